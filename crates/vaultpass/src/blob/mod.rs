//! Binary vault-blob codec
//!
//! The blob is a flat sequence of chunks, each
//! `{4-byte ASCII tag}{u32 big-endian length}{payload}`. Account and
//! shared-folder records live in `ACCT`/`SHAR` chunks whose payloads are
//! positional, length-prefixed items; unknown tags are skipped for
//! forward compatibility.

mod chunk;
mod parser;

pub(crate) use chunk::{read_items, Chunk, ChunkReader};
pub(crate) use parser::parse_accounts;

pub(crate) const TAG_ACCOUNT: [u8; 4] = *b"ACCT";
pub(crate) const TAG_SHARE: [u8; 4] = *b"SHAR";
