//! Pull-based readers for the blob's chunk and item framing

use crate::error::{Result, VaultError};

/// One tagged, length-prefixed segment of the blob.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Chunk<'a> {
    pub tag: [u8; 4],
    pub payload: &'a [u8],
}

/// Forward scanner producing `(tag, payload)` pairs lazily.
pub(crate) struct ChunkReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ChunkReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Read the next chunk, or `None` at a clean end of input.
    pub fn next_chunk(&mut self) -> Result<Option<Chunk<'a>>> {
        if self.pos == self.buf.len() {
            return Ok(None);
        }

        let remaining = self.buf.len() - self.pos;
        if remaining < 8 {
            return Err(VaultError::Format(format!(
                "truncated chunk header at offset {}",
                self.pos
            )));
        }

        let mut tag = [0u8; 4];
        tag.copy_from_slice(&self.buf[self.pos..self.pos + 4]);
        let len = u32::from_be_bytes(
            self.buf[self.pos + 4..self.pos + 8].try_into().expect("4 bytes"),
        ) as usize;

        if len > remaining - 8 {
            return Err(VaultError::Format(format!(
                "chunk length {} exceeds remaining {} bytes at offset {}",
                len,
                remaining - 8,
                self.pos
            )));
        }

        let payload = &self.buf[self.pos + 8..self.pos + 8 + len];
        self.pos += 8 + len;
        Ok(Some(Chunk { tag, payload }))
    }
}

/// Split an `ACCT`/`SHAR` payload into its positional items
/// (`{u32 big-endian length}{bytes}` each).
pub(crate) fn read_items(payload: &[u8]) -> Result<Vec<&[u8]>> {
    let mut items = Vec::new();
    let mut pos = 0;
    while pos < payload.len() {
        if payload.len() - pos < 4 {
            return Err(VaultError::Format(format!(
                "truncated item header at offset {pos}"
            )));
        }
        let len = u32::from_be_bytes(payload[pos..pos + 4].try_into().expect("4 bytes")) as usize;
        pos += 4;
        if len > payload.len() - pos {
            return Err(VaultError::Format(format!(
                "item length {} exceeds remaining {} bytes",
                len,
                payload.len() - pos
            )));
        }
        items.push(&payload[pos..pos + len]);
        pos += len;
    }
    Ok(items)
}
