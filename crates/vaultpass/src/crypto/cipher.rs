//! AES-256-CBC field encryption
//!
//! Two on-the-wire encodings, distinguished by a leading marker byte:
//! - random-IV: `'!' || iv[16] || ciphertext` (new encryptions always use
//!   this one)
//! - legacy fixed-IV: bare ciphertext with an all-zero IV
//!
//! Form fields carry the base64 representation instead:
//! `"!" + base64(iv) + "|" + base64(ciphertext)`, or plain base64 for the
//! legacy encoding. Decryption detects the encoding from the payload
//! shape, never from caller-supplied metadata.

use aes::Aes256;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;

use crate::error::{Result, VaultError};

use super::SymmetricKey;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const MARKER: u8 = b'!';
const BLOCK: usize = 16;
const ZERO_IV: [u8; BLOCK] = [0u8; BLOCK];

pub(crate) fn cbc_encrypt(key: &SymmetricKey, iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let pad_len = BLOCK - (plaintext.len() % BLOCK);
    let mut buf = vec![0u8; plaintext.len() + pad_len];
    buf[..plaintext.len()].copy_from_slice(plaintext);

    let encryptor = Aes256CbcEnc::new_from_slices(key.as_bytes(), iv)
        .map_err(|e| VaultError::Crypto(format!("aes init: {e}")))?;
    let ciphertext = encryptor
        .encrypt_padded_mut::<Pkcs7>(&mut buf, plaintext.len())
        .map_err(|e| VaultError::Crypto(format!("aes encrypt: {e}")))?
        .to_vec();
    Ok(ciphertext)
}

pub(crate) fn cbc_decrypt(key: &SymmetricKey, iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK != 0 {
        return Err(VaultError::Crypto(format!(
            "ciphertext not block-aligned: {} bytes",
            ciphertext.len()
        )));
    }

    let mut buf = ciphertext.to_vec();
    let decryptor = Aes256CbcDec::new_from_slices(key.as_bytes(), iv)
        .map_err(|e| VaultError::Crypto(format!("aes init: {e}")))?;
    let plaintext = decryptor
        .decrypt_padded_mut::<Pkcs7>(&mut buf)
        .map_err(|e| VaultError::Crypto(format!("aes decrypt: {e}")))?
        .to_vec();
    Ok(plaintext)
}

/// Encrypt an opaque byte field in the random-IV binary encoding.
///
/// Empty plaintext encrypts to empty ciphertext.
pub fn encrypt_field(plaintext: &[u8], key: &SymmetricKey) -> Result<Vec<u8>> {
    if plaintext.is_empty() {
        return Ok(Vec::new());
    }

    let mut iv = [0u8; BLOCK];
    rand::thread_rng().fill_bytes(&mut iv);
    let ciphertext = cbc_encrypt(key, &iv, plaintext)?;

    let mut out = Vec::with_capacity(1 + BLOCK + ciphertext.len());
    out.push(MARKER);
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt an opaque byte field, detecting the encoding from its shape.
///
/// Empty ciphertext decrypts to empty plaintext (a no-op, not an error).
pub fn decrypt_field(data: &[u8], key: &SymmetricKey) -> Result<Vec<u8>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }

    if data[0] == MARKER {
        if data.len() < 1 + BLOCK + BLOCK || (data.len() - 1 - BLOCK) % BLOCK != 0 {
            return Err(VaultError::Crypto(format!(
                "truncated random-IV field: {} bytes",
                data.len()
            )));
        }
        let iv = &data[1..1 + BLOCK];
        cbc_decrypt(key, iv, &data[1 + BLOCK..])
    } else {
        cbc_decrypt(key, &ZERO_IV, data)
    }
}

/// Encrypt a string field in the base64 wire form used by mutation
/// requests: `"!" + base64(iv) + "|" + base64(ciphertext)`.
pub fn encrypt_field_b64(plaintext: &str, key: &SymmetricKey) -> Result<String> {
    if plaintext.is_empty() {
        return Ok(String::new());
    }

    let mut iv = [0u8; BLOCK];
    rand::thread_rng().fill_bytes(&mut iv);
    let ciphertext = cbc_encrypt(key, &iv, plaintext.as_bytes())?;

    Ok(format!(
        "!{}|{}",
        STANDARD.encode(iv),
        STANDARD.encode(ciphertext)
    ))
}

/// Decrypt a base64 wire-form field, detecting the encoding from its
/// marker: `!iv|ciphertext` (both base64) or plain base64 for the legacy
/// fixed-IV encoding.
pub fn decrypt_field_b64(data: &str, key: &SymmetricKey) -> Result<String> {
    if data.is_empty() {
        return Ok(String::new());
    }

    let plaintext = if let Some(rest) = data.strip_prefix('!') {
        let (iv_b64, ct_b64) = rest
            .split_once('|')
            .ok_or_else(|| VaultError::Crypto("random-IV field missing separator".to_string()))?;
        let iv = STANDARD
            .decode(iv_b64)
            .map_err(|e| VaultError::Crypto(format!("iv base64: {e}")))?;
        let ciphertext = STANDARD
            .decode(ct_b64)
            .map_err(|e| VaultError::Crypto(format!("ciphertext base64: {e}")))?;
        if iv.len() != BLOCK {
            return Err(VaultError::Crypto(format!("iv must be 16 bytes, got {}", iv.len())));
        }
        cbc_decrypt(key, &iv, &ciphertext)?
    } else {
        let ciphertext = STANDARD
            .decode(data)
            .map_err(|e| VaultError::Crypto(format!("ciphertext base64: {e}")))?;
        cbc_decrypt(key, &ZERO_IV, &ciphertext)?
    };

    Ok(String::from_utf8_lossy(&plaintext).into_owned())
}
