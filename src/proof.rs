//! The proof-of-possession challenge.
//!
//! The drive picks a pseudo-random 8 byte window of the file, keyed by the
//! access token and the declared size, and the client has to echo those bytes
//! back. The offset derivation has to match the drive bit for bit.

use std::io::SeekFrom;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use md5::{Digest, Md5};
use num_bigint::BigUint;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

pub const PROOF_WINDOW: u64 = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofCode {
    pub offset: u64,
    pub bytes: Vec<u8>,
}

impl ProofCode {
    pub fn encode(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

/// The numeric seed derived from `secret`: the first 16 hex digits of its MD5.
pub fn proof_seed(secret: &str) -> BigUint {
    let digest = base16ct::lower::encode_string(&Md5::digest(secret.as_bytes()));
    // 16 hex digits are always valid base-16
    BigUint::parse_bytes(digest[..16].as_bytes(), 16).unwrap_or_default()
}

/// Where the proof window starts, always in `0..declared_size` (or 0 for empty files).
pub fn proof_offset(secret: &str, declared_size: u64) -> u64 {
    if declared_size == 0 {
        return 0;
    }
    let offset = proof_seed(secret) % BigUint::from(declared_size);
    // the remainder is below `declared_size`, so it has at most one digit
    offset.iter_u64_digits().next().unwrap_or(0)
}

/// Reads the proof window of a file of `declared_size` bytes out of `source`.
pub async fn read_proof_code<S>(
    source: &mut S,
    secret: &str,
    declared_size: u64,
) -> std::io::Result<ProofCode>
where
    S: AsyncRead + AsyncSeek + Unpin,
{
    let offset = proof_offset(secret, declared_size);
    let window = PROOF_WINDOW.min(declared_size - offset);

    let mut bytes = Vec::with_capacity(window as usize);
    if window > 0 {
        source.seek(SeekFrom::Start(offset)).await?;
        (&mut *source).take(window).read_to_end(&mut bytes).await?;
    }

    Ok(ProofCode { offset, bytes })
}
