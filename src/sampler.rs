use std::io::Cursor;

use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncReadExt, Chain};

/// How many leading bytes go into the pre-hash.
pub const PRE_HASH_BUDGET: u64 = 1024;

/// A stream whose sampled prefix has been put back in front of it.
pub type Replay<R> = Chain<Cursor<Vec<u8>>, R>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrehashSample {
    /// Number of bytes that went into the hash.
    pub len: usize,
    /// Lowercase hex SHA-1 of the sampled bytes.
    pub hash: String,
}

pub fn sha1_hex(data: &[u8]) -> String {
    base16ct::lower::encode_string(&Sha1::digest(data))
}

/// Hashes up to `budget` leading bytes of `stream`.
///
/// Returns the sample along with a stream that yields the exact original byte
/// sequence, sampled prefix included.
pub async fn sample_prefix<R: AsyncRead + Unpin>(
    mut stream: R,
    budget: u64,
) -> std::io::Result<(PrehashSample, Replay<R>)> {
    let mut prefix = Vec::with_capacity(budget as usize);
    (&mut stream).take(budget).read_to_end(&mut prefix).await?;

    let sample = PrehashSample {
        len: prefix.len(),
        hash: sha1_hex(&prefix),
    };
    Ok((sample, Cursor::new(prefix).chain(stream)))
}
