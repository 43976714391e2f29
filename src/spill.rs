use std::io::SeekFrom;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

use sha1::{Digest, Sha1};
use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, AsyncWriteExt, ReadBuf};

const COPY_BUF: usize = 64 * 1024;

/// A seekable on-disk copy of a stream.
///
/// The backing file is removed when this is dropped, on every exit path.
#[derive(Debug)]
pub struct SpillFile {
    file: File,
    path: TempPath,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDigest {
    /// Lowercase hex SHA-1 of the whole content.
    pub sha1: String,
    pub len: u64,
}

impl SpillFile {
    pub fn create_in(dir: &Path) -> std::io::Result<Self> {
        let (file, path) = tempfile::Builder::new()
            .prefix("file-")
            .tempfile_in(dir)?
            .into_parts();
        Ok(Self {
            file: File::from_std(file),
            path,
        })
    }

    /// Copies all of `stream` to disk while hashing it, in a single pass.
    pub async fn spill<R: AsyncRead + Unpin>(
        dir: &Path,
        mut stream: R,
    ) -> std::io::Result<(Self, ContentDigest)> {
        let mut spill = Self::create_in(dir)?;
        let mut hasher = Sha1::new();
        let mut len = 0;

        let mut buf = vec![0; COPY_BUF];
        loop {
            let read = stream.read(&mut buf).await?;
            if read == 0 {
                break;
            }
            let data = &buf[..read];
            hasher.update(data);
            spill.file.write_all(data).await?;
            len += read as u64;
        }
        spill.file.flush().await?;

        let digest = ContentDigest {
            sha1: base16ct::lower::encode_string(&hasher.finalize()),
            len,
        };
        Ok((spill, digest))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn rewind(&mut self) -> std::io::Result<()> {
        self.file.seek(SeekFrom::Start(0)).await?;
        Ok(())
    }

    /// Removes the backing file now, reporting failures instead of ignoring them.
    pub fn discard(self) {
        let Self { file, path } = self;
        drop(file);
        let shown = path.display().to_string();
        if let Err(err) = path.close() {
            tracing::warn!(path = %shown, "failed to remove spill file: {err}");
        }
    }
}

impl AsyncRead for SpillFile {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.file).poll_read(cx, buf)
    }
}

impl AsyncSeek for SpillFile {
    fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> std::io::Result<()> {
        Pin::new(&mut self.file).start_seek(position)
    }

    fn poll_complete(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<u64>> {
        Pin::new(&mut self.file).poll_complete(cx)
    }
}
