use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::UploadError;
use crate::request::PartInfo;
use crate::transport::Transport;

/// Progress after `done` of `part_count` parts, or `None` when there is nothing to report on.
pub fn progress_percent(done: u64, part_count: u64) -> Option<u8> {
    if part_count == 0 {
        return None;
    }
    Some((done * 100 / part_count).min(100) as u8)
}

/// Streams a file to the part URLs of an upload session, one part after the other.
pub struct ChunkedTransfer<'a, T: ?Sized> {
    pub transport: &'a T,
    pub part_size: u64,
    pub cancel: &'a CancellationToken,
}

impl<T: Transport + ?Sized> ChunkedTransfer<'_, T> {
    /// Uploads `parts` (sorted by part number) from `source`, which must be at offset 0.
    ///
    /// Returns the number of bytes sent.
    pub async fn run<R, P>(
        &self,
        parts: &[PartInfo],
        part_count: u64,
        source: &mut R,
        progress: &mut P,
    ) -> Result<u64, UploadError>
    where
        R: AsyncRead + Unpin + Send,
        P: FnMut(u8) + Send,
    {
        let mut sent = 0;
        for (done, part) in (1..).zip(parts) {
            if self.cancel.is_cancelled() {
                return Err(UploadError::Cancelled);
            }

            let part_size = self.part_size.max(1);
            let mut data = Vec::with_capacity(part_size.min(1024 * 1024) as usize);
            (&mut *source)
                .take(part_size)
                .read_to_end(&mut data)
                .await?;
            let len = data.len() as u64;

            debug!(part_number = part.part_number, len, "uploading part");
            self.transport.upload_part(&part.upload_url, data).await?;
            sent += len;

            if let Some(percent) = progress_percent(done, part_count) {
                progress(percent);
            }
        }
        Ok(sent)
    }
}
