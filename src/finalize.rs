use reqwest::Method;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::UploadError;
use crate::request::UploadSession;
use crate::transport::{Transport, COMPLETE_UPLOAD};

/// Commits an upload session once all of its parts are transferred.
///
/// The drive has to echo back the session's file id, anything else is treated
/// as a failed commit.
pub async fn complete_upload<T: Transport + ?Sized>(
    transport: &T,
    drive_id: &str,
    session: &UploadSession,
    cancel: &CancellationToken,
) -> Result<(), UploadError> {
    if cancel.is_cancelled() {
        return Err(UploadError::Cancelled);
    }

    let body = json!({
        "drive_id": drive_id,
        "file_id": session.file_id,
        "upload_id": session.upload_id,
    });
    let response = transport
        .request(Method::POST, COMPLETE_UPLOAD, body)
        .await?;

    if response.get("file_id").and_then(|id| id.as_str()) != Some(session.file_id.as_str()) {
        return Err(UploadError::ProtocolMismatch {
            expected: session.file_id.clone(),
            raw: response,
        });
    }

    info!(file_id = %session.file_id, "upload completed");
    Ok(())
}
