use reqwest::Method;
use serde_json::json;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::UploadConfig;
use crate::error::UploadError;
use crate::finalize::complete_upload;
use crate::negotiator::{Negotiated, UploadNegotiator};
use crate::request::UploadTarget;
use crate::transfer::ChunkedTransfer;
use crate::transport::{Transport, USER_INFO};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The drive deduplicated the content, no bytes were transferred.
    RapidUpload { file_id: String },
    Transferred { file_id: String, parts: usize, bytes: u64 },
}

impl UploadOutcome {
    pub fn file_id(&self) -> &str {
        match self {
            Self::RapidUpload { file_id } | Self::Transferred { file_id, .. } => file_id,
        }
    }
}

/// Uploads files into one drive.
pub struct DriveUploader<T> {
    transport: T,
    drive_id: String,
    config: UploadConfig,
}

impl<T: Transport> DriveUploader<T> {
    pub fn new(transport: T, drive_id: impl Into<String>, config: UploadConfig) -> Self {
        Self {
            transport,
            drive_id: drive_id.into(),
            config,
        }
    }

    /// Creates an uploader for the default drive of the account behind `transport`.
    pub async fn for_default_drive(
        transport: T,
        config: UploadConfig,
    ) -> Result<Self, UploadError> {
        let raw = transport.request(Method::POST, USER_INFO, json!({})).await?;
        let drive_id = raw["default_drive_id"]
            .as_str()
            .filter(|id| !id.is_empty())
            .map(str::to_owned);
        let Some(drive_id) = drive_id else {
            return Err(UploadError::MissingDriveId { raw });
        };
        debug!(%drive_id, "using the default drive");
        Ok(Self::new(transport, drive_id, config))
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Uploads `stream`, which has to yield exactly `target.size` bytes.
    ///
    /// `progress` receives the completed percentage after every transferred part.
    /// A stream of any other length fails with [`UploadError::SizeMismatch`]
    /// and the session is never committed.
    pub async fn put<R, P>(
        &self,
        target: &UploadTarget,
        stream: R,
        mut progress: P,
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome, UploadError>
    where
        R: AsyncRead + Unpin + Send,
        P: FnMut(u8) + Send,
    {
        let negotiator = UploadNegotiator {
            transport: &self.transport,
            config: &self.config,
            drive_id: &self.drive_id,
            cancel,
        };

        let (session, parts, part_count, mut source) =
            match negotiator.negotiate(target, stream).await? {
                Negotiated::RapidUpload { file_id } => {
                    return Ok(UploadOutcome::RapidUpload { file_id });
                }
                Negotiated::TransferRequired {
                    session,
                    parts,
                    part_count,
                    source,
                } => (session, parts, part_count, source),
            };

        let transfer = ChunkedTransfer {
            transport: &self.transport,
            part_size: self.config.part_size,
            cancel,
        };
        let bytes = transfer
            .run(&parts, part_count, &mut source, &mut progress)
            .await?;
        let trailing = tokio::io::copy(&mut source, &mut tokio::io::sink()).await?;
        // the spill is not needed for the commit
        drop(source);
        if bytes + trailing != target.size {
            return Err(UploadError::SizeMismatch {
                declared: target.size,
                actual: bytes + trailing,
            });
        }

        complete_upload(&self.transport, &self.drive_id, &session, cancel).await?;
        info!(name = %target.name, file_id = %session.file_id, bytes, "file uploaded");

        Ok(UploadOutcome::Transferred {
            file_id: session.file_id,
            parts: parts.len(),
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::TransportError;
    use crate::testing::{payload, session_response, ScriptedTransport};
    use crate::transport::{COMPLETE_UPLOAD, CREATE_UPLOAD};

    fn uploader(
        rapid_upload: bool,
        dir: &std::path::Path,
        transport: ScriptedTransport,
    ) -> DriveUploader<ScriptedTransport> {
        let config = UploadConfig::default()
            .rapid_upload(rapid_upload)
            .temp_dir(dir);
        DriveUploader::new(transport, "drive-1", config)
    }

    fn spilled_files(dir: &tempfile::TempDir) -> usize {
        std::fs::read_dir(dir.path()).unwrap().count()
    }

    #[tokio::test]
    async fn small_file_without_rapid_upload() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new()
            .respond(session_response("f-a", 1))
            .respond(json!({"file_id": "f-a"}));
        let uploader = uploader(false, dir.path(), transport);
        let data = payload(2000);
        let mut reported = vec![];

        let outcome = uploader
            .put(
                &UploadTarget::new("root", "a.bin", 2000),
                &data[..],
                |p| reported.push(p),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            outcome,
            UploadOutcome::Transferred {
                file_id: "f-a".into(),
                parts: 1,
                bytes: 2000
            }
        );
        assert_eq!(reported, [100]);

        let requests = uploader.transport().requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].0, CREATE_UPLOAD);
        assert!(requests[0].1.get("pre_hash").is_none());
        assert!(requests[0].1.get("proof_code").is_some());
        assert_eq!(requests[1].0, COMPLETE_UPLOAD);

        let parts = uploader.transport().parts();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].1, data);
        assert_eq!(spilled_files(&dir), 0);
    }

    #[tokio::test]
    async fn confirmed_rapid_upload_never_transfers() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new()
            .challenge(json!({}))
            .respond(json!({"file_id": "f-b", "upload_id": "u-b", "rapid_upload": true}));
        let uploader = uploader(true, dir.path(), transport);
        let data = payload(20_000_000);
        let mut calls = 0;

        let outcome = uploader
            .put(
                &UploadTarget::new("root", "b.bin", 20_000_000),
                &data[..],
                |_| calls += 1,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.file_id(), "f-b");
        assert!(matches!(outcome, UploadOutcome::RapidUpload { .. }));
        assert_eq!(calls, 0);
        assert!(uploader.transport().parts().is_empty());
        let requests = uploader.transport().requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].1["part_info_list"].as_array().unwrap().len(), 2);
        assert_eq!(spilled_files(&dir), 0);
    }

    #[tokio::test]
    async fn failed_rapid_upload_transfers_from_the_spill() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new()
            .challenge(json!({}))
            .respond(session_response("f-c", 3))
            .respond(json!({"file_id": "f-c"}));
        let config = UploadConfig::default()
            .temp_dir(dir.path())
            .part_size(1000);
        let uploader = DriveUploader::new(transport, "drive-1", config);
        let data = payload(2500);
        let mut reported = vec![];

        let outcome = uploader
            .put(
                &UploadTarget::new("root", "c.bin", 2500),
                &data[..],
                |p| reported.push(p),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.file_id(), "f-c");
        assert_eq!(reported, [33, 66, 100]);
        let sent: Vec<u8> = uploader
            .transport()
            .parts()
            .into_iter()
            .flat_map(|(_, body)| body)
            .collect();
        assert_eq!(sent, data);
        assert_eq!(spilled_files(&dir), 0);
    }

    #[tokio::test]
    async fn empty_file_commits_one_empty_part() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new()
            .respond(session_response("f-d", 1))
            .respond(json!({"file_id": "f-d"}));
        let uploader = uploader(true, dir.path(), transport);

        let outcome = uploader
            .put(
                &UploadTarget::new("root", "empty", 0),
                &b""[..],
                |_| {},
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            outcome,
            UploadOutcome::Transferred {
                file_id: "f-d".into(),
                parts: 1,
                bytes: 0
            }
        );
        let requests = uploader.transport().requests();
        assert_eq!(requests[0].1["part_info_list"], json!([{"part_number": 1}]));
        assert_eq!(
            requests[0].1["pre_hash"],
            "da39a3ee5e6b4b0d3255bfef95601890afd80709"
        );
        assert_eq!(uploader.transport().parts()[0].1, b"");
    }

    #[tokio::test]
    async fn mismatched_commit_reports_the_raw_payload() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new()
            .respond(session_response("f-e", 1))
            .respond(json!({"file_id": "someone-else", "name": "e.bin"}));
        let uploader = uploader(false, dir.path(), transport);

        let err = uploader
            .put(
                &UploadTarget::new("root", "e.bin", 10),
                &payload(10)[..],
                |_| {},
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        let UploadError::ProtocolMismatch { expected, raw } = err else {
            panic!("unexpected error {err:?}");
        };
        assert_eq!(expected, "f-e");
        assert_eq!(raw["file_id"], "someone-else");
        assert_eq!(spilled_files(&dir), 0);
    }

    #[tokio::test]
    async fn rejected_part_removes_the_spill() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport {
            reject_part: Some(1),
            ..ScriptedTransport::new()
                .challenge(json!({}))
                .respond(session_response("f-f", 3))
        };
        let config = UploadConfig::default()
            .temp_dir(dir.path())
            .part_size(1000);
        let uploader = DriveUploader::new(transport, "drive-1", config);

        let err = uploader
            .put(
                &UploadTarget::new("root", "f.bin", 2500),
                &payload(2500)[..],
                |_| {},
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            UploadError::Transport(TransportError::PartRejected { status: 403, .. })
        ));
        assert_eq!(uploader.transport().parts().len(), 1);
        assert_eq!(uploader.transport().requests().len(), 2);
        assert_eq!(spilled_files(&dir), 0);
    }

    #[tokio::test]
    async fn cancelled_transfer_removes_the_spill() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new()
            .challenge(json!({}))
            .respond(session_response("f-g", 3));
        let config = UploadConfig::default()
            .temp_dir(dir.path())
            .part_size(1000);
        let uploader = DriveUploader::new(transport, "drive-1", config);
        let cancel = CancellationToken::new();

        let err = uploader
            .put(
                &UploadTarget::new("root", "g.bin", 2500),
                &payload(2500)[..],
                |_| cancel.cancel(),
                &cancel,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Cancelled));
        assert_eq!(uploader.transport().parts().len(), 1);
        assert_eq!(spilled_files(&dir), 0);
    }

    #[tokio::test]
    async fn longer_stream_is_never_committed() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new().respond(session_response("f-h", 2));
        let config = UploadConfig::default()
            .temp_dir(dir.path())
            .part_size(1000);
        let uploader = DriveUploader::new(transport, "drive-1", config);

        let err = uploader
            .put(
                &UploadTarget::new("root", "h.bin", 2000),
                &payload(3000)[..],
                |_| {},
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            UploadError::SizeMismatch {
                declared: 2000,
                actual: 3000
            }
        ));
        let requests = uploader.transport().requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, CREATE_UPLOAD);
    }

    #[tokio::test]
    async fn zero_part_size_from_the_addition_still_sends_every_byte() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new()
            .respond(session_response("f-i", 5))
            .respond(json!({"file_id": "f-i"}));
        let config = UploadConfig::from_json(r#"{"part_size": 0, "rapid_upload": false}"#)
            .unwrap()
            .temp_dir(dir.path());
        let uploader = DriveUploader::new(transport, "drive-1", config);
        let data = payload(5);

        let outcome = uploader
            .put(
                &UploadTarget::new("root", "i.bin", 5),
                &data[..],
                |_| {},
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            outcome,
            UploadOutcome::Transferred {
                file_id: "f-i".into(),
                parts: 5,
                bytes: 5
            }
        );
        let requests = uploader.transport().requests();
        assert_eq!(requests[0].1["part_info_list"].as_array().unwrap().len(), 5);
        let parts = uploader.transport().parts();
        assert!(parts.iter().all(|(_, body)| body.len() == 1));
        let sent: Vec<u8> = parts.into_iter().flat_map(|(_, body)| body).collect();
        assert_eq!(sent, data);
    }

    #[tokio::test]
    async fn default_drive_is_looked_up() {
        let transport =
            ScriptedTransport::new().respond(json!({"user_id": "u", "default_drive_id": "d-9"}));

        let uploader = DriveUploader::for_default_drive(transport, UploadConfig::default())
            .await
            .unwrap();

        assert_eq!(uploader.drive_id, "d-9");
        let requests = uploader.transport().requests();
        assert_eq!(requests, [(USER_INFO.to_owned(), json!({}))]);
    }

    #[tokio::test]
    async fn account_without_a_default_drive() {
        let transport = ScriptedTransport::new().respond(json!({"user_id": "u"}));

        let err = DriveUploader::for_default_drive(transport, UploadConfig::default())
            .await
            .err()
            .unwrap();

        let UploadError::MissingDriveId { raw } = err else {
            panic!("unexpected error {err:?}");
        };
        assert_eq!(raw["user_id"], "u");
    }
}
