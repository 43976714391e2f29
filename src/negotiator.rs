use std::pin::Pin;
use std::task::{Context, Poll};

use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncRead, ReadBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::UploadConfig;
use crate::error::{TransportError, UploadError, PRE_HASH_MATCHED};
use crate::proof::read_proof_code;
use crate::request::{
    part_count, CreateUploadResponse, NegotiationPayload, PartInfo, UploadRequest, UploadSession,
    UploadTarget,
};
use crate::sampler::{sample_prefix, Replay, PRE_HASH_BUDGET};
use crate::spill::SpillFile;
use crate::transport::{Transport, CREATE_UPLOAD};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    PrehashPending,
    HashChallengeIssued,
    RapidConfirmed,
    TransferRequired,
}

/// Where the bytes of a required transfer come from.
#[derive(Debug)]
pub enum TransferSource<R> {
    /// The caller's stream, with its sampled prefix replayed in front.
    Stream(R),
    /// The on-disk copy made while hashing, rewound to the start.
    Spilled(SpillFile),
}

impl<R: AsyncRead + Unpin> AsyncRead for TransferSource<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Stream(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Spilled(spill) => Pin::new(spill).poll_read(cx, buf),
        }
    }
}

#[derive(Debug)]
pub enum Negotiated<R> {
    /// The drive already had the content, nothing has to be transferred.
    RapidUpload { file_id: String },
    TransferRequired {
        session: UploadSession,
        parts: Vec<PartInfo>,
        part_count: u64,
        source: TransferSource<R>,
    },
}

impl<R> Negotiated<R> {
    pub fn state(&self) -> NegotiationState {
        match self {
            Self::RapidUpload { .. } => NegotiationState::RapidConfirmed,
            Self::TransferRequired { .. } => NegotiationState::TransferRequired,
        }
    }
}

/// Runs the create-upload handshake for a single file.
pub struct UploadNegotiator<'a, T: ?Sized> {
    pub transport: &'a T,
    pub config: &'a UploadConfig,
    pub drive_id: &'a str,
    pub cancel: &'a CancellationToken,
}

impl<T: Transport + ?Sized> UploadNegotiator<'_, T> {
    pub async fn negotiate<R: AsyncRead + Unpin + Send>(
        &self,
        target: &UploadTarget,
        stream: R,
    ) -> Result<Negotiated<Replay<R>>, UploadError> {
        // a refresh during the upload must not change the proof secret midway
        let secret = self.transport.access_token();

        if !self.config.rapid_upload {
            debug!(name = %target.name, "rapid upload disabled, hashing the whole file");
            return self.prove_possession(target, stream, &secret).await;
        }

        let (sample, replay) = sample_prefix(stream, PRE_HASH_BUDGET).await?;
        debug!(
            name = %target.name,
            state = ?NegotiationState::PrehashPending,
            sampled = sample.len,
            "submitting pre-hash"
        );

        let payload = NegotiationPayload::pre_hash(sample.hash);
        match self.create_upload(target, payload).await {
            Ok(response) => self.conclude(target, response, TransferSource::Stream(replay)),
            Err(UploadError::Transport(err)) if err.is_challenge() => {
                debug!(
                    name = %target.name,
                    state = ?NegotiationState::HashChallengeIssued,
                    "pre-hash matched, proving possession"
                );
                self.prove_possession(target, replay, &secret).await
            }
            Err(err) => Err(err),
        }
    }

    /// Hashes the full content, answers the proof challenge and resubmits.
    async fn prove_possession<S, O>(
        &self,
        target: &UploadTarget,
        stream: S,
        secret: &str,
    ) -> Result<Negotiated<O>, UploadError>
    where
        S: AsyncRead + Unpin + Send,
    {
        let (mut spill, digest) = SpillFile::spill(&self.config.temp_dir, stream).await?;
        if digest.len != target.size {
            return Err(UploadError::SizeMismatch {
                declared: target.size,
                actual: digest.len,
            });
        }

        let proof = read_proof_code(&mut spill, secret, target.size).await?;
        spill.rewind().await?;

        let payload = NegotiationPayload::full_hash(digest.sha1, proof.encode());
        let response = match self.create_upload(target, payload).await {
            Ok(response) => response,
            // a repeated challenge may still carry the session to transfer into
            Err(UploadError::Transport(TransportError::Api(failure)))
                if failure.code == PRE_HASH_MATCHED =>
            {
                failure.body
            }
            Err(err) => return Err(err),
        };

        self.conclude(target, response, TransferSource::Spilled(spill))
    }

    fn conclude<R>(
        &self,
        target: &UploadTarget,
        raw: Value,
        source: TransferSource<R>,
    ) -> Result<Negotiated<R>, UploadError> {
        let response = CreateUploadResponse::deserialize(&raw)?;
        if response.rapid_upload {
            info!(name = %target.name, file_id = %response.file_id, "rapid upload confirmed");
            if let TransferSource::Spilled(spill) = source {
                spill.discard();
            }
            return Ok(Negotiated::RapidUpload {
                file_id: response.file_id,
            });
        }

        let Some(session) = response.session() else {
            return Err(UploadError::MissingSession { raw });
        };
        debug!(
            name = %target.name,
            file_id = %session.file_id,
            state = ?NegotiationState::TransferRequired,
            parts = response.part_info_list.len(),
            "transfer required"
        );

        let mut parts = response.part_info_list;
        parts.sort_by_key(|part| part.part_number);
        Ok(Negotiated::TransferRequired {
            session,
            parts,
            part_count: part_count(target.size, self.config.part_size),
            source,
        })
    }

    async fn create_upload(
        &self,
        target: &UploadTarget,
        payload: NegotiationPayload,
    ) -> Result<Value, UploadError> {
        if self.cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }
        let request = UploadRequest::new(self.config, self.drive_id, target, payload);
        let body = serde_json::to_value(&request)?;
        Ok(self.transport.request(Method::POST, CREATE_UPLOAD, body).await?)
    }
}
