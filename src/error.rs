use serde::Deserialize;
use serde_json::Value;

/// The structured error code the drive returns when a pre-hash matched an
/// existing object and the client has to prove possession of the full content.
pub const PRE_HASH_MATCHED: &str = "PreHashMatched";

/// A failure reported by the drive API itself, as opposed to a network failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiFailure {
    #[serde(skip)]
    pub status: u16,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
    /// The whole error body, which may still carry an upload session.
    #[serde(skip)]
    pub body: Value,
}

impl ApiFailure {
    pub fn from_body(status: u16, body: Value) -> Self {
        let mut failure = ApiFailure::deserialize(&body).unwrap_or_default();
        failure.status = status;
        failure.body = body;
        failure
    }
}

/// Errors surfaced by a [`Transport`](crate::transport::Transport).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("drive api error {}: {} ({})", .0.status, .0.code, .0.message)]
    Api(Box<ApiFailure>),

    #[error("part upload to {url} failed with status {status}")]
    PartRejected { url: String, status: u16 },

    #[error("malformed response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl TransportError {
    pub fn api(status: u16, body: Value) -> Self {
        Self::Api(Box::new(ApiFailure::from_body(status, body)))
    }

    /// The structured error code, if the drive sent one.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api(failure) if !failure.code.is_empty() => Some(&failure.code),
            _ => None,
        }
    }

    pub fn is_challenge(&self) -> bool {
        self.code() == Some(PRE_HASH_MATCHED)
    }
}

/// Errors produced by an upload.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("local I/O error: {0}")]
    LocalIo(#[from] std::io::Error),

    #[error("unexpected response from drive: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("upload completion returned a different file (expected {expected}): {raw}")]
    ProtocolMismatch { expected: String, raw: Value },

    #[error("drive did not issue an upload session: {raw}")]
    MissingSession { raw: Value },

    #[error("stream yielded {actual} bytes but {declared} were declared")]
    SizeMismatch { declared: u64, actual: u64 },

    #[error("drive did not report a default drive: {raw}")]
    MissingDriveId { raw: Value },

    #[error("upload cancelled")]
    Cancelled,
}
