use std::sync::{Arc, PoisonError, RwLock};

use reqwest::Method;
use serde_json::Value;

pub use crate::error::TransportError;

/// The drive endpoint that allocates an upload session, or short-circuits it.
pub const CREATE_UPLOAD: &str = "/adrive/v2/file/createWithFolders";
/// The drive endpoint that commits an upload session.
pub const COMPLETE_UPLOAD: &str = "/v2/file/complete";
/// The account endpoint reporting, among others, the `default_drive_id`.
pub const USER_INFO: &str = "/v2/user/get";

/// A shared access token.
///
/// A background refresher may replace the token at any time; readers take a
/// snapshot whenever they need it.
#[derive(Debug, Clone, Default)]
pub struct AccessToken(Arc<RwLock<String>>);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Arc::new(RwLock::new(token.into())))
    }

    pub fn get(&self) -> String {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set(&self, token: impl Into<String>) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = token.into();
    }
}

/// An authenticated connection to the drive API.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Sends a JSON request to an API endpoint and returns the JSON response.
    ///
    /// Failures the drive describes with a structured `code` must surface as
    /// [`TransportError::Api`], so callers can tell them apart from network
    /// failures.
    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Value,
    ) -> Result<Value, TransportError>;

    /// Uploads the raw bytes of one part to a pre-signed part URL.
    async fn upload_part(&self, upload_url: &str, body: Vec<u8>) -> Result<(), TransportError>;

    /// The current access token, which doubles as the proof-code secret.
    fn access_token(&self) -> String;
}
