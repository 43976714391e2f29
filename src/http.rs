use reqwest::Method;
use serde_json::Value;

use crate::transport::{AccessToken, Transport, TransportError};

pub const DEFAULT_API_BASE: &str = "https://api.aliyundrive.com";

/// A [`Transport`] talking to the drive over HTTPS.
pub struct HttpTransport {
    pub api_base: String,
    pub client: reqwest::Client,
    pub token: AccessToken,
}

impl HttpTransport {
    pub fn new(api_base: impl Into<String>, token: AccessToken) -> Self {
        let api_base: String = api_base.into();
        Self {
            api_base: api_base.trim_end_matches('/').to_owned(),
            client: reqwest::Client::new(),
            token,
        }
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Value,
    ) -> Result<Value, TransportError> {
        let url = format!("{}{endpoint}", self.api_base);
        let response = self
            .client
            .request(method, url)
            .bearer_auth(self.token.get())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else if status.is_success() {
            serde_json::from_slice(&bytes)?
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        if !status.is_success() {
            return Err(TransportError::api(status.as_u16(), body));
        }
        Ok(body)
    }

    async fn upload_part(&self, upload_url: &str, body: Vec<u8>) -> Result<(), TransportError> {
        // The part URL is pre-signed, and the signature covers an empty content type.
        let response = self.client.put(upload_url).body(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::PartRejected {
                url: upload_url.into(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    fn access_token(&self) -> String {
        self.token.get()
    }
}
