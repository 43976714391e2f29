use std::collections::VecDeque;
use std::sync::Mutex;

use reqwest::Method;
use serde_json::{json, Value};

use crate::error::PRE_HASH_MATCHED;
use crate::transport::{Transport, TransportError};

pub const TOKEN: &str = "secret-token";

/// A [`Transport`] replaying canned API responses and recording everything it sees.
#[derive(Default)]
pub struct ScriptedTransport {
    pub responses: Mutex<VecDeque<Result<Value, TransportError>>>,
    pub requests: Mutex<Vec<(String, Value)>>,
    pub parts: Mutex<Vec<(String, Vec<u8>)>>,
    /// Rejects the part upload with this (0-based) index.
    pub reject_part: Option<usize>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, response: Value) -> Self {
        self.responses.lock().unwrap().push_back(Ok(response));
        self
    }

    pub fn fail(self, err: TransportError) -> Self {
        self.responses.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn challenge(self, body: Value) -> Self {
        let mut body = body;
        body["code"] = PRE_HASH_MATCHED.into();
        self.fail(TransportError::api(409, body))
    }

    pub fn requests(&self) -> Vec<(String, Value)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn parts(&self) -> Vec<(String, Vec<u8>)> {
        self.parts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Value,
    ) -> Result<Value, TransportError> {
        assert_eq!(method, Method::POST);
        self.requests.lock().unwrap().push((endpoint.into(), body));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("unscripted request to {endpoint}"))
    }

    async fn upload_part(&self, upload_url: &str, body: Vec<u8>) -> Result<(), TransportError> {
        let mut parts = self.parts.lock().unwrap();
        if self.reject_part == Some(parts.len()) {
            return Err(TransportError::PartRejected {
                url: upload_url.into(),
                status: 403,
            });
        }
        parts.push((upload_url.into(), body));
        Ok(())
    }

    fn access_token(&self) -> String {
        TOKEN.into()
    }
}

/// A create-upload response allocating `parts` part URLs.
pub fn session_response(file_id: &str, parts: u64) -> Value {
    let part_info_list: Vec<_> = (1..=parts)
        .map(|n| json!({"part_number": n, "upload_url": format!("https://upload.test/{file_id}/{n}")}))
        .collect();
    json!({
        "file_id": file_id,
        "upload_id": format!("upload-{file_id}"),
        "rapid_upload": false,
        "part_info_list": part_info_list,
    })
}

pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 256) as u8).collect()
}
