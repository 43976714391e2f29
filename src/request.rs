//! Wire types of the create-upload / complete-upload exchange.

use serde::{Deserialize, Serialize};

use crate::config::{CheckNameMode, UploadConfig};

/// Number of parts requested for a file of `size` bytes.
///
/// A zero-byte file still requests a single, empty part, so the drive always
/// issues a target that can be committed.
pub fn part_count(size: u64, part_size: u64) -> u64 {
    size.div_ceil(part_size.max(1)).max(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PartNumber {
    pub part_number: u64,
}

/// The possession evidence sent along with a create-upload request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum NegotiationPayload {
    PreHash {
        pre_hash: String,
    },
    FullHash {
        content_hash: String,
        content_hash_name: &'static str,
        proof_code: String,
        proof_version: &'static str,
    },
}

impl NegotiationPayload {
    pub fn pre_hash(hash: String) -> Self {
        Self::PreHash { pre_hash: hash }
    }

    pub fn full_hash(sha1: String, proof_code: String) -> Self {
        Self::FullHash {
            content_hash: sha1,
            content_hash_name: "sha1",
            proof_code,
            proof_version: "v1",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadRequest {
    pub check_name_mode: CheckNameMode,
    pub drive_id: String,
    pub name: String,
    pub parent_file_id: String,
    pub part_info_list: Vec<PartNumber>,
    pub size: u64,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(flatten)]
    pub payload: NegotiationPayload,
}

impl UploadRequest {
    pub fn new(
        config: &UploadConfig,
        drive_id: &str,
        target: &UploadTarget,
        payload: NegotiationPayload,
    ) -> Self {
        let part_info_list = (1..=part_count(target.size, config.part_size))
            .map(|part_number| PartNumber { part_number })
            .collect();
        Self {
            check_name_mode: config.check_name_mode,
            drive_id: drive_id.into(),
            name: target.name.clone(),
            parent_file_id: target.parent_id.clone(),
            part_info_list,
            size: target.size,
            kind: "file",
            payload,
        }
    }
}

/// Where a file ends up, and how big the caller says it is.
#[derive(Debug, Clone)]
pub struct UploadTarget {
    pub parent_id: String,
    pub name: String,
    pub size: u64,
}

impl UploadTarget {
    pub fn new(parent_id: impl Into<String>, name: impl Into<String>, size: u64) -> Self {
        Self {
            parent_id: parent_id.into(),
            name: name.into(),
            size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PartInfo {
    pub part_number: u64,
    pub upload_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateUploadResponse {
    #[serde(default)]
    pub file_id: String,
    #[serde(default)]
    pub upload_id: String,
    #[serde(default)]
    pub rapid_upload: bool,
    #[serde(default)]
    pub part_info_list: Vec<PartInfo>,
}

impl CreateUploadResponse {
    pub fn session(&self) -> Option<UploadSession> {
        if self.file_id.is_empty() || self.upload_id.is_empty() {
            return None;
        }
        Some(UploadSession {
            file_id: self.file_id.clone(),
            upload_id: self.upload_id.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadSession {
    pub file_id: String,
    pub upload_id: String,
}
