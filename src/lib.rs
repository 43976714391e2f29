//! Uploads files to a deduplicating cloud drive.
//!
//! An upload first tries to convince the drive that it already holds the
//! content ("rapid upload"): a SHA-1 of the first KiB, then a SHA-1 of the
//! whole file together with a proof-of-possession code. Only when the drive
//! still wants the bytes are they sent, in fixed-size parts, and the upload
//! session is committed afterwards.

pub mod config;
pub mod error;
pub mod finalize;
pub mod http;
pub mod negotiator;
pub mod proof;
pub mod request;
pub mod sampler;
pub mod spill;
pub mod transfer;
pub mod transport;
pub mod uploader;

#[cfg(test)]
mod testing;

pub use config::{CheckNameMode, UploadConfig};
pub use error::{TransportError, UploadError};
pub use http::HttpTransport;
pub use request::UploadTarget;
pub use transport::{AccessToken, Transport};
pub use uploader::{DriveUploader, UploadOutcome};
