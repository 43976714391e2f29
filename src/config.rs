use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};

const ONE_MEG: u64 = 1024 * 1024;

/// The size of every part except the last one.
pub const DEFAULT_PART_SIZE: u64 = 10 * ONE_MEG;

/// What the drive does when `name` already exists under the parent folder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckNameMode {
    #[default]
    Overwrite,
    Refuse,
    AutoRename,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Probe the drive with a pre-hash before hashing the whole file.
    pub rapid_upload: bool,
    /// Where full-content spills are written.
    pub temp_dir: PathBuf,
    /// Never zero, a zero from the addition is read as one byte.
    #[serde(deserialize_with = "non_zero_part_size")]
    pub part_size: u64,
    pub check_name_mode: CheckNameMode,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            rapid_upload: true,
            temp_dir: std::env::temp_dir(),
            part_size: DEFAULT_PART_SIZE,
            check_name_mode: CheckNameMode::default(),
        }
    }
}

fn non_zero_part_size<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    Ok(u64::deserialize(deserializer)?.max(1))
}

impl UploadConfig {
    /// Reads the config from a storage "addition" JSON blob. Missing keys keep
    /// their defaults.
    pub fn from_json(addition: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(addition)
    }

    pub fn rapid_upload(mut self, enabled: bool) -> Self {
        self.rapid_upload = enabled;
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    pub fn part_size(mut self, part_size: u64) -> Self {
        self.part_size = part_size.max(1);
        self
    }

    pub fn check_name_mode(mut self, mode: CheckNameMode) -> Self {
        self.check_name_mode = mode;
        self
    }
}
