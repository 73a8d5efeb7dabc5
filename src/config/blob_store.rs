use crate::error::VaultError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

/// Which object store holds blob payloads.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum BlobStoreConfig {
    /// Local directory, sharded by the first two hex digits of the hash.
    /// TOML: `blob_store.root`. Default: `./data/blobs`.
    Fs { root: PathBuf },
    /// S3-compatible object storage (AWS, MinIO, ...).
    S3(S3Config),
}

impl Default for BlobStoreConfig {
    fn default() -> Self {
        BlobStoreConfig::Fs {
            root: PathBuf::from("./data/blobs"),
        }
    }
}

impl BlobStoreConfig {
    pub fn validate(&self) -> Result<(), VaultError> {
        match self {
            BlobStoreConfig::Fs { root } if root.as_os_str().is_empty() => Err(
                VaultError::Config("blob_store.root must be non-empty".to_string()),
            ),
            BlobStoreConfig::S3(s3) if s3.bucket.trim().is_empty() => Err(VaultError::Config(
                "blob_store.bucket must be non-empty".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct S3Config {
    /// TOML: `blob_store.endpoint`. Example: `http://localhost:9000`.
    pub endpoint: Url,

    /// TOML: `blob_store.bucket`. Example: `commit-data`.
    pub bucket: String,

    /// Key prefix separating blob payloads from other artifacts in the bucket.
    /// TOML: `blob_store.prefix`. Default: `blobs/`.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// TOML: `blob_store.region`. Default: `us-east-1`.
    #[serde(default = "default_region")]
    pub region: String,

    pub access_key: String,

    pub secret_key: String,

    /// Path-style addressing (`endpoint/bucket/key`), required by most MinIO setups.
    /// TOML: `blob_store.path_style`. Default: `true`.
    #[serde(default = "default_path_style")]
    pub path_style: bool,
}

fn default_prefix() -> String {
    "blobs/".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_path_style() -> bool {
    true
}
