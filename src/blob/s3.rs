use super::sigv4::{self, Credentials};
use super::{BlobStore, ContentHash, ensure_addressed};
use crate::config::S3Config;
use crate::error::{IsRetryable, VaultError};
use crate::host::HOST_BODY_PREVIEW_CHARS;
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use chrono::Utc;
use reqwest::{Method, StatusCode};
use std::sync::LazyLock;
use std::time::Duration;
use url::Url;

static OBJECT_RETRY_POLICY: LazyLock<ExponentialBuilder> = LazyLock::new(|| {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(2))
        .with_max_times(3)
        .with_jitter()
});

/// Blob store on an S3-compatible bucket; objects live at `<prefix><hash[0..2]>/<hash>`.
pub struct S3BlobStore {
    client: reqwest::Client,
    cfg: S3Config,
}

impl S3BlobStore {
    pub fn new(cfg: S3Config) -> Result<Self, VaultError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self { client, cfg })
    }

    pub(crate) fn object_key(&self, hash: &ContentHash) -> String {
        let prefix = self.cfg.prefix.trim_start_matches('/');
        let sep = if prefix.is_empty() || prefix.ends_with('/') {
            ""
        } else {
            "/"
        };
        format!("{prefix}{sep}{}/{}", hash.shard(), hash.as_str())
    }

    pub(crate) fn object_url(&self, hash: &ContentHash) -> Result<Url, VaultError> {
        let key = self.object_key(hash);
        let mut url = self.cfg.endpoint.clone();
        if self.cfg.path_style {
            url.path_segments_mut()
                .map_err(|()| VaultError::Config("blob_store.endpoint cannot be a base".into()))?
                .pop_if_empty()
                .push(&self.cfg.bucket)
                .extend(key.split('/'));
        } else {
            let host = url
                .host_str()
                .ok_or_else(|| VaultError::Config("blob_store.endpoint has no host".into()))?
                .to_string();
            url.set_host(Some(&format!("{}.{host}", self.cfg.bucket)))?;
            url.path_segments_mut()
                .map_err(|()| VaultError::Config("blob_store.endpoint cannot be a base".into()))?
                .pop_if_empty()
                .extend(key.split('/'));
        }
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        hash: &ContentHash,
        body: Option<&[u8]>,
    ) -> Result<reqwest::Response, VaultError> {
        let url = self.object_url(hash)?;
        let payload_sha256 = sigv4::sha256_hex(body.unwrap_or_default());

        let op = || {
            let url = url.clone();
            let method = method.clone();
            let payload_sha256 = payload_sha256.clone();
            async move {
                let signed = sigv4::sign(
                    method.as_str(),
                    &url,
                    &payload_sha256,
                    Utc::now(),
                    &Credentials {
                        access_key: &self.cfg.access_key,
                        secret_key: &self.cfg.secret_key,
                        region: &self.cfg.region,
                        service: "s3",
                    },
                );

                let mut request = self
                    .client
                    .request(method, url.clone())
                    .header("host", signed.host)
                    .header("x-amz-date", signed.amz_date)
                    .header("x-amz-content-sha256", signed.content_sha256)
                    .header(reqwest::header::AUTHORIZATION, signed.authorization);
                if let Some(bytes) = body {
                    request = request.body(bytes.to_vec());
                }

                let resp = request
                    .send()
                    .await
                    .map_err(|e| VaultError::TransientHost(format!("object store: {e}")))?;

                if resp.status().is_server_error() {
                    let status = resp.status();
                    let preview = body_preview(resp).await;
                    tracing::debug!(%status, url = %url, body = %preview, "Object store server error (will retry)");
                    return Err(VaultError::TransientHost(format!(
                        "object store returned {status}"
                    )));
                }
                Ok(resp)
            }
        };

        op.retry(*OBJECT_RETRY_POLICY)
            .when(IsRetryable::is_retryable)
            .await
    }
}

async fn body_preview(resp: reqwest::Response) -> String {
    match resp.bytes().await {
        Ok(bytes) => {
            let raw_body = String::from_utf8_lossy(&bytes);
            format!("{:.len$}", raw_body, len = HOST_BODY_PREVIEW_CHARS)
        }
        Err(e) => format!("<failed to read body: {e}>"),
    }
}

async fn unexpected(resp: reqwest::Response) -> VaultError {
    let status = resp.status();
    VaultError::ObjectStore {
        status,
        message: body_preview(resp).await,
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, hash: &ContentHash, bytes: &[u8]) -> Result<(), VaultError> {
        ensure_addressed(hash, bytes)?;
        let resp = self.send(Method::PUT, hash, Some(bytes)).await?;
        if resp.status().is_success() {
            tracing::debug!(hash = %hash, size = bytes.len(), "Blob uploaded");
            Ok(())
        } else {
            Err(unexpected(resp).await)
        }
    }

    async fn get(&self, hash: &ContentHash) -> Result<Vec<u8>, VaultError> {
        let resp = self.send(Method::GET, hash, None).await?;
        match resp.status() {
            s if s.is_success() => Ok(resp.bytes().await?.to_vec()),
            StatusCode::NOT_FOUND => Err(VaultError::NotFound(format!("blob {hash}"))),
            _ => Err(unexpected(resp).await),
        }
    }

    async fn exists(&self, hash: &ContentHash) -> Result<bool, VaultError> {
        let resp = self.send(Method::HEAD, hash, None).await?;
        match resp.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(unexpected(resp).await),
        }
    }

    fn describe(&self) -> String {
        format!(
            "s3:{}/{}/{}",
            self.cfg.endpoint.as_str().trim_end_matches('/'),
            self.cfg.bucket,
            self.cfg.prefix
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(path_style: bool, prefix: &str) -> S3Config {
        S3Config {
            endpoint: Url::parse("http://localhost:9000").unwrap(),
            bucket: "commit-data".to_string(),
            prefix: prefix.to_string(),
            region: "us-east-1".to_string(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            path_style,
        }
    }

    #[test]
    fn path_style_url_includes_bucket_and_sharded_key() {
        let store = S3BlobStore::new(cfg(true, "blobs/")).unwrap();
        let hash = ContentHash::of(b"hello");
        assert_eq!(
            store.object_url(&hash).unwrap().as_str(),
            format!("http://localhost:9000/commit-data/blobs/2c/{hash}")
        );
    }

    #[test]
    fn virtual_host_url_moves_bucket_into_host() {
        let store = S3BlobStore::new(cfg(false, "blobs")).unwrap();
        let hash = ContentHash::of(b"hello");
        assert_eq!(store.object_key(&hash), format!("blobs/2c/{hash}"));
        assert_eq!(
            store.object_url(&hash).unwrap().as_str(),
            format!("http://commit-data.localhost:9000/blobs/2c/{hash}")
        );
    }

    #[test]
    fn empty_prefix_keys_start_at_shard() {
        let store = S3BlobStore::new(cfg(true, "")).unwrap();
        let hash = ContentHash::of(b"hello");
        assert_eq!(store.object_key(&hash), format!("2c/{hash}"));
    }
}
