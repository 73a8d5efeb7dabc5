//! AWS Signature Version 4 for the handful of S3 object requests the store issues.
//! Requests carry no query string, so the canonical query is always empty.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use url::Url;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SIGNED_HEADERS: &str = "host;x-amz-content-sha256;x-amz-date";

pub(crate) struct Credentials<'a> {
    pub access_key: &'a str,
    pub secret_key: &'a str,
    pub region: &'a str,
    pub service: &'a str,
}

/// Header values to attach to a signed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SignedHeaders {
    pub host: String,
    pub amz_date: String,
    pub content_sha256: String,
    pub authorization: String,
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub(crate) fn sign(
    method: &str,
    url: &Url,
    payload_sha256: &str,
    now: DateTime<Utc>,
    creds: &Credentials<'_>,
) -> SignedHeaders {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();
    let host = host_header(url);

    let canonical_headers =
        format!("host:{host}\nx-amz-content-sha256:{payload_sha256}\nx-amz-date:{amz_date}\n");
    let canonical_request = [
        method,
        url.path(),
        "",
        canonical_headers.as_str(),
        SIGNED_HEADERS,
        payload_sha256,
    ]
    .join("\n");

    let scope = format!("{date}/{}/{}/aws4_request", creds.region, creds.service);
    let string_to_sign = [
        ALGORITHM,
        amz_date.as_str(),
        scope.as_str(),
        sha256_hex(canonical_request.as_bytes()).as_str(),
    ]
    .join("\n");

    let key = signing_key(creds.secret_key, &date, creds.region, creds.service);
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes()));

    SignedHeaders {
        host,
        amz_date,
        content_sha256: payload_sha256.to_string(),
        authorization: format!(
            "{ALGORITHM} Credential={}/{scope}, SignedHeaders={SIGNED_HEADERS}, Signature={signature}",
            creds.access_key
        ),
    }
}

fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

fn signing_key(secret_key: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}
