use std::collections::{BTreeMap, HashSet};
use std::sync::RwLock;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use lazy_static::lazy_static;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use reqwest::Client;
use sha2::{Digest, Sha256};
use url::Url;

use crate::config::ObjectStorageSettings;

type HmacSha256 = Hmac<Sha256>;

const AWS_URI_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const MAX_PRESIGN_SECONDS: u64 = 604_800;

lazy_static! {
    // scheme://bucket/path; only the path is used
    static ref BLOB_REFERENCE: Regex =
        Regex::new(r"^[a-z][a-z0-9+.-]*://[^/]+/(.+)$").expect("valid blob reference regex");
}

/// Object key inside the bucket from a stored `scheme://bucket/path` reference.
pub fn object_path_from_reference(reference: &str) -> Option<&str> {
    BLOB_REFERENCE
        .captures(reference.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Bucket holding the audio recordings.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// `scheme://bucket/key` reference persisted for an uploaded object.
    fn reference_for(&self, key: &str) -> String;

    /// Key for a recording; the configured audio prefix is applied here.
    fn audio_key(&self, assessment_id: &str, section: i64, question: i64, extension: &str) -> String;

    async fn put_object(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;

    /// Time-limited read URL for an object key.
    fn presign_get(&self, key: &str, ttl: Duration) -> Result<String>;
}

#[derive(Clone, Debug)]
pub struct ObjectStorageClient {
    bucket: String,
    region: String,
    endpoint: Url,
    access_key: String,
    secret_key: String,
    prefix: String,
    http: Client,
}

impl ObjectStorageClient {
    pub fn new(settings: ObjectStorageSettings, production: bool) -> Result<Self> {
        let endpoint = settings
            .endpoint
            .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", settings.region));

        let endpoint = Url::parse(&endpoint).context("Invalid object storage endpoint URL")?;
        if endpoint.host_str().is_none() {
            bail!("Object storage endpoint must include a host");
        }

        if production && endpoint.scheme() != "https" {
            bail!(
                "Object storage endpoint must use HTTPS in production mode. Got: {}",
                endpoint.scheme()
            );
        }

        if endpoint.scheme() != "https" && endpoint.scheme() != "http" {
            bail!(
                "Invalid endpoint scheme: {}. Must be http or https.",
                endpoint.scheme()
            );
        }

        Ok(Self {
            bucket: settings.bucket,
            region: settings.region,
            access_key: settings.access_key,
            secret_key: settings.secret_key,
            endpoint,
            prefix: sanitize_prefix(&settings.audio_prefix),
            http: Client::new(),
        })
    }

    fn canonical_uri(&self, key: &str) -> String {
        format!("/{}/{}", self.bucket, encode_key(key))
    }

    fn object_url(&self, key: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.set_path(&format!("{}/{}", self.bucket, encode_key(key)));
        url
    }

    fn host(&self) -> Result<String> {
        let host = self
            .endpoint
            .host_str()
            .ok_or_else(|| anyhow!("Object storage endpoint missing host"))?
            .to_lowercase();
        Ok(match self.endpoint.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host,
        })
    }

    fn canonical_query_string(params: &BTreeMap<String, String>) -> String {
        params
            .iter()
            .map(|(key, value)| {
                format!(
                    "{}={}",
                    utf8_percent_encode(key, AWS_URI_ENCODE_SET),
                    utf8_percent_encode(value, AWS_URI_ENCODE_SET)
                )
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}

#[async_trait]
impl BlobStore for ObjectStorageClient {
    fn reference_for(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key.trim_matches('/'))
    }

    fn audio_key(&self, assessment_id: &str, section: i64, question: i64, extension: &str) -> String {
        prefixed_audio_key(&self.prefix, assessment_id, section, question, extension)
    }

    async fn put_object(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let key = key.trim_matches('/');
        let payload_hash = hex::encode(Sha256::digest(&bytes));
        let now = Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();
        let scope = format!("{}/{}/s3/aws4_request", date_stamp, self.region);
        let host = self.host()?;

        let canonical_headers = format!(
            "host:{}\nx-amz-content-sha256:{}\nx-amz-date:{}\n",
            host, payload_hash, amz_date
        );
        let signed_headers = "host;x-amz-content-sha256;x-amz-date";

        let canonical_request = format!(
            "PUT\n{}\n\n{}\n{}\n{}",
            self.canonical_uri(key),
            canonical_headers,
            signed_headers,
            payload_hash
        );

        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signing_key = derive_signing_key(&self.secret_key, &date_stamp, &self.region, "s3")?;
        let signature = hex::encode(hmac_sign(&signing_key, string_to_sign.as_bytes())?);

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.access_key, scope, signed_headers, signature
        );

        self.http
            .put(self.object_url(key))
            .header("Authorization", authorization)
            .header("x-amz-date", amz_date)
            .header("x-amz-content-sha256", payload_hash)
            .header("content-type", content_type)
            .body(bytes)
            .send()
            .await
            .with_context(|| format!("Failed to upload object {}", key))?
            .error_for_status()
            .context("Object storage upload returned error status")?;

        Ok(())
    }

    fn presign_get(&self, key: &str, ttl: Duration) -> Result<String> {
        let key = key.trim_matches('/');
        if key.is_empty() {
            bail!("Cannot sign an empty object key");
        }

        let ttl_secs = ttl.as_secs().clamp(1, MAX_PRESIGN_SECONDS);
        let now = Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();
        let scope = format!("{}/{}/s3/aws4_request", date_stamp, self.region);

        let mut params = BTreeMap::new();
        params.insert("X-Amz-Algorithm".into(), "AWS4-HMAC-SHA256".into());
        params.insert(
            "X-Amz-Credential".into(),
            format!("{}/{}", self.access_key, scope),
        );
        params.insert("X-Amz-Date".into(), amz_date.clone());
        params.insert("X-Amz-Expires".into(), ttl_secs.to_string());
        params.insert("X-Amz-SignedHeaders".into(), "host".into());

        let canonical_request = format!(
            "GET\n{}\n{}\nhost:{}\n\nhost\nUNSIGNED-PAYLOAD",
            self.canonical_uri(key),
            Self::canonical_query_string(&params),
            self.host()?
        );

        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signing_key = derive_signing_key(&self.secret_key, &date_stamp, &self.region, "s3")?;
        let signature = hex::encode(hmac_sign(&signing_key, string_to_sign.as_bytes())?);

        params.insert("X-Amz-Signature".into(), signature);

        let mut url = self.object_url(key);
        url.set_query(Some(&Self::canonical_query_string(&params)));
        Ok(url.to_string())
    }
}

/// Blob store kept in process memory, for tests and local runs without a bucket.
///
/// Signed URLs point at `memory://`; signing a key that was never stored fails.
pub struct InMemoryBlobStore {
    bucket: String,
    prefix: String,
    objects: RwLock<HashSet<String>>,
}

impl InMemoryBlobStore {
    pub fn new(bucket: &str, prefix: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            prefix: sanitize_prefix(prefix),
            objects: RwLock::new(HashSet::new()),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects
            .read()
            .map(|objects| objects.contains(key.trim_matches('/')))
            .unwrap_or(false)
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    fn reference_for(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key.trim_matches('/'))
    }

    fn audio_key(&self, assessment_id: &str, section: i64, question: i64, extension: &str) -> String {
        prefixed_audio_key(&self.prefix, assessment_id, section, question, extension)
    }

    async fn put_object(&self, key: &str, _bytes: Vec<u8>, _content_type: &str) -> Result<()> {
        self.objects
            .write()
            .map_err(|_| anyhow!("Blob store lock poisoned"))?
            .insert(key.trim_matches('/').to_string());
        Ok(())
    }

    fn presign_get(&self, key: &str, ttl: Duration) -> Result<String> {
        let key = key.trim_matches('/');
        if !self.contains(key) {
            bail!("No such object: {}", key);
        }
        Ok(format!(
            "memory://{}/{}?expires={}",
            self.bucket,
            encode_key(key),
            ttl.as_secs()
        ))
    }
}

fn prefixed_audio_key(
    prefix: &str,
    assessment_id: &str,
    section: i64,
    question: i64,
    extension: &str,
) -> String {
    let key = format!(
        "{}/{}/{}.{}",
        assessment_id.trim_matches('/'),
        section,
        question,
        extension.trim_start_matches('.')
    );
    if prefix.is_empty() {
        key
    } else {
        format!("{}/{}", prefix, key)
    }
}

fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| utf8_percent_encode(segment, AWS_URI_ENCODE_SET).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

fn sanitize_prefix(prefix: &str) -> String {
    prefix
        .trim_matches('/')
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

fn derive_signing_key(secret: &str, date: &str, region: &str, service: &str) -> Result<Vec<u8>> {
    let mut key = format!("AWS4{}", secret).into_bytes();
    key = hmac_sign(&key, date)?;
    key = hmac_sign(&key, region)?;
    key = hmac_sign(&key, service)?;
    hmac_sign(&key, b"aws4_request")
}

fn hmac_sign(key: &[u8], message: impl AsRef<[u8]>) -> Result<Vec<u8>> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| anyhow!("Invalid HMAC key: {}", e))?;
    mac.update(message.as_ref());
    Ok(mac.finalize().into_bytes().to_vec())
}
