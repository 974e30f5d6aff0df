//! Object storage holding the source regulation documents.
//!
//! Two backends implement [`ObjectStore`]:
//!
//! - **[`S3Store`]** talks to MinIO or any S3-compatible service through the
//!   REST API, signing every request with AWS Signature V4 (`hmac` + `sha2`,
//!   no C dependencies). Requests use path-style addressing
//!   (`http://host:port/<bucket>/<key>`), which MinIO requires.
//! - **[`LocalStore`]** serves a directory tree, for development and tests.
//!
//! Object keys are `/`-separated paths. The first path segment names the
//! jurisdiction (`tunisia/`, `france/`, `europe/`); see [`infer_country`].
//!
//! # Configuration
//!
//! ```toml
//! [storage]
//! backend = "s3"
//! endpoint = "localhost:9000"
//! access_key = "minioadmin"
//! secret_key = "minioadmin"
//! bucket = "regulations"
//! secure = false
//! ```

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use walkdir::WalkDir;

use crate::config::StorageConfig;
use crate::models::{Country, ObjectInfo};

/// Read access to the document bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Backend identifier (e.g. `"s3"`, `"filesystem"`).
    fn kind(&self) -> &str;

    /// List every object in the bucket.
    ///
    /// Must return an error when the listing cannot be obtained, so that
    /// callers can tell an outage apart from an empty bucket.
    async fn list(&self) -> Result<Vec<ObjectInfo>>;

    /// Download one object's raw bytes.
    async fn fetch(&self, key: &str) -> Result<Vec<u8>>;
}

/// Build the configured object store.
pub fn create_store(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    match config.backend.as_str() {
        "s3" => Ok(Arc::new(S3Store::new(config.clone())?)),
        "filesystem" => Ok(Arc::new(LocalStore::new(
            config.root.clone(),
            &config.include_globs,
        )?)),
        other => bail!("Unknown storage backend: {}", other),
    }
}

/// Infer the jurisdiction of an object from its top-level folder.
///
/// Keys without a folder are `Unknown`.
pub fn infer_country(key: &str) -> Country {
    match key.split_once('/') {
        Some((folder, _)) => Country::from_folder(folder),
        None => Country::Unknown,
    }
}

/// Local file name used for a downloaded object.
///
/// `temp_<16 hex of sha256(key)>_<basename>`: distinct keys never share a
/// file, and the extension survives for format detection.
pub fn download_name(key: &str) -> String {
    let base = key.rsplit(['/', '\\']).next().unwrap_or(key);
    format!("temp_{}_{}", &hex_sha256(key.as_bytes())[..16], base)
}

/// Download `key` into `dir` and return the local path.
pub async fn download_to(store: &dyn ObjectStore, key: &str, dir: &Path) -> Result<PathBuf> {
    let bytes = store.fetch(key).await?;
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create download directory: {}", dir.display()))?;
    let path = dir.join(download_name(key));
    tokio::fs::write(&path, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::debug!(key, path = %path.display(), bytes = bytes.len(), "downloaded object");
    Ok(path)
}

/// Remove a file written by [`download_to`]. Failures are logged only.
pub async fn discard_download(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::warn!(path = %path.display(), error = %e, "could not remove downloaded file");
    }
}

/// Build a [`GlobSet`] from a list of glob pattern strings.
///
/// An empty list yields `None`, meaning "match everything".
fn build_globset(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(Some(builder.build()?))
}

fn included(set: &Option<GlobSet>, key: &str) -> bool {
    set.as_ref().map(|s| s.is_match(key)).unwrap_or(true)
}

// ═══════════════════════════════════════════════════════════════════════
// Local directory backend
// ═══════════════════════════════════════════════════════════════════════

/// Serves the files below `root` as objects keyed by their relative path.
pub struct LocalStore {
    root: PathBuf,
    include: Option<GlobSet>,
}

impl LocalStore {
    pub fn new(root: PathBuf, include_globs: &[String]) -> Result<Self> {
        Ok(Self {
            root,
            include: build_globset(include_globs)?,
        })
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let rel = Path::new(key);
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            bail!("invalid object key: {}", key);
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    fn kind(&self) -> &str {
        "filesystem"
    }

    async fn list(&self) -> Result<Vec<ObjectInfo>> {
        if !self.root.is_dir() {
            bail!("storage root does not exist: {}", self.root.display());
        }

        let mut objects = Vec::new();
        for entry in WalkDir::new(&self.root) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            if !included(&self.include, &key) {
                continue;
            }

            let meta = entry.metadata()?;
            let modified: DateTime<Utc> = meta
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());

            objects.push(ObjectInfo {
                filename: key,
                size: meta.len() as i64,
                last_modified: modified.to_rfc3339(),
            });
        }

        // Sort for deterministic ordering
        objects.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(objects)
    }

    async fn fetch(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(key)?;
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// S3 / MinIO backend
// ═══════════════════════════════════════════════════════════════════════

type HmacSha256 = Hmac<Sha256>;

/// S3-compatible bucket accessed with SigV4-signed REST calls.
pub struct S3Store {
    config: StorageConfig,
    include: Option<GlobSet>,
    client: reqwest::Client,
}

impl S3Store {
    pub fn new(config: StorageConfig) -> Result<Self> {
        let include = build_globset(&config.include_globs)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            config,
            include,
            client,
        })
    }

    fn host(&self) -> String {
        self.config
            .endpoint
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/')
            .to_string()
    }

    fn scheme(&self) -> &'static str {
        if self.config.secure {
            "https"
        } else {
            "http"
        }
    }

    /// Issue a SigV4-signed GET for `canonical_uri` with the given query.
    async fn signed_get(
        &self,
        canonical_uri: &str,
        query: &[(String, String)],
    ) -> Result<reqwest::Response> {
        let host = self.host();
        let now = Utc::now();
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

        // Canonical query string must be sorted
        let mut sorted = query.to_vec();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        let canonical_querystring = sorted
            .iter()
            .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let payload_hash = hex_sha256(b"");
        let headers = [
            ("host", host.as_str()),
            ("x-amz-content-sha256", payload_hash.as_str()),
            ("x-amz-date", amz_date.as_str()),
        ];
        let signed_headers = headers
            .iter()
            .map(|(k, _)| *k)
            .collect::<Vec<_>>()
            .join(";");
        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect();

        let canonical_request = format!(
            "GET\n{}\n{}\n{}\n{}\n{}",
            canonical_uri, canonical_querystring, canonical_headers, signed_headers, payload_hash
        );

        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, self.config.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );

        let signing_key = derive_signing_key(
            &self.config.secret_key,
            &date_stamp,
            &self.config.region,
            "s3",
        )?;
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes())?);

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.config.access_key, credential_scope, signed_headers, signature
        );

        let mut url = format!("{}://{}{}", self.scheme(), host, canonical_uri);
        if !canonical_querystring.is_empty() {
            url.push('?');
            url.push_str(&canonical_querystring);
        }

        let resp = self
            .client
            .get(&url)
            .header("Authorization", authorization)
            .header("x-amz-content-sha256", payload_hash)
            .header("x-amz-date", amz_date)
            .send()
            .await?;
        Ok(resp)
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn kind(&self) -> &str {
        "s3"
    }

    /// List all objects, following `NextContinuationToken` pagination.
    async fn list(&self) -> Result<Vec<ObjectInfo>> {
        let canonical_uri = format!("/{}", uri_encode(&self.config.bucket));
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("list-type".to_string(), "2".to_string()),
                ("max-keys".to_string(), "1000".to_string()),
            ];
            if !self.config.prefix.is_empty() {
                query.push(("prefix".to_string(), self.config.prefix.clone()));
            }
            if let Some(ref token) = continuation_token {
                query.push(("continuation-token".to_string(), token.clone()));
            }

            let resp = self.signed_get(&canonical_uri, &query).await.map_err(|e| {
                anyhow::anyhow!(
                    "Failed to list objects in s3://{}/{}: {}",
                    self.config.bucket,
                    self.config.prefix,
                    e
                )
            })?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                bail!(
                    "S3 ListObjectsV2 failed (HTTP {}): {}",
                    status,
                    body.chars().take(500).collect::<String>()
                );
            }

            let xml_body = resp.text().await?;
            let (batch, is_truncated, next_token) = parse_list_objects_response(&xml_body);
            objects.extend(batch.into_iter().filter(|o| included(&self.include, &o.filename)));

            if is_truncated && next_token.is_some() {
                continuation_token = next_token;
            } else {
                break;
            }
        }

        tracing::debug!(bucket = %self.config.bucket, count = objects.len(), "listed objects");
        Ok(objects)
    }

    async fn fetch(&self, key: &str) -> Result<Vec<u8>> {
        let encoded_key = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
        let canonical_uri = format!("/{}/{}", uri_encode(&self.config.bucket), encoded_key);

        let resp = self.signed_get(&canonical_uri, &[]).await.map_err(|e| {
            anyhow::anyhow!("Failed to get s3://{}/{}: {}", self.config.bucket, key, e)
        })?;

        if !resp.status().is_success() {
            bail!(
                "S3 GetObject failed (HTTP {}) for key '{}'",
                resp.status(),
                key
            );
        }

        Ok(resp.bytes().await?.to_vec())
    }
}

// ============ AWS SigV4 Helpers ============

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| anyhow::anyhow!("invalid HMAC key: {}", e))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Derive the AWS SigV4 signing key for a given date, region, and service.
///
/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(
    secret_key: &str,
    date_stamp: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    )?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

/// URI-encode a string per RFC 3986, leaving `A-Z a-z 0-9 - _ . ~` as is.
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}

// ============ XML Parsing ============

/// Parse a `ListObjectsV2` response into objects, the truncation flag and
/// the next continuation token. Folder placeholder keys (`…/`) are skipped.
fn parse_list_objects_response(xml: &str) -> (Vec<ObjectInfo>, bool, Option<String>) {
    let mut objects = Vec::new();
    let is_truncated = extract_xml_value(xml, "IsTruncated")
        .map(|v| v == "true")
        .unwrap_or(false);
    let next_token = extract_xml_value(xml, "NextContinuationToken");

    let mut remaining = xml;
    while let Some(start) = remaining.find("<Contents>") {
        let block_start = start + "<Contents>".len();
        let Some(end) = remaining[block_start..].find("</Contents>") else {
            break;
        };
        let block = &remaining[block_start..block_start + end];
        remaining = &remaining[block_start + end + "</Contents>".len()..];

        let key = extract_xml_value(block, "Key")
            .map(|k| unescape_xml(&k))
            .unwrap_or_default();
        if key.is_empty() || key.ends_with('/') {
            continue;
        }

        objects.push(ObjectInfo {
            filename: key,
            size: extract_xml_value(block, "Size")
                .and_then(|s| s.parse::<i64>().ok())
                .unwrap_or(0),
            last_modified: extract_xml_value(block, "LastModified").unwrap_or_default(),
        });
    }

    (objects, is_truncated, next_token)
}

/// Extract the text content of an XML tag (simple, non-nested).
fn extract_xml_value(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)?;
    Some(xml[start..start + end].to_string())
}

fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
