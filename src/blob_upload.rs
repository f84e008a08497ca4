//! Azure Blob Storage upload.
//!
//! Every file under the content directory (recursively) is uploaded into one
//! container under its base name, overwriting what is there. Uploads run one
//! at a time and the first failure stops the run.
//!
//! # Connection string
//!
//! `AZURE_STORAGE_CONNECTION_STRING` uses the standard format:
//!
//! ```text
//! DefaultEndpointsProtocol=https;AccountName=<name>;AccountKey=<base64>;EndpointSuffix=core.windows.net
//! ```
//!
//! `BlobEndpoint=<url>` replaces the derived endpoint (Azurite, sovereign
//! clouds).
//!
//! # Authentication
//!
//! Requests carry a
//! [Shared Key](https://learn.microsoft.com/rest/api/storageservices/authorize-with-shared-key)
//! `Authorization` header: HMAC-SHA256 over the canonical string-to-sign,
//! keyed with the base64-decoded account key (`hmac` + `sha2` crates).

use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Url;
use sha2::Sha256;
use std::path::Path;
use std::time::Duration;
use walkdir::WalkDir;

use crate::config::UploadConfig;
use crate::stats;

type HmacSha256 = Hmac<Sha256>;

const STORAGE_API_VERSION: &str = "2021-08-06";

/// Storage account settings parsed from a connection string.
#[derive(Clone)]
pub struct StorageAccount {
    pub account_name: String,
    account_key: Vec<u8>,
    pub blob_endpoint: String,
}

impl std::fmt::Debug for StorageAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageAccount")
            .field("account_name", &self.account_name)
            .field("account_key", &"<redacted>")
            .field("blob_endpoint", &self.blob_endpoint)
            .finish()
    }
}

impl StorageAccount {
    pub fn from_connection_string(connection_string: &str) -> Result<Self> {
        let mut protocol = "https";
        let mut account_name = None;
        let mut account_key = None;
        let mut suffix = "core.windows.net";
        let mut blob_endpoint = None;

        for part in connection_string.split(';').map(str::trim) {
            if part.is_empty() {
                continue;
            }
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| anyhow!("Malformed connection string segment"))?;
            match key {
                "DefaultEndpointsProtocol" => protocol = value,
                "AccountName" => account_name = Some(value),
                "AccountKey" => account_key = Some(value),
                "EndpointSuffix" => suffix = value,
                "BlobEndpoint" => blob_endpoint = Some(value),
                _ => {}
            }
        }

        let account_name = account_name
            .ok_or_else(|| anyhow!("Connection string has no AccountName"))?
            .to_string();
        let account_key = BASE64
            .decode(account_key.ok_or_else(|| anyhow!("Connection string has no AccountKey"))?)
            .context("AccountKey is not valid base64")?;
        let blob_endpoint = blob_endpoint
            .map(|e| e.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("{}://{}.blob.{}", protocol, account_name, suffix));

        Ok(Self {
            account_name,
            account_key,
            blob_endpoint,
        })
    }

    /// URL of `blob` inside `container`.
    pub fn blob_url(&self, container: &str, blob: &str) -> Result<Url> {
        let mut url = Url::parse(&self.blob_endpoint)
            .with_context(|| format!("Invalid blob endpoint: {}", self.blob_endpoint))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("Blob endpoint cannot be a base URL: {}", self.blob_endpoint))?
            .pop_if_empty()
            .push(container)
            .push(blob);
        Ok(url)
    }

    /// `Authorization` header value for a request described by `string_to_sign`.
    fn authorization(&self, string_to_sign: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(&self.account_key)
            .map_err(|e| anyhow!("Invalid account key: {}", e))?;
        mac.update(string_to_sign.as_bytes());
        let signature = BASE64.encode(mac.finalize().into_bytes());
        Ok(format!("SharedKey {}:{}", self.account_name, signature))
    }
}

/// Canonical string-to-sign for a blob service request without conditional
/// or range headers. `ms_headers` must be the complete set of `x-ms-*`
/// headers sent.
fn string_to_sign(
    account_name: &str,
    method: &str,
    content_length: usize,
    content_type: &str,
    ms_headers: &[(&str, &str)],
    url: &Url,
) -> String {
    let length = if content_length == 0 {
        String::new()
    } else {
        content_length.to_string()
    };

    let mut headers: Vec<(String, &str)> = ms_headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.trim()))
        .collect();
    headers.sort();
    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v))
        .collect();

    let mut canonical_resource = format!("/{}{}", account_name, url.path());
    let mut query: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.into_owned()))
        .collect();
    query.sort();
    for (k, v) in query {
        canonical_resource.push_str(&format!("\n{}:{}", k, v));
    }

    // VERB, Content-Encoding, Content-Language, Content-Length, Content-MD5,
    // Content-Type, Date, If-Modified-Since, If-Match, If-None-Match,
    // If-Unmodified-Since, Range.
    format!(
        "{}\n\n\n{}\n\n{}\n\n\n\n\n\n\n{}{}",
        method, length, content_type, canonical_headers, canonical_resource
    )
}

/// Detect MIME content type from a file extension.
fn detect_content_type(name: &str) -> &'static str {
    match name.rsplit('.').next().map(|e| e.to_ascii_lowercase()).as_deref() {
        Some("md" | "markdown") => "text/markdown",
        Some("txt") => "text/plain",
        Some("json") => "application/json",
        Some("yaml" | "yml") => "text/yaml",
        Some("html" | "htm") => "text/html",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

pub struct BlobUploader {
    client: reqwest::Client,
    account: StorageAccount,
    container: String,
}

impl BlobUploader {
    pub fn new(account: StorageAccount, config: &UploadConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            account,
            container: config.container.clone(),
        })
    }

    /// `Put Blob` of `data` as a block blob named `blob`.
    pub async fn put_blob(&self, blob: &str, data: Vec<u8>) -> Result<()> {
        let url = self.account.blob_url(&self.container, blob)?;
        let content_type = detect_content_type(blob);
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let ms_headers = [
            ("x-ms-blob-type", "BlockBlob"),
            ("x-ms-date", date.as_str()),
            ("x-ms-version", STORAGE_API_VERSION),
        ];

        let to_sign = string_to_sign(
            &self.account.account_name,
            "PUT",
            data.len(),
            content_type,
            &ms_headers,
            &url,
        );
        let authorization = self.account.authorization(&to_sign)?;

        let mut request = self
            .client
            .put(url)
            .header("Authorization", authorization)
            .header("Content-Type", content_type);
        for (name, value) in ms_headers {
            request = request.header(name, value);
        }

        let response = request.body(data).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Put Blob '{}' returned {}: {}", blob, status, body.trim());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub files: usize,
    pub bytes: u64,
}

/// Upload every file under `dir`, stopping at the first failure.
pub async fn upload_directory(uploader: &BlobUploader, dir: &Path) -> Result<UploadSummary> {
    if !dir.is_dir() {
        bail!("Content directory does not exist: {}", dir.display());
    }

    let mut summary = UploadSummary::default();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().to_string();
        let data = std::fs::read(entry.path())
            .with_context(|| format!("Failed to read {}", entry.path().display()))?;
        let size = data.len() as u64;

        uploader
            .put_blob(&name, data)
            .await
            .with_context(|| format!("Failed to upload {}", entry.path().display()))?;
        println!("Uploaded {} to the Azure Blob Storage", name);

        summary.files += 1;
        summary.bytes += size;
    }

    println!(
        "Uploaded all blogposts to the Azure Blob Storage ({} files, {})",
        summary.files,
        stats::format_bytes(summary.bytes)
    );
    Ok(summary)
}
