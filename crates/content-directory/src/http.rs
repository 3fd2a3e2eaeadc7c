//! HTTP implementation of [`ContentDirectory`] over the short-URL backend.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::error::DirectoryError;
use crate::types::{
    BundleHandle, ContentDescriptor, FileCollection, ImageHandle, QuizPayload, ShortUrlRecord,
};
use crate::{ContentDirectory, Result};

pub const DEFAULT_BASE_URL: &str = "https://epy.digital";
pub const API_KEY_HEADER: &str = "X-API-KEY";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const ERROR_BODY_LIMIT: usize = 200;

/// Connection settings for [`HttpDirectoryClient`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Base URL relative endpoints are appended to.
    pub base_url: String,

    /// Static key sent in the `X-API-KEY` header on every request.
    pub api_key: Option<String>,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl DirectoryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// Resolve an endpoint against the base URL.
///
/// Absolute `http`, `https` and `file` URLs are used unchanged; anything else
/// is appended to the base (keeping any path prefix the base carries).
pub fn resolve_endpoint(base: &Url, endpoint: &str) -> Result<Url> {
    let endpoint = endpoint.trim();
    if let Ok(url) = Url::parse(endpoint) {
        if matches!(url.scheme(), "http" | "https" | "file") {
            return Ok(url);
        }
    }

    let joined = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    );
    Url::parse(&joined).map_err(|e| DirectoryError::InvalidUrl {
        endpoint: endpoint.to_string(),
        message: e.to_string(),
    })
}

/// reqwest-backed directory client.
pub struct HttpDirectoryClient {
    http: Client,
    base: Url,
    api_key: Option<String>,
}

impl HttpDirectoryClient {
    pub fn new(config: &DirectoryConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url).map_err(|e| DirectoryError::InvalidUrl {
            endpoint: config.base_url.clone(),
            message: e.to_string(),
        })?;

        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| DirectoryError::Network {
                url: config.base_url.clone(),
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            http,
            base,
            api_key: config.api_key.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub fn endpoint_url(&self, endpoint: &str) -> Result<Url> {
        resolve_endpoint(&self.base, endpoint)
    }

    /// Endpoint with properly encoded query parameters.
    pub(crate) fn endpoint_with_query(&self, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.endpoint_url(path)?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: &Url) -> RequestBuilder {
        let builder = self
            .http
            .request(method, url.clone())
            .header("Content-Type", "application/json");
        match &self.api_key {
            Some(key) => builder.header(API_KEY_HEADER, key),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, url: &Url) -> Result<Response> {
        tracing::debug!(url = %url, "Sending directory request");

        let response = builder
            .send()
            .await
            .map_err(|e| DirectoryError::from_reqwest(url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(url = %url, status = status.as_u16(), "Directory request failed");
            return Err(DirectoryError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body: body.chars().take(ERROR_BODY_LIMIT).collect(),
            });
        }

        Ok(response)
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self.send(self.request(Method::GET, &url), &url).await?;
        let text = response
            .text()
            .await
            .map_err(|e| DirectoryError::from_reqwest(url.as_str(), e))?;

        tracing::debug!(url = %url, len = text.len(), "Directory request succeeded");
        serde_json::from_str(&text).map_err(|e| DirectoryError::parse(url.as_str(), e))
    }

    /// Send a JSON body and discard the response body.
    pub(crate) async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: &B,
    ) -> Result<String> {
        let builder = self.request(method, &url).json(body);
        let response = self.send(builder, &url).await?;
        response
            .text()
            .await
            .map_err(|e| DirectoryError::from_reqwest(url.as_str(), e))
    }

    /// Raw bytes from a URL; `file://` locations are read from disk.
    async fn get_bytes(&self, url: Url) -> Result<(Vec<u8>, Option<String>)> {
        if url.scheme() == "file" {
            let path = url.to_file_path().map_err(|_| DirectoryError::AssetLoad {
                location: url.to_string(),
                message: "not a local file path".to_string(),
            })?;
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| DirectoryError::AssetLoad {
                    location: url.to_string(),
                    message: e.to_string(),
                })?;
            return Ok((bytes, None));
        }

        let response = self.send(self.request(Method::GET, &url), &url).await?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| DirectoryError::from_reqwest(url.as_str(), e))?;
        Ok((bytes.to_vec(), content_type))
    }

    async fn get_object(&self, short_code: &str) -> Result<ContentDescriptor> {
        let url = self.endpoint_with_query("/get_object", &[("short_code", short_code)])?;
        let record: ShortUrlRecord = self.get_json(url.clone()).await?;

        if record.object_type.is_none() {
            return Err(DirectoryError::Parse {
                url: url.to_string(),
                message: "response has no 'type' field".to_string(),
            });
        }

        let descriptor = ContentDescriptor::from(record);
        tracing::info!(
            short_code = %short_code,
            content_type = %descriptor.content_type,
            metadata = %descriptor.metadata.raw(),
            "Fetched object properties"
        );
        Ok(descriptor)
    }
}

#[async_trait]
impl ContentDirectory for HttpDirectoryClient {
    async fn resolve_by_identity(&self, identity: &str) -> Result<ContentDescriptor> {
        self.get_object(identity).await
    }

    async fn resolve_by_short_code(&self, short_code: &str) -> Result<ContentDescriptor> {
        self.get_object(short_code).await
    }

    async fn fetch_quiz_by_id(&self, quiz_id: &str) -> Result<QuizPayload> {
        let url = self.endpoint_with_query("/retrieve_quiz", &[("id", quiz_id)])?;
        self.get_json(url).await
    }

    async fn fetch_quiz_at(&self, location: &str) -> Result<QuizPayload> {
        let url = self.endpoint_url(location)?;
        self.get_json(url).await
    }

    async fn fetch_asset_bundle(&self, location: &str) -> Result<BundleHandle> {
        let url = self.endpoint_url(location)?;
        let (bytes, _) = self.get_bytes(url).await?;
        if bytes.is_empty() {
            return Err(DirectoryError::AssetLoad {
                location: location.to_string(),
                message: "bundle is empty".to_string(),
            });
        }
        Ok(BundleHandle {
            location: location.to_string(),
            bytes,
        })
    }

    async fn fetch_image(&self, location: &str) -> Result<ImageHandle> {
        let is_url = Url::parse(location).is_ok() || location.starts_with('/');
        let (bytes, content_type) = if is_url {
            self.get_bytes(self.endpoint_url(location)?).await?
        } else {
            (self.download_file(location).await?, None)
        };

        if bytes.is_empty() {
            return Err(DirectoryError::AssetLoad {
                location: location.to_string(),
                message: "image is empty".to_string(),
            });
        }
        Ok(ImageHandle {
            location: location.to_string(),
            content_type,
            bytes,
        })
    }

    async fn fetch_file_collection(&self, collection_id: &str) -> Result<FileCollection> {
        let url = self.endpoint_with_query("/get_file_collection", &[("id", collection_id)])?;
        self.get_json(url).await
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>> {
        let url = self.endpoint_with_query("/download_file", &[("file_id", file_id)])?;
        let (bytes, _) = self.get_bytes(url).await?;
        Ok(bytes)
    }
}
