//! Adapter for registries speaking the OCI Distribution Specification v2 API.
//!
//! Built on reqwest. Blob bodies are streamed in both directions: pulls expose
//! the response body as an [`AsyncRead`](tokio::io::AsyncRead), pushes feed the
//! reader straight into the request body.

use crate::adapter::{ArtifactRegistry, BlobReader, ChunkAccepted, ChunkRejected, ChunkSpan};
use crate::auth::Credentials;
use crate::digest::{Digest, is_digest};
use crate::error::{ReplicaError, Result};
use crate::model::RegistryEndpoint;
use crate::oci::{Descriptor, Manifest, media_types};
use async_trait::async_trait;
use futures_util::TryStreamExt;
use reqwest::header::{self, HeaderMap};
use reqwest::{Body, Client as ReqwestClient, Method, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tokio_util::io::{ReaderStream, StreamReader};
use url::Url;

#[cfg(test)]
#[path = "native_tests.rs"]
mod tests;

const DOCKER_CONTENT_DIGEST: &str = "Docker-Content-Digest";

/// Configuration for the HTTP client.
///
/// # Examples
///
/// ```
/// use libreplica::adapter::native::ClientConfig;
///
/// let config = ClientConfig::new()
///     .with_connect_timeout(10)
///     .with_max_idle_per_host(20);
/// assert_eq!(config.connect_timeout_seconds, 10);
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Connect timeout in seconds (default: 30). Transfers themselves are not
    /// time-limited; a blob may take as long as it takes.
    pub connect_timeout_seconds: u64,
    /// Maximum idle connections per host (default: 10)
    pub max_idle_per_host: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_seconds: 30,
            max_idle_per_host: 10,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, seconds: u64) -> Self {
        self.connect_timeout_seconds = seconds;
        self
    }

    pub fn with_max_idle_per_host(mut self, max: usize) -> Self {
        self.max_idle_per_host = max;
        self
    }
}

/// HTTP adapter for a Distribution-compatible registry.
#[derive(Debug, Clone)]
pub struct NativeAdapter {
    http_client: ReqwestClient,
    /// Base registry URL (e.g., "https://registry.example.com")
    registry_url: String,
    kind: String,
    credentials: Credentials,
}

impl NativeAdapter {
    /// Creates an adapter for the endpoint with default client configuration.
    pub fn new(endpoint: &RegistryEndpoint) -> Result<Self> {
        Self::with_config(endpoint, ClientConfig::default())
    }

    pub fn with_config(endpoint: &RegistryEndpoint, config: ClientConfig) -> Result<Self> {
        let registry_url = Self::normalize_url(&endpoint.url)?;

        let http_client = ReqwestClient::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .pool_max_idle_per_host(config.max_idle_per_host)
            .danger_accept_invalid_certs(endpoint.insecure)
            .build()
            .map_err(|e| ReplicaError::adapter_with_source("Failed to create HTTP client", e))?;

        Ok(Self {
            http_client,
            registry_url,
            kind: endpoint.kind.clone(),
            credentials: endpoint.credentials.clone(),
        })
    }

    /// Normalizes a registry URL by ensuring it has a scheme and removing trailing slashes.
    fn normalize_url(url: &str) -> Result<String> {
        let url = url.trim();

        if url.is_empty() {
            return Err(ReplicaError::adapter("Registry URL cannot be empty"));
        }

        // Add default scheme if missing
        let url = if !url.starts_with("http://") && !url.starts_with("https://") {
            format!("https://{}", url)
        } else {
            url.to_string()
        };

        let url = url.trim_end_matches('/');
        Url::parse(url)
            .map_err(|e| ReplicaError::adapter_with_source(format!("Invalid registry URL {url}"), e))?;

        Ok(url.to_string())
    }

    /// Returns the base registry URL.
    pub fn registry_url(&self) -> &str {
        &self.registry_url
    }

    fn manifest_url(&self, repository: &str, reference: &str) -> String {
        format!(
            "{}/v2/{}/manifests/{}",
            self.registry_url, repository, reference
        )
    }

    fn blob_url(&self, repository: &str, digest: &str) -> String {
        format!("{}/v2/{}/blobs/{}", self.registry_url, repository, digest)
    }

    fn upload_url(&self, repository: &str) -> String {
        format!("{}/v2/{}/blobs/uploads/", self.registry_url, repository)
    }

    /// Resolves an upload `Location`, which registries may send relative.
    fn resolve_location(&self, location: &str) -> Result<Url> {
        let base = Url::parse(&format!("{}/", self.registry_url))
            .map_err(|e| ReplicaError::validation_with_source("Invalid registry URL", e))?;
        base.join(location).map_err(|e| {
            ReplicaError::validation_with_source(format!("Invalid upload location {location}"), e)
        })
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let request = self.http_client.request(method, url);
        match self.credentials.to_header_value() {
            Some(auth) => request.header(header::AUTHORIZATION, auth),
            None => request,
        }
    }

    fn request_url(&self, method: Method, url: Url) -> RequestBuilder {
        self.request(method, url.as_str())
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| Self::translate_reqwest_error(e, &self.registry_url))?;
        Self::check_response_status(response).await
    }

    fn header_str(headers: &HeaderMap, name: impl header::AsHeaderName) -> Option<String> {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    }

    fn accept_manifests(request: RequestBuilder) -> RequestBuilder {
        request.header(header::ACCEPT, media_types::MANIFEST_ACCEPT.join(", "))
    }

    /// Opens an upload session and returns its absolute location.
    async fn initiate_upload(&self, repository: &str) -> Result<Url> {
        let response = self
            .send(
                self.request(Method::POST, &self.upload_url(repository))
                    .header(header::CONTENT_LENGTH, "0"),
            )
            .await?;
        let location = Self::header_str(response.headers(), header::LOCATION)
            .ok_or_else(|| ReplicaError::validation("Upload response missing Location header"))?;
        self.resolve_location(&location)
    }

    /// Closes an upload session by committing it under `digest`.
    async fn complete_upload(
        &self,
        mut location: Url,
        digest: &str,
        body: Body,
        size: u64,
    ) -> Result<()> {
        location.query_pairs_mut().append_pair("digest", digest);
        self.send(
            self.request_url(Method::PUT, location)
                .header(header::CONTENT_TYPE, media_types::OCTET_STREAM)
                .header(header::CONTENT_LENGTH, size.to_string())
                .body(body),
        )
        .await?;
        Ok(())
    }

    /// Asks an upload session how many bytes it holds. Answers the last byte
    /// persisted, if the registry says.
    async fn upload_progress(&self, location: &Url) -> Option<i64> {
        let response = self
            .send(self.request_url(Method::GET, location.clone()))
            .await
            .ok()?;
        Self::header_str(response.headers(), header::RANGE).and_then(|r| parse_range_end(&r))
    }

    async fn patch_chunk(
        &self,
        location: &Url,
        span: ChunkSpan,
        chunk: BlobReader,
    ) -> Result<(Url, Option<i64>)> {
        let response = self
            .send(
                self.request_url(Method::PATCH, location.clone())
                    .header(header::CONTENT_TYPE, media_types::OCTET_STREAM)
                    .header(header::CONTENT_RANGE, format!("{}-{}", span.start, span.end))
                    .header(header::CONTENT_LENGTH, span.len().to_string())
                    .body(Body::wrap_stream(ReaderStream::new(chunk))),
            )
            .await?;
        let next = match Self::header_str(response.headers(), header::LOCATION) {
            Some(l) => self.resolve_location(&l)?,
            None => location.clone(),
        };
        let accepted =
            Self::header_str(response.headers(), header::RANGE).and_then(|r| parse_range_end(&r));
        Ok((next, accepted))
    }

    fn body_reader(response: Response) -> BlobReader {
        let stream = response.bytes_stream().map_err(std::io::Error::other);
        Box::new(StreamReader::new(Box::pin(stream)))
    }

    /// Translates a reqwest error into a ReplicaError.
    fn translate_reqwest_error(error: reqwest::Error, registry_url: &str) -> ReplicaError {
        if error.is_timeout() {
            ReplicaError::network_with_source(format!("Request to {} timed out", registry_url), error)
        } else if error.is_connect() {
            ReplicaError::network_with_source(
                format!("Failed to connect to registry at {}", registry_url),
                error,
            )
        } else if error.is_request() || error.is_body() {
            ReplicaError::network_with_source(
                format!("Failed to send request to {}", registry_url),
                error,
            )
        } else {
            ReplicaError::network_with_source(
                format!("Network error communicating with {}", registry_url),
                error,
            )
        }
    }

    /// Checks the HTTP response status and translates errors to ReplicaError.
    async fn check_response_status(response: Response) -> Result<Response> {
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().to_string();
        let retry_after = Self::header_str(response.headers(), header::RETRY_AFTER)
            .and_then(|v| v.trim().parse::<u64>().ok());
        let error_body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("(unable to read response body)"));

        match status {
            StatusCode::UNAUTHORIZED => Err(ReplicaError::authentication(
                format!("Authentication required for {}: {}", url, error_body),
                Some(401),
            )),
            StatusCode::FORBIDDEN => Err(ReplicaError::authentication(
                format!("Access forbidden for {}: {}", url, error_body),
                Some(403),
            )),
            StatusCode::NOT_FOUND => Err(ReplicaError::not_found("endpoint", url)),
            StatusCode::TOO_MANY_REQUESTS => Err(ReplicaError::rate_limit(
                format!("Rate limit exceeded for {}", url),
                retry_after,
            )),
            s if s.is_server_error() => Err(ReplicaError::server(
                format!("Server error from {}: {}", url, error_body),
                status.as_u16(),
            )),
            _ => Err(ReplicaError::network(format!(
                "HTTP {} from {}: {}",
                status.as_u16(),
                url,
                error_body
            ))),
        }
    }
}

/// Parses the end of a `Range: 0-<end>` upload progress header.
fn parse_range_end(range: &str) -> Option<i64> {
    let range = range.trim().trim_start_matches("bytes=");
    let (_, end) = range.split_once('-')?;
    end.trim().parse().ok()
}

#[async_trait]
impl ArtifactRegistry for NativeAdapter {
    async fn pull_manifest(
        &self,
        repository: &str,
        reference: &str,
    ) -> Result<(Manifest, String)> {
        let response = self
            .send(Self::accept_manifests(
                self.request(Method::GET, &self.manifest_url(repository, reference)),
            ))
            .await?;

        let content_type = Self::header_str(response.headers(), header::CONTENT_TYPE);
        let digest = Self::header_str(response.headers(), DOCKER_CONTENT_DIGEST);
        let payload = response.bytes().await.map_err(|e| {
            ReplicaError::network_with_source("Failed to read manifest response", e)
        })?;

        let manifest = Manifest::from_bytes(content_type.as_deref(), payload.to_vec())?;
        let digest = digest.unwrap_or_else(|| manifest.digest().to_string());
        Ok((manifest, digest))
    }

    async fn manifest_exist(
        &self,
        repository: &str,
        reference: &str,
    ) -> Result<(bool, Option<Descriptor>)> {
        let result = self
            .send(Self::accept_manifests(
                self.request(Method::HEAD, &self.manifest_url(repository, reference)),
            ))
            .await;
        let response = match result {
            Ok(response) => response,
            Err(e) if e.is_not_found() => return Ok((false, None)),
            Err(e) => return Err(e),
        };

        let headers = response.headers();
        let media_type = Self::header_str(headers, header::CONTENT_TYPE)
            .map(|m| crate::oci::strip_parameters(&m).to_string())
            .unwrap_or_default();
        let size = response.content_length().unwrap_or(0);
        let digest = match Self::header_str(headers, DOCKER_CONTENT_DIGEST) {
            Some(digest) => digest,
            // Some registries leave the digest off HEAD responses
            None => self.pull_manifest(repository, reference).await?.1,
        };

        Ok((true, Some(Descriptor::new(media_type, digest, size))))
    }

    async fn push_manifest(
        &self,
        repository: &str,
        reference: &str,
        media_type: &str,
        payload: &[u8],
    ) -> Result<String> {
        let response = self
            .send(
                self.request(Method::PUT, &self.manifest_url(repository, reference))
                    .header(header::CONTENT_TYPE, media_type)
                    .body(payload.to_vec()),
            )
            .await?;
        Ok(Self::header_str(response.headers(), DOCKER_CONTENT_DIGEST)
            .unwrap_or_else(|| Digest::sha256_of(payload).to_string()))
    }

    async fn delete_manifest(&self, repository: &str, reference: &str) -> Result<()> {
        let digest = if is_digest(reference) {
            reference.to_string()
        } else {
            // Manifests can only be deleted by digest
            match self.manifest_exist(repository, reference).await? {
                (true, Some(desc)) => desc.digest,
                _ => {
                    return Err(ReplicaError::not_found(
                        "manifest",
                        format!("{repository}:{reference}"),
                    ));
                }
            }
        };
        self.send(self.request(Method::DELETE, &self.manifest_url(repository, &digest)))
            .await?;
        Ok(())
    }

    async fn delete_tag(&self, _repository: &str, _tag: &str) -> Result<()> {
        Err(ReplicaError::unsupported(&self.kind, "DeleteTag"))
    }

    async fn blob_exist(&self, repository: &str, digest: &str) -> Result<bool> {
        match self
            .send(self.request(Method::HEAD, &self.blob_url(repository, digest)))
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn can_be_mount(&self, _digest: &str) -> Result<Option<String>> {
        // A plain Distribution registry cannot say which repositories hold a blob
        Ok(None)
    }

    async fn mount_blob(
        &self,
        src_repository: &str,
        digest: &str,
        dst_repository: &str,
    ) -> Result<()> {
        let mut url = Url::parse(&self.upload_url(dst_repository))
            .map_err(|e| ReplicaError::validation_with_source("Invalid upload URL", e))?;
        url.query_pairs_mut()
            .append_pair("mount", digest)
            .append_pair("from", src_repository);

        let response = self
            .send(
                self.request_url(Method::POST, url)
                    .header(header::CONTENT_LENGTH, "0"),
            )
            .await?;
        if response.status() == StatusCode::CREATED {
            return Ok(());
        }

        // 202 means the registry opened a plain upload instead of mounting
        let location = Self::header_str(response.headers(), header::LOCATION)
            .and_then(|l| self.resolve_location(&l).ok());
        if let Some(location) = location {
            let _ = self.send(self.request_url(Method::DELETE, location)).await;
        }
        Err(ReplicaError::network(format!(
            "the registry refused to mount {digest} from {src_repository} into {dst_repository}"
        )))
    }

    async fn pull_blob(&self, repository: &str, digest: &str) -> Result<(u64, BlobReader)> {
        let response = self
            .send(self.request(Method::GET, &self.blob_url(repository, digest)))
            .await?;
        let size = response.content_length().unwrap_or(0);
        Ok((size, Self::body_reader(response)))
    }

    async fn pull_blob_chunk(
        &self,
        repository: &str,
        digest: &str,
        span: ChunkSpan,
    ) -> Result<(u64, BlobReader)> {
        let response = self
            .send(
                self.request(Method::GET, &self.blob_url(repository, digest))
                    .header(header::RANGE, format!("bytes={}-{}", span.start, span.end)),
            )
            .await?;

        let whole_blob = span.start == 0 && span.is_last();
        if response.status() != StatusCode::PARTIAL_CONTENT && !whole_blob {
            return Err(ReplicaError::validation(format!(
                "the registry ignored the range request for {digest} (status {})",
                response.status().as_u16()
            )));
        }
        let size = response.content_length().unwrap_or(span.len());
        Ok((size, Self::body_reader(response)))
    }

    async fn push_blob(
        &self,
        repository: &str,
        digest: &str,
        size: u64,
        blob: BlobReader,
    ) -> Result<()> {
        let location = self.initiate_upload(repository).await?;
        self.complete_upload(location, digest, Body::wrap_stream(ReaderStream::new(blob)), size)
            .await
    }

    async fn push_blob_chunk(
        &self,
        repository: &str,
        digest: &str,
        span: ChunkSpan,
        chunk: BlobReader,
        location: &str,
    ) -> std::result::Result<ChunkAccepted, ChunkRejected> {
        let rejected = |accepted_end: i64, location: String| {
            move |error: ReplicaError| ChunkRejected {
                accepted_end,
                location,
                error,
            }
        };
        let before = span.start as i64 - 1;

        let location = if location.is_empty() {
            self.initiate_upload(repository)
                .await
                .map_err(rejected(-1, String::new()))?
        } else {
            self.resolve_location(location)
                .map_err(rejected(before, location.to_string()))?
        };

        let (next, accepted) = match self.patch_chunk(&location, span, chunk).await {
            Ok(progress) => progress,
            Err(error) => {
                let accepted_end = self.upload_progress(&location).await.unwrap_or(before);
                return Err(ChunkRejected {
                    accepted_end,
                    location: location.to_string(),
                    error,
                });
            }
        };
        let accepted_end = accepted.unwrap_or(span.end as i64);

        if span.is_last() {
            // A failed commit leaves the session unusable, start over
            self.complete_upload(next.clone(), digest, Body::from(Vec::new()), 0)
                .await
                .map_err(rejected(-1, String::new()))?;
        }

        Ok(ChunkAccepted {
            location: next.to_string(),
            accepted_end,
        })
    }
}
