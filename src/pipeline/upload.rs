//! Upload: hand an encoded image to the gallery API and get an id back.
//!
//! This is the only stage with network I/O. All requests go through the
//! [`Transport`] trait so the pipeline can be driven against the real API
//! ([`HttpTransport`]), an in-process router, or a scripted mock.
//!
//! ## No retries
//!
//! The API assigns a fresh id to every stored image, so replaying a request
//! whose response was lost would store the image twice. Failures are
//! returned to the caller, who decides whether the user should try again.

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::model::{EncodedImage, GalleryImage, UploadResult};
use crate::pipeline::encode;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Path of the image endpoint.
pub const IMAGE_ENDPOINT: &str = "/api/image";

/// HTTP method of an [`ApiRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        })
    }
}

/// A transport-agnostic API request.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the API base, e.g. `/api/image`.
    pub path: String,
    pub body: Option<serde_json::Value>,
    /// Bearer token, sent as `authorization: Bearer <token>`.
    pub token: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            token: None,
        }
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn bearer(mut self, token: Option<&str>) -> Self {
        self.token = token.map(str::to_string);
        self
    }
}

/// A raw API response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse the body as JSON. A malformed body is a transport failure.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, IngestError> {
        serde_json::from_slice(&self.body).map_err(|e| IngestError::Upload {
            detail: format!("malformed response body: {}", e),
            status: Some(self.status),
        })
    }

    /// The `{ "error": ... }` message of a failed response, if any.
    pub fn error_message(&self) -> String {
        #[derive(Deserialize)]
        struct ErrorBody {
            error: String,
        }
        serde_json::from_slice::<ErrorBody>(&self.body)
            .map(|b| b.error)
            .unwrap_or_else(|_| format!("HTTP {}", self.status))
    }

    /// Turn a non-success status into the matching error.
    pub fn error_for_status(self, what: &str) -> Result<Self, IngestError> {
        if self.is_success() {
            return Ok(self);
        }
        let message = self.error_message();
        Err(match self.status {
            401 | 403 => IngestError::Auth { detail: message },
            404 => IngestError::NotFound {
                what: format!("{what}: {message}"),
            },
            status => IngestError::Upload {
                detail: format!("{what}: {message}"),
                status: Some(status),
            },
        })
    }
}

/// Something that can carry an [`ApiRequest`] to the gallery API.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, IngestError>;
}

/// [`Transport`] over HTTP via reqwest.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    timeout_secs: u64,
}

impl HttpTransport {
    /// Build a transport for `config.api_base_url` with the configured
    /// per-request timeout.
    pub fn new(config: &IngestConfig) -> Result<Self, IngestError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| IngestError::InvalidConfig(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            timeout_secs: config.request_timeout_secs,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, IngestError> {
        let url = format!("{}{}", self.base_url, request.path);
        debug!("{} {}", request.method, url);

        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Patch => self.client.patch(&url),
            Method::Delete => self.client.delete(&url),
        };
        if let Some(token) = &request.token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                IngestError::Timeout {
                    endpoint: request.path.clone(),
                    secs: self.timeout_secs,
                }
            } else {
                IngestError::upload(e)
            }
        })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                IngestError::Timeout {
                    endpoint: request.path.clone(),
                    secs: self.timeout_secs,
                }
            } else {
                IngestError::upload(e)
            }
        })?;

        Ok(ApiResponse {
            status,
            content_type,
            body: body.to_vec(),
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateImageBody<'a> {
    value: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    gallery_id: Option<&'a str>,
}

#[derive(Deserialize)]
struct UploadResponse {
    id: Option<String>,
}

/// Upload an encoded image that belongs to no gallery yet.
///
/// Returns the server-assigned id. A response without an id is a failure,
/// never an empty string.
pub async fn upload_image(
    transport: &dyn Transport,
    encoded: &EncodedImage,
) -> Result<UploadResult, IngestError> {
    let body = CreateImageBody {
        value: &encoded.data,
        gallery_id: None,
    };
    let request = ApiRequest::new(Method::Post, IMAGE_ENDPOINT).json(serde_json::json!(body));
    let response = transport.send(request).await?.error_for_status("upload image")?;

    match response.json::<UploadResponse>()?.id {
        Some(id) if !id.is_empty() => {
            info!(
                "Uploaded {}x{} image → id {}",
                encoded.width, encoded.height, id
            );
            Ok(UploadResult { id })
        }
        _ => {
            warn!("Upload response carried no image id");
            Err(IngestError::Upload {
                detail: "response carried no image id".into(),
                status: Some(response.status),
            })
        }
    }
}

/// Store a URL-safe encoded image in an existing gallery.
///
/// `value` must already have been passed through
/// [`encode::to_url_safe`]; a value that still contains `+`, `/` or trailing
/// `=` is refused locally. The token is attached when present; the API
/// decides whether the call needs one.
pub async fn create_image(
    transport: &dyn Transport,
    value: &str,
    gallery_id: &str,
    token: Option<&str>,
) -> Result<GalleryImage, IngestError> {
    if !encode::is_url_safe(value) {
        return Err(IngestError::Encode {
            detail: "image value must be URL-safe encoded before create_image".into(),
        });
    }
    if gallery_id.is_empty() {
        return Err(IngestError::NotFound {
            what: "gallery '' (no gallery id given)".into(),
        });
    }

    let body = CreateImageBody {
        value,
        gallery_id: Some(gallery_id),
    };
    let request = ApiRequest::new(Method::Post, IMAGE_ENDPOINT)
        .json(serde_json::json!(body))
        .bearer(token);
    let response = transport.send(request).await?.error_for_status("create image")?;
    let image: GalleryImage = response.json()?;
    if image.id.is_empty() {
        return Err(IngestError::Upload {
            detail: "response carried no image id".into(),
            status: Some(response.status),
        });
    }

    info!("Created image {} in gallery {}", image.id, gallery_id);
    Ok(image)
}
