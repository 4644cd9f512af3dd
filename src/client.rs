//! Typed client for the gallery API.
//!
//! [`GalleryClient`] wraps a [`Transport`] and the caller's bearer token. The
//! two upload operations delegate to [`crate::pipeline::upload`]; everything
//! else is a thin JSON call. Operations that the server gates on ownership
//! fail locally with [`IngestError::Auth`] when no token is held, so an
//! anonymous caller never sends a mutation at all.

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::model::{AuthSession, EncodedImage, Gallery, GalleryImage, UploadResult};
use crate::pipeline::upload::{self, ApiRequest, ApiResponse, HttpTransport, Method, Transport};
use futures::stream;
use serde_json::json;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::Stream;
use tracing::{debug, warn};

/// A stream of full gallery snapshots.
pub type GalleryStream = Pin<Box<dyn Stream<Item = Result<Gallery, IngestError>> + Send>>;

pub struct GalleryClient<T: Transport = HttpTransport> {
    transport: T,
    token: Option<String>,
}

impl GalleryClient<HttpTransport> {
    /// HTTP client for `config.api_base_url`, carrying `config.token`.
    pub fn from_config(config: &IngestConfig) -> Result<Self, IngestError> {
        let mut client = Self::new(HttpTransport::new(config)?);
        client.token = config.token.clone();
        Ok(client)
    }
}

impl<T: Transport> GalleryClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn require_token(&self, operation: &str) -> Result<&str, IngestError> {
        match self.token.as_deref() {
            Some(token) if !token.is_empty() => Ok(token),
            _ => {
                warn!("Refusing {} without a token", operation);
                Err(IngestError::Auth {
                    detail: format!("{operation} requires a signed-in user"),
                })
            }
        }
    }

    async fn call(&self, request: ApiRequest, what: &str) -> Result<ApiResponse, IngestError> {
        debug!("{} {} ({})", request.method, request.path, what);
        self.transport.send(request).await?.error_for_status(what)
    }

    // ── Auth ─────────────────────────────────────────────────────────────

    async fn authenticate(
        &mut self,
        path: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, IngestError> {
        let request = ApiRequest::new(Method::Post, path)
            .json(json!({ "email": email, "password": password }));
        let session: AuthSession = self.call(request, "authenticate").await?.json()?;
        self.token = Some(session.token.clone());
        Ok(session)
    }

    /// Register and keep the returned access token.
    pub async fn sign_up(
        &mut self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, IngestError> {
        self.authenticate("/api/signup", email, password).await
    }

    /// Sign in and keep the returned access token.
    pub async fn sign_in(
        &mut self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, IngestError> {
        self.authenticate("/api/signin", email, password).await
    }

    /// Exchange a refresh token for a new session and keep its access token.
    pub async fn refresh(&mut self, refresh_token: &str) -> Result<AuthSession, IngestError> {
        let request =
            ApiRequest::new(Method::Post, "/api/refresh").json(json!({ "refresh": refresh_token }));
        let session: AuthSession = self.call(request, "refresh").await?.json()?;
        self.token = Some(session.token.clone());
        Ok(session)
    }

    // ── Images ───────────────────────────────────────────────────────────

    pub async fn upload_image(&self, encoded: &EncodedImage) -> Result<UploadResult, IngestError> {
        upload::upload_image(&self.transport, encoded).await
    }

    pub async fn create_image(
        &self,
        value: &str,
        gallery_id: &str,
    ) -> Result<GalleryImage, IngestError> {
        upload::create_image(&self.transport, value, gallery_id, self.token()).await
    }

    /// Raw bytes of a stored image.
    pub async fn image_bytes(&self, image_id: &str) -> Result<Vec<u8>, IngestError> {
        let request = ApiRequest::new(Method::Get, format!("/api/image/{image_id}"));
        Ok(self.call(request, "image").await?.body)
    }

    pub async fn set_image_disabled(
        &self,
        image_id: &str,
        disabled: bool,
    ) -> Result<(), IngestError> {
        let token = self.require_token("set_image_disabled")?;
        let request = ApiRequest::new(Method::Patch, format!("/api/image/{image_id}"))
            .json(json!({ "disabled": disabled }))
            .bearer(Some(token));
        self.call(request, "update image").await?;
        Ok(())
    }

    pub async fn delete_image(&self, image_id: &str) -> Result<(), IngestError> {
        let token = self.require_token("delete_image")?;
        let request =
            ApiRequest::new(Method::Delete, format!("/api/image/{image_id}")).bearer(Some(token));
        self.call(request, "delete image").await?;
        Ok(())
    }

    // ── Galleries ────────────────────────────────────────────────────────

    pub async fn create_gallery(&self, background: &str) -> Result<Gallery, IngestError> {
        let token = self.require_token("create_gallery")?;
        let request = ApiRequest::new(Method::Post, "/api/gallery")
            .json(json!({ "background": background }))
            .bearer(Some(token));
        self.call(request, "create gallery").await?.json()
    }

    /// One gallery with its images. The token, when held, lets the owner see
    /// disabled images too.
    pub async fn gallery(&self, gallery_id: &str) -> Result<Gallery, IngestError> {
        let request =
            ApiRequest::new(Method::Get, format!("/api/gallery/{gallery_id}")).bearer(self.token());
        self.call(request, "gallery").await?.json()
    }

    /// Galleries owned by the signed-in user.
    pub async fn galleries(&self) -> Result<Vec<Gallery>, IngestError> {
        let token = self.require_token("galleries")?;
        let request = ApiRequest::new(Method::Get, "/api/gallery").bearer(Some(token));
        self.call(request, "galleries").await?.json()
    }

    pub async fn delete_gallery(&self, gallery_id: &str) -> Result<(), IngestError> {
        let token = self.require_token("delete_gallery")?;
        let request = ApiRequest::new(Method::Delete, format!("/api/gallery/{gallery_id}"))
            .bearer(Some(token));
        self.call(request, "delete gallery").await?;
        Ok(())
    }
}

impl<T: Transport + 'static> GalleryClient<T> {
    /// Re-fetch a gallery every `interval`, yielding each full snapshot.
    ///
    /// The first snapshot is fetched immediately. A failed fetch is yielded
    /// as an error and polling continues; drop the stream to stop.
    pub fn poll_gallery(
        self: Arc<Self>,
        gallery_id: impl Into<String>,
        interval: Duration,
    ) -> GalleryStream {
        let gallery_id = gallery_id.into();
        Box::pin(stream::unfold(
            (self, gallery_id, true),
            move |(client, gallery_id, first)| async move {
                if !first {
                    tokio::time::sleep(interval).await;
                }
                let snapshot = client.gallery(&gallery_id).await;
                Some((snapshot, (client, gallery_id, false)))
            },
        ))
    }
}
