//! Per-page gallery controller.
//!
//! A [`GallerySession`] is what one open gallery page holds: the gallery id,
//! whether the markup overlay is showing, the image being marked up, and the
//! last snapshot fetched from the API. Two sessions never share any of it.
//!
//! The image list is never patched locally. Every mutation is followed by a
//! full re-fetch, so concurrent uploads can finish in any order and the
//! session still converges on what the server holds.

use crate::client::{GalleryClient, GalleryStream};
use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::ingest::{self, UploadSource};
use crate::model::{Gallery, GalleryImage, WorkingRaster};
use crate::pipeline::upload::{HttpTransport, Transport};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct GallerySession<T: Transport = HttpTransport> {
    client: Arc<GalleryClient<T>>,
    config: IngestConfig,
    gallery_id: String,
    overlay_visible: bool,
    working: Option<WorkingRaster>,
    snapshot: Option<Gallery>,
    notice: Option<&'static str>,
}

impl<T: Transport + 'static> GallerySession<T> {
    pub fn new(
        client: Arc<GalleryClient<T>>,
        gallery_id: impl Into<String>,
        config: IngestConfig,
    ) -> Self {
        Self {
            client,
            config,
            gallery_id: gallery_id.into(),
            overlay_visible: false,
            working: None,
            snapshot: None,
            notice: None,
        }
    }

    pub fn gallery_id(&self) -> &str {
        &self.gallery_id
    }

    /// Last fetched gallery, if any.
    pub fn snapshot(&self) -> Option<&Gallery> {
        self.snapshot.as_ref()
    }

    pub fn overlay_visible(&self) -> bool {
        self.overlay_visible
    }

    pub fn working(&self) -> Option<&WorkingRaster> {
        self.working.as_ref()
    }

    /// User-facing message of the last failed action, cleared on success.
    pub fn notice(&self) -> Option<&'static str> {
        self.notice
    }

    // ── Overlay ──────────────────────────────────────────────────────────

    /// Show the markup overlay over `image`.
    pub fn open_overlay(&mut self, image: WorkingRaster) {
        self.working = Some(image);
        self.overlay_visible = true;
    }

    /// Replace the image under the overlay, e.g. after a stroke was drawn.
    pub fn update_working(&mut self, image: WorkingRaster) {
        self.working = Some(image);
    }

    pub fn close_overlay(&mut self) {
        self.overlay_visible = false;
        self.working = None;
    }

    // ── Actions ──────────────────────────────────────────────────────────

    fn record<R>(&mut self, result: Result<R, IngestError>) -> Result<R, IngestError> {
        match &result {
            Ok(_) => self.notice = None,
            Err(e) => {
                warn!("Gallery {}: {}", self.gallery_id, e);
                self.notice = Some(e.user_message());
            }
        }
        result
    }

    /// Re-fetch the whole gallery and replace the snapshot.
    pub async fn refresh(&mut self) -> Result<&Gallery, IngestError> {
        let gallery = self.client.gallery(&self.gallery_id).await?;
        debug!(
            "Gallery {} refreshed: {} images",
            gallery.id,
            gallery.images.len()
        );
        Ok(self.snapshot.insert(gallery))
    }

    /// Replace the snapshot with one received from [`Self::watch`].
    pub fn apply_snapshot(&mut self, gallery: Gallery) {
        if gallery.id == self.gallery_id {
            self.snapshot = Some(gallery);
        }
    }

    /// Poll the gallery at the configured interval.
    pub fn watch(&self) -> GalleryStream {
        self.client
            .clone()
            .poll_gallery(self.gallery_id.clone(), self.config.poll_interval())
    }

    async fn refresh_after<R>(
        &mut self,
        result: Result<R, IngestError>,
    ) -> Result<R, IngestError> {
        let result = self.record(result);
        if result.is_ok() {
            if let Err(e) = self.refresh().await {
                warn!("Gallery {}: refresh after change failed: {}", self.gallery_id, e);
            }
        }
        result
    }

    /// Downscale, encode and add a picked file to the gallery.
    pub async fn submit_file(&mut self, path: &Path) -> Result<GalleryImage, IngestError> {
        let result = ingest::ingest(
            &*self.client,
            UploadSource::File(path.to_path_buf()),
            &self.gallery_id,
            &self.config,
        )
        .await;
        self.refresh_after(result).await
    }

    /// Add the marked-up image under the overlay to the gallery and close the
    /// overlay.
    pub async fn submit_drawing(&mut self) -> Result<GalleryImage, IngestError> {
        let working = match self.working.clone() {
            Some(working) => working,
            None => {
                return self.record(Err(IngestError::Encode {
                    detail: "no image under the overlay".into(),
                }))
            }
        };
        let result = ingest::ingest(
            &*self.client,
            UploadSource::Rendered(working),
            &self.gallery_id,
            &self.config,
        )
        .await;
        if result.is_ok() {
            self.close_overlay();
        }
        self.refresh_after(result).await
    }

    /// Flip an image between shown and hidden.
    pub async fn toggle_image(&mut self, image_id: &str) -> Result<(), IngestError> {
        let known = self
            .snapshot
            .as_ref()
            .and_then(|g| g.images.iter().find(|img| img.id == image_id))
            .map(|img| img.disabled);
        let disabled = match known {
            Some(disabled) => disabled,
            None => {
                let found = self.refresh().await.map(|g| {
                    g.images
                        .iter()
                        .find(|img| img.id == image_id)
                        .map(|img| img.disabled)
                });
                match found {
                    Ok(Some(disabled)) => disabled,
                    Ok(None) => {
                        return self.record(Err(IngestError::NotFound {
                            what: format!("image '{image_id}'"),
                        }))
                    }
                    Err(e) => return self.record(Err(e)),
                }
            }
        };

        let result = self.client.set_image_disabled(image_id, !disabled).await;
        self.refresh_after(result).await
    }

    pub async fn delete_image(&mut self, image_id: &str) -> Result<(), IngestError> {
        let result = self.client.delete_image(image_id).await;
        self.refresh_after(result).await
    }
}
