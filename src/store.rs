//! Persistence for users, galleries and images.
//!
//! The server only talks to the [`GalleryStore`] trait, shared as
//! `Arc<dyn GalleryStore>`. [`InMemoryGalleryStore`] keeps everything in a
//! single mutex-guarded map set, which is all the reference server and the
//! tests need.

use crate::error::StoreError;
use crate::model::{Gallery, GalleryImage, User};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

pub type GuardedGalleryStore = Arc<dyn GalleryStore>;

/// Fields of an image that can be changed after creation.
#[derive(Debug, Clone, Default)]
pub struct ImageUpdate {
    pub value: Option<String>,
    pub disabled: Option<bool>,
}

pub trait GalleryStore: Send + Sync {
    // ── Users ────────────────────────────────────────────────────────────
    /// Fails with [`StoreError::Conflict`] when the e-mail is taken.
    fn create_user(&self, email: &str, password_hash: &str) -> Result<User, StoreError>;
    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    fn get_user(&self, id: &str) -> Result<User, StoreError>;

    // ── Galleries ────────────────────────────────────────────────────────
    fn create_gallery(&self, owner: &str, background: &str) -> Result<Gallery, StoreError>;
    /// The gallery without its images.
    fn get_gallery(&self, id: &str) -> Result<Gallery, StoreError>;
    fn list_galleries(&self, owner: &str) -> Result<Vec<Gallery>, StoreError>;
    /// Deletes the gallery and every image in it.
    fn delete_gallery(&self, id: &str) -> Result<(), StoreError>;

    // ── Images ───────────────────────────────────────────────────────────
    fn create_image(
        &self,
        value: &str,
        gallery_id: Option<&str>,
    ) -> Result<GalleryImage, StoreError>;
    fn get_image(&self, id: &str) -> Result<GalleryImage, StoreError>;
    /// Images of a gallery in creation order. Disabled images are only
    /// included when `viewer` owns the gallery.
    fn list_images(
        &self,
        gallery_id: &str,
        viewer: Option<&str>,
    ) -> Result<Vec<GalleryImage>, StoreError>;
    fn update_image(&self, id: &str, update: ImageUpdate) -> Result<GalleryImage, StoreError>;
    fn delete_image(&self, id: &str) -> Result<(), StoreError>;
}

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    galleries: HashMap<String, Gallery>,
    images: HashMap<String, GalleryImage>,
    /// Insertion order of image ids, for stable listings.
    image_order: Vec<String>,
}

#[derive(Default)]
pub struct InMemoryGalleryStore {
    tables: Mutex<Tables>,
}

impl InMemoryGalleryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Backend("store mutex poisoned".into()))
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

impl GalleryStore for InMemoryGalleryStore {
    fn create_user(&self, email: &str, password_hash: &str) -> Result<User, StoreError> {
        let mut t = self.lock()?;
        if t.users.values().any(|u| u.email.eq_ignore_ascii_case(email)) {
            return Err(StoreError::Conflict(format!("user '{email}' already exists")));
        }
        let user = User {
            id: new_id(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
        };
        t.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let t = self.lock()?;
        Ok(t
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    fn get_user(&self, id: &str) -> Result<User, StoreError> {
        self.lock()?
            .users
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("user", id))
    }

    fn create_gallery(&self, owner: &str, background: &str) -> Result<Gallery, StoreError> {
        let mut t = self.lock()?;
        if !t.users.contains_key(owner) {
            return Err(StoreError::not_found("user", owner));
        }
        let gallery = Gallery {
            id: new_id(),
            created_at: Utc::now(),
            disabled: false,
            value: background.to_string(),
            owner: owner.to_string(),
            images: Vec::new(),
        };
        t.galleries.insert(gallery.id.clone(), gallery.clone());
        Ok(gallery)
    }

    fn get_gallery(&self, id: &str) -> Result<Gallery, StoreError> {
        self.lock()?
            .galleries
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("gallery", id))
    }

    fn list_galleries(&self, owner: &str) -> Result<Vec<Gallery>, StoreError> {
        let t = self.lock()?;
        let mut galleries: Vec<Gallery> = t
            .galleries
            .values()
            .filter(|g| g.owner == owner)
            .cloned()
            .collect();
        galleries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(galleries)
    }

    fn delete_gallery(&self, id: &str) -> Result<(), StoreError> {
        let mut t = self.lock()?;
        if t.galleries.remove(id).is_none() {
            return Err(StoreError::not_found("gallery", id));
        }
        let Tables {
            images,
            image_order,
            ..
        } = &mut *t;
        images.retain(|_, img| img.gallery_id.as_deref() != Some(id));
        image_order.retain(|image_id| images.contains_key(image_id));
        Ok(())
    }

    fn create_image(
        &self,
        value: &str,
        gallery_id: Option<&str>,
    ) -> Result<GalleryImage, StoreError> {
        let mut t = self.lock()?;
        if let Some(gid) = gallery_id {
            if !t.galleries.contains_key(gid) {
                return Err(StoreError::not_found("gallery", gid));
            }
        }
        let image = GalleryImage {
            id: new_id(),
            created_at: Utc::now(),
            disabled: false,
            value: value.to_string(),
            gallery_id: gallery_id.map(str::to_string),
        };
        t.image_order.push(image.id.clone());
        t.images.insert(image.id.clone(), image.clone());
        Ok(image)
    }

    fn get_image(&self, id: &str) -> Result<GalleryImage, StoreError> {
        self.lock()?
            .images
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("image", id))
    }

    fn list_images(
        &self,
        gallery_id: &str,
        viewer: Option<&str>,
    ) -> Result<Vec<GalleryImage>, StoreError> {
        let t = self.lock()?;
        let gallery = t
            .galleries
            .get(gallery_id)
            .ok_or_else(|| StoreError::not_found("gallery", gallery_id))?;
        let is_owner = viewer == Some(gallery.owner.as_str());

        Ok(t
            .image_order
            .iter()
            .filter_map(|id| t.images.get(id))
            .filter(|img| img.gallery_id.as_deref() == Some(gallery_id))
            .filter(|img| is_owner || !img.disabled)
            .cloned()
            .collect())
    }

    fn update_image(&self, id: &str, update: ImageUpdate) -> Result<GalleryImage, StoreError> {
        let mut t = self.lock()?;
        let image = t
            .images
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("image", id))?;
        if let Some(value) = update.value {
            image.value = value;
        }
        if let Some(disabled) = update.disabled {
            image.disabled = disabled;
        }
        Ok(image.clone())
    }

    fn delete_image(&self, id: &str) -> Result<(), StoreError> {
        let mut t = self.lock()?;
        if t.images.remove(id).is_none() {
            return Err(StoreError::not_found("image", id));
        }
        t.image_order.retain(|i| i != id);
        Ok(())
    }
}
