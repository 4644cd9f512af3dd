use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::error::ApiError;
use super::session::Session;
use super::state::GuardedAuthManager;
use crate::model::{AuthSession, Gallery, GalleryImage};
use crate::pipeline::encode;
use crate::store::{GuardedGalleryStore, ImageUpdate};

type ApiResult<T> = Result<T, ApiError>;
type JsonBody<T> = Result<Json<T>, JsonRejection>;

// ── Auth ─────────────────────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
pub(super) struct CredentialsBody {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, Debug)]
pub(super) struct RefreshBody {
    pub refresh: String,
}

pub(super) async fn sign_up(
    State(auth): State<GuardedAuthManager>,
    body: JsonBody<CredentialsBody>,
) -> ApiResult<Json<AuthSession>> {
    let Json(body) = body?;
    Ok(Json(auth.sign_up(&body.email, &body.password)?))
}

pub(super) async fn sign_in(
    State(auth): State<GuardedAuthManager>,
    body: JsonBody<CredentialsBody>,
) -> ApiResult<Json<AuthSession>> {
    let Json(body) = body?;
    Ok(Json(auth.sign_in(&body.email, &body.password)?))
}

pub(super) async fn refresh(
    State(auth): State<GuardedAuthManager>,
    body: JsonBody<RefreshBody>,
) -> ApiResult<Json<AuthSession>> {
    let Json(body) = body?;
    Ok(Json(auth.refresh(&body.refresh)?))
}

// ── Ownership ────────────────────────────────────────────────────────────

fn require_gallery_owner(
    store: &GuardedGalleryStore,
    gallery_id: &str,
    session: &Session,
) -> ApiResult<Gallery> {
    let gallery = store.get_gallery(gallery_id)?;
    if gallery.owner != session.user_id {
        debug!(
            "user_id={} is not the owner of gallery {}",
            session.user_id, gallery_id
        );
        return Err(ApiError::forbidden());
    }
    Ok(gallery)
}

/// Detached images have no owner, so nobody may change them.
fn require_image_owner(
    store: &GuardedGalleryStore,
    image_id: &str,
    session: &Session,
) -> ApiResult<GalleryImage> {
    let image = store.get_image(image_id)?;
    match image.gallery_id.as_deref() {
        Some(gallery_id) => {
            require_gallery_owner(store, gallery_id, session)?;
            Ok(image)
        }
        None => Err(ApiError::forbidden()),
    }
}

// ── Images ───────────────────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(super) struct CreateImageBody {
    pub value: Option<String>,
    /// Older clients send the data-URL as `base64`.
    pub base64: Option<String>,
    pub gallery_id: Option<String>,
}

pub(super) async fn post_image(
    State(store): State<GuardedGalleryStore>,
    body: JsonBody<CreateImageBody>,
) -> ApiResult<Response> {
    let Json(body) = body?;
    let value = body
        .value
        .or(body.base64)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::bad_request("An image value is required."))?;

    match body.gallery_id.as_deref() {
        None => {
            let image = store.create_image(&value, None)?;
            info!("Stored detached image {}", image.id);
            Ok(Json(json!({ "id": image.id })).into_response())
        }
        Some(gallery_id) => {
            let image = store.create_image(&encode::from_url_safe(&value), Some(gallery_id))?;
            info!("Stored image {} in gallery {}", image.id, gallery_id);
            Ok(Json(image).into_response())
        }
    }
}

pub(super) async fn get_image(
    State(store): State<GuardedGalleryStore>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let image = store.get_image(&id)?;
    let payload = match encode::split_data_url(&image.value) {
        Some((_mime, payload)) => payload,
        None => image.value.as_str(),
    };
    let bytes = encode::decode_payload(payload)?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/png".to_string()),
            (header::CONTENT_LENGTH, bytes.len().to_string()),
        ],
        Body::from(bytes),
    )
        .into_response())
}

#[derive(Deserialize, Debug)]
pub(super) struct UpdateImageBody {
    pub value: Option<String>,
    pub disabled: Option<bool>,
}

pub(super) async fn patch_image(
    session: Session,
    State(store): State<GuardedGalleryStore>,
    Path(id): Path<String>,
    body: JsonBody<UpdateImageBody>,
) -> ApiResult<Json<GalleryImage>> {
    require_image_owner(&store, &id, &session)?;
    let Json(body) = body?;
    let update = ImageUpdate {
        value: body.value.map(|v| encode::from_url_safe(&v)),
        disabled: body.disabled,
    };
    let image = store.update_image(&id, update)?;
    debug!("Updated image {} (disabled={})", image.id, image.disabled);
    Ok(Json(image))
}

pub(super) async fn delete_image(
    session: Session,
    State(store): State<GuardedGalleryStore>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    require_image_owner(&store, &id, &session)?;
    store.delete_image(&id)?;
    info!("Deleted image {}", id);
    Ok(StatusCode::NO_CONTENT)
}

// ── Galleries ────────────────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
pub(super) struct CreateGalleryBody {
    pub background: String,
}

pub(super) async fn post_gallery(
    session: Session,
    State(store): State<GuardedGalleryStore>,
    body: JsonBody<CreateGalleryBody>,
) -> ApiResult<Json<Gallery>> {
    let Json(body) = body?;
    if body.background.is_empty() {
        return Err(ApiError::bad_request("A background image is required."));
    }
    let gallery = store.create_gallery(&session.user_id, &body.background)?;
    info!("Created gallery {} for user_id={}", gallery.id, session.user_id);
    Ok(Json(gallery))
}

pub(super) async fn get_galleries(
    session: Session,
    State(store): State<GuardedGalleryStore>,
) -> ApiResult<Json<Vec<Gallery>>> {
    Ok(Json(store.list_galleries(&session.user_id)?))
}

pub(super) async fn get_gallery(
    session: Option<Session>,
    State(store): State<GuardedGalleryStore>,
    Path(id): Path<String>,
) -> ApiResult<Json<Gallery>> {
    let mut gallery = store.get_gallery(&id)?;
    let viewer = session.as_ref().map(|s| s.user_id.as_str());
    gallery.images = store.list_images(&id, viewer)?;
    Ok(Json(gallery))
}

pub(super) async fn delete_gallery(
    session: Session,
    State(store): State<GuardedGalleryStore>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    require_gallery_owner(&store, &id, &session)?;
    store.delete_gallery(&id)?;
    info!("Deleted gallery {}", id);
    Ok(StatusCode::NO_CONTENT)
}
