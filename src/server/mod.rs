//! Reference gallery API server (axum).
//!
//! Implements the REST contract the upload client speaks:
//!
//! | Route                  | Method | Auth        |
//! |------------------------|--------|-------------|
//! | `/api/signup`          | POST   | none        |
//! | `/api/signin`          | POST   | none        |
//! | `/api/refresh`         | POST   | none        |
//! | `/api/image`           | POST   | none        |
//! | `/api/image/{id}`      | GET    | none        |
//! | `/api/image/{id}`      | PATCH  | owner       |
//! | `/api/image/{id}`      | DELETE | owner       |
//! | `/api/gallery`         | POST   | signed in   |
//! | `/api/gallery`         | GET    | signed in   |
//! | `/api/gallery/{id}`    | GET    | optional    |
//! | `/api/gallery/{id}`    | DELETE | owner       |
//!
//! Owner-gated routes extract a [`Session`] before touching the body, so a
//! request without a valid token is rejected with 401 before any mutation;
//! a valid token that does not own the gallery gets 403.

mod error;
mod routes;
mod session;
mod state;

pub use error::ApiError;
pub use session::Session;
pub use state::{GuardedAuthManager, ServerState};

use crate::config::ServerConfig;
use crate::error::IngestError;
use crate::store::GuardedGalleryStore;
use axum::{
    extract::{DefaultBodyLimit, Request},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::info;

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();
    let response = next.run(request).await;
    info!(
        "{} {} → {} in {:?}",
        method,
        path,
        response.status().as_u16(),
        start.elapsed()
    );
    response
}

/// Build the API router for `state`.
pub fn make_app(state: ServerState) -> Router {
    let max_body = state.config.max_body_bytes;

    let auth_routes = Router::new()
        .route("/signup", post(routes::sign_up))
        .route("/signin", post(routes::sign_in))
        .route("/refresh", post(routes::refresh));

    let image_routes = Router::new()
        .route("/image", post(routes::post_image))
        .route(
            "/image/{id}",
            get(routes::get_image)
                .patch(routes::patch_image)
                .delete(routes::delete_image),
        );

    let gallery_routes = Router::new()
        .route(
            "/gallery",
            post(routes::post_gallery).get(routes::get_galleries),
        )
        .route(
            "/gallery/{id}",
            get(routes::get_gallery).delete(routes::delete_gallery),
        );

    let api = Router::new()
        .merge(auth_routes)
        .merge(image_routes)
        .merge(gallery_routes);

    Router::new()
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(max_body))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

/// Serve the API on an already bound listener until the task is dropped.
pub async fn serve(listener: TcpListener, state: ServerState) -> Result<(), IngestError> {
    let app = make_app(state);
    axum::serve(listener, app)
        .await
        .map_err(|e| IngestError::Internal(format!("server failed: {}", e)))
}

/// Bind `config.bind` and serve the API with `store`.
pub async fn run_server(
    config: ServerConfig,
    store: GuardedGalleryStore,
) -> Result<(), IngestError> {
    let listener = TcpListener::bind(config.bind)
        .await
        .map_err(|e| IngestError::InvalidConfig(format!("cannot bind {}: {}", config.bind, e)))?;
    let addr = listener
        .local_addr()
        .map_err(|e| IngestError::Internal(e.to_string()))?;
    info!("Gallery API listening on http://{}", addr);

    serve(listener, ServerState::new(config, store)).await
}
