use super::error::ApiError;
use super::state::ServerState;

use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::{header, request::Parts},
};
use tracing::debug;

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
}

fn extract_token_from_headers(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .filter(|v| !v.trim().is_empty())
}

fn extract_session(parts: &Parts, ctx: &ServerState) -> Result<Option<Session>, ApiError> {
    let token = match extract_token_from_headers(parts) {
        None => {
            debug!("No authorization header.");
            return Ok(None);
        }
        Some(token) => token,
    };

    let user_id = ctx.auth.verify_access(&token)?;
    debug!("Resolved session for user_id={}", user_id);
    Ok(Some(Session { user_id }))
}

/// Required session: a missing or invalid token is a 401.
impl FromRequestParts<ServerState> for Session {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        extract_session(parts, ctx)?.ok_or_else(ApiError::unauthorized)
    }
}

/// Optional session: an anonymous or stale caller is treated as a visitor.
impl OptionalFromRequestParts<ServerState> for Session {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &ServerState,
    ) -> Result<Option<Self>, Self::Rejection> {
        match extract_session(parts, ctx) {
            Ok(session) => Ok(session),
            Err(e) => {
                debug!("Ignoring invalid token on optional session: {}", e.message);
                Ok(None)
            }
        }
    }
}
