//! Accounts and bearer tokens for the reference server.
//!
//! Passwords are stored as Argon2 PHC strings. Sessions are a pair of HS256
//! JWTs `{ sub, exp }`: a short-lived access token for `authorization:
//! Bearer ...` and a long-lived refresh token, each signed with its own
//! secret so one can never be replayed as the other.

use crate::config::ServerConfig;
use crate::error::{AuthError, StoreError};
use crate::model::{AuthSession, User};
use crate::store::GuardedGalleryStore;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

mod gallery_argon2 {
    use argon2::{
        password_hash::{
            rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
        },
        Argon2,
    };

    pub fn hash(plain: &[u8]) -> Result<String, String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(plain, &salt)
            .map(|h| h.to_string())
            .map_err(|err| err.to_string())
    }

    pub fn verify(plain: &[u8], target_hash: &str) -> bool {
        match PasswordHash::new(target_hash) {
            Ok(parsed) => Argon2::default().verify_password(plain, &parsed).is_ok(),
            Err(_) => false,
        }
    }
}

/// Hash a password into a PHC string.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    gallery_argon2::hash(password.as_bytes()).map_err(AuthError::Hashing)
}

/// Check a password against a stored PHC string. A malformed hash never
/// verifies.
pub fn verify_password(password: &str, hash: &str) -> bool {
    gallery_argon2::verify(password.as_bytes(), hash)
}

/// Strip an optional `Bearer` prefix from an authorization value.
///
/// A bare `Bearer` with nothing after it unpacks to an empty token.
pub fn unpack_token(value: &str) -> &str {
    let value = value.trim_start();
    let rest = value
        .strip_prefix("Bearer")
        .or_else(|| value.strip_prefix("bearer"));
    match rest {
        Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => rest.trim(),
        _ => value.trim(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    /// Expiry, seconds since the Unix epoch.
    pub exp: u64,
}

#[derive(Clone)]
struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: u64,
}

impl TokenKeys {
    fn new(secret: &str, ttl_secs: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs,
        }
    }

    fn sign(&self, user_id: &str) -> Result<String, AuthError> {
        let claims = Claims {
            sub: user_id.to_string(),
            exp: Utc::now().timestamp().max(0) as u64 + self.ttl_secs,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }

    fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }
}

/// Signs users up and in, and issues and checks their tokens.
#[derive(Clone)]
pub struct AuthManager {
    store: GuardedGalleryStore,
    access: TokenKeys,
    refresh: TokenKeys,
}

impl AuthManager {
    pub fn new(config: &ServerConfig, store: GuardedGalleryStore) -> Self {
        Self {
            store,
            access: TokenKeys::new(&config.access_secret, config.access_ttl_secs),
            refresh: TokenKeys::new(&config.refresh_secret, config.refresh_ttl_secs),
        }
    }

    fn issue(&self, user: &User) -> Result<AuthSession, AuthError> {
        Ok(AuthSession {
            id: user.id.clone(),
            email: user.email.clone(),
            token: self.access.sign(&user.id)?,
            expires: format!("{}s", self.access.ttl_secs),
            refresh: self.refresh.sign(&user.id)?,
        })
    }

    pub fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(AuthError::InvalidInput("a valid email is required".into()));
        }
        if password.is_empty() {
            return Err(AuthError::InvalidInput("a password is required".into()));
        }

        let hash = hash_password(password)?;
        let user = self.store.create_user(email, &hash)?;
        info!("Signed up user {}", user.id);
        self.issue(&user)
    }

    pub fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let user = self
            .store
            .find_user_by_email(email.trim())?
            .ok_or(AuthError::BadCredentials)?;
        if !verify_password(password, &user.password_hash) {
            debug!("Wrong password for user {}", user.id);
            return Err(AuthError::BadCredentials);
        }
        info!("Signed in user {}", user.id);
        self.issue(&user)
    }

    /// Exchange a refresh token for a fresh session.
    pub fn refresh(&self, refresh_token: &str) -> Result<AuthSession, AuthError> {
        let claims = self.refresh.verify(unpack_token(refresh_token))?;
        let user = self
            .store
            .get_user(&claims.sub)
            .map_err(|e| match e {
                StoreError::NotFound { .. } => AuthError::InvalidToken("unknown user".into()),
                other => AuthError::Store(other),
            })?;
        self.issue(&user)
    }

    /// Verify an access token and return the user id it was issued to.
    pub fn verify_access(&self, token: &str) -> Result<String, AuthError> {
        let token = unpack_token(token);
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        Ok(self.access.verify(token)?.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryGalleryStore;
    use std::sync::Arc;

    fn manager() -> AuthManager {
        let config = ServerConfig::new("access-secret", "refresh-secret").unwrap();
        AuthManager::new(&config, Arc::new(InMemoryGalleryStore::new()))
    }

    #[test]
    fn argon2_hash_verifies() {
        let hash = hash_password("123mypw").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("123mypw", &hash));
        assert!(!verify_password("not the pw", &hash));
        assert!(!verify_password("123mypw", "garbage"));
    }

    #[test]
    fn sign_up_then_sign_in() {
        let auth = manager();
        let up = auth.sign_up("ann@example.com", "pw").unwrap();
        assert_eq!(up.expires, "10800s");
        assert_eq!(auth.verify_access(&up.token).unwrap(), up.id);

        let session = auth.sign_in("ann@example.com", "pw").unwrap();
        assert_eq!(session.id, up.id);
    }

    #[test]
    fn bad_credentials_do_not_say_which() {
        let auth = manager();
        auth.sign_up("ann@example.com", "pw").unwrap();
        let wrong_pw = auth.sign_in("ann@example.com", "nope").unwrap_err();
        let wrong_user = auth.sign_in("bob@example.com", "pw").unwrap_err();
        assert_eq!(wrong_pw.to_string(), wrong_user.to_string());
    }

    #[test]
    fn duplicate_sign_up_conflicts() {
        let auth = manager();
        auth.sign_up("ann@example.com", "pw").unwrap();
        let err = auth.sign_up("ann@example.com", "pw2").unwrap_err();
        assert!(matches!(err, AuthError::Store(StoreError::Conflict(_))));
    }

    #[test]
    fn tokens_are_not_interchangeable() {
        let auth = manager();
        let s = auth.sign_up("ann@example.com", "pw").unwrap();
        assert!(auth.verify_access(&s.refresh).is_err());
        assert!(auth.refresh(&s.token).is_err());

        let renewed = auth.refresh(&s.refresh).unwrap();
        assert_eq!(renewed.id, s.id);
    }

    #[test]
    fn bearer_prefix_is_optional() {
        let auth = manager();
        let s = auth.sign_up("ann@example.com", "pw").unwrap();
        let with_prefix = format!("Bearer {}", s.token);
        assert_eq!(auth.verify_access(&with_prefix).unwrap(), s.id);
        assert!(matches!(auth.verify_access("Bearer "), Err(AuthError::MissingToken)));
        assert!(matches!(auth.verify_access("  bearer"), Err(AuthError::MissingToken)));
    }

    #[test]
    fn unpack_token_only_strips_a_whole_scheme_word() {
        assert_eq!(unpack_token("Bearer abc"), "abc");
        assert_eq!(unpack_token("  bearer   abc  "), "abc");
        assert_eq!(unpack_token("Bearer "), "");
        assert_eq!(unpack_token("abc"), "abc");
        assert_eq!(unpack_token("Bearerabc"), "Bearerabc");
    }

    #[test]
    fn expired_token_is_rejected() {
        let keys = TokenKeys::new("access-secret", 0);
        let claims = Claims {
            sub: "u1".into(),
            exp: (Utc::now().timestamp() - 10) as u64,
        };
        let token =
            jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding).unwrap();
        assert!(manager().verify_access(&token).is_err());
    }
}
