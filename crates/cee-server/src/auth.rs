//! Bearer-token authentication (HS256 JWT).
//!
//! Tokens carry `sub` (user id), `role`, `iss`, `iat`, and `exp`. A missing or
//! invalid token never rejects the request here: the caller becomes
//! [`Caller::Anonymous`] and the orchestrator denies and audits it like any
//! other refused dispatch.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use cee_core::{Caller, Principal};
use cee_settings::AuthSettings;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::server::AppState;

/// JWT claims.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    /// Role name.
    pub role: String,
    /// Issuer.
    pub iss: String,
    /// Issued-at, seconds since the epoch.
    pub iat: u64,
    /// Expiry, seconds since the epoch.
    pub exp: u64,
}

/// Token errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Signing or verification failed.
    #[error("token error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    /// The secret is empty.
    #[error("JWT secret must not be empty")]
    EmptySecret,
}

/// Mints and verifies bearer tokens with one shared secret.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    issuer: String,
    ttl_secs: u64,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("issuer", &self.issuer)
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    /// Build from a secret and the auth settings.
    pub fn new(secret: &str, settings: &AuthSettings) -> Result<Self, AuthError> {
        if secret.is_empty() {
            return Err(AuthError::EmptySecret);
        }
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[settings.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);
        validation.leeway = settings.leeway_secs;
        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            issuer: settings.issuer.clone(),
            ttl_secs: settings.token_ttl_secs,
        })
    }

    /// Build from settings, if a secret is configured.
    pub fn from_settings(settings: &AuthSettings) -> Result<Option<Self>, AuthError> {
        settings
            .jwt_secret
            .as_deref()
            .map(|secret| Self::new(secret, settings))
            .transpose()
    }

    /// Sign a token for `user_id` with `role`.
    pub fn mint(&self, user_id: &str, role: &str) -> Result<String, AuthError> {
        let now = Utc::now().timestamp().max(0) as u64;
        let claims = Claims {
            sub: user_id.to_string(),
            role: role.to_string(),
            iss: self.issuer.clone(),
            iat: now,
            exp: now + self.ttl_secs,
        };
        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding,
        )?)
    }

    /// Verify a token and extract its principal.
    pub fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)?;
        Ok(Principal::new(data.claims.sub, data.claims.role))
    }

    /// Resolve an `Authorization` header value to a caller.
    pub fn caller_from_header(&self, header: Option<&str>) -> Caller {
        let Some(value) = header else {
            return Caller::Anonymous;
        };
        let Some(token) = value
            .strip_prefix("Bearer ")
            .or_else(|| value.strip_prefix("bearer "))
        else {
            debug!("non-bearer authorization header ignored");
            return Caller::Anonymous;
        };
        match self.verify(token.trim()) {
            Ok(principal) => Caller::Authenticated(principal),
            Err(error) => {
                warn!(%error, "rejected bearer token");
                Caller::Anonymous
            }
        }
    }
}

/// The request's caller, resolved from its bearer token.
#[derive(Clone, Debug)]
pub struct CallerIdentity(pub Caller);

impl FromRequestParts<AppState> for CallerIdentity {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        let caller = match &state.tokens {
            Some(tokens) => tokens.caller_from_header(header),
            None => Caller::Anonymous,
        };
        Ok(Self(caller))
    }
}
