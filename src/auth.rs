use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::{Rng, distr::Alphanumeric};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    error::AppError,
    models::{Role, User},
    permissions::TrustLevel,
    repository::RepositoryState,
};

/// Length of the one-time code mailed at signup.
pub const CONFIRMATION_CODE_LENGTH: usize = 15;

/// Claims
///
/// The payload of an access token. Signed with HS256 using `AppConfig::jwt_secret`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the user's UUID.
    pub sub: Uuid,
    /// Expiration Time (exp), seconds since the epoch.
    pub exp: usize,
    /// Issued At (iat), seconds since the epoch.
    pub iat: usize,
}

/// issue_token
///
/// Signs an access token for `user_id` valid for `config.jwt_ttl_hours`.
pub fn issue_token(config: &AppConfig, user_id: Uuid) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id,
        iat: now.timestamp() as usize,
        exp: (now + Duration::hours(config.jwt_ttl_hours)).timestamp() as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
}

/// Verifies the signature and expiry of a bearer token.
pub fn decode_token(secret: &str, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::default();
    validation.validate_exp = true;
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
}

/// generate_confirmation_code
///
/// A fresh random alphanumeric code. Only its digest is ever stored.
pub fn generate_confirmation_code() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(CONFIRMATION_CODE_LENGTH)
        .map(char::from)
        .collect()
}

/// SHA-256 hex digest of a confirmation code.
pub fn hash_confirmation_code(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// confirmation_code_matches
///
/// True when `user` holds an unexpired code whose digest equals that of `code`.
/// Codes issued more than `ttl_mins` minutes before `now` are rejected.
pub fn confirmation_code_matches(
    user: &User,
    code: &str,
    ttl_mins: i64,
    now: DateTime<Utc>,
) -> bool {
    let (Some(stored), Some(issued_at)) = (&user.confirmation_code_hash, user.confirmation_sent_at)
    else {
        return false;
    };
    if now - issued_at > Duration::minutes(ttl_mins) {
        return false;
    }
    *stored == hash_confirmation_code(code)
}

/// AuthUser
///
/// The resolved identity of an authenticated request, loaded fresh from the store
/// so role changes take effect immediately.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
    pub is_superuser: bool,
    pub is_staff: bool,
}

impl From<User> for AuthUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            role: user.role,
            is_superuser: user.is_superuser,
            is_staff: user.is_staff,
        }
    }
}

/// Actor
///
/// Whoever issued the request. Requests without credentials are `Anonymous`
/// rather than rejected, so public reads work for everyone.
#[derive(Debug, Clone, PartialEq)]
pub enum Actor {
    Anonymous,
    User(AuthUser),
}

impl Actor {
    pub fn trust_level(&self) -> TrustLevel {
        TrustLevel::of(self)
    }

    pub fn user(&self) -> Option<&AuthUser> {
        match self {
            Actor::Anonymous => None,
            Actor::User(user) => Some(user),
        }
    }
}

/// Actor Extractor
///
/// 1. Local bypass: in `Env::Local` an `x-user-id` header naming an existing user
///    authenticates as that user.
/// 2. No `Authorization` header: `Actor::Anonymous`.
/// 3. Otherwise the header must carry a valid, unexpired bearer token for a user
///    that still exists, or the request is rejected with 401.
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        if config.env == Env::Local {
            let bypass_id = parts
                .headers
                .get("x-user-id")
                .and_then(|value| value.to_str().ok())
                .and_then(|id| Uuid::parse_str(id).ok());
            if let Some(user_id) = bypass_id {
                if let Some(user) = repo.get_user(user_id).await? {
                    return Ok(Actor::User(user.into()));
                }
            }
        }

        let Some(auth_header) = parts.headers.get(header::AUTHORIZATION) else {
            return Ok(Actor::Anonymous);
        };

        let token = auth_header
            .to_str()
            .ok()
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(AppError::Unauthorized("expected a bearer token"))?;

        let claims = decode_token(&config.jwt_secret, token).map_err(|e| {
            tracing::debug!(error = %e, "Rejected bearer token");
            AppError::Unauthorized("token is invalid or expired")
        })?;

        // A deleted account invalidates its outstanding tokens.
        let user = repo
            .get_user(claims.sub)
            .await?
            .ok_or(AppError::Unauthorized("user no longer exists"))?;

        Ok(Actor::User(user.into()))
    }
}

/// AuthUser Extractor
///
/// Requires an authenticated actor. Anonymous requests are refused with 403.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Actor::from_request_parts(parts, state).await? {
            Actor::User(user) => Ok(user),
            Actor::Anonymous => Err(AppError::Forbidden(
                "authentication credentials were not provided",
            )),
        }
    }
}
