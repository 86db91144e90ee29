use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::validation::{
    EMAIL_MAX_LENGTH, NAME_MAX_LENGTH, PROFILE_FIELD_MAX_LENGTH, SLUG_MAX_LENGTH,
    USERNAME_MAX_LENGTH, validate_slug, validate_username, validate_year,
};

// --- Roles ---

/// Role
///
/// The coarse trust level stored on every account. Superuser and staff status are
/// separate flags on `User`, so they are not represented here.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    #[default]
    User,
    Moderator,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "moderator" => Ok(Role::Moderator),
            "admin" => Ok(Role::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Lets `FromRow` decode the `users.role` text column straight into a `Role`.
impl TryFrom<String> for Role {
    type Error = UnknownRole;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// The account record from the `users` table. The confirmation code is stored only
/// as a SHA-256 digest together with the time it was issued.
#[derive(Debug, Clone, FromRow, Default)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub is_superuser: bool,
    pub is_staff: bool,
    pub confirmation_code_hash: Option<String>,
    pub confirmation_sent_at: Option<DateTime<Utc>>,
}

/// UserProfile
///
/// The public shape of an account, returned by `/users` and `/users/me`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct UserProfile {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    pub role: Role,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            bio: user.bio,
            role: user.role,
        }
    }
}

/// CatalogEntry
///
/// A named, slug-keyed catalog record. Categories and genres share this shape and
/// differ only in the table they live in (see `CatalogKind`).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct CatalogEntry {
    pub name: String,
    pub slug: String,
}

pub type Category = CatalogEntry;
pub type Genre = CatalogEntry;

/// CatalogKind
///
/// Selects which catalog table a category/genre operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogKind {
    Category,
    Genre,
}

impl CatalogKind {
    pub fn table(&self) -> &'static str {
        match self {
            CatalogKind::Category => "categories",
            CatalogKind::Genre => "genres",
        }
    }

    pub fn entity(&self) -> &'static str {
        match self {
            CatalogKind::Category => "category",
            CatalogKind::Genre => "genre",
        }
    }
}

/// Title
///
/// The central catalog entity, as returned to clients. `rating` is derived from the
/// title's reviews on every read and is never stored.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct Title {
    pub id: i64,
    pub name: String,
    pub year: i32,
    pub rating: Option<i32>,
    pub description: Option<String>,
    pub genre: Vec<Genre>,
    pub category: Option<Category>,
}

/// rating_from_scores
///
/// Mean of the scores rounded to the nearest integer, halves rounding up, or `None`
/// when there are no scores. Matches PostgreSQL's `ROUND(AVG(score))` for the 1..=10
/// score range.
pub fn rating_from_scores(scores: &[i16]) -> Option<i32> {
    if scores.is_empty() {
        return None;
    }
    let sum: i64 = scores.iter().map(|&s| i64::from(s)).sum();
    let count = scores.len() as i64;
    Some(((2 * sum + count) / (2 * count)) as i32)
}

/// Review
///
/// A user's scored review of a title. `author` is the author's username, loaded with
/// a JOIN; the raw ids are kept for permission checks but never serialized.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Review {
    pub id: i64,
    #[serde(skip)]
    #[ts(skip)]
    pub title_id: i64,
    #[serde(skip)]
    #[ts(skip)]
    pub author_id: Uuid,
    pub author: String,
    pub text: String,
    pub score: i16,
    pub pub_date: DateTime<Utc>,
}

/// Comment
///
/// A comment attached to a review, with the author's username joined in.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Comment {
    pub id: i64,
    #[serde(skip)]
    #[ts(skip)]
    pub review_id: i64,
    #[serde(skip)]
    #[ts(skip)]
    pub author_id: Uuid,
    pub author: String,
    pub text: String,
    pub pub_date: DateTime<Utc>,
}

/// Page
///
/// The envelope every list endpoint returns: the total number of matching rows and
/// the requested slice of them.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Page<T> {
    pub count: i64,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            count: self.count,
            results: self.results.into_iter().map(f).collect(),
        }
    }
}

// --- Request Payloads (Input Schemas) ---

/// SignupRequest
///
/// Input payload for `POST /auth/signup`. A confirmation code is mailed to `email`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct SignupRequest {
    #[validate(
        length(min = 1, max = USERNAME_MAX_LENGTH),
        custom(function = "validate_username")
    )]
    pub username: String,
    #[validate(email, length(max = EMAIL_MAX_LENGTH))]
    pub email: String,
}

/// TokenRequest
///
/// Input payload for `POST /auth/token`: exchanges a confirmation code for a JWT.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct TokenRequest {
    #[validate(length(min = 1, max = USERNAME_MAX_LENGTH))]
    pub username: String,
    #[validate(length(min = 1))]
    pub confirmation_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct TokenResponse {
    pub token: String,
}

/// CatalogEntryRequest
///
/// Input payload for creating a category or a genre.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct CatalogEntryRequest {
    #[validate(length(min = 1, max = NAME_MAX_LENGTH))]
    pub name: String,
    #[validate(
        length(min = 1, max = SLUG_MAX_LENGTH),
        custom(function = "validate_slug")
    )]
    pub slug: String,
}

/// CreateTitleRequest
///
/// Input payload for `POST /titles`. Genres and category are referenced by slug.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct CreateTitleRequest {
    #[validate(length(min = 1, max = NAME_MAX_LENGTH))]
    pub name: String,
    #[validate(custom(function = "validate_year"))]
    pub year: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub genre: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// UpdateTitleRequest
///
/// Partial update payload for `PATCH /titles/{id}`. Only provided fields change; a
/// provided `genre` list replaces the title's genres entirely.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct UpdateTitleRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = NAME_MAX_LENGTH))]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "validate_year"))]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct CreateReviewRequest {
    #[validate(length(min = 1))]
    pub text: String,
    #[validate(range(min = 1, max = 10))]
    pub score: i16,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct UpdateReviewRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1))]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, max = 10))]
    pub score: Option<i16>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct CreateCommentRequest {
    #[validate(length(min = 1))]
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct UpdateCommentRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1))]
    pub text: Option<String>,
}

/// CreateUserRequest
///
/// Admin payload for `POST /users`. The role defaults to `user`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct CreateUserRequest {
    #[validate(
        length(min = 1, max = USERNAME_MAX_LENGTH),
        custom(function = "validate_username")
    )]
    pub username: String,
    #[validate(email, length(max = EMAIL_MAX_LENGTH))]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = PROFILE_FIELD_MAX_LENGTH))]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = PROFILE_FIELD_MAX_LENGTH))]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

/// UpdateUserRequest
///
/// Partial update payload for `PATCH /users/{username}` and `PATCH /users/me`.
/// The self-service route drops `role` before it reaches the repository.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct UpdateUserRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(
        length(min = 1, max = USERNAME_MAX_LENGTH),
        custom(function = "validate_username")
    )]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(email, length(max = EMAIL_MAX_LENGTH))]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = PROFILE_FIELD_MAX_LENGTH))]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = PROFILE_FIELD_MAX_LENGTH))]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

// --- Query Parameters ---

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Pagination
///
/// A clamped limit/offset pair. Limits fall in `1..=MAX_PAGE_SIZE`, offsets are
/// never negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
}

impl Pagination {
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        Self {
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
            offset: offset.unwrap_or(0).max(0),
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageParams {
    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.limit, self.offset)
    }
}

/// SearchParams
///
/// Query parameters for the name-searchable lists (categories, genres, users).
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchParams {
    /// Case-insensitive substring match.
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl SearchParams {
    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.limit, self.offset)
    }
}

/// TitleFilter
///
/// Query parameters accepted by `GET /titles`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TitleFilter {
    /// Genre slug.
    pub genre: Option<String>,
    /// Category slug.
    pub category: Option<String>,
    /// Case-insensitive substring of the title name.
    pub name: Option<String>,
    pub year: Option<i32>,
    /// Case-insensitive substring of the description.
    pub description: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl TitleFilter {
    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.limit, self.offset)
    }
}
