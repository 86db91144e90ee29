use std::borrow::Cow;
use std::sync::LazyLock;

use chrono::{Datelike, Utc};
use regex::Regex;
use validator::ValidationError;

// --- Field Limits ---

pub const USERNAME_MAX_LENGTH: u64 = 150;
pub const EMAIL_MAX_LENGTH: u64 = 254;
pub const NAME_MAX_LENGTH: u64 = 256;
pub const SLUG_MAX_LENGTH: u64 = 50;
pub const PROFILE_FIELD_MAX_LENGTH: u64 = 150;

/// The username the `/users/me` route is keyed on. No account may claim it.
pub const RESERVED_USERNAME: &str = "me";

static USERNAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w.@+-]+$").expect("username pattern is valid"));

static SLUG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-a-zA-Z0-9_]+$").expect("slug pattern is valid"));

fn error(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(Cow::Borrowed(message));
    err
}

/// validate_username
///
/// Letters, digits and `.@+-_` only, and never the reserved `me`.
pub fn validate_username(value: &str) -> Result<(), ValidationError> {
    if value.eq_ignore_ascii_case(RESERVED_USERNAME) {
        return Err(error("reserved", "the username 'me' is reserved"));
    }
    if !USERNAME_PATTERN.is_match(value) {
        return Err(error(
            "pattern",
            "username may contain only letters, digits and @/./+/-/_",
        ));
    }
    Ok(())
}

pub fn validate_slug(value: &str) -> Result<(), ValidationError> {
    if SLUG_PATTERN.is_match(value) {
        Ok(())
    } else {
        Err(error(
            "pattern",
            "slug may contain only latin letters, digits, hyphens and underscores",
        ))
    }
}

/// validate_year
///
/// A title cannot be released after the current calendar year (UTC).
pub fn validate_year(value: i32) -> Result<(), ValidationError> {
    if value > Utc::now().year() {
        return Err(error("future_year", "year cannot be later than the current year"));
    }
    Ok(())
}
