/// Router Module Index
///
/// Splits the API by who may reach it. `create_router` puts an authentication
/// layer in front of the `authenticated` and `admin` groups; finer checks
/// (author, moderator, admin) run in the handlers through `permissions`.
///
/// No group registers `PUT`, so any `PUT` is answered with 405.

/// Reads and the signup/token exchange. Open to anonymous callers.
pub mod public;

/// Review and comment writes, and the caller's own profile.
pub mod authenticated;

/// Catalog writes and account management.
pub mod admin;
