use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, patch, post},
};

/// Authenticated Router Module
///
/// Routes for any signed-in user. The layer above rejects anonymous callers; the
/// update and delete handlers additionally require the caller to be the author,
/// a moderator or an admin.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET/PATCH /users/me
        // The caller's own profile. `role` cannot be changed here.
        .route("/users/me", get(handlers::get_me).patch(handlers::update_me))
        // --- Reviews ---
        // POST /titles/{title_id}/reviews
        // One review per user per title; a second attempt is a 400.
        .route("/titles/{title_id}/reviews", post(handlers::create_review))
        .route(
            "/titles/{title_id}/reviews/{review_id}",
            patch(handlers::update_review).delete(handlers::delete_review),
        )
        // --- Comments ---
        .route(
            "/titles/{title_id}/reviews/{review_id}/comments",
            post(handlers::create_comment),
        )
        .route(
            "/titles/{title_id}/reviews/{review_id}/comments/{comment_id}",
            patch(handlers::update_comment).delete(handlers::delete_comment),
        )
}
