use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints any client may call, with or without a token. Everything here is a
/// read, apart from the two registration steps.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // POST /auth/signup
        // Creates (or reuses) the account and mails a confirmation code.
        .route("/auth/signup", post(handlers::signup))
        // POST /auth/token
        // Trades username + confirmation code for an access token.
        .route("/auth/token", post(handlers::obtain_token))
        // --- Catalog ---
        .route("/categories", get(handlers::list_categories))
        .route("/genres", get(handlers::list_genres))
        // GET /titles?genre=&category=&name=&year=&description=
        .route("/titles", get(handlers::list_titles))
        .route("/titles/{title_id}", get(handlers::get_title))
        // --- Publications ---
        .route("/titles/{title_id}/reviews", get(handlers::list_reviews))
        .route(
            "/titles/{title_id}/reviews/{review_id}",
            get(handlers::get_review),
        )
        .route(
            "/titles/{title_id}/reviews/{review_id}/comments",
            get(handlers::list_comments),
        )
        .route(
            "/titles/{title_id}/reviews/{review_id}/comments/{comment_id}",
            get(handlers::get_comment),
        )
}
