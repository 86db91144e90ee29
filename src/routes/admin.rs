use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, patch, post},
};

/// Admin Router Module
///
/// Catalog writes and account management. Sits behind the authentication layer;
/// each handler then checks for admin trust (admin role, staff or superuser).
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // --- Catalog ---
        .route("/categories", post(handlers::create_category))
        .route("/categories/{slug}", delete(handlers::delete_category))
        .route("/genres", post(handlers::create_genre))
        .route("/genres/{slug}", delete(handlers::delete_genre))
        .route("/titles", post(handlers::create_title))
        .route(
            "/titles/{title_id}",
            patch(handlers::update_title).delete(handlers::delete_title),
        )
        // --- Users ---
        .route(
            "/users",
            get(handlers::list_users).post(handlers::create_user),
        )
        .route(
            "/users/{username}",
            get(handlers::get_user)
                .patch(handlers::update_user)
                .delete(handlers::delete_user),
        )
}
