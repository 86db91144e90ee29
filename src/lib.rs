use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
    routing::get,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod mailer;
pub mod models;
pub mod permissions;
pub mod repository;
pub mod validation;

// Routing split by access group (public, authenticated, admin).
pub mod routes;
use auth::AuthUser;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use mailer::{LogMailer, MailerState, MockMailer, SmtpMailer};
pub use repository::{PostgresRepository, RepositoryState};

/// Every API route lives under this prefix.
pub const API_PREFIX: &str = "/api/v1";

/// ApiDoc
///
/// The OpenAPI document, served at `/api-docs/openapi.json` and browsable through
/// Swagger UI.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::signup, handlers::obtain_token,
        handlers::list_categories, handlers::create_category, handlers::delete_category,
        handlers::list_genres, handlers::create_genre, handlers::delete_genre,
        handlers::list_titles, handlers::get_title, handlers::create_title,
        handlers::update_title, handlers::delete_title,
        handlers::list_reviews, handlers::get_review, handlers::create_review,
        handlers::update_review, handlers::delete_review,
        handlers::list_comments, handlers::get_comment, handlers::create_comment,
        handlers::update_comment, handlers::delete_comment,
        handlers::get_me, handlers::update_me,
        handlers::list_users, handlers::create_user, handlers::get_user,
        handlers::update_user, handlers::delete_user,
    ),
    components(
        schemas(
            models::Role, models::UserProfile, models::CatalogEntry, models::Title,
            models::Review, models::Comment, models::SignupRequest, models::TokenRequest,
            models::TokenResponse, models::CatalogEntryRequest, models::CreateTitleRequest,
            models::UpdateTitleRequest, models::CreateReviewRequest, models::UpdateReviewRequest,
            models::CreateCommentRequest, models::UpdateCommentRequest,
            models::CreateUserRequest, models::UpdateUserRequest,
        )
    ),
    tags(
        (name = "yamdb", description = "YaMDb reviews API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The shared, cloneable container of every service a handler may need.
#[derive(Clone)]
pub struct AppState {
    /// Persistence, behind the `Repository` trait.
    pub repo: RepositoryState,
    /// Confirmation-code delivery, behind the `Mailer` trait.
    pub mailer: MailerState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for MailerState {
    fn from_ref(app_state: &AppState) -> MailerState {
        app_state.mailer.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Guards the authenticated and admin groups. Extracting `AuthUser` rejects
/// anonymous callers with 403 and bad tokens with 401 before the handler runs.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the route groups under `/api/v1`, the docs and health endpoints,
/// and the observability layers.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let api = Router::new()
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .merge(
            admin::admin_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        );

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // GET /health
        // Liveness probe; touches nothing.
        .route("/health", get(|| async { "ok" }))
        .nest(API_PREFIX, api)
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Opens the per-request span, tagged with the `x-request-id` set by the layer
/// above so every log line of a request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
