use axum::{
    Json,
    extract::{FromRequest, Path, Query, Request, State, rejection::JsonRejection},
    http::StatusCode,
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::{
    AppState,
    auth::{self, Actor, AuthUser},
    error::{AppError, AppResult},
    models::{
        CatalogEntry, CatalogEntryRequest, CatalogKind, Comment, CreateCommentRequest,
        CreateReviewRequest, CreateTitleRequest, CreateUserRequest, Page, PageParams, Review,
        SearchParams, SignupRequest, Title, TitleFilter, TokenRequest, TokenResponse,
        UpdateCommentRequest, UpdateReviewRequest, UpdateTitleRequest, UpdateUserRequest,
        UserProfile,
    },
    permissions::{
        can_create_publication, can_manage_catalog, can_manage_users, can_modify_publication,
        can_read, ensure,
    },
    repository::NewUser,
};

// --- Extractors ---

/// ValidatedJson
///
/// Like `Json<T>`, but also runs the payload's `validator` rules. Malformed JSON
/// and rule violations both become a 400 `AppError`.
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(ValidatedJson(value))
    }
}

// --- Auth ---

/// signup
///
/// [Public Route] Registers an account (or reuses the one matching both username
/// and email) and mails it a fresh confirmation code. Any previous code stops
/// working.
#[utoipa::path(
    post,
    path = "/api/v1/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 200, description = "Confirmation code sent", body = SignupRequest),
        (status = 400, description = "Invalid payload or username/email taken")
    )
)]
pub async fn signup(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<SignupRequest>,
) -> AppResult<Json<SignupRequest>> {
    let by_username = state.repo.find_user_by_username(&payload.username).await?;
    let by_email = state.repo.find_user_by_email(&payload.email).await?;

    let user = match (by_username, by_email) {
        (Some(existing), Some(same)) if existing.id == same.id => existing,
        (Some(_), _) => {
            return Err(AppError::field(
                "username",
                "a user with this username is registered with another email",
            ));
        }
        (None, Some(_)) => {
            return Err(AppError::field(
                "email",
                "a user with this email already exists",
            ));
        }
        (None, None) => {
            state
                .repo
                .create_user(NewUser {
                    username: payload.username.clone(),
                    email: payload.email.clone(),
                    ..Default::default()
                })
                .await?
        }
    };

    let code = auth::generate_confirmation_code();
    state
        .repo
        .set_confirmation_code(
            user.id,
            Some(auth::hash_confirmation_code(&code)),
            Some(Utc::now()),
        )
        .await?;
    state
        .mailer
        .send_confirmation_code(&user.email, &user.username, &code)
        .await?;

    tracing::info!(username = %user.username, "Confirmation code issued");
    Ok(Json(payload))
}

/// obtain_token
///
/// [Public Route] Exchanges a username and its confirmation code for an access
/// token. A code works once.
#[utoipa::path(
    post,
    path = "/api/v1/auth/token",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Access token", body = TokenResponse),
        (status = 400, description = "Wrong or expired confirmation code"),
        (status = 404, description = "Unknown username")
    )
)]
pub async fn obtain_token(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<TokenRequest>,
) -> AppResult<Json<TokenResponse>> {
    let user = state
        .repo
        .find_user_by_username(&payload.username)
        .await?
        .ok_or(AppError::NotFound("user"))?;

    let ttl_mins = state.config.confirmation_ttl_mins;
    let code_error = || AppError::field("confirmation_code", "invalid or expired confirmation code");

    if !auth::confirmation_code_matches(&user, &payload.confirmation_code, ttl_mins, Utc::now()) {
        return Err(code_error());
    }

    // A concurrent exchange of the same code may have won since the read above.
    let code_hash = auth::hash_confirmation_code(&payload.confirmation_code);
    if !state
        .repo
        .consume_confirmation_code(user.id, &code_hash, ttl_mins)
        .await?
    {
        return Err(code_error());
    }

    let token = auth::issue_token(&state.config, user.id)?;

    tracing::info!(username = %user.username, "Access token issued");
    Ok(Json(TokenResponse { token }))
}

// --- Catalog: Categories & Genres ---

async fn list_catalog(
    state: &AppState,
    actor: &Actor,
    kind: CatalogKind,
    params: SearchParams,
) -> AppResult<Json<Page<CatalogEntry>>> {
    ensure(can_read(actor))?;
    let page = params.pagination();
    let entries = state.repo.list_catalog(kind, params.search, page).await?;
    Ok(Json(entries))
}

async fn create_catalog_entry(
    state: &AppState,
    actor: &Actor,
    kind: CatalogKind,
    payload: CatalogEntryRequest,
) -> AppResult<(StatusCode, Json<CatalogEntry>)> {
    ensure(can_manage_catalog(actor))?;
    let entry = state.repo.create_catalog_entry(kind, payload).await?;
    tracing::info!(kind = kind.entity(), slug = %entry.slug, "Catalog entry created");
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn delete_catalog_entry(
    state: &AppState,
    actor: &Actor,
    kind: CatalogKind,
    slug: &str,
) -> AppResult<StatusCode> {
    ensure(can_manage_catalog(actor))?;
    if state.repo.delete_catalog_entry(kind, slug).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(kind.entity()))
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/categories",
    params(SearchParams),
    responses((status = 200, description = "Categories", body = Page<CatalogEntry>))
)]
pub async fn list_categories(
    actor: Actor,
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> AppResult<Json<Page<CatalogEntry>>> {
    list_catalog(&state, &actor, CatalogKind::Category, params).await
}

/// create_category
///
/// [Admin Route] Adds a category. Slugs are unique.
#[utoipa::path(
    post,
    path = "/api/v1/categories",
    request_body = CatalogEntryRequest,
    responses(
        (status = 201, description = "Created", body = CatalogEntry),
        (status = 400, description = "Invalid payload or duplicate slug"),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn create_category(
    actor: Actor,
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<CatalogEntryRequest>,
) -> AppResult<(StatusCode, Json<CatalogEntry>)> {
    create_catalog_entry(&state, &actor, CatalogKind::Category, payload).await
}

/// delete_category
///
/// [Admin Route] Titles in the category remain, without a category.
#[utoipa::path(
    delete,
    path = "/api/v1/categories/{slug}",
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_category(
    actor: Actor,
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<StatusCode> {
    delete_catalog_entry(&state, &actor, CatalogKind::Category, &slug).await
}

#[utoipa::path(
    get,
    path = "/api/v1/genres",
    params(SearchParams),
    responses((status = 200, description = "Genres", body = Page<CatalogEntry>))
)]
pub async fn list_genres(
    actor: Actor,
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> AppResult<Json<Page<CatalogEntry>>> {
    list_catalog(&state, &actor, CatalogKind::Genre, params).await
}

#[utoipa::path(
    post,
    path = "/api/v1/genres",
    request_body = CatalogEntryRequest,
    responses(
        (status = 201, description = "Created", body = CatalogEntry),
        (status = 400, description = "Invalid payload or duplicate slug"),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn create_genre(
    actor: Actor,
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<CatalogEntryRequest>,
) -> AppResult<(StatusCode, Json<CatalogEntry>)> {
    create_catalog_entry(&state, &actor, CatalogKind::Genre, payload).await
}

#[utoipa::path(
    delete,
    path = "/api/v1/genres/{slug}",
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_genre(
    actor: Actor,
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<StatusCode> {
    delete_catalog_entry(&state, &actor, CatalogKind::Genre, &slug).await
}

// --- Titles ---

/// list_titles
///
/// [Public Route] Paginated titles with their derived rating. Filters by genre or
/// category slug, name or description substring, and exact year.
#[utoipa::path(
    get,
    path = "/api/v1/titles",
    params(TitleFilter),
    responses((status = 200, description = "Titles", body = Page<Title>))
)]
pub async fn list_titles(
    actor: Actor,
    State(state): State<AppState>,
    Query(filter): Query<TitleFilter>,
) -> AppResult<Json<Page<Title>>> {
    ensure(can_read(&actor))?;
    let titles = state.repo.list_titles(&filter, filter.pagination()).await?;
    Ok(Json(titles))
}

#[utoipa::path(
    get,
    path = "/api/v1/titles/{title_id}",
    responses(
        (status = 200, description = "Title", body = Title),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_title(
    actor: Actor,
    State(state): State<AppState>,
    Path(title_id): Path<i64>,
) -> AppResult<Json<Title>> {
    ensure(can_read(&actor))?;
    let title = state
        .repo
        .get_title(title_id)
        .await?
        .ok_or(AppError::NotFound("title"))?;
    Ok(Json(title))
}

/// create_title
///
/// [Admin Route] Genres and category are given by slug and must already exist.
#[utoipa::path(
    post,
    path = "/api/v1/titles",
    request_body = CreateTitleRequest,
    responses(
        (status = 201, description = "Created", body = Title),
        (status = 400, description = "Invalid payload or unknown genre/category"),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn create_title(
    actor: Actor,
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<CreateTitleRequest>,
) -> AppResult<(StatusCode, Json<Title>)> {
    ensure(can_manage_catalog(&actor))?;
    let title = state.repo.create_title(payload).await?;
    tracing::info!(title_id = title.id, "Title created");
    Ok((StatusCode::CREATED, Json(title)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/titles/{title_id}",
    request_body = UpdateTitleRequest,
    responses(
        (status = 200, description = "Updated", body = Title),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_title(
    actor: Actor,
    State(state): State<AppState>,
    Path(title_id): Path<i64>,
    ValidatedJson(payload): ValidatedJson<UpdateTitleRequest>,
) -> AppResult<Json<Title>> {
    ensure(can_manage_catalog(&actor))?;
    let title = state
        .repo
        .update_title(title_id, payload)
        .await?
        .ok_or(AppError::NotFound("title"))?;
    Ok(Json(title))
}

/// delete_title
///
/// [Admin Route] Removes the title together with its reviews and their comments.
#[utoipa::path(
    delete,
    path = "/api/v1/titles/{title_id}",
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_title(
    actor: Actor,
    State(state): State<AppState>,
    Path(title_id): Path<i64>,
) -> AppResult<StatusCode> {
    ensure(can_manage_catalog(&actor))?;
    if state.repo.delete_title(title_id).await? {
        tracing::info!(title_id, "Title deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("title"))
    }
}

// --- Reviews ---

async fn require_title(state: &AppState, title_id: i64) -> AppResult<()> {
    state
        .repo
        .get_title(title_id)
        .await?
        .map(|_| ())
        .ok_or(AppError::NotFound("title"))
}

async fn require_review(state: &AppState, title_id: i64, review_id: i64) -> AppResult<Review> {
    state
        .repo
        .get_review(title_id, review_id)
        .await?
        .ok_or(AppError::NotFound("review"))
}

#[utoipa::path(
    get,
    path = "/api/v1/titles/{title_id}/reviews",
    params(PageParams),
    responses(
        (status = 200, description = "Reviews", body = Page<Review>),
        (status = 404, description = "Title Not Found")
    )
)]
pub async fn list_reviews(
    actor: Actor,
    State(state): State<AppState>,
    Path(title_id): Path<i64>,
    Query(params): Query<PageParams>,
) -> AppResult<Json<Page<Review>>> {
    ensure(can_read(&actor))?;
    require_title(&state, title_id).await?;
    let reviews = state
        .repo
        .list_reviews(title_id, params.pagination())
        .await?;
    Ok(Json(reviews))
}

#[utoipa::path(
    get,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}",
    responses(
        (status = 200, description = "Review", body = Review),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_review(
    actor: Actor,
    State(state): State<AppState>,
    Path((title_id, review_id)): Path<(i64, i64)>,
) -> AppResult<Json<Review>> {
    ensure(can_read(&actor))?;
    Ok(Json(require_review(&state, title_id, review_id).await?))
}

/// create_review
///
/// [Authenticated Route] The author and title come from the request, never the
/// body. A second review of the same title by the same author is a 400 on `title`.
#[utoipa::path(
    post,
    path = "/api/v1/titles/{title_id}/reviews",
    request_body = CreateReviewRequest,
    responses(
        (status = 201, description = "Created", body = Review),
        (status = 400, description = "Invalid payload or already reviewed"),
        (status = 404, description = "Title Not Found")
    )
)]
pub async fn create_review(
    actor: Actor,
    State(state): State<AppState>,
    Path(title_id): Path<i64>,
    ValidatedJson(payload): ValidatedJson<CreateReviewRequest>,
) -> AppResult<(StatusCode, Json<Review>)> {
    ensure(can_create_publication(&actor))?;
    let Some(author) = actor.user() else {
        return Err(AppError::Forbidden("authentication credentials were not provided"));
    };
    require_title(&state, title_id).await?;

    let review = state
        .repo
        .create_review(title_id, author.id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(review)))
}

/// update_review
///
/// [Authenticated Route] Author, moderator or admin only.
#[utoipa::path(
    patch,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}",
    request_body = UpdateReviewRequest,
    responses(
        (status = 200, description = "Updated", body = Review),
        (status = 403, description = "Not the author or a moderator"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_review(
    actor: Actor,
    State(state): State<AppState>,
    Path((title_id, review_id)): Path<(i64, i64)>,
    ValidatedJson(payload): ValidatedJson<UpdateReviewRequest>,
) -> AppResult<Json<Review>> {
    let review = require_review(&state, title_id, review_id).await?;
    ensure(can_modify_publication(&actor, review.author_id))?;

    let updated = state
        .repo
        .update_review(review_id, payload)
        .await?
        .ok_or(AppError::NotFound("review"))?;
    Ok(Json(updated))
}

#[utoipa::path(
    delete,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}",
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the author or a moderator"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_review(
    actor: Actor,
    State(state): State<AppState>,
    Path((title_id, review_id)): Path<(i64, i64)>,
) -> AppResult<StatusCode> {
    let review = require_review(&state, title_id, review_id).await?;
    ensure(can_modify_publication(&actor, review.author_id))?;

    if state.repo.delete_review(review_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("review"))
    }
}

// --- Comments ---

async fn require_comment(state: &AppState, review_id: i64, comment_id: i64) -> AppResult<Comment> {
    state
        .repo
        .get_comment(review_id, comment_id)
        .await?
        .ok_or(AppError::NotFound("comment"))
}

/// list_comments
///
/// [Public Route] The review must belong to the title in the path.
#[utoipa::path(
    get,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}/comments",
    params(PageParams),
    responses(
        (status = 200, description = "Comments", body = Page<Comment>),
        (status = 404, description = "Review Not Found")
    )
)]
pub async fn list_comments(
    actor: Actor,
    State(state): State<AppState>,
    Path((title_id, review_id)): Path<(i64, i64)>,
    Query(params): Query<PageParams>,
) -> AppResult<Json<Page<Comment>>> {
    ensure(can_read(&actor))?;
    require_review(&state, title_id, review_id).await?;
    let comments = state
        .repo
        .list_comments(review_id, params.pagination())
        .await?;
    Ok(Json(comments))
}

#[utoipa::path(
    get,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}/comments/{comment_id}",
    responses(
        (status = 200, description = "Comment", body = Comment),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_comment(
    actor: Actor,
    State(state): State<AppState>,
    Path((title_id, review_id, comment_id)): Path<(i64, i64, i64)>,
) -> AppResult<Json<Comment>> {
    ensure(can_read(&actor))?;
    require_review(&state, title_id, review_id).await?;
    Ok(Json(require_comment(&state, review_id, comment_id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}/comments",
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Created", body = Comment),
        (status = 404, description = "Review Not Found")
    )
)]
pub async fn create_comment(
    actor: Actor,
    State(state): State<AppState>,
    Path((title_id, review_id)): Path<(i64, i64)>,
    ValidatedJson(payload): ValidatedJson<CreateCommentRequest>,
) -> AppResult<(StatusCode, Json<Comment>)> {
    ensure(can_create_publication(&actor))?;
    let Some(author) = actor.user() else {
        return Err(AppError::Forbidden("authentication credentials were not provided"));
    };
    require_review(&state, title_id, review_id).await?;

    let comment = state
        .repo
        .create_comment(review_id, author.id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}/comments/{comment_id}",
    request_body = UpdateCommentRequest,
    responses(
        (status = 200, description = "Updated", body = Comment),
        (status = 403, description = "Not the author or a moderator"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_comment(
    actor: Actor,
    State(state): State<AppState>,
    Path((title_id, review_id, comment_id)): Path<(i64, i64, i64)>,
    ValidatedJson(payload): ValidatedJson<UpdateCommentRequest>,
) -> AppResult<Json<Comment>> {
    require_review(&state, title_id, review_id).await?;
    let comment = require_comment(&state, review_id, comment_id).await?;
    ensure(can_modify_publication(&actor, comment.author_id))?;

    let updated = state
        .repo
        .update_comment(comment_id, payload)
        .await?
        .ok_or(AppError::NotFound("comment"))?;
    Ok(Json(updated))
}

#[utoipa::path(
    delete,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}/comments/{comment_id}",
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the author or a moderator"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_comment(
    actor: Actor,
    State(state): State<AppState>,
    Path((title_id, review_id, comment_id)): Path<(i64, i64, i64)>,
) -> AppResult<StatusCode> {
    require_review(&state, title_id, review_id).await?;
    let comment = require_comment(&state, review_id, comment_id).await?;
    ensure(can_modify_publication(&actor, comment.author_id))?;

    if state.repo.delete_comment(comment_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("comment"))
    }
}

// --- Users ---

/// get_me
///
/// [Authenticated Route] The caller's own profile.
#[utoipa::path(
    get,
    path = "/api/v1/users/me",
    responses((status = 200, description = "My Profile", body = UserProfile))
)]
pub async fn get_me(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<UserProfile>> {
    let user = state
        .repo
        .get_user(id)
        .await?
        .ok_or(AppError::NotFound("user"))?;
    Ok(Json(user.into()))
}

/// update_me
///
/// [Authenticated Route] Edits the caller's own profile. `role` is ignored so
/// nobody can promote themselves.
#[utoipa::path(
    patch,
    path = "/api/v1/users/me",
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated", body = UserProfile),
        (status = 400, description = "Invalid payload or username/email taken")
    )
)]
pub async fn update_me(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    ValidatedJson(mut payload): ValidatedJson<UpdateUserRequest>,
) -> AppResult<Json<UserProfile>> {
    payload.role = None;
    let user = state
        .repo
        .update_user(id, payload)
        .await?
        .ok_or(AppError::NotFound("user"))?;
    Ok(Json(user.into()))
}

#[utoipa::path(
    get,
    path = "/api/v1/users",
    params(SearchParams),
    responses(
        (status = 200, description = "Users", body = Page<UserProfile>),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn list_users(
    actor: Actor,
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> AppResult<Json<Page<UserProfile>>> {
    ensure(can_manage_users(&actor))?;
    let page = params.pagination();
    let users = state.repo.list_users(params.search, page).await?;
    Ok(Json(users.map(UserProfile::from)))
}

/// create_user
///
/// [Admin Route] Creates an account directly, with any role. The user still logs
/// in through signup and a confirmation code.
#[utoipa::path(
    post,
    path = "/api/v1/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "Created", body = UserProfile),
        (status = 400, description = "Invalid payload or username/email taken"),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn create_user(
    actor: Actor,
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<UserProfile>)> {
    ensure(can_manage_users(&actor))?;
    let user = state.repo.create_user(payload.into()).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/{username}",
    responses(
        (status = 200, description = "User", body = UserProfile),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_user(
    actor: Actor,
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> AppResult<Json<UserProfile>> {
    ensure(can_manage_users(&actor))?;
    let user = state
        .repo
        .find_user_by_username(&username)
        .await?
        .ok_or(AppError::NotFound("user"))?;
    Ok(Json(user.into()))
}

#[utoipa::path(
    patch,
    path = "/api/v1/users/{username}",
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated", body = UserProfile),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_user(
    actor: Actor,
    State(state): State<AppState>,
    Path(username): Path<String>,
    ValidatedJson(payload): ValidatedJson<UpdateUserRequest>,
) -> AppResult<Json<UserProfile>> {
    ensure(can_manage_users(&actor))?;
    let existing = state
        .repo
        .find_user_by_username(&username)
        .await?
        .ok_or(AppError::NotFound("user"))?;
    let user = state
        .repo
        .update_user(existing.id, payload)
        .await?
        .ok_or(AppError::NotFound("user"))?;
    Ok(Json(user.into()))
}

/// delete_user
///
/// [Admin Route] The user's reviews and comments go with the account.
#[utoipa::path(
    delete,
    path = "/api/v1/users/{username}",
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_user(
    actor: Actor,
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> AppResult<StatusCode> {
    ensure(can_manage_users(&actor))?;
    if state.repo.delete_user(&username).await? {
        tracing::info!(username = %username, "User deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("user"))
    }
}
