#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tower::util::ServiceExt;
use uuid::Uuid;
use yamdb::{
    AppState, auth,
    config::AppConfig,
    create_router,
    mailer::MockMailer,
    models::{
        CatalogEntry, CatalogEntryRequest, CatalogKind, Comment, CreateCommentRequest,
        CreateReviewRequest, CreateTitleRequest, Page, Pagination, Review, Role, Title,
        TitleFilter, UpdateCommentRequest, UpdateReviewRequest, UpdateTitleRequest,
        UpdateUserRequest, User, rating_from_scores,
    },
    repository::{NewUser, RepoError, RepoResult, Repository},
};

// --- In-Memory Repository ---

struct StoredTitle {
    id: i64,
    name: String,
    year: i32,
    description: Option<String>,
    category_id: Option<i64>,
    genre_ids: Vec<i64>,
}

#[derive(Default)]
struct Store {
    next_id: i64,
    users: Vec<User>,
    categories: Vec<(i64, CatalogEntry)>,
    genres: Vec<(i64, CatalogEntry)>,
    titles: Vec<StoredTitle>,
    reviews: Vec<Review>,
    comments: Vec<Comment>,
}

impl Store {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn catalog(&self, kind: CatalogKind) -> &Vec<(i64, CatalogEntry)> {
        match kind {
            CatalogKind::Category => &self.categories,
            CatalogKind::Genre => &self.genres,
        }
    }

    fn catalog_mut(&mut self, kind: CatalogKind) -> &mut Vec<(i64, CatalogEntry)> {
        match kind {
            CatalogKind::Category => &mut self.categories,
            CatalogKind::Genre => &mut self.genres,
        }
    }

    fn username_of(&self, id: Uuid) -> String {
        self.users
            .iter()
            .find(|u| u.id == id)
            .map(|u| u.username.clone())
            .unwrap_or_default()
    }

    fn resolve(&self, kind: CatalogKind, slug: &str) -> RepoResult<i64> {
        self.catalog(kind)
            .iter()
            .find(|(_, e)| e.slug == slug)
            .map(|(id, _)| *id)
            .ok_or_else(|| RepoError::InvalidReference {
                field: kind.entity(),
                value: slug.to_string(),
            })
    }

    fn resolve_genres(&self, slugs: &[String]) -> RepoResult<Vec<i64>> {
        let mut ids = Vec::new();
        for slug in slugs {
            let id = self.resolve(CatalogKind::Genre, slug)?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    fn view(&self, title: &StoredTitle) -> Title {
        let mut genre: Vec<CatalogEntry> = self
            .genres
            .iter()
            .filter(|(id, _)| title.genre_ids.contains(id))
            .map(|(_, e)| e.clone())
            .collect();
        genre.sort_by(|a, b| a.name.cmp(&b.name));

        let scores: Vec<i16> = self
            .reviews
            .iter()
            .filter(|r| r.title_id == title.id)
            .map(|r| r.score)
            .collect();

        Title {
            id: title.id,
            name: title.name.clone(),
            year: title.year,
            rating: rating_from_scores(&scores),
            description: title.description.clone(),
            genre,
            category: title.category_id.and_then(|cid| {
                self.categories
                    .iter()
                    .find(|(id, _)| *id == cid)
                    .map(|(_, e)| e.clone())
            }),
        }
    }

    fn review_view(&self, review: &Review) -> Review {
        Review {
            author: self.username_of(review.author_id),
            ..review.clone()
        }
    }

    fn comment_view(&self, comment: &Comment) -> Comment {
        Comment {
            author: self.username_of(comment.author_id),
            ..comment.clone()
        }
    }

    fn remove_reviews(&mut self, keep: impl Fn(&Review) -> bool) {
        let removed: Vec<i64> = self
            .reviews
            .iter()
            .filter(|r| !keep(r))
            .map(|r| r.id)
            .collect();
        self.reviews.retain(|r| keep(r));
        self.comments.retain(|c| !removed.contains(&c.review_id));
    }

    fn check_unique_user(&self, id: Option<Uuid>, username: &str, email: &str) -> RepoResult<()> {
        let others = self.users.iter().filter(|u| Some(u.id) != id);
        for user in others {
            if user.username == username {
                return Err(RepoError::Conflict {
                    field: "username",
                    message: "a user with this username already exists",
                });
            }
            if user.email == email {
                return Err(RepoError::Conflict {
                    field: "email",
                    message: "a user with this email already exists",
                });
            }
        }
        Ok(())
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn paginate<T>(items: Vec<T>, page: Pagination) -> Page<T> {
    let count = items.len() as i64;
    let results = items
        .into_iter()
        .skip(page.offset as usize)
        .take(page.limit as usize)
        .collect();
    Page { count, results }
}

/// InMemoryRepository
///
/// A `Repository` kept in a mutex, enforcing the same unique constraints and
/// cascades as the PostgreSQL schema.
#[derive(Default)]
pub struct InMemoryRepository {
    store: Mutex<Store>,
}

impl InMemoryRepository {
    /// Inserts a fully specified user, bypassing the uniqueness checks.
    pub fn insert_user(&self, user: User) -> User {
        self.store.lock().unwrap().users.push(user.clone());
        user
    }

    pub fn review_count(&self) -> usize {
        self.store.lock().unwrap().reviews.len()
    }

    pub fn comment_count(&self) -> usize {
        self.store.lock().unwrap().comments.len()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        let store = self.store.lock().unwrap();
        Ok(store.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        let store = self.store.lock().unwrap();
        Ok(store.users.iter().find(|u| u.username == username).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let store = self.store.lock().unwrap();
        Ok(store.users.iter().find(|u| u.email == email).cloned())
    }

    async fn list_users(&self, search: Option<String>, page: Pagination) -> RepoResult<Page<User>> {
        let store = self.store.lock().unwrap();
        let mut users: Vec<User> = store
            .users
            .iter()
            .filter(|u| search.as_deref().is_none_or(|s| contains_ci(&u.username, s)))
            .cloned()
            .collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(paginate(users, page))
    }

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let mut store = self.store.lock().unwrap();
        store.check_unique_user(None, &user.username, &user.email)?;
        let created = User {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            bio: user.bio,
            role: user.role,
            ..Default::default()
        };
        store.users.push(created.clone());
        Ok(created)
    }

    async fn update_user(&self, id: Uuid, changes: UpdateUserRequest) -> RepoResult<Option<User>> {
        let mut store = self.store.lock().unwrap();
        let Some(current) = store.users.iter().find(|u| u.id == id).cloned() else {
            return Ok(None);
        };
        let username = changes.username.unwrap_or(current.username);
        let email = changes.email.unwrap_or(current.email);
        store.check_unique_user(Some(id), &username, &email)?;

        let user = store.users.iter_mut().find(|u| u.id == id).unwrap();
        user.username = username;
        user.email = email;
        if let Some(v) = changes.first_name {
            user.first_name = v;
        }
        if let Some(v) = changes.last_name {
            user.last_name = v;
        }
        if let Some(v) = changes.bio {
            user.bio = v;
        }
        if let Some(v) = changes.role {
            user.role = v;
        }
        Ok(Some(user.clone()))
    }

    async fn delete_user(&self, username: &str) -> RepoResult<bool> {
        let mut store = self.store.lock().unwrap();
        let Some(id) = store
            .users
            .iter()
            .find(|u| u.username == username)
            .map(|u| u.id)
        else {
            return Ok(false);
        };
        store.users.retain(|u| u.id != id);
        store.remove_reviews(|r| r.author_id != id);
        store.comments.retain(|c| c.author_id != id);
        Ok(true)
    }

    async fn set_confirmation_code(
        &self,
        id: Uuid,
        code_hash: Option<String>,
        issued_at: Option<DateTime<Utc>>,
    ) -> RepoResult<()> {
        let mut store = self.store.lock().unwrap();
        let user = store
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(RepoError::NotFound("user"))?;
        user.confirmation_code_hash = code_hash;
        user.confirmation_sent_at = issued_at;
        Ok(())
    }

    async fn consume_confirmation_code(
        &self,
        id: Uuid,
        code_hash: &str,
        ttl_mins: i64,
    ) -> RepoResult<bool> {
        let mut store = self.store.lock().unwrap();
        let Some(user) = store.users.iter_mut().find(|u| u.id == id) else {
            return Ok(false);
        };
        let fresh = user
            .confirmation_sent_at
            .is_some_and(|at| at > Utc::now() - chrono::Duration::minutes(ttl_mins));
        if !fresh || user.confirmation_code_hash.as_deref() != Some(code_hash) {
            return Ok(false);
        }
        user.confirmation_code_hash = None;
        user.confirmation_sent_at = None;
        Ok(true)
    }

    async fn list_catalog(
        &self,
        kind: CatalogKind,
        search: Option<String>,
        page: Pagination,
    ) -> RepoResult<Page<CatalogEntry>> {
        let store = self.store.lock().unwrap();
        let mut entries: Vec<CatalogEntry> = store
            .catalog(kind)
            .iter()
            .map(|(_, e)| e.clone())
            .filter(|e| search.as_deref().is_none_or(|s| contains_ci(&e.name, s)))
            .collect();
        entries.sort_by(|a, b| (&a.name, &a.slug).cmp(&(&b.name, &b.slug)));
        Ok(paginate(entries, page))
    }

    async fn create_catalog_entry(
        &self,
        kind: CatalogKind,
        entry: CatalogEntryRequest,
    ) -> RepoResult<CatalogEntry> {
        let mut store = self.store.lock().unwrap();
        if store.catalog(kind).iter().any(|(_, e)| e.slug == entry.slug) {
            return Err(RepoError::Conflict {
                field: "slug",
                message: "slug already exists",
            });
        }
        let id = store.next_id();
        let created = CatalogEntry {
            name: entry.name,
            slug: entry.slug,
        };
        store.catalog_mut(kind).push((id, created.clone()));
        Ok(created)
    }

    async fn delete_catalog_entry(&self, kind: CatalogKind, slug: &str) -> RepoResult<bool> {
        let mut store = self.store.lock().unwrap();
        let Ok(id) = store.resolve(kind, slug) else {
            return Ok(false);
        };
        store.catalog_mut(kind).retain(|(eid, _)| *eid != id);
        for title in store.titles.iter_mut() {
            match kind {
                CatalogKind::Category if title.category_id == Some(id) => {
                    title.category_id = None
                }
                CatalogKind::Genre => title.genre_ids.retain(|g| *g != id),
                _ => {}
            }
        }
        Ok(true)
    }

    async fn list_titles(&self, filter: &TitleFilter, page: Pagination) -> RepoResult<Page<Title>> {
        let store = self.store.lock().unwrap();
        let mut titles: Vec<Title> = store
            .titles
            .iter()
            .map(|t| store.view(t))
            .filter(|t| {
                filter
                    .genre
                    .as_deref()
                    .is_none_or(|g| t.genre.iter().any(|e| e.slug == g))
                    && filter
                        .category
                        .as_deref()
                        .is_none_or(|c| t.category.as_ref().is_some_and(|e| e.slug == c))
                    && filter.name.as_deref().is_none_or(|n| contains_ci(&t.name, n))
                    && filter.year.is_none_or(|y| t.year == y)
                    && filter.description.as_deref().is_none_or(|d| {
                        t.description.as_deref().is_some_and(|td| contains_ci(td, d))
                    })
            })
            .collect();
        titles.sort_by_key(|t| t.id);
        Ok(paginate(titles, page))
    }

    async fn get_title(&self, id: i64) -> RepoResult<Option<Title>> {
        let store = self.store.lock().unwrap();
        Ok(store.titles.iter().find(|t| t.id == id).map(|t| store.view(t)))
    }

    async fn create_title(&self, req: CreateTitleRequest) -> RepoResult<Title> {
        let mut store = self.store.lock().unwrap();
        let category_id = match &req.category {
            Some(slug) => Some(store.resolve(CatalogKind::Category, slug)?),
            None => None,
        };
        let genre_ids = store.resolve_genres(&req.genre)?;
        let id = store.next_id();
        let stored = StoredTitle {
            id,
            name: req.name,
            year: req.year,
            description: req.description,
            category_id,
            genre_ids,
        };
        let view = store.view(&stored);
        store.titles.push(stored);
        Ok(view)
    }

    async fn update_title(&self, id: i64, req: UpdateTitleRequest) -> RepoResult<Option<Title>> {
        let mut store = self.store.lock().unwrap();
        if !store.titles.iter().any(|t| t.id == id) {
            return Ok(None);
        }
        let category_id = match &req.category {
            Some(slug) => Some(store.resolve(CatalogKind::Category, slug)?),
            None => None,
        };
        let genre_ids = match &req.genre {
            Some(slugs) => Some(store.resolve_genres(slugs)?),
            None => None,
        };

        let title = store.titles.iter_mut().find(|t| t.id == id).unwrap();
        if let Some(name) = req.name {
            title.name = name;
        }
        if let Some(year) = req.year {
            title.year = year;
        }
        if let Some(description) = req.description {
            title.description = Some(description);
        }
        if category_id.is_some() {
            title.category_id = category_id;
        }
        if let Some(ids) = genre_ids {
            title.genre_ids = ids;
        }

        let store = &*store;
        Ok(store.titles.iter().find(|t| t.id == id).map(|t| store.view(t)))
    }

    async fn delete_title(&self, id: i64) -> RepoResult<bool> {
        let mut store = self.store.lock().unwrap();
        let before = store.titles.len();
        store.titles.retain(|t| t.id != id);
        if store.titles.len() == before {
            return Ok(false);
        }
        store.remove_reviews(|r| r.title_id != id);
        Ok(true)
    }

    async fn list_reviews(&self, title_id: i64, page: Pagination) -> RepoResult<Page<Review>> {
        let store = self.store.lock().unwrap();
        let reviews: Vec<Review> = store
            .reviews
            .iter()
            .filter(|r| r.title_id == title_id)
            .map(|r| store.review_view(r))
            .collect();
        Ok(paginate(reviews, page))
    }

    async fn get_review(&self, title_id: i64, review_id: i64) -> RepoResult<Option<Review>> {
        let store = self.store.lock().unwrap();
        Ok(store
            .reviews
            .iter()
            .find(|r| r.id == review_id && r.title_id == title_id)
            .map(|r| store.review_view(r)))
    }

    async fn create_review(
        &self,
        title_id: i64,
        author_id: Uuid,
        req: CreateReviewRequest,
    ) -> RepoResult<Review> {
        let mut store = self.store.lock().unwrap();
        if !store.titles.iter().any(|t| t.id == title_id) {
            return Err(RepoError::NotFound("title"));
        }
        if store
            .reviews
            .iter()
            .any(|r| r.title_id == title_id && r.author_id == author_id)
        {
            return Err(RepoError::Conflict {
                field: "title",
                message: "you have already reviewed this title",
            });
        }
        let review = Review {
            id: store.next_id(),
            title_id,
            author_id,
            author: store.username_of(author_id),
            text: req.text,
            score: req.score,
            pub_date: Utc::now(),
        };
        store.reviews.push(review.clone());
        Ok(review)
    }

    async fn update_review(
        &self,
        review_id: i64,
        req: UpdateReviewRequest,
    ) -> RepoResult<Option<Review>> {
        let mut store = self.store.lock().unwrap();
        let Some(review) = store.reviews.iter_mut().find(|r| r.id == review_id) else {
            return Ok(None);
        };
        if let Some(text) = req.text {
            review.text = text;
        }
        if let Some(score) = req.score {
            review.score = score;
        }
        let review = review.clone();
        Ok(Some(store.review_view(&review)))
    }

    async fn delete_review(&self, review_id: i64) -> RepoResult<bool> {
        let mut store = self.store.lock().unwrap();
        let before = store.reviews.len();
        store.remove_reviews(|r| r.id != review_id);
        Ok(store.reviews.len() != before)
    }

    async fn list_comments(&self, review_id: i64, page: Pagination) -> RepoResult<Page<Comment>> {
        let store = self.store.lock().unwrap();
        let comments: Vec<Comment> = store
            .comments
            .iter()
            .filter(|c| c.review_id == review_id)
            .map(|c| store.comment_view(c))
            .collect();
        Ok(paginate(comments, page))
    }

    async fn get_comment(&self, review_id: i64, comment_id: i64) -> RepoResult<Option<Comment>> {
        let store = self.store.lock().unwrap();
        Ok(store
            .comments
            .iter()
            .find(|c| c.id == comment_id && c.review_id == review_id)
            .map(|c| store.comment_view(c)))
    }

    async fn create_comment(
        &self,
        review_id: i64,
        author_id: Uuid,
        req: CreateCommentRequest,
    ) -> RepoResult<Comment> {
        let mut store = self.store.lock().unwrap();
        if !store.reviews.iter().any(|r| r.id == review_id) {
            return Err(RepoError::NotFound("review"));
        }
        let comment = Comment {
            id: store.next_id(),
            review_id,
            author_id,
            author: store.username_of(author_id),
            text: req.text,
            pub_date: Utc::now(),
        };
        store.comments.push(comment.clone());
        Ok(comment)
    }

    async fn update_comment(
        &self,
        comment_id: i64,
        req: UpdateCommentRequest,
    ) -> RepoResult<Option<Comment>> {
        let mut store = self.store.lock().unwrap();
        let Some(comment) = store.comments.iter_mut().find(|c| c.id == comment_id) else {
            return Ok(None);
        };
        if let Some(text) = req.text {
            comment.text = text;
        }
        let comment = comment.clone();
        Ok(Some(store.comment_view(&comment)))
    }

    async fn delete_comment(&self, comment_id: i64) -> RepoResult<bool> {
        let mut store = self.store.lock().unwrap();
        let before = store.comments.len();
        store.comments.retain(|c| c.id != comment_id);
        Ok(store.comments.len() != before)
    }
}

// --- Application Harness ---

/// TestApp
///
/// The full router over an `InMemoryRepository` and a `MockMailer`, with helpers
/// for seeding users and issuing requests.
pub struct TestApp {
    pub router: Router,
    pub repo: Arc<InMemoryRepository>,
    pub mailer: MockMailer,
    pub config: AppConfig,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with(AppConfig::default(), MockMailer::new())
    }

    pub fn with(config: AppConfig, mailer: MockMailer) -> Self {
        let repo = Arc::new(InMemoryRepository::default());
        let state = AppState {
            repo: repo.clone(),
            mailer: Arc::new(mailer.clone()),
            config: config.clone(),
        };
        Self {
            router: create_router(state),
            repo,
            mailer,
            config,
        }
    }

    /// Creates a user with the given role and returns it with a valid token.
    pub async fn user(&self, username: &str, role: Role) -> (User, String) {
        let user = self
            .repo
            .create_user(NewUser {
                username: username.to_string(),
                email: format!("{username}@example.com"),
                role,
                ..Default::default()
            })
            .await
            .unwrap();
        let token = auth::issue_token(&self.config, user.id).unwrap();
        (user, token)
    }

    pub fn superuser(&self, username: &str) -> (User, String) {
        let user = self.repo.insert_user(User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: format!("{username}@example.com"),
            is_superuser: true,
            ..Default::default()
        });
        let token = auth::issue_token(&self.config, user.id).unwrap();
        (user, token)
    }

    pub async fn catalog(&self, kind: CatalogKind, name: &str, slug: &str) {
        self.repo
            .create_catalog_entry(
                kind,
                CatalogEntryRequest {
                    name: name.to_string(),
                    slug: slug.to_string(),
                },
            )
            .await
            .unwrap();
    }

    pub async fn title(&self, name: &str, year: i32, genre: &[&str], category: Option<&str>) -> Title {
        self.repo
            .create_title(CreateTitleRequest {
                name: name.to_string(),
                year,
                description: None,
                genre: genre.iter().map(|g| g.to_string()).collect(),
                category: category.map(str::to_string),
            })
            .await
            .unwrap()
    }

    pub async fn review(&self, title_id: i64, author: &User, score: i16) -> Review {
        self.repo
            .create_review(
                title_id,
                author.id,
                CreateReviewRequest {
                    text: format!("review by {}", author.username),
                    score,
                },
            )
            .await
            .unwrap()
    }

    /// Sends a request through the router. The body is parsed as JSON when it can
    /// be, returned as a JSON string when it cannot, and `Null` when empty.
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.send(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, token, Some(body)).await
    }

    pub async fn patch(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(Method::PATCH, uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.send(Method::DELETE, uri, token, None).await
    }
}
