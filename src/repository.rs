use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::models::{
    CatalogEntry, CatalogEntryRequest, CatalogKind, Category, Comment, CreateCommentRequest,
    CreateReviewRequest, CreateTitleRequest, CreateUserRequest, Genre, Page, Pagination, Review,
    Title, TitleFilter, UpdateCommentRequest, UpdateReviewRequest, UpdateTitleRequest,
    UpdateUserRequest, User,
};

/// RepoError
///
/// Persistence failures as seen by the request layer. Unique-constraint violations
/// are classified by constraint name so callers can report them against a field.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("duplicate {field}: {message}")]
    Conflict {
        field: &'static str,
        message: &'static str,
    },

    #[error("unknown {field}: {value}")]
    InvalidReference { field: &'static str, value: String },

    #[error("database error: {0}")]
    Database(sqlx::Error),
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Unique constraints declared in the migrations, with the field and message the
/// API reports when one of them is violated.
const UNIQUE_CONSTRAINTS: &[(&str, &str, &str)] = &[
    ("uq_review_author_title", "title", "you have already reviewed this title"),
    ("uq_users_username", "username", "a user with this username already exists"),
    ("uq_users_email", "email", "a user with this email already exists"),
    ("uq_users_username_email", "username", "a user with this username and email already exists"),
    ("uq_categories_slug", "slug", "a category with this slug already exists"),
    ("uq_genres_slug", "slug", "a genre with this slug already exists"),
    ("uq_genre_title", "genre", "genre listed more than once"),
];

/// Foreign keys (PostgreSQL default names) and the parent entity that vanished
/// when an insert or update violates one, e.g. a title deleted mid-request.
const FOREIGN_KEYS: &[(&str, &str)] = &[
    ("reviews_title_id_fkey", "title"),
    ("reviews_author_id_fkey", "user"),
    ("comments_review_id_fkey", "review"),
    ("comments_author_id_fkey", "user"),
    ("genre_title_title_id_fkey", "title"),
    ("genre_title_genre_id_fkey", "genre"),
    ("titles_category_id_fkey", "category"),
];

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let constraint = db_err.constraint().unwrap_or_default();
            match db_err.code().as_deref() {
                // unique_violation
                Some("23505") => {
                    if let Some((_, field, message)) =
                        UNIQUE_CONSTRAINTS.iter().find(|(name, ..)| *name == constraint)
                    {
                        return RepoError::Conflict {
                            field: *field,
                            message: *message,
                        };
                    }
                }
                // foreign_key_violation
                Some("23503") => {
                    let entity = FOREIGN_KEYS
                        .iter()
                        .find(|(name, _)| *name == constraint)
                        .map_or("resource", |(_, entity)| *entity);
                    return RepoError::NotFound(entity);
                }
                _ => {}
            }
        }
        RepoError::Database(err)
    }
}

/// NewUser
///
/// Everything needed to insert an account. Built from either a signup or an admin
/// `CreateUserRequest`.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    pub role: crate::models::Role,
}

impl From<CreateUserRequest> for NewUser {
    fn from(req: CreateUserRequest) -> Self {
        Self {
            username: req.username,
            email: req.email,
            first_name: req.first_name.unwrap_or_default(),
            last_name: req.last_name.unwrap_or_default(),
            bio: req.bio.unwrap_or_default(),
            role: req.role.unwrap_or_default(),
        }
    }
}

/// Repository Trait
///
/// The persistence contract the handlers are written against. `PostgresRepository`
/// is the production implementation; tests supply an in-memory one.
///
/// Lookups return `Ok(None)`/`Ok(false)` for missing rows so the handler decides
/// which 404 to report. Writes that hit a constraint return `RepoError::Conflict`.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    async fn list_users(&self, search: Option<String>, page: Pagination)
    -> RepoResult<Page<User>>;
    async fn create_user(&self, user: NewUser) -> RepoResult<User>;
    /// Applies the provided fields. `None` when the user does not exist.
    async fn update_user(&self, id: Uuid, changes: UpdateUserRequest)
    -> RepoResult<Option<User>>;
    async fn delete_user(&self, username: &str) -> RepoResult<bool>;
    /// Replaces (or with `None`, clears) the stored confirmation code digest.
    async fn set_confirmation_code(
        &self,
        id: Uuid,
        code_hash: Option<String>,
        issued_at: Option<DateTime<Utc>>,
    ) -> RepoResult<()>;
    /// Clears the stored code if it still equals `code_hash` and was issued less
    /// than `ttl_mins` minutes ago. Returns whether this call consumed it; of any
    /// number of concurrent callers at most one sees `true`.
    async fn consume_confirmation_code(
        &self,
        id: Uuid,
        code_hash: &str,
        ttl_mins: i64,
    ) -> RepoResult<bool>;

    // --- Catalog ---
    async fn list_catalog(
        &self,
        kind: CatalogKind,
        search: Option<String>,
        page: Pagination,
    ) -> RepoResult<Page<CatalogEntry>>;
    async fn create_catalog_entry(
        &self,
        kind: CatalogKind,
        entry: CatalogEntryRequest,
    ) -> RepoResult<CatalogEntry>;
    async fn delete_catalog_entry(&self, kind: CatalogKind, slug: &str) -> RepoResult<bool>;

    // --- Titles ---
    async fn list_titles(&self, filter: &TitleFilter, page: Pagination) -> RepoResult<Page<Title>>;
    async fn get_title(&self, id: i64) -> RepoResult<Option<Title>>;
    /// Fails with `InvalidReference` when a genre or category slug is unknown.
    async fn create_title(&self, req: CreateTitleRequest) -> RepoResult<Title>;
    async fn update_title(&self, id: i64, req: UpdateTitleRequest) -> RepoResult<Option<Title>>;
    /// Cascades to the title's reviews and their comments.
    async fn delete_title(&self, id: i64) -> RepoResult<bool>;

    // --- Reviews ---
    async fn list_reviews(&self, title_id: i64, page: Pagination) -> RepoResult<Page<Review>>;
    async fn get_review(&self, title_id: i64, review_id: i64) -> RepoResult<Option<Review>>;
    /// Relies on the `uq_review_author_title` constraint; a second review by the same
    /// author for the same title fails with `RepoError::Conflict`.
    async fn create_review(
        &self,
        title_id: i64,
        author_id: Uuid,
        req: CreateReviewRequest,
    ) -> RepoResult<Review>;
    async fn update_review(
        &self,
        review_id: i64,
        req: UpdateReviewRequest,
    ) -> RepoResult<Option<Review>>;
    async fn delete_review(&self, review_id: i64) -> RepoResult<bool>;

    // --- Comments ---
    async fn list_comments(&self, review_id: i64, page: Pagination) -> RepoResult<Page<Comment>>;
    async fn get_comment(&self, review_id: i64, comment_id: i64) -> RepoResult<Option<Comment>>;
    async fn create_comment(
        &self,
        review_id: i64,
        author_id: Uuid,
        req: CreateCommentRequest,
    ) -> RepoResult<Comment>;
    async fn update_comment(
        &self,
        comment_id: i64,
        req: UpdateCommentRequest,
    ) -> RepoResult<Option<Comment>>;
    async fn delete_comment(&self, comment_id: i64) -> RepoResult<bool>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// The `Repository` implementation backed by PostgreSQL.
#[derive(Clone)]
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str = "id, username, email, first_name, last_name, bio, role, \
     is_superuser, is_staff, confirmation_code_hash, confirmation_sent_at";

const REVIEW_SELECT: &str = "SELECT r.id, r.title_id, r.author_id, u.username AS author, \
     r.text, r.score, r.pub_date FROM reviews r JOIN users u ON u.id = r.author_id";

const COMMENT_SELECT: &str = "SELECT c.id, c.review_id, c.author_id, u.username AS author, \
     c.text, c.pub_date FROM comments c JOIN users u ON u.id = c.author_id";

/// One row of the title listing before its genres are attached.
#[derive(FromRow)]
struct TitleRow {
    id: i64,
    name: String,
    year: i32,
    description: Option<String>,
    category_name: Option<String>,
    category_slug: Option<String>,
    rating: Option<i32>,
}

#[derive(FromRow)]
struct TitleGenreRow {
    title_id: i64,
    name: String,
    slug: String,
}

fn like_pattern(value: &str) -> String {
    let escaped = value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// push_title_filters
///
/// Appends the `GET /titles` filters to a query whose FROM clause aliases titles as
/// `t` and categories as `c`.
fn push_title_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &TitleFilter) {
    if let Some(genre) = &filter.genre {
        builder.push(
            " AND EXISTS (SELECT 1 FROM genre_title gt JOIN genres g ON g.id = gt.genre_id \
             WHERE gt.title_id = t.id AND g.slug = ",
        );
        builder.push_bind(genre.clone());
        builder.push(")");
    }
    if let Some(category) = &filter.category {
        builder.push(" AND c.slug = ");
        builder.push_bind(category.clone());
    }
    if let Some(name) = &filter.name {
        builder.push(" AND t.name ILIKE ");
        builder.push_bind(like_pattern(name));
    }
    if let Some(year) = filter.year {
        builder.push(" AND t.year = ");
        builder.push_bind(year);
    }
    if let Some(description) = &filter.description {
        builder.push(" AND t.description ILIKE ");
        builder.push_bind(like_pattern(description));
    }
}

impl PostgresRepository {
    /// Loads the genres of every title in `rows` with one query and assembles the
    /// API shape, preserving row order.
    async fn assemble_titles(&self, rows: Vec<TitleRow>) -> RepoResult<Vec<Title>> {
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let genre_rows = sqlx::query_as::<_, TitleGenreRow>(
            "SELECT gt.title_id, g.name, g.slug FROM genre_title gt \
             JOIN genres g ON g.id = gt.genre_id \
             WHERE gt.title_id = ANY($1) ORDER BY g.name",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut genres: HashMap<i64, Vec<Genre>> = HashMap::new();
        for row in genre_rows {
            genres.entry(row.title_id).or_default().push(Genre {
                name: row.name,
                slug: row.slug,
            });
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let category = match (row.category_name, row.category_slug) {
                    (Some(name), Some(slug)) => Some(Category { name, slug }),
                    _ => None,
                };
                Title {
                    id: row.id,
                    name: row.name,
                    year: row.year,
                    rating: row.rating,
                    description: row.description,
                    genre: genres.remove(&row.id).unwrap_or_default(),
                    category,
                }
            })
            .collect())
    }

    fn title_select() -> QueryBuilder<'static, Postgres> {
        QueryBuilder::new(
            "SELECT t.id, t.name, t.year, t.description, \
                    c.name AS category_name, c.slug AS category_slug, \
                    ROUND(AVG(r.score))::INTEGER AS rating \
             FROM titles t \
             LEFT JOIN categories c ON c.id = t.category_id \
             LEFT JOIN reviews r ON r.title_id = t.id \
             WHERE TRUE",
        )
    }
}

/// Resolves a category slug to its id inside the caller's transaction.
async fn resolve_category(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    slug: &str,
) -> RepoResult<i64> {
    sqlx::query_scalar::<_, i64>("SELECT id FROM categories WHERE slug = $1")
        .bind(slug)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| RepoError::InvalidReference {
            field: "category",
            value: slug.to_string(),
        })
}

/// Replaces the genre links of a title. Every slug must exist.
async fn replace_genres(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    title_id: i64,
    slugs: &[String],
) -> RepoResult<()> {
    let mut wanted: Vec<String> = slugs.to_vec();
    wanted.sort();
    wanted.dedup();

    let found: Vec<(i64, String)> =
        sqlx::query_as("SELECT id, slug FROM genres WHERE slug = ANY($1)")
            .bind(&wanted)
            .fetch_all(&mut **tx)
            .await?;

    if let Some(missing) = wanted
        .iter()
        .find(|slug| !found.iter().any(|(_, s)| s == *slug))
    {
        return Err(RepoError::InvalidReference {
            field: "genre",
            value: missing.clone(),
        });
    }

    sqlx::query("DELETE FROM genre_title WHERE title_id = $1")
        .bind(title_id)
        .execute(&mut **tx)
        .await?;

    for (genre_id, _) in found {
        sqlx::query("INSERT INTO genre_title (title_id, genre_id) VALUES ($1, $2)")
            .bind(title_id)
            .bind(genre_id)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

#[async_trait]
impl Repository for PostgresRepository {
    // --- USERS ---

    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// list_users
    ///
    /// Paginated account listing ordered by username, optionally narrowed by a
    /// case-insensitive username search.
    async fn list_users(
        &self,
        search: Option<String>,
        page: Pagination,
    ) -> RepoResult<Page<User>> {
        let mut count: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM users WHERE TRUE");
        let mut select: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {USER_COLUMNS} FROM users WHERE TRUE"));

        if let Some(s) = search {
            count.push(" AND username ILIKE ");
            count.push_bind(like_pattern(&s));
            select.push(" AND username ILIKE ");
            select.push_bind(like_pattern(&s));
        }
        select.push(" ORDER BY username LIMIT ");
        select.push_bind(page.limit);
        select.push(" OFFSET ");
        select.push_bind(page.offset);

        let count: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;
        let results = select.build_query_as::<User>().fetch_all(&self.pool).await?;
        Ok(Page { count, results })
    }

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let sql = format!(
            "INSERT INTO users (id, username, email, first_name, last_name, bio, role) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {USER_COLUMNS}"
        );
        let created = sqlx::query_as::<_, User>(&sql)
            .bind(Uuid::new_v4())
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.bio)
            .bind(user.role.as_str())
            .fetch_one(&self.pool)
            .await?;
        tracing::info!(username = %created.username, role = %created.role, "user created");
        Ok(created)
    }

    /// update_user
    ///
    /// Uses `COALESCE` so only the provided fields change.
    async fn update_user(
        &self,
        id: Uuid,
        changes: UpdateUserRequest,
    ) -> RepoResult<Option<User>> {
        let sql = format!(
            "UPDATE users SET \
                username = COALESCE($2, username), \
                email = COALESCE($3, email), \
                first_name = COALESCE($4, first_name), \
                last_name = COALESCE($5, last_name), \
                bio = COALESCE($6, bio), \
                role = COALESCE($7, role) \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(changes.username)
            .bind(changes.email)
            .bind(changes.first_name)
            .bind(changes.last_name)
            .bind(changes.bio)
            .bind(changes.role.map(|r| r.as_str()))
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_user(&self, username: &str) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM users WHERE username = $1")
            .bind(username)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn set_confirmation_code(
        &self,
        id: Uuid,
        code_hash: Option<String>,
        issued_at: Option<DateTime<Utc>>,
    ) -> RepoResult<()> {
        let res = sqlx::query(
            "UPDATE users SET confirmation_code_hash = $2, confirmation_sent_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(code_hash)
        .bind(issued_at)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(RepoError::NotFound("user"));
        }
        Ok(())
    }

    async fn consume_confirmation_code(
        &self,
        id: Uuid,
        code_hash: &str,
        ttl_mins: i64,
    ) -> RepoResult<bool> {
        let consumed = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE users
            SET confirmation_code_hash = NULL, confirmation_sent_at = NULL
            WHERE id = $1
              AND confirmation_code_hash = $2
              AND confirmation_sent_at > NOW() - make_interval(mins => $3::INTEGER)
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(code_hash)
        .bind(ttl_mins)
        .fetch_optional(&self.pool)
        .await?;
        Ok(consumed.is_some())
    }

    // --- CATALOG ---

    async fn list_catalog(
        &self,
        kind: CatalogKind,
        search: Option<String>,
        page: Pagination,
    ) -> RepoResult<Page<CatalogEntry>> {
        let table = kind.table();
        let mut count: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT COUNT(*) FROM {table} WHERE TRUE"));
        let mut select: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT name, slug FROM {table} WHERE TRUE"));

        if let Some(s) = search {
            count.push(" AND name ILIKE ");
            count.push_bind(like_pattern(&s));
            select.push(" AND name ILIKE ");
            select.push_bind(like_pattern(&s));
        }
        select.push(" ORDER BY name, slug LIMIT ");
        select.push_bind(page.limit);
        select.push(" OFFSET ");
        select.push_bind(page.offset);

        let count: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;
        let results = select
            .build_query_as::<CatalogEntry>()
            .fetch_all(&self.pool)
            .await?;
        Ok(Page { count, results })
    }

    async fn create_catalog_entry(
        &self,
        kind: CatalogKind,
        entry: CatalogEntryRequest,
    ) -> RepoResult<CatalogEntry> {
        let sql = format!(
            "INSERT INTO {} (name, slug) VALUES ($1, $2) RETURNING name, slug",
            kind.table()
        );
        Ok(sqlx::query_as::<_, CatalogEntry>(&sql)
            .bind(entry.name)
            .bind(entry.slug)
            .fetch_one(&self.pool)
            .await?)
    }

    /// delete_catalog_entry
    ///
    /// Titles referencing a deleted category keep existing with a NULL category;
    /// genre links are removed by the foreign key cascade.
    async fn delete_catalog_entry(&self, kind: CatalogKind, slug: &str) -> RepoResult<bool> {
        let sql = format!("DELETE FROM {} WHERE slug = $1", kind.table());
        let res = sqlx::query(&sql).bind(slug).execute(&self.pool).await?;
        Ok(res.rows_affected() > 0)
    }

    // --- TITLES ---

    /// list_titles
    ///
    /// Filters are assembled with `QueryBuilder` bindings. The rating is computed
    /// in SQL as the rounded average of review scores.
    async fn list_titles(&self, filter: &TitleFilter, page: Pagination) -> RepoResult<Page<Title>> {
        let mut count: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT COUNT(*) FROM titles t \
             LEFT JOIN categories c ON c.id = t.category_id WHERE TRUE",
        );
        push_title_filters(&mut count, filter);
        let count: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = Self::title_select();
        push_title_filters(&mut select, filter);
        select.push(" GROUP BY t.id, c.id ORDER BY t.id LIMIT ");
        select.push_bind(page.limit);
        select.push(" OFFSET ");
        select.push_bind(page.offset);

        let rows = select
            .build_query_as::<TitleRow>()
            .fetch_all(&self.pool)
            .await?;
        let results = self.assemble_titles(rows).await?;
        Ok(Page { count, results })
    }

    async fn get_title(&self, id: i64) -> RepoResult<Option<Title>> {
        let mut select = Self::title_select();
        select.push(" AND t.id = ");
        select.push_bind(id);
        select.push(" GROUP BY t.id, c.id");

        let rows = select
            .build_query_as::<TitleRow>()
            .fetch_optional(&self.pool)
            .await?
            .into_iter()
            .collect();
        Ok(self.assemble_titles(rows).await?.pop())
    }

    /// create_title
    ///
    /// Inserts the title and its genre links in one transaction, resolving every
    /// slug first so an unknown reference leaves nothing behind.
    async fn create_title(&self, req: CreateTitleRequest) -> RepoResult<Title> {
        let mut tx = self.pool.begin().await?;

        let category_id = match &req.category {
            Some(slug) => Some(resolve_category(&mut tx, slug).await?),
            None => None,
        };

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO titles (name, year, description, category_id) \
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(&req.name)
        .bind(req.year)
        .bind(&req.description)
        .bind(category_id)
        .fetch_one(&mut *tx)
        .await?;

        replace_genres(&mut tx, id, &req.genre).await?;
        tx.commit().await?;

        self.get_title(id).await?.ok_or(RepoError::NotFound("title"))
    }

    async fn update_title(&self, id: i64, req: UpdateTitleRequest) -> RepoResult<Option<Title>> {
        let mut tx = self.pool.begin().await?;

        let res = sqlx::query(
            "UPDATE titles SET name = COALESCE($2, name), year = COALESCE($3, year), \
             description = COALESCE($4, description) WHERE id = $1",
        )
        .bind(id)
        .bind(&req.name)
        .bind(req.year)
        .bind(&req.description)
        .execute(&mut *tx)
        .await?;
        if res.rows_affected() == 0 {
            return Ok(None);
        }

        if let Some(slug) = &req.category {
            let category_id = resolve_category(&mut tx, slug).await?;
            sqlx::query("UPDATE titles SET category_id = $2 WHERE id = $1")
                .bind(id)
                .bind(category_id)
                .execute(&mut *tx)
                .await?;
        }
        if let Some(genres) = &req.genre {
            replace_genres(&mut tx, id, genres).await?;
        }
        tx.commit().await?;

        self.get_title(id).await
    }

    async fn delete_title(&self, id: i64) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM titles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    // --- REVIEWS ---

    async fn list_reviews(&self, title_id: i64, page: Pagination) -> RepoResult<Page<Review>> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reviews WHERE title_id = $1")
            .bind(title_id)
            .fetch_one(&self.pool)
            .await?;
        let sql = format!("{REVIEW_SELECT} WHERE r.title_id = $1 ORDER BY r.id LIMIT $2 OFFSET $3");
        let results = sqlx::query_as::<_, Review>(&sql)
            .bind(title_id)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await?;
        Ok(Page { count, results })
    }

    async fn get_review(&self, title_id: i64, review_id: i64) -> RepoResult<Option<Review>> {
        let sql = format!("{REVIEW_SELECT} WHERE r.id = $1 AND r.title_id = $2");
        Ok(sqlx::query_as::<_, Review>(&sql)
            .bind(review_id)
            .bind(title_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// create_review
    ///
    /// Inserts and joins the author's username in one statement. The
    /// `uq_review_author_title` constraint makes a concurrent duplicate fail here
    /// rather than slipping past a read-then-write check.
    async fn create_review(
        &self,
        title_id: i64,
        author_id: Uuid,
        req: CreateReviewRequest,
    ) -> RepoResult<Review> {
        Ok(sqlx::query_as::<_, Review>(
            r#"
            WITH inserted AS (
                INSERT INTO reviews (title_id, author_id, text, score)
                VALUES ($1, $2, $3, $4)
                RETURNING id, title_id, author_id, text, score, pub_date
            )
            SELECT i.id, i.title_id, i.author_id, u.username AS author, i.text, i.score, i.pub_date
            FROM inserted i JOIN users u ON u.id = i.author_id
            "#,
        )
        .bind(title_id)
        .bind(author_id)
        .bind(req.text)
        .bind(req.score)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn update_review(
        &self,
        review_id: i64,
        req: UpdateReviewRequest,
    ) -> RepoResult<Option<Review>> {
        Ok(sqlx::query_as::<_, Review>(
            r#"
            WITH updated AS (
                UPDATE reviews SET text = COALESCE($2, text), score = COALESCE($3, score)
                WHERE id = $1
                RETURNING id, title_id, author_id, text, score, pub_date
            )
            SELECT d.id, d.title_id, d.author_id, u.username AS author, d.text, d.score, d.pub_date
            FROM updated d JOIN users u ON u.id = d.author_id
            "#,
        )
        .bind(review_id)
        .bind(req.text)
        .bind(req.score)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_review(&self, review_id: i64) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(review_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    // --- COMMENTS ---

    async fn list_comments(&self, review_id: i64, page: Pagination) -> RepoResult<Page<Comment>> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE review_id = $1")
            .bind(review_id)
            .fetch_one(&self.pool)
            .await?;
        let sql =
            format!("{COMMENT_SELECT} WHERE c.review_id = $1 ORDER BY c.id LIMIT $2 OFFSET $3");
        let results = sqlx::query_as::<_, Comment>(&sql)
            .bind(review_id)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await?;
        Ok(Page { count, results })
    }

    async fn get_comment(&self, review_id: i64, comment_id: i64) -> RepoResult<Option<Comment>> {
        let sql = format!("{COMMENT_SELECT} WHERE c.id = $1 AND c.review_id = $2");
        Ok(sqlx::query_as::<_, Comment>(&sql)
            .bind(comment_id)
            .bind(review_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_comment(
        &self,
        review_id: i64,
        author_id: Uuid,
        req: CreateCommentRequest,
    ) -> RepoResult<Comment> {
        Ok(sqlx::query_as::<_, Comment>(
            r#"
            WITH inserted AS (
                INSERT INTO comments (review_id, author_id, text)
                VALUES ($1, $2, $3)
                RETURNING id, review_id, author_id, text, pub_date
            )
            SELECT i.id, i.review_id, i.author_id, u.username AS author, i.text, i.pub_date
            FROM inserted i JOIN users u ON u.id = i.author_id
            "#,
        )
        .bind(review_id)
        .bind(author_id)
        .bind(req.text)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn update_comment(
        &self,
        comment_id: i64,
        req: UpdateCommentRequest,
    ) -> RepoResult<Option<Comment>> {
        Ok(sqlx::query_as::<_, Comment>(
            r#"
            WITH updated AS (
                UPDATE comments SET text = COALESCE($2, text)
                WHERE id = $1
                RETURNING id, review_id, author_id, text, pub_date
            )
            SELECT d.id, d.review_id, d.author_id, u.username AS author, d.text, d.pub_date
            FROM updated d JOIN users u ON u.id = d.author_id
            "#,
        )
        .bind(comment_id)
        .bind(req.text)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_comment(&self, comment_id: i64) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(comment_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}
