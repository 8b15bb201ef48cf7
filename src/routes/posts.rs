/**
 * Post Routes
 * CRUD API endpoints for blog posts, with slug derivation
 */
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::db::models::{Post, PostListing, PostSummary};
use crate::error::{ApiError, ApiResult};
use crate::routes::MessageResponse;
use crate::slug::slugify;
use crate::state::AppState;
use crate::uploads::WriteForm;

const POST_COLUMNS: &str = "id, title, slug, content, excerpt, cover_image, status, created_at";

pub const STATUS_DRAFT: &str = "draft";
pub const STATUS_PUBLISHED: &str = "published";

/// Query parameters for GET /api/posts
#[derive(Debug, Default, Deserialize)]
pub struct PostListQuery {
    pub status: Option<String>,
}

/// Response for POST /api/posts
#[derive(Debug, Serialize)]
pub struct CreatedPost {
    pub id: i64,
    pub slug: String,
}

/// Validate the publish status, defaulting to draft when unspecified.
fn normalize_status(raw: Option<String>) -> Result<String, ApiError> {
    match raw.as_deref() {
        None | Some("") => Ok(STATUS_DRAFT.to_string()),
        Some(STATUS_DRAFT) => Ok(STATUS_DRAFT.to_string()),
        Some(STATUS_PUBLISHED) => Ok(STATUS_PUBLISHED.to_string()),
        Some(other) => Err(ApiError::Validation(format!(
            "Invalid status '{}'. Expected 'draft' or 'published'.",
            other
        ))),
    }
}

/// Derive the slug from a required, non-empty title. Titles with no
/// slug-eligible characters are rejected rather than stored with an
/// empty slug.
fn derive_slug(title: &str) -> Result<String, ApiError> {
    let slug = slugify(title);
    if slug.is_empty() {
        return Err(ApiError::Validation(
            "Title must contain at least one letter or digit".to_string(),
        ));
    }
    Ok(slug)
}

fn require_title(raw: Option<String>) -> Result<String, ApiError> {
    raw.filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("Title is required".to_string()))
}

/// Map a unique-index violation on the derived slug to a conflict.
fn map_slug_conflict(e: sqlx::Error) -> ApiError {
    let is_unique_violation = e
        .as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false);

    if is_unique_violation {
        ApiError::Conflict("A post with this title already exists.".to_string())
    } else {
        ApiError::Database(e)
    }
}

/// GET /api/posts - Published posts (no full content), newest first.
/// `?status=all` switches to the administrative view: every post,
/// reduced field set.
pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<PostListQuery>,
) -> ApiResult<impl IntoResponse> {
    if query.status.as_deref() == Some("all") {
        let posts = sqlx::query_as::<_, PostListing>(
            r#"
            SELECT id, title, slug, status, created_at
            FROM posts
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(state.pool())
        .await?;
        return Ok(Json(posts).into_response());
    }

    let posts = sqlx::query_as::<_, PostSummary>(
        r#"
        SELECT id, title, slug, excerpt, cover_image, status, created_at
        FROM posts
        WHERE status = 'published'
        ORDER BY created_at DESC
        "#,
    )
    .fetch_all(state.pool())
    .await?;

    Ok(Json(posts).into_response())
}

/// GET /api/posts/:slug - Full post by slug, published only. Drafts are
/// reported as not found rather than revealing their existence.
pub async fn get_post(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<Post>> {
    let post = sqlx::query_as::<_, Post>(&format!(
        "SELECT {} FROM posts WHERE slug = $1 AND status = 'published'",
        POST_COLUMNS
    ))
    .bind(&slug)
    .fetch_optional(state.pool())
    .await?
    .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))?;

    Ok(Json(post))
}

/// POST /api/posts - Create a post. Title is required; the slug is
/// derived from it and uniqueness is enforced by the database, surfacing
/// as 409. An optional cover image is stored before the INSERT.
pub async fn create_post(
    State(state): State<AppState>,
    mut form: WriteForm,
) -> ApiResult<impl IntoResponse> {
    let title = require_title(form.take("title"))?;
    let slug = derive_slug(&title)?;
    let status = normalize_status(form.take("status"))?;

    let cover_image = match form.take_file() {
        Some(file) => Some(state.uploads().save(file).await?),
        None => None,
    };

    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO posts (title, slug, content, excerpt, cover_image, status)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(&title)
    .bind(&slug)
    .bind(form.take("content"))
    .bind(form.take("excerpt"))
    .bind(&cover_image)
    .bind(&status)
    .fetch_one(state.pool())
    .await
    .map_err(map_slug_conflict)?;

    Ok((StatusCode::CREATED, Json(CreatedPost { id, slug })))
}

/// PUT /api/posts/:id - Full overwrite. The slug is re-derived from the
/// (possibly changed) title, so renaming a post silently changes its
/// public URL. Cover image follows the upload-or-keep rule; createdAt is
/// immutable.
pub async fn update_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    mut form: WriteForm,
) -> ApiResult<Json<MessageResponse>> {
    let title = require_title(form.take("title"))?;
    let slug = derive_slug(&title)?;
    let status = normalize_status(form.take("status"))?;

    let cover_image = form
        .image_patch("coverImage")
        .resolve(state.uploads())
        .await?;

    sqlx::query(
        r#"
        UPDATE posts
        SET title = $1, slug = $2, content = $3, excerpt = $4, cover_image = $5, status = $6
        WHERE id = $7
        "#,
    )
    .bind(&title)
    .bind(&slug)
    .bind(form.take("content"))
    .bind(form.take("excerpt"))
    .bind(&cover_image)
    .bind(&status)
    .bind(id)
    .execute(state.pool())
    .await
    .map_err(map_slug_conflict)?;

    Ok(Json(MessageResponse::new("Post updated successfully")))
}

/// DELETE /api/posts/:id - Remove the row only; the cover image file is
/// intentionally left on disk, unlike the portfolio delete.
pub async fn delete_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<MessageResponse>> {
    sqlx::query("DELETE FROM posts WHERE id = $1")
        .bind(id)
        .execute(state.pool())
        .await?;

    Ok(Json(MessageResponse::new("Post deleted successfully")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_status_defaults_to_draft() {
        assert_eq!(normalize_status(None).unwrap(), "draft");
        assert_eq!(normalize_status(Some(String::new())).unwrap(), "draft");
    }

    #[test]
    fn test_normalize_status_accepts_known_values() {
        assert_eq!(normalize_status(Some("draft".into())).unwrap(), "draft");
        assert_eq!(
            normalize_status(Some("published".into())).unwrap(),
            "published"
        );
    }

    #[test]
    fn test_normalize_status_rejects_unknown_values() {
        let err = normalize_status(Some("archived".into())).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn test_require_title() {
        assert_eq!(require_title(Some("Hello".into())).unwrap(), "Hello");
        assert!(require_title(None).is_err());
        assert!(require_title(Some("   ".into())).is_err());
    }

    #[test]
    fn test_derive_slug_rejects_empty_result() {
        assert_eq!(derive_slug("My Great Post!").unwrap(), "my-great-post");
        let err = derive_slug("!!!").unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn test_map_slug_conflict_passes_through_other_errors() {
        let err = map_slug_conflict(sqlx::Error::PoolClosed);
        assert!(matches!(err, ApiError::Database(_)));
    }

    /// Stand-in for a driver error so both mapping branches can be
    /// exercised without a live database.
    #[derive(Debug)]
    struct StubDbError {
        message: &'static str,
        unique: bool,
    }

    impl std::fmt::Display for StubDbError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.message)
        }
    }

    impl std::error::Error for StubDbError {}

    impl sqlx::error::DatabaseError for StubDbError {
        fn message(&self) -> &str {
            self.message
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            if self.unique {
                sqlx::error::ErrorKind::UniqueViolation
            } else {
                sqlx::error::ErrorKind::Other
            }
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }
    }

    #[test]
    fn test_map_slug_conflict_maps_unique_violation_to_conflict() {
        let db_error = StubDbError {
            message: "duplicate key value violates unique constraint \"idx_posts_slug\"",
            unique: true,
        };
        let err = map_slug_conflict(sqlx::Error::Database(Box::new(db_error)));
        match err {
            ApiError::Conflict(msg) => {
                assert_eq!(msg, "A post with this title already exists.")
            }
            other => panic!("expected Conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_map_slug_conflict_keeps_other_database_errors() {
        let db_error = StubDbError {
            message: "deadlock detected",
            unique: false,
        };
        let err = map_slug_conflict(sqlx::Error::Database(Box::new(db_error)));
        assert!(matches!(err, ApiError::Database(_)));
    }
}
