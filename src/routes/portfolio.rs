/**
 * Portfolio Routes
 * CRUD API endpoints for portfolio entries
 */
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::db::models::PortfolioItem;
use crate::error::{ApiError, ApiResult};
use crate::routes::MessageResponse;
use crate::state::AppState;
use crate::uploads::WriteForm;

const ITEM_COLUMNS: &str = "id, title, description, image_url, project_url, github_url, tags";

/// GET /api/portfolio - All entries, newest first. No pagination.
pub async fn list_items(State(state): State<AppState>) -> ApiResult<Json<Vec<PortfolioItem>>> {
    let items = sqlx::query_as::<_, PortfolioItem>(&format!(
        "SELECT {} FROM portfolio ORDER BY id DESC",
        ITEM_COLUMNS
    ))
    .fetch_all(state.pool())
    .await?;

    Ok(Json(items))
}

/// GET /api/portfolio/:id - Single entry by id
pub async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<PortfolioItem>> {
    let item = sqlx::query_as::<_, PortfolioItem>(&format!(
        "SELECT {} FROM portfolio WHERE id = $1",
        ITEM_COLUMNS
    ))
    .bind(id)
    .fetch_optional(state.pool())
    .await?
    .ok_or_else(|| ApiError::NotFound("Portfolio item not found".to_string()))?;

    Ok(Json(item))
}

/// POST /api/portfolio - Create an entry, optionally storing an uploaded
/// image first. The upload happens before the INSERT; a failed write to
/// disk aborts the request with no database mutation.
pub async fn create_item(
    State(state): State<AppState>,
    mut form: WriteForm,
) -> ApiResult<impl IntoResponse> {
    let image_url = match form.take_file() {
        Some(file) => Some(state.uploads().save(file).await?),
        None => None,
    };

    let item = sqlx::query_as::<_, PortfolioItem>(&format!(
        r#"
        INSERT INTO portfolio (title, description, image_url, project_url, github_url, tags)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {}
        "#,
        ITEM_COLUMNS
    ))
    .bind(form.take("title"))
    .bind(form.take("description"))
    .bind(&image_url)
    .bind(form.take("projectUrl"))
    .bind(form.take("githubUrl"))
    .bind(form.take("tags"))
    .fetch_one(state.pool())
    .await?;

    Ok((StatusCode::CREATED, Json(item)))
}

/// PUT /api/portfolio/:id - Full overwrite of an entry. A new upload
/// replaces the stored image; otherwise a resent imageUrl field is kept;
/// otherwise the column is cleared. The caller must resend unchanged
/// fields.
pub async fn update_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    mut form: WriteForm,
) -> ApiResult<Json<MessageResponse>> {
    let image_url = form.image_patch("imageUrl").resolve(state.uploads()).await?;

    sqlx::query(
        r#"
        UPDATE portfolio
        SET title = $1, description = $2, image_url = $3, project_url = $4, github_url = $5, tags = $6
        WHERE id = $7
        "#,
    )
    .bind(form.take("title"))
    .bind(form.take("description"))
    .bind(&image_url)
    .bind(form.take("projectUrl"))
    .bind(form.take("githubUrl"))
    .bind(form.take("tags"))
    .bind(id)
    .execute(state.pool())
    .await?;

    Ok(Json(MessageResponse::new("Portfolio updated successfully")))
}

/// DELETE /api/portfolio/:id - Remove the entry and its image file.
///
/// Sequence: read the stored image_url, delete the file if it exists,
/// then delete the row. The two steps are sequential and non-atomic;
/// a row-delete failure after the file is gone leaves the image lost
/// with the row still present. Documented inconsistency window.
pub async fn delete_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<MessageResponse>> {
    let row: Option<(Option<String>,)> =
        sqlx::query_as("SELECT image_url FROM portfolio WHERE id = $1")
            .bind(id)
            .fetch_optional(state.pool())
            .await?;

    if let Some((Some(image_url),)) = row {
        // Best-effort: a missing or undeletable file does not block the
        // row delete.
        if let Err(e) = state.uploads().remove_by_url(&image_url).await {
            tracing::warn!(id, image_url = %image_url, "failed to delete portfolio image: {}", e);
        }
    }

    sqlx::query("DELETE FROM portfolio WHERE id = $1")
        .bind(id)
        .execute(state.pool())
        .await?;

    Ok(Json(MessageResponse::new("Portfolio deleted successfully")))
}
