// src/handlers/fiches.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use validator::Validate;

use crate::{
    config::RECENT_ATTEMPTS_LIMIT,
    error::AppError,
    grading::{PgStore, QuizStore},
    models::{
        attempt::QuizAttempt,
        fiche::{
            CreateFicheRequest, Fiche, FicheListItem, FicheListParams, FicheRef, PendingWork,
            UpdateFicheRequest, contains_pattern,
        },
        user::Role,
    },
    utils::{jwt::Claims, sanitize::sanitize_fiche_content},
};

const FICHE_COLUMNS: &str = "id, title, description, content, author_id, category, difficulty_level, \
                             is_published, views_count, created_at, updated_at";

async fn find_fiche(pool: &PgPool, id: i64) -> Result<Fiche, AppError> {
    sqlx::query_as::<_, Fiche>(&format!("SELECT {FICHE_COLUMNS} FROM fiches WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Fiche not found".to_string()))
}

/// Loads a fiche the caller is allowed to modify (its author, or an admin).
pub(crate) async fn find_owned_fiche(pool: &PgPool, id: i64, claims: &Claims) -> Result<Fiche, AppError> {
    let fiche = find_fiche(pool, id).await?;
    if fiche.author_id != claims.user_id()? && claims.role() != Role::Admin {
        return Err(AppError::Forbidden("You can only manage your own fiches".to_string()));
    }
    Ok(fiche)
}

/// Loads a fiche the caller may read: published, or their own, or any for admins.
pub(crate) async fn find_visible_fiche(pool: &PgPool, id: i64, claims: &Claims) -> Result<Fiche, AppError> {
    let fiche = find_fiche(pool, id).await?;
    if !fiche.is_published && fiche.author_id != claims.user_id()? && claims.role() != Role::Admin {
        return Err(AppError::NotFound("Fiche not found".to_string()));
    }
    Ok(fiche)
}

/// Lists published fiches, newest first.
pub async fn list_fiches(
    State(pool): State<PgPool>,
    Query(params): Query<FicheListParams>,
) -> Result<impl IntoResponse, AppError> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        r#"
        SELECT
            f.id, f.title, f.description, f.category, f.difficulty_level,
            u.username AS author_username, f.views_count,
            (SELECT COUNT(*) FROM questions q WHERE q.fiche_id = f.id) AS question_count,
            f.created_at
        FROM fiches f
        JOIN users u ON u.id = f.author_id
        WHERE f.is_published = TRUE
        "#,
    );

    if let Some(category) = params.category.filter(|c| !c.trim().is_empty()) {
        builder.push(" AND f.category = ");
        builder.push_bind(category);
    }

    if let Some(search) = params.search.filter(|s| !s.trim().is_empty()) {
        let pattern = contains_pattern(&search);
        builder.push(" AND (f.title ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR f.description ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR f.category ILIKE ");
        builder.push_bind(pattern);
        builder.push(")");
    }
    builder.push(" ORDER BY f.created_at DESC");

    let fiches: Vec<FicheListItem> = builder
        .build_query_as()
        .fetch_all(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list fiches: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    let categories: Vec<String> = sqlx::query_scalar(
        "SELECT DISTINCT category FROM fiches WHERE is_published = TRUE AND category <> '' ORDER BY category",
    )
    .fetch_all(&pool)
    .await?;

    Ok(Json(json!({
        "fiches": fiches,
        "categories": categories,
    })))
}

/// Returns a fiche, counts the view and joins the caller's latest attempts.
pub async fn get_fiche(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut fiche = find_visible_fiche(&pool, id, &claims).await?;
    let user_id = claims.user_id()?;

    fiche.views_count = sqlx::query_scalar::<_, i64>(
        "UPDATE fiches SET views_count = views_count + 1 WHERE id = $1 RETURNING views_count",
    )
    .bind(id)
    .fetch_one(&pool)
    .await?;

    let question_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM questions WHERE fiche_id = $1")
        .bind(id)
        .fetch_one(&pool)
        .await?;

    let recent_attempts = sqlx::query_as::<_, QuizAttempt>(
        r#"
        SELECT id, student_id, fiche_id, score, total_questions, correct_answers, time_spent_seconds, completed_at
        FROM quiz_attempts
        WHERE fiche_id = $1 AND student_id = $2
        ORDER BY completed_at DESC
        LIMIT $3
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(RECENT_ATTEMPTS_LIMIT)
    .fetch_all(&pool)
    .await?;

    Ok(Json(json!({
        "fiche": fiche,
        "question_count": question_count,
        "recent_attempts": recent_attempts,
    })))
}

/// Creates a fiche authored by the caller.
/// Teachers and admins only.
pub async fn create_fiche(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateFicheRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let author_id = claims.user_id()?;

    let fiche = sqlx::query_as::<_, Fiche>(&format!(
        r#"
        INSERT INTO fiches (title, description, content, author_id, category, difficulty_level, is_published)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {FICHE_COLUMNS}
        "#
    ))
    .bind(payload.title.trim())
    .bind(payload.description.trim())
    .bind(sanitize_fiche_content(&payload.content))
    .bind(author_id)
    .bind(payload.category.trim())
    .bind(&payload.difficulty_level)
    .bind(payload.is_published)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create fiche: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    tracing::info!(fiche_id = fiche.id, author_id, "Fiche created");

    Ok((StatusCode::CREATED, Json(fiche)))
}

/// Updates a fiche. Author or admin only.
pub async fn update_fiche(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateFicheRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    find_owned_fiche(&pool, id, &claims).await?;

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE fiches SET updated_at = NOW()");

    if let Some(title) = payload.title {
        builder.push(", title = ");
        builder.push_bind(title.trim().to_string());
    }

    if let Some(description) = payload.description {
        builder.push(", description = ");
        builder.push_bind(description.trim().to_string());
    }

    if let Some(content) = payload.content {
        builder.push(", content = ");
        builder.push_bind(sanitize_fiche_content(&content));
    }

    if let Some(category) = payload.category {
        builder.push(", category = ");
        builder.push_bind(category.trim().to_string());
    }

    if let Some(difficulty_level) = payload.difficulty_level {
        builder.push(", difficulty_level = ");
        builder.push_bind(difficulty_level);
    }

    if let Some(is_published) = payload.is_published {
        builder.push(", is_published = ");
        builder.push_bind(is_published);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    builder.build().execute(&pool).await.map_err(|e| {
        tracing::error!("Failed to update fiche: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(StatusCode::OK)
}

/// Deletes a fiche with its questions and attempts. Author or admin only.
pub async fn delete_fiche(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    find_owned_fiche(&pool, id, &claims).await?;

    let result = sqlx::query("DELETE FROM fiches WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete fiche: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Fiche not found".to_string()));
    }

    tracing::info!(fiche_id = id, "Fiche deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Outstanding authoring work on the caller's fiches (every fiche for admins):
/// unpublished fiches, published fiches without questions and questions
/// that cannot be answered correctly.
pub async fn pending_work(
    State(pool): State<PgPool>,
    State(store): State<PgStore>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let author_id = match claims.role() {
        Role::Admin => None,
        _ => Some(claims.user_id()?),
    };

    let fiches = sqlx::query_as::<_, FicheRef>(
        r#"
        SELECT id, title, is_published
        FROM fiches
        WHERE ($1::BIGINT IS NULL OR author_id = $1)
        ORDER BY created_at DESC
        "#,
    )
    .bind(author_id)
    .fetch_all(&pool)
    .await?;

    let mut pending = PendingWork::default();
    for fiche in &fiches {
        let definition = store.load_quiz_definition(fiche.id).await?;
        pending.add_fiche(fiche, &definition);
    }

    if !pending.is_empty() {
        tracing::debug!(
            ?author_id,
            questions = pending.questions_without_correct_answer.len() + pending.questions_with_too_few_answers.len(),
            "Pending authoring work"
        );
    }

    Ok(Json(pending))
}
