// src/handlers/questions.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use validator::Validate;

use crate::{
    error::AppError,
    grading::{PgStore, QuizStore},
    handlers::fiches::find_owned_fiche,
    models::question::{AnswerInput, NO_CORRECT_ANSWER_WARNING, Question, QuestionRequest},
    utils::jwt::Claims,
};

/// Fiche that owns a question.
async fn question_fiche_id(pool: &PgPool, question_id: i64) -> Result<i64, AppError> {
    sqlx::query_scalar::<_, i64>("SELECT fiche_id FROM questions WHERE id = $1")
        .bind(question_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Question not found".to_string()))
}

async fn insert_answers(
    tx: &mut Transaction<'_, Postgres>,
    question_id: i64,
    answers: &[&AnswerInput],
) -> Result<(), sqlx::Error> {
    let mut builder =
        QueryBuilder::<Postgres>::new("INSERT INTO answers (question_id, text, is_correct, display_order) ");
    builder.push_values(answers, |mut row, answer| {
        row.push_bind(question_id)
            .push_bind(answer.text.trim().to_string())
            .push_bind(answer.is_correct)
            .push_bind(answer.order);
    });
    builder.build().execute(&mut **tx).await?;
    Ok(())
}

fn log_warnings(question_id: i64, warnings: &[String]) {
    for warning in warnings {
        tracing::warn!(question_id, "{}", warning);
    }
}

fn question_warnings(question: &Question) -> Vec<String> {
    if question.correct_answers().next().is_none() {
        vec![NO_CORRECT_ANSWER_WARNING.to_string()]
    } else {
        Vec::new()
    }
}

/// Questions of a fiche with their answers, ids and correctness flags,
/// in quiz order. Author or admin only.
pub async fn list_questions(
    State(pool): State<PgPool>,
    State(store): State<PgStore>,
    Extension(claims): Extension<Claims>,
    Path(fiche_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let fiche = find_owned_fiche(&pool, fiche_id, &claims).await?;
    let definition = store.load_quiz_definition(fiche.id).await?;

    let questions: Vec<_> = definition
        .questions
        .iter()
        .map(|q| json!({ "question": q, "warnings": question_warnings(q) }))
        .collect();

    Ok(Json(json!({
        "fiche_id": fiche.id,
        "title": fiche.title,
        "questions": questions,
    })))
}

/// One question with its answers as stored, for editing.
/// Author or admin only.
pub async fn get_question(
    State(pool): State<PgPool>,
    State(store): State<PgStore>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let fiche_id = question_fiche_id(&pool, id).await?;
    find_owned_fiche(&pool, fiche_id, &claims).await?;

    let definition = store.load_quiz_definition(fiche_id).await?;
    let question = definition
        .question(id)
        .ok_or(AppError::NotFound("Question not found".to_string()))?;

    Ok(Json(json!({
        "question": question,
        "warnings": question_warnings(question),
    })))
}

/// Adds a question with its answers to a fiche.
/// Author or admin only. Returns the id and any authoring warnings.
pub async fn create_question(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(fiche_id): Path<i64>,
    Json(payload): Json<QuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    find_owned_fiche(&pool, fiche_id, &claims).await?;

    let mut tx = pool.begin().await?;

    let question_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO questions (fiche_id, text, display_order, points)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(fiche_id)
    .bind(payload.text.trim())
    .bind(payload.order)
    .bind(payload.points)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create question: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let answers: Vec<&AnswerInput> = payload.answers.iter().collect();
    insert_answers(&mut tx, question_id, &answers).await.map_err(|e| {
        tracing::error!("Failed to create answers: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    tx.commit().await?;

    let warnings = payload.warnings();
    log_warnings(question_id, &warnings);

    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": question_id, "warnings": warnings })),
    ))
}

/// Replaces a question's text, order, points and answer set.
/// Answers sent with their id are edited in place, others are added,
/// and answers left out are deleted.
/// Author or admin only.
pub async fn update_question(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<QuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let fiche_id = question_fiche_id(&pool, id).await?;
    find_owned_fiche(&pool, fiche_id, &claims).await?;

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        UPDATE questions
        SET text = $1, display_order = $2, points = $3, updated_at = NOW()
        WHERE id = $4
        "#,
    )
    .bind(payload.text.trim())
    .bind(payload.order)
    .bind(payload.points)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    // Answers that are kept keep their id, so past attempts still point at them.
    let existing: Vec<i64> = sqlx::query_scalar("SELECT id FROM answers WHERE question_id = $1")
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

    let (kept, added): (Vec<&AnswerInput>, Vec<&AnswerInput>) = payload
        .answers
        .iter()
        .partition(|a| a.id.is_some_and(|answer_id| existing.contains(&answer_id)));
    let kept_ids: Vec<i64> = kept.iter().filter_map(|a| a.id).collect();

    sqlx::query("DELETE FROM answers WHERE question_id = $1 AND NOT (id = ANY($2))")
        .bind(id)
        .bind(&kept_ids)
        .execute(&mut *tx)
        .await?;

    for answer in &kept {
        sqlx::query("UPDATE answers SET text = $1, is_correct = $2, display_order = $3 WHERE id = $4")
            .bind(answer.text.trim())
            .bind(answer.is_correct)
            .bind(answer.order)
            .bind(answer.id)
            .execute(&mut *tx)
            .await?;
    }

    if !added.is_empty() {
        insert_answers(&mut tx, id, &added).await.map_err(|e| {
            tracing::error!("Failed to add answers: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;
    }

    tx.commit().await?;

    let warnings = payload.warnings();
    log_warnings(id, &warnings);

    Ok(Json(json!({ "id": id, "warnings": warnings })))
}

/// Deletes a question and its answers. Author or admin only.
pub async fn delete_question(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let fiche_id = question_fiche_id(&pool, id).await?;
    find_owned_fiche(&pool, fiche_id, &claims).await?;

    sqlx::query("DELETE FROM questions WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete question: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    Ok(StatusCode::NO_CONTENT)
}
