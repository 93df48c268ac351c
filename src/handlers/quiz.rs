// src/handlers/quiz.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;

use crate::{
    config::Config,
    error::AppError,
    grading::{GradingError, PgStore, QuizStore, grade_submission},
    handlers::fiches::find_visible_fiche,
    models::{
        attempt::{AttemptSummary, SubmitQuizRequest},
        question::PublicQuestion,
    },
    utils::jwt::{Claims, elapsed_since_quiz_start, quiz_started_at, sign_quiz_token_started_at},
};

#[derive(Debug, Deserialize)]
pub struct OpenQuizParams {
    /// Token from an earlier opening of the same quiz. Keeps the timer running.
    pub quiz_token: Option<String>,
}

/// Opens the quiz of a fiche.
///
/// Returns the questions without correctness flags and a quiz token
/// recording when the quiz was opened. Reopening with a still valid token
/// keeps the original start time.
pub async fn open_quiz(
    State(pool): State<PgPool>,
    State(store): State<PgStore>,
    State(config): State<Config>,
    Extension(claims): Extension<Claims>,
    Path(fiche_id): Path<i64>,
    Query(params): Query<OpenQuizParams>,
) -> Result<impl IntoResponse, AppError> {
    let fiche = find_visible_fiche(&pool, fiche_id, &claims).await?;
    let user_id = claims.user_id()?;

    let definition = store.load_quiz_definition(fiche.id).await.map_err(|e| {
        tracing::error!("Failed to load quiz definition: {:?}", e);
        AppError::from(e)
    })?;

    if definition.is_empty() {
        return Err(GradingError::EmptyQuiz { fiche_id }.into());
    }

    let malformed = definition.questions.iter().filter(|q| !q.is_well_formed()).count();
    if malformed > 0 {
        tracing::warn!(fiche_id, malformed, "Quiz has questions without a correct answer or with fewer than two answers");
    }

    let started_at = quiz_started_at(params.quiz_token.as_deref(), user_id, fiche.id, &config.jwt_secret)
        .unwrap_or_else(|| Utc::now().timestamp());
    let quiz_token =
        sign_quiz_token_started_at(user_id, fiche.id, started_at, &config.jwt_secret, config.quiz_token_ttl)?;
    let questions: Vec<PublicQuestion> = definition.questions.iter().map(PublicQuestion::from).collect();

    Ok(Json(json!({
        "fiche_id": fiche.id,
        "title": fiche.title,
        "questions": questions,
        "quiz_token": quiz_token,
        "expires_in": config.quiz_token_ttl,
    })))
}

/// Grades a quiz submission.
///
/// The quiz definition is reloaded here, the client only supplies choices.
/// Returns 201 Created with the recorded attempt.
pub async fn submit_quiz(
    State(pool): State<PgPool>,
    State(store): State<PgStore>,
    State(config): State<Config>,
    Extension(claims): Extension<Claims>,
    Path(fiche_id): Path<i64>,
    Json(req): Json<SubmitQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    let fiche = find_visible_fiche(&pool, fiche_id, &claims).await?;
    let student_id = claims.user_id()?;

    let definition = store.load_quiz_definition(fiche.id).await.map_err(|e| {
        tracing::error!("Failed to load quiz definition: {:?}", e);
        AppError::from(e)
    })?;

    let choices = req.choices();
    if choices.len() < req.answers.len() {
        tracing::debug!(
            fiche_id,
            dropped = req.answers.len() - choices.len(),
            "Dropped unreadable submission entries"
        );
    }

    let elapsed = elapsed_since_quiz_start(
        req.quiz_token.as_deref(),
        student_id,
        fiche.id,
        &config.jwt_secret,
    );

    let attempt = grade_submission(&store, &definition, student_id, &choices, elapsed).await?;

    Ok((StatusCode::CREATED, Json(AttemptSummary::from(attempt))))
}
