// src/handlers/results.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde_json::json;
use sqlx::PgPool;

use crate::{
    error::AppError,
    grading::{PgStore, QuizStore},
    handlers::fiches::find_owned_fiche,
    models::{
        attempt::{
            AnswerReview, AttemptReview, AttemptSummary, FicheAttemptRow, FicheStats, QuestionAnswer,
            StudentAttemptRow, StudentStats,
        },
        question::QuizDefinition,
        user::Role,
    },
    utils::jwt::Claims,
};

/// Attaches question and answer texts to the recorded answers.
///
/// Deleting a question also deletes its recorded answers, so every row
/// normally resolves. A question deleted between listing the answers and
/// loading the definition still shows its verdict, without text.
fn review_answers(answers: Vec<QuestionAnswer>, definition: &QuizDefinition) -> Vec<AnswerReview> {
    answers
        .into_iter()
        .map(|qa| {
            let question = definition.question(qa.question_id);
            AnswerReview {
                question_id: qa.question_id,
                question_text: question.map(|q| q.text.clone()),
                selected_answer_id: qa.selected_answer_id,
                selected_answer_text: question
                    .and_then(|q| q.answer(qa.selected_answer_id))
                    .map(|a| a.text.clone()),
                correct_answer_texts: question
                    .map(|q| q.correct_answers().map(|a| a.text.clone()).collect())
                    .unwrap_or_default(),
                is_correct: qa.is_correct,
            }
        })
        .collect()
}

/// Detailed result of one attempt, answers in question order.
///
/// Visible to the student who made it, the fiche author and admins.
pub async fn get_attempt(
    State(pool): State<PgPool>,
    State(store): State<PgStore>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = store
        .find_attempt(id)
        .await?
        .ok_or(AppError::NotFound("Attempt not found".to_string()))?;

    let user_id = claims.user_id()?;
    if attempt.student_id != user_id && claims.role() != Role::Admin {
        let author_id: Option<i64> = sqlx::query_scalar("SELECT author_id FROM fiches WHERE id = $1")
            .bind(attempt.fiche_id)
            .fetch_optional(&pool)
            .await?;
        if author_id != Some(user_id) {
            return Err(AppError::Forbidden("You do not have access to these results".to_string()));
        }
    }

    let answers = store.list_question_answers(attempt.id).await?;
    let definition = store.load_quiz_definition(attempt.fiche_id).await?;

    Ok(Json(AttemptReview {
        answers: review_answers(answers, &definition),
        attempt: AttemptSummary::from(attempt),
    }))
}

/// The caller's quiz history, newest first, with summary statistics.
pub async fn my_results(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let attempts = sqlx::query_as::<_, StudentAttemptRow>(
        r#"
        SELECT
            a.id, a.fiche_id, f.title AS fiche_title, a.score,
            a.correct_answers, a.total_questions, a.time_spent_seconds, a.completed_at
        FROM quiz_attempts a
        JOIN fiches f ON f.id = a.fiche_id
        WHERE a.student_id = $1
        ORDER BY a.completed_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch student results: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let stats = StudentStats::from_rows(&attempts);

    Ok(Json(json!({
        "attempts": attempts,
        "stats": stats,
    })))
}

/// All attempts on a fiche with statistics. Author or admin only.
pub async fn fiche_results(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(fiche_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let fiche = find_owned_fiche(&pool, fiche_id, &claims).await?;

    let attempts = sqlx::query_as::<_, FicheAttemptRow>(
        r#"
        SELECT
            a.id, a.student_id, u.username AS student_username, a.score,
            a.correct_answers, a.total_questions, a.time_spent_seconds, a.completed_at
        FROM quiz_attempts a
        JOIN users u ON u.id = a.student_id
        WHERE a.fiche_id = $1
        ORDER BY a.completed_at DESC
        "#,
    )
    .bind(fiche.id)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch fiche results: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let stats = FicheStats::from_rows(&attempts);

    Ok(Json(json!({
        "fiche_id": fiche.id,
        "title": fiche.title,
        "attempts": attempts,
        "stats": stats,
    })))
}
