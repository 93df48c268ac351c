// src/grading/store.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{
    attempt::{QuestionAnswer, QuizAttempt},
    question::QuizDefinition,
};

/// Errors raised by a [`QuizStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The store refused the write (constraint violation, injected failure).
    #[error("write rejected: {0}")]
    Rejected(String),
}

/// Attempt row about to be written. The store assigns the id.
#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub student_id: i64,
    pub fiche_id: i64,
    pub score: Decimal,
    pub total_questions: i32,
    pub correct_answers: i32,
    pub time_spent_seconds: Option<i64>,
    pub completed_at: DateTime<Utc>,
}

/// Per-question answer about to be written under a new attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct NewQuestionAnswer {
    pub question_id: i64,
    pub selected_answer_id: i64,
    pub is_correct: bool,
    pub answered_at: DateTime<Utc>,
}

/// Persistence the grading engine depends on.
#[async_trait]
pub trait QuizStore: Send + Sync {
    /// Loads every question of a fiche with its answers, in display order.
    /// A fiche without questions yields an empty definition.
    async fn load_quiz_definition(&self, fiche_id: i64) -> Result<QuizDefinition, StoreError>;

    /// Writes the attempt and all of its answers, or nothing at all.
    async fn record_attempt(
        &self,
        attempt: NewAttempt,
        answers: Vec<NewQuestionAnswer>,
    ) -> Result<QuizAttempt, StoreError>;

    async fn find_attempt(&self, attempt_id: i64) -> Result<Option<QuizAttempt>, StoreError>;

    /// Answers of one attempt, in the question order of the fiche.
    async fn list_question_answers(&self, attempt_id: i64) -> Result<Vec<QuestionAnswer>, StoreError>;
}
