// src/grading/postgres.rs

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;

use super::store::{NewAttempt, NewQuestionAnswer, QuizStore, StoreError};
use crate::models::{
    attempt::{QuestionAnswer, QuizAttempt},
    question::{Answer, Question, QuizDefinition},
};

/// PostgreSQL-backed [`QuizStore`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuizStore for PgStore {
    async fn load_quiz_definition(&self, fiche_id: i64) -> Result<QuizDefinition, StoreError> {
        let mut questions = sqlx::query_as::<_, Question>(
            r#"
            SELECT id, fiche_id, text, display_order, points
            FROM questions
            WHERE fiche_id = $1
            ORDER BY display_order, created_at, id
            "#,
        )
        .bind(fiche_id)
        .fetch_all(&self.pool)
        .await?;

        if questions.is_empty() {
            return Ok(QuizDefinition {
                fiche_id,
                questions,
            });
        }

        let question_ids: Vec<i64> = questions.iter().map(|q| q.id).collect();
        let answers = sqlx::query_as::<_, Answer>(
            r#"
            SELECT id, question_id, text, is_correct, display_order
            FROM answers
            WHERE question_id = ANY($1)
            ORDER BY display_order, created_at, id
            "#,
        )
        .bind(&question_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_question: HashMap<i64, Vec<Answer>> = HashMap::new();
        for answer in answers {
            by_question.entry(answer.question_id).or_default().push(answer);
        }
        for question in &mut questions {
            question.answers = by_question.remove(&question.id).unwrap_or_default();
        }

        Ok(QuizDefinition {
            fiche_id,
            questions,
        })
    }

    async fn record_attempt(
        &self,
        attempt: NewAttempt,
        answers: Vec<NewQuestionAnswer>,
    ) -> Result<QuizAttempt, StoreError> {
        // Dropping the transaction without commit rolls everything back.
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query_as::<_, QuizAttempt>(
            r#"
            INSERT INTO quiz_attempts
                (student_id, fiche_id, score, total_questions, correct_answers, time_spent_seconds, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, student_id, fiche_id, score, total_questions, correct_answers, time_spent_seconds, completed_at
            "#,
        )
        .bind(attempt.student_id)
        .bind(attempt.fiche_id)
        .bind(attempt.score)
        .bind(attempt.total_questions)
        .bind(attempt.correct_answers)
        .bind(attempt.time_spent_seconds)
        .bind(attempt.completed_at)
        .fetch_one(&mut *tx)
        .await?;

        if !answers.is_empty() {
            let mut builder = sqlx::QueryBuilder::<sqlx::Postgres>::new(
                "INSERT INTO question_answers (attempt_id, question_id, selected_answer_id, is_correct, answered_at) ",
            );
            builder.push_values(&answers, |mut row, answer| {
                row.push_bind(created.id)
                    .push_bind(answer.question_id)
                    .push_bind(answer.selected_answer_id)
                    .push_bind(answer.is_correct)
                    .push_bind(answer.answered_at);
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;

        Ok(created)
    }

    async fn find_attempt(&self, attempt_id: i64) -> Result<Option<QuizAttempt>, StoreError> {
        let attempt = sqlx::query_as::<_, QuizAttempt>(
            r#"
            SELECT id, student_id, fiche_id, score, total_questions, correct_answers, time_spent_seconds, completed_at
            FROM quiz_attempts
            WHERE id = $1
            "#,
        )
        .bind(attempt_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(attempt)
    }

    async fn list_question_answers(&self, attempt_id: i64) -> Result<Vec<QuestionAnswer>, StoreError> {
        let answers = sqlx::query_as::<_, QuestionAnswer>(
            r#"
            SELECT qa.id, qa.attempt_id, qa.question_id, qa.selected_answer_id, qa.is_correct, qa.answered_at
            FROM question_answers qa
            JOIN questions q ON q.id = qa.question_id
            WHERE qa.attempt_id = $1
            ORDER BY q.display_order, q.created_at, q.id
            "#,
        )
        .bind(attempt_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(answers)
    }
}
