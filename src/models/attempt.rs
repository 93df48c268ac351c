// src/models/attempt.rs

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::config::PASSING_SCORE_PERCENTAGE;

/// Question id -> selected answer id, as parsed from a submission.
pub type SubmittedChoices = HashMap<i64, i64>;

/// Represents the 'quiz_attempts' table in the database.
/// Written once by the grading engine and never updated.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct QuizAttempt {
    pub id: i64,
    pub student_id: i64,
    pub fiche_id: i64,
    /// Percentage in [0, 100] with two decimals.
    pub score: Decimal,
    pub total_questions: i32,
    pub correct_answers: i32,
    pub time_spent_seconds: Option<i64>,
    pub completed_at: DateTime<Utc>,
}

impl QuizAttempt {
    pub fn passed(&self) -> bool {
        self.score >= Decimal::from(PASSING_SCORE_PERCENTAGE)
    }
}

/// Represents the 'question_answers' table in the database.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct QuestionAnswer {
    pub id: i64,
    pub attempt_id: i64,
    pub question_id: i64,
    pub selected_answer_id: i64,
    /// Snapshot taken at grading time, never recomputed.
    pub is_correct: bool,
    pub answered_at: DateTime<Utc>,
}

/// DTO for submitting a quiz.
#[derive(Debug, Deserialize)]
pub struct SubmitQuizRequest {
    /// The token received when the quiz was opened. Only used for timing.
    pub quiz_token: Option<String>,

    /// Raw answers map.
    /// Key: question id, either `"12"` or `"question_12"`.
    /// Value: selected answer id, as a number or a numeric string.
    #[serde(default)]
    pub answers: HashMap<String, serde_json::Value>,
}

impl SubmitQuizRequest {
    /// Turns the loosely-typed payload into a typed choice map.
    /// Entries that cannot be read as ids are dropped.
    pub fn choices(&self) -> SubmittedChoices {
        self.answers
            .iter()
            .filter_map(|(key, value)| {
                let question_id = parse_question_key(key)?;
                let answer_id = parse_answer_value(value)?;
                Some((question_id, answer_id))
            })
            .collect()
    }
}

fn parse_question_key(key: &str) -> Option<i64> {
    let key = key.trim();
    key.strip_prefix("question_").unwrap_or(key).parse().ok()
}

fn parse_answer_value(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Response returned after a submission has been graded.
#[derive(Debug, Serialize)]
pub struct AttemptSummary {
    pub id: i64,
    pub fiche_id: i64,
    pub score: Decimal,
    pub correct_answers: i32,
    pub total_questions: i32,
    pub time_spent_seconds: Option<i64>,
    pub completed_at: DateTime<Utc>,
    pub passed: bool,
}

impl From<QuizAttempt> for AttemptSummary {
    fn from(attempt: QuizAttempt) -> Self {
        let passed = attempt.passed();
        Self {
            id: attempt.id,
            fiche_id: attempt.fiche_id,
            score: attempt.score,
            correct_answers: attempt.correct_answers,
            total_questions: attempt.total_questions,
            time_spent_seconds: attempt.time_spent_seconds,
            completed_at: attempt.completed_at,
            passed,
        }
    }
}

/// One line of an attempt review, in question order.
#[derive(Debug, Serialize)]
pub struct AnswerReview {
    pub question_id: i64,
    /// `None` when the question was deleted after grading.
    pub question_text: Option<String>,
    pub selected_answer_id: i64,
    pub selected_answer_text: Option<String>,
    pub correct_answer_texts: Vec<String>,
    pub is_correct: bool,
}

/// Attempt together with its per-question breakdown.
#[derive(Debug, Serialize)]
pub struct AttemptReview {
    #[serde(flatten)]
    pub attempt: AttemptSummary,
    pub answers: Vec<AnswerReview>,
}

/// Attempt row joined with the fiche title, for a student's history.
#[derive(Debug, Serialize, FromRow)]
pub struct StudentAttemptRow {
    pub id: i64,
    pub fiche_id: i64,
    pub fiche_title: String,
    pub score: Decimal,
    pub correct_answers: i32,
    pub total_questions: i32,
    pub time_spent_seconds: Option<i64>,
    pub completed_at: DateTime<Utc>,
}

/// Attempt row joined with the student name, for a teacher's view of a fiche.
#[derive(Debug, Serialize, FromRow)]
pub struct FicheAttemptRow {
    pub id: i64,
    pub student_id: i64,
    pub student_username: String,
    pub score: Decimal,
    pub correct_answers: i32,
    pub total_questions: i32,
    pub time_spent_seconds: Option<i64>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct StudentStats {
    pub total_attempts: usize,
    pub average_score: Decimal,
    pub passed_attempts: usize,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct FicheStats {
    pub total_attempts: usize,
    pub unique_students: usize,
    pub average_score: Decimal,
    /// Percentage of attempts that passed.
    pub pass_rate: Decimal,
}

fn passed(score: Decimal) -> bool {
    score >= Decimal::from(PASSING_SCORE_PERCENTAGE)
}

fn average(scores: &[Decimal]) -> Decimal {
    if scores.is_empty() {
        return Decimal::ZERO;
    }
    let sum: Decimal = scores.iter().copied().sum();
    (sum / Decimal::from(scores.len() as i64)).round_dp(2)
}

impl StudentStats {
    pub fn from_rows(rows: &[StudentAttemptRow]) -> Self {
        let scores: Vec<Decimal> = rows.iter().map(|r| r.score).collect();
        Self {
            total_attempts: rows.len(),
            average_score: average(&scores),
            passed_attempts: scores.iter().filter(|s| passed(**s)).count(),
        }
    }
}

impl FicheStats {
    pub fn from_rows(rows: &[FicheAttemptRow]) -> Self {
        let scores: Vec<Decimal> = rows.iter().map(|r| r.score).collect();
        let mut students: Vec<i64> = rows.iter().map(|r| r.student_id).collect();
        students.sort_unstable();
        students.dedup();

        let passed_count = scores.iter().filter(|s| passed(**s)).count();
        let pass_rate = if rows.is_empty() {
            Decimal::ZERO
        } else {
            (Decimal::from(passed_count as i64 * 100) / Decimal::from(rows.len() as i64)).round_dp(2)
        };

        Self {
            total_attempts: rows.len(),
            unique_students: students.len(),
            average_score: average(&scores),
            pass_rate,
        }
    }
}
