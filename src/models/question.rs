// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

use crate::config::{MAX_ANSWERS_PER_QUESTION, MIN_ANSWERS_PER_QUESTION};

/// Warning surfaced to the author when a question has no correct answer.
pub const NO_CORRECT_ANSWER_WARNING: &str = "No correct answer has been defined for this question.";

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub fiche_id: i64,
    pub text: String,

    /// Display position inside the quiz.
    /// Mapped from 'display_order' since `order` is a reserved SQL keyword.
    #[sqlx(rename = "display_order")]
    pub order: i32,

    /// Weight of the question. Stored for authors, not used in scoring.
    pub points: i32,

    /// Candidate answers, filled in after the question rows are loaded.
    #[sqlx(skip)]
    pub answers: Vec<Answer>,
}

impl Question {
    /// Finds one of this question's own answers.
    pub fn answer(&self, answer_id: i64) -> Option<&Answer> {
        self.answers.iter().find(|a| a.id == answer_id)
    }

    pub fn correct_answers(&self) -> impl Iterator<Item = &Answer> {
        self.answers.iter().filter(|a| a.is_correct)
    }

    /// A well-formed question has at least two answers, one of them correct.
    pub fn is_well_formed(&self) -> bool {
        self.answers.len() >= MIN_ANSWERS_PER_QUESTION && self.correct_answers().next().is_some()
    }
}

/// Represents the 'answers' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Answer {
    pub id: i64,
    pub question_id: i64,
    pub text: String,
    pub is_correct: bool,
    #[sqlx(rename = "display_order")]
    pub order: i32,
}

/// The authoritative, ordered question set of one fiche.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizDefinition {
    pub fiche_id: i64,
    pub questions: Vec<Question>,
}

impl QuizDefinition {
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn question(&self, question_id: i64) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }

    /// Position of a question in display order.
    pub fn position(&self, question_id: i64) -> Option<usize> {
        self.questions.iter().position(|q| q.id == question_id)
    }
}

/// DTO for sending a question to the student (hides correctness).
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub text: String,
    pub order: i32,
    pub points: i32,
    pub answers: Vec<PublicAnswer>,
}

#[derive(Debug, Serialize)]
pub struct PublicAnswer {
    pub id: i64,
    pub text: String,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id,
            text: q.text.clone(),
            order: q.order,
            points: q.points,
            answers: q
                .answers
                .iter()
                .map(|a| PublicAnswer {
                    id: a.id,
                    text: a.text.clone(),
                })
                .collect(),
        }
    }
}

/// DTO for creating or replacing a question together with its answers.
#[derive(Debug, Deserialize, Validate)]
pub struct QuestionRequest {
    #[validate(length(min = 1, max = 2000))]
    pub text: String,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub order: i32,
    #[serde(default = "default_points")]
    #[validate(range(min = 1, max = 100))]
    pub points: i32,
    #[validate(custom(function = validate_answers))]
    pub answers: Vec<AnswerInput>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AnswerInput {
    /// Existing answer to keep and edit. New answers leave it out.
    #[serde(default)]
    pub id: Option<i64>,
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
    #[serde(default)]
    pub order: i32,
}

impl QuestionRequest {
    /// Authoring warnings that do not block saving.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if !self.answers.iter().any(|a| a.is_correct) {
            warnings.push(NO_CORRECT_ANSWER_WARNING.to_string());
        }
        warnings
    }
}

fn default_points() -> i32 {
    1
}

fn validate_answers(answers: &[AnswerInput]) -> Result<(), validator::ValidationError> {
    if answers.len() < MIN_ANSWERS_PER_QUESTION {
        return Err(validator::ValidationError::new("too_few_answers"));
    }
    if answers.len() > MAX_ANSWERS_PER_QUESTION {
        return Err(validator::ValidationError::new("too_many_answers"));
    }
    for answer in answers {
        if answer.text.trim().is_empty() || answer.text.chars().count() > 500 {
            return Err(validator::ValidationError::new("invalid_answer_text"));
        }
        if answer.order < 0 {
            return Err(validator::ValidationError::new("invalid_answer_order"));
        }
    }
    Ok(())
}
