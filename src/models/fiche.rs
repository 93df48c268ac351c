// src/models/fiche.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

use crate::{config::MIN_ANSWERS_PER_QUESTION, models::question::QuizDefinition};

/// Represents the 'fiches' table in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Fiche {
    pub id: i64,
    pub title: String,
    pub description: String,

    /// Course summary. Sanitized HTML.
    pub content: String,

    pub author_id: i64,

    /// Subject (e.g., "Mathematics", "History"). May be empty.
    pub category: String,

    /// 'beginner', 'intermediate' or 'advanced'.
    pub difficulty_level: String,

    pub is_published: bool,
    pub views_count: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Row for the fiche listing, joined with author and question count.
#[derive(Debug, Serialize, FromRow)]
pub struct FicheListItem {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub category: String,
    pub difficulty_level: String,
    pub author_username: String,
    pub views_count: i64,
    pub question_count: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize)]
pub struct FicheListParams {
    /// Exact category match.
    pub category: Option<String>,
    /// Case-insensitive match on title, description or category.
    pub search: Option<String>,
}

/// `ILIKE` pattern matching `term` anywhere, with wildcards in the term escaped.
pub fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Fiche columns needed to list outstanding authoring work.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct FicheRef {
    pub id: i64,
    pub title: String,
    pub is_published: bool,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct PendingQuestion {
    pub fiche_id: i64,
    pub fiche_title: String,
    pub question_id: i64,
    pub text: String,
    pub answer_count: usize,
}

/// Authoring work left on a set of fiches.
#[derive(Debug, Default, Serialize)]
pub struct PendingWork {
    pub unpublished_fiches: Vec<FicheRef>,
    pub published_fiches_without_questions: Vec<FicheRef>,
    pub questions_without_correct_answer: Vec<PendingQuestion>,
    pub questions_with_too_few_answers: Vec<PendingQuestion>,
}

impl PendingWork {
    pub fn add_fiche(&mut self, fiche: &FicheRef, definition: &QuizDefinition) {
        if !fiche.is_published {
            self.unpublished_fiches.push(fiche.clone());
        } else if definition.is_empty() {
            self.published_fiches_without_questions.push(fiche.clone());
        }

        for question in definition.questions.iter().filter(|q| !q.is_well_formed()) {
            let pending = PendingQuestion {
                fiche_id: fiche.id,
                fiche_title: fiche.title.clone(),
                question_id: question.id,
                text: question.text.clone(),
                answer_count: question.answers.len(),
            };
            if question.answers.len() < MIN_ANSWERS_PER_QUESTION {
                self.questions_with_too_few_answers.push(pending);
            } else {
                self.questions_without_correct_answer.push(pending);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.unpublished_fiches.is_empty()
            && self.published_fiches_without_questions.is_empty()
            && self.questions_without_correct_answer.is_empty()
            && self.questions_with_too_few_answers.is_empty()
    }
}

/// DTO for creating a fiche.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateFicheRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 2000))]
    pub description: String,
    #[validate(length(min = 1, max = 100000))]
    pub content: String,
    #[serde(default)]
    #[validate(length(max = 100))]
    pub category: String,
    #[serde(default = "default_difficulty")]
    #[validate(custom(function = validate_difficulty))]
    pub difficulty_level: String,
    #[serde(default = "default_published")]
    pub is_published: bool,
}

/// DTO for updating a fiche. Fields are optional.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateFicheRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 2000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 100000))]
    pub content: Option<String>,
    #[validate(length(max = 100))]
    pub category: Option<String>,
    #[validate(custom(function = validate_difficulty))]
    pub difficulty_level: Option<String>,
    pub is_published: Option<bool>,
}

fn default_difficulty() -> String {
    "intermediate".to_string()
}

fn default_published() -> bool {
    true
}

fn validate_difficulty(level: &str) -> Result<(), validator::ValidationError> {
    match level {
        "beginner" | "intermediate" | "advanced" => Ok(()),
        _ => Err(validator::ValidationError::new("invalid_difficulty_level")),
    }
}
