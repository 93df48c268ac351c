// src/grading/memory.rs

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::store::{NewAttempt, NewQuestionAnswer, QuizStore, StoreError};
use crate::models::{
    attempt::{QuestionAnswer, QuizAttempt},
    question::QuizDefinition,
};

/// In-process [`QuizStore`] with the same visibility rules as the database:
/// an attempt and its answers appear together or not at all.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    definitions: HashMap<i64, QuizDefinition>,
    attempts: Vec<QuizAttempt>,
    answers: Vec<QuestionAnswer>,
    next_attempt_id: i64,
    next_answer_id: i64,
    /// Fail every answer write after the attempt row went in.
    fail_answer_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers (or replaces) the quiz of a fiche.
    pub fn insert_quiz(&self, definition: QuizDefinition) {
        self.lock().definitions.insert(definition.fiche_id, definition);
    }

    /// Makes subsequent answer writes fail.
    pub fn fail_answer_writes(&self, fail: bool) {
        self.lock().fail_answer_writes = fail;
    }

    pub fn attempts(&self) -> Vec<QuizAttempt> {
        self.lock().attempts.clone()
    }

    pub fn answer_count(&self) -> usize {
        self.lock().answers.len()
    }
}

#[async_trait]
impl QuizStore for MemoryStore {
    async fn load_quiz_definition(&self, fiche_id: i64) -> Result<QuizDefinition, StoreError> {
        Ok(self
            .lock()
            .definitions
            .get(&fiche_id)
            .cloned()
            .unwrap_or(QuizDefinition {
                fiche_id,
                questions: Vec::new(),
            }))
    }

    async fn record_attempt(
        &self,
        attempt: NewAttempt,
        answers: Vec<NewQuestionAnswer>,
    ) -> Result<QuizAttempt, StoreError> {
        let mut inner = self.lock();

        inner.next_attempt_id += 1;
        let created = QuizAttempt {
            id: inner.next_attempt_id,
            student_id: attempt.student_id,
            fiche_id: attempt.fiche_id,
            score: attempt.score,
            total_questions: attempt.total_questions,
            correct_answers: attempt.correct_answers,
            time_spent_seconds: attempt.time_spent_seconds,
            completed_at: attempt.completed_at,
        };
        inner.attempts.push(created.clone());

        let staged = stage_answers(&mut inner, created.id, answers);
        match staged {
            Ok(rows) => {
                inner.answers.extend(rows);
                Ok(created)
            }
            Err(e) => {
                // Roll back the attempt row.
                inner.attempts.retain(|a| a.id != created.id);
                Err(e)
            }
        }
    }

    async fn find_attempt(&self, attempt_id: i64) -> Result<Option<QuizAttempt>, StoreError> {
        Ok(self.lock().attempts.iter().find(|a| a.id == attempt_id).cloned())
    }

    async fn list_question_answers(&self, attempt_id: i64) -> Result<Vec<QuestionAnswer>, StoreError> {
        let inner = self.lock();
        let Some(attempt) = inner.attempts.iter().find(|a| a.id == attempt_id) else {
            return Ok(Vec::new());
        };

        let mut rows: Vec<QuestionAnswer> = inner
            .answers
            .iter()
            .filter(|qa| qa.attempt_id == attempt_id)
            .cloned()
            .collect();

        if let Some(definition) = inner.definitions.get(&attempt.fiche_id) {
            rows.sort_by_key(|qa| definition.position(qa.question_id).unwrap_or(usize::MAX));
        }
        Ok(rows)
    }
}

fn stage_answers(
    inner: &mut Inner,
    attempt_id: i64,
    answers: Vec<NewQuestionAnswer>,
) -> Result<Vec<QuestionAnswer>, StoreError> {
    if inner.fail_answer_writes && !answers.is_empty() {
        return Err(StoreError::Rejected("answer write failed".to_string()));
    }

    let mut seen = HashSet::new();
    let mut rows = Vec::with_capacity(answers.len());
    for answer in answers {
        if !seen.insert(answer.question_id) {
            return Err(StoreError::Rejected(format!(
                "duplicate answer for question {} in attempt {}",
                answer.question_id, attempt_id
            )));
        }
        inner.next_answer_id += 1;
        rows.push(QuestionAnswer {
            id: inner.next_answer_id,
            attempt_id,
            question_id: answer.question_id,
            selected_answer_id: answer.selected_answer_id,
            is_correct: answer.is_correct,
            answered_at: answer.answered_at,
        });
    }
    Ok(rows)
}
