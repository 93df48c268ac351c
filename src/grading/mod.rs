// src/grading/mod.rs

//! Quiz grading.
//!
//! A submission is scored against the quiz definition loaded from the store,
//! never against anything the client sent besides its choices. Choices that
//! do not resolve to one of the question's own answers are skipped and count
//! as unanswered.

pub mod memory;
pub mod postgres;
pub mod store;

use chrono::{TimeDelta, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

use crate::models::{
    attempt::{QuizAttempt, SubmittedChoices},
    question::QuizDefinition,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::{NewAttempt, NewQuestionAnswer, QuizStore, StoreError};

#[derive(Debug, Error)]
pub enum GradingError {
    /// Nothing to grade. No attempt is written.
    #[error("fiche {fiche_id} has no quiz questions")]
    EmptyQuiz { fiche_id: i64 },

    #[error("failed to persist quiz attempt: {0}")]
    Persistence(#[from] StoreError),
}

/// A choice that matched one of its question's answers.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAnswer {
    pub question_id: i64,
    pub answer_id: i64,
    pub is_correct: bool,
}

/// Outcome of scoring, before anything is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Grade {
    pub total_questions: i32,
    pub correct_answers: i32,
    pub score: Decimal,
    /// In quiz definition order.
    pub answers: Vec<ResolvedAnswer>,
    /// Choices naming an answer that does not belong to their question.
    pub stale_references: usize,
}

/// Scores a submission. Pure: reads the definition and the choices only.
///
/// Every question counts in the denominator. Points are ignored, each
/// question weighs the same. When several answers of a question are flagged
/// correct, selecting any of them earns the question.
pub fn score_submission(
    definition: &QuizDefinition,
    choices: &SubmittedChoices,
) -> Result<Grade, GradingError> {
    if definition.is_empty() {
        return Err(GradingError::EmptyQuiz {
            fiche_id: definition.fiche_id,
        });
    }

    let total = definition.questions.len();
    let mut correct = 0usize;
    let mut stale_references = 0usize;
    let mut answers = Vec::with_capacity(choices.len().min(total));

    for question in &definition.questions {
        let Some(&answer_id) = choices.get(&question.id) else {
            continue;
        };

        // Only the question's own answers can match.
        let Some(answer) = question.answer(answer_id) else {
            tracing::debug!(
                question_id = question.id,
                answer_id,
                "Skipping choice that does not belong to its question"
            );
            stale_references += 1;
            continue;
        };

        if answer.is_correct {
            correct += 1;
        }
        answers.push(ResolvedAnswer {
            question_id: question.id,
            answer_id: answer.id,
            is_correct: answer.is_correct,
        });
    }

    Ok(Grade {
        total_questions: total as i32,
        correct_answers: correct as i32,
        score: percentage(correct, total),
        answers,
        stale_references,
    })
}

/// `correct / total * 100`, two decimals, half away from zero, within [0, 100].
pub fn percentage(correct: usize, total: usize) -> Decimal {
    if total == 0 {
        return Decimal::ZERO;
    }
    let raw = Decimal::from(correct as u64 * 100) / Decimal::from(total as u64);
    raw.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        .clamp(Decimal::ZERO, Decimal::ONE_HUNDRED)
}

/// Grades one submission and records it.
///
/// Each call creates a new attempt, even for identical input. The attempt
/// and its answers are written in a single store call, so a failed write
/// leaves nothing behind.
pub async fn grade_submission<S>(
    store: &S,
    definition: &QuizDefinition,
    student_id: i64,
    choices: &SubmittedChoices,
    elapsed: Option<TimeDelta>,
) -> Result<QuizAttempt, GradingError>
where
    S: QuizStore + ?Sized,
{
    let grade = score_submission(definition, choices)?;

    if grade.stale_references > 0 {
        tracing::info!(
            fiche_id = definition.fiche_id,
            student_id,
            stale = grade.stale_references,
            "Submission referenced answers outside their questions"
        );
    }

    let now = Utc::now();
    let attempt = NewAttempt {
        student_id,
        fiche_id: definition.fiche_id,
        score: grade.score,
        total_questions: grade.total_questions,
        correct_answers: grade.correct_answers,
        time_spent_seconds: elapsed.map(|d| d.num_seconds().max(0)),
        completed_at: now,
    };
    let answers = grade
        .answers
        .iter()
        .map(|a| NewQuestionAnswer {
            question_id: a.question_id,
            selected_answer_id: a.answer_id,
            is_correct: a.is_correct,
            answered_at: now,
        })
        .collect();

    let attempt = store.record_attempt(attempt, answers).await.map_err(|e| {
        tracing::error!(
            fiche_id = definition.fiche_id,
            student_id,
            "Failed to record quiz attempt: {:?}",
            e
        );
        GradingError::Persistence(e)
    })?;

    tracing::info!(
        attempt_id = attempt.id,
        fiche_id = attempt.fiche_id,
        student_id,
        score = %attempt.score,
        "Quiz graded"
    );

    Ok(attempt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::{Answer, Question};

    /// Question `id` with answers `id*10` (correct) and `id*10 + 1`.
    fn question(id: i64, order: i32) -> Question {
        Question {
            id,
            fiche_id: 1,
            text: format!("Question {id}"),
            order,
            points: 1,
            answers: vec![
                Answer { id: id * 10, question_id: id, text: "right".into(), is_correct: true, order: 0 },
                Answer { id: id * 10 + 1, question_id: id, text: "wrong".into(), is_correct: false, order: 1 },
            ],
        }
    }

    fn quiz(n: i64) -> QuizDefinition {
        QuizDefinition {
            fiche_id: 1,
            questions: (1..=n).map(|i| question(i, i as i32)).collect(),
        }
    }

    #[test]
    fn test_score_perfect() {
        let choices: SubmittedChoices = [(1, 10), (2, 20)].into_iter().collect();
        let grade = score_submission(&quiz(2), &choices).unwrap();
        assert_eq!(grade.correct_answers, 2);
        assert_eq!(grade.score, Decimal::ONE_HUNDRED);
        assert_eq!(grade.answers.len(), 2);
    }

    #[test]
    fn test_score_thirds_are_rounded() {
        let choices: SubmittedChoices = [(1, 10), (2, 20), (3, 31)].into_iter().collect();
        let grade = score_submission(&quiz(3), &choices).unwrap();
        assert_eq!(grade.correct_answers, 2);
        assert_eq!(grade.score, Decimal::new(6667, 2));

        let choices: SubmittedChoices = [(1, 10)].into_iter().collect();
        let grade = score_submission(&quiz(3), &choices).unwrap();
        assert_eq!(grade.score, Decimal::new(3333, 2));
    }

    #[test]
    fn test_score_midpoint_rounds_up() {
        // 1/32 = 3.125%
        assert_eq!(percentage(1, 32), Decimal::new(313, 2));
        assert_eq!(percentage(0, 7), Decimal::ZERO);
        assert_eq!(percentage(7, 7), Decimal::ONE_HUNDRED);
    }

    #[test]
    fn test_unanswered_questions_count_against_score() {
        let choices: SubmittedChoices = [(1, 10)].into_iter().collect();
        let grade = score_submission(&quiz(4), &choices).unwrap();
        assert_eq!(grade.total_questions, 4);
        assert_eq!(grade.correct_answers, 1);
        assert_eq!(grade.score, Decimal::new(2500, 2));
        assert_eq!(grade.answers.len(), 1);
    }

    #[test]
    fn test_wrong_answer_is_recorded_as_incorrect() {
        let choices: SubmittedChoices = [(1, 11)].into_iter().collect();
        let grade = score_submission(&quiz(1), &choices).unwrap();
        assert_eq!(grade.correct_answers, 0);
        assert_eq!(
            grade.answers,
            vec![ResolvedAnswer { question_id: 1, answer_id: 11, is_correct: false }]
        );
    }

    #[test]
    fn test_cross_question_answer_is_skipped() {
        // Answer 20 is the correct answer of question 2, submitted for question 1.
        let choices: SubmittedChoices = [(1, 20)].into_iter().collect();
        let grade = score_submission(&quiz(2), &choices).unwrap();
        assert_eq!(grade.correct_answers, 0);
        assert!(grade.answers.is_empty());
        assert_eq!(grade.stale_references, 1);
    }

    #[test]
    fn test_foreign_question_ids_are_ignored() {
        let choices: SubmittedChoices = [(1, 10), (999, 9990)].into_iter().collect();
        let grade = score_submission(&quiz(2), &choices).unwrap();
        assert_eq!(grade.correct_answers, 1);
        assert_eq!(grade.score, Decimal::new(5000, 2));
        assert_eq!(grade.stale_references, 0);
    }

    #[test]
    fn test_points_do_not_weight_score() {
        let mut definition = quiz(2);
        definition.questions[0].points = 10;
        let choices: SubmittedChoices = [(2, 20)].into_iter().collect();
        let grade = score_submission(&definition, &choices).unwrap();
        assert_eq!(grade.score, Decimal::new(5000, 2));
    }

    #[test]
    fn test_any_correct_answer_earns_multi_correct_question() {
        let mut definition = quiz(1);
        definition.questions[0].answers[1].is_correct = true;
        let choices: SubmittedChoices = [(1, 11)].into_iter().collect();
        let grade = score_submission(&definition, &choices).unwrap();
        assert_eq!(grade.score, Decimal::ONE_HUNDRED);
    }

    #[test]
    fn test_answers_follow_definition_order() {
        let mut definition = quiz(3);
        definition.questions.reverse();
        let choices: SubmittedChoices = [(1, 10), (2, 21), (3, 30)].into_iter().collect();
        let grade = score_submission(&definition, &choices).unwrap();
        let order: Vec<i64> = grade.answers.iter().map(|a| a.question_id).collect();
        assert_eq!(order, vec![3, 2, 1]);
    }

    #[test]
    fn test_empty_quiz_is_rejected() {
        let definition = QuizDefinition { fiche_id: 7, questions: vec![] };
        let err = score_submission(&definition, &SubmittedChoices::new()).unwrap_err();
        assert!(matches!(err, GradingError::EmptyQuiz { fiche_id: 7 }));
    }
}
