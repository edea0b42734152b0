use crate::models::question::{AnswerPayload, Question, QuestionType};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GradedAnswer {
    pub question_id: Uuid,
    pub payload: AnswerPayload,
    pub is_correct: bool,
    pub points_earned: i32,
    pub max_points: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GradeReport {
    pub earned_points: i64,
    pub total_points: i64,
    pub score: i32,
    pub graded: Vec<GradedAnswer>,
}

pub struct GradingService;

impl GradingService {
    /// Grades every answered question, all-or-nothing per question.
    /// Unanswered questions still count towards the total.
    pub fn grade(questions: &[Question], answers: &HashMap<Uuid, AnswerPayload>) -> GradeReport {
        let mut total_points: i64 = 0;
        let mut earned_points: i64 = 0;
        let mut graded = Vec::new();

        for q in questions {
            let max_points = q.points.max(0);
            total_points += max_points as i64;

            let Some(payload) = answers.get(&q.id) else {
                continue;
            };

            let is_correct = Self::is_correct(q, payload);
            let points_earned = if is_correct { max_points } else { 0 };
            earned_points += points_earned as i64;

            graded.push(GradedAnswer {
                question_id: q.id,
                payload: payload.clone(),
                is_correct,
                points_earned,
                max_points,
            });
        }

        GradeReport {
            earned_points,
            total_points,
            score: Self::percentage(earned_points, total_points),
            graded,
        }
    }

    pub fn is_correct(question: &Question, payload: &AnswerPayload) -> bool {
        match (question.question_type, payload) {
            (QuestionType::Single, AnswerPayload::Single(selected)) => question
                .options
                .iter()
                .any(|o| o.id == *selected && o.is_correct),
            (QuestionType::Multiple, AnswerPayload::Multiple(selected)) => {
                let correct: BTreeSet<Uuid> = question
                    .options
                    .iter()
                    .filter(|o| o.is_correct)
                    .map(|o| o.id)
                    .collect();
                *selected == correct
            }
            (QuestionType::Text, AnswerPayload::Text(given)) => question
                .options
                .first()
                .map(|expected| text_matches(&expected.text, given))
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Integer percentage, truncated. Zero when nothing can be earned.
    pub fn percentage(earned: i64, total: i64) -> i32 {
        if total <= 0 {
            return 0;
        }
        let earned = earned.clamp(0, total);
        (earned * 100 / total) as i32
    }
}

fn text_matches(expected: &str, given: &str) -> bool {
    let expected = expected.trim().to_lowercase();
    if expected.is_empty() {
        return false;
    }
    let given = given.trim().to_lowercase();
    given == expected || given.contains(&expected)
}
