// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "question_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    /// Single-choice question.
    Mcq,
    /// Multiple answers may be correct; graded as an order-insensitive set.
    MultipleChoice,
    TrueFalse,
    ShortAnswer,
}

impl QuestionType {
    /// Choice-based types must carry a non-empty option list.
    pub fn requires_options(&self) -> bool {
        matches!(self, QuestionType::Mcq | QuestionType::MultipleChoice)
    }
}

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub quiz_id: i64,

    pub question_type: QuestionType,

    pub question_text: String,

    /// List of options (e.g., ["Option A", "Option B"]).
    /// Stored as a JSON array in the database. Empty for short-answer and
    /// true/false questions.
    pub options: Json<Vec<String>>,

    /// The correct answer key or content. For multiple_choice, a
    /// comma-separated list of option keys.
    pub correct_answer: String,

    pub marks: i32,

    pub sort_order: i32,
}

impl Question {
    /// Grades a submitted answer against the answer key.
    ///
    /// mcq/true_false: exact match after trimming.
    /// multiple_choice: comma-separated keys compared as sets.
    /// short_answer: trimmed, case-insensitive match.
    pub fn is_correct(&self, answer: &str) -> bool {
        match self.question_type {
            QuestionType::Mcq | QuestionType::TrueFalse => {
                answer.trim() == self.correct_answer.trim()
            }
            QuestionType::MultipleChoice => {
                let mut given = split_keys(answer);
                let mut expected = split_keys(&self.correct_answer);
                given.sort_unstable();
                expected.sort_unstable();
                !expected.is_empty() && given == expected
            }
            QuestionType::ShortAnswer => answer
                .trim()
                .eq_ignore_ascii_case(self.correct_answer.trim()),
        }
    }

    /// Marks awarded for a submitted answer. All-or-nothing per question.
    pub fn marks_for(&self, answer: &str) -> i32 {
        if self.is_correct(answer) { self.marks } else { 0 }
    }
}

fn split_keys(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

/// DTO for sending a question to a student taking the quiz
/// (excludes the answer key).
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub question_text: String,
    pub options: Json<Vec<String>>,
    pub marks: i32,
    pub sort_order: i32,
}

impl From<Question> for PublicQuestion {
    fn from(q: Question) -> Self {
        Self {
            id: q.id,
            question_type: q.question_type,
            question_text: q.question_text,
            options: q.options,
            marks: q.marks,
            sort_order: q.sort_order,
        }
    }
}

/// DTO for creating a new question.
#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = validate_question_options))]
pub struct CreateQuestionRequest {
    pub question_type: QuestionType,
    #[validate(length(min = 1, max = 5000))]
    pub question_text: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[validate(length(min = 1, max = 2000))]
    pub correct_answer: String,
    #[validate(range(min = 1))]
    pub marks: i32,
    #[serde(default)]
    pub sort_order: i32,
}

fn validate_question_options(req: &CreateQuestionRequest) -> Result<(), validator::ValidationError> {
    if req.question_type.requires_options() {
        if req.options.is_empty() {
            return Err(validator::ValidationError::new("options_required"));
        }
        for opt in &req.options {
            if opt.is_empty() || opt.len() > 500 {
                return Err(validator::ValidationError::new("invalid_option"));
            }
        }
    }
    Ok(())
}

/// DTO for updating a question. Fields are optional.
#[derive(Debug, Deserialize)]
pub struct UpdateQuestionRequest {
    pub question_text: Option<String>,
    pub options: Option<Vec<String>>,
    pub correct_answer: Option<String>,
    pub marks: Option<i32>,
    pub sort_order: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(question_type: QuestionType, correct_answer: &str, marks: i32) -> Question {
        Question {
            id: 1,
            quiz_id: 1,
            question_type,
            question_text: "q".to_string(),
            options: Json(vec!["A".to_string(), "B".to_string(), "C".to_string()]),
            correct_answer: correct_answer.to_string(),
            marks,
            sort_order: 0,
        }
    }

    #[test]
    fn mcq_requires_exact_key() {
        let q = question(QuestionType::Mcq, "B", 5);
        assert!(q.is_correct("B"));
        assert!(q.is_correct(" B "));
        assert!(!q.is_correct("b"));
        assert!(!q.is_correct("A"));
        assert_eq!(q.marks_for("B"), 5);
        assert_eq!(q.marks_for("A"), 0);
    }

    #[test]
    fn multiple_choice_compares_sets() {
        let q = question(QuestionType::MultipleChoice, "A,C", 4);
        assert!(q.is_correct("A,C"));
        assert!(q.is_correct("C, A"));
        assert!(!q.is_correct("A"));
        assert!(!q.is_correct("A,B,C"));
        assert!(!q.is_correct(""));
    }

    #[test]
    fn true_false_matches_literal() {
        let q = question(QuestionType::TrueFalse, "true", 2);
        assert!(q.is_correct("true"));
        assert!(!q.is_correct("false"));
    }

    #[test]
    fn short_answer_ignores_case_and_whitespace() {
        let q = question(QuestionType::ShortAnswer, "Photosynthesis", 3);
        assert!(q.is_correct("photosynthesis"));
        assert!(q.is_correct("  PHOTOSYNTHESIS  "));
        assert!(!q.is_correct("photo synthesis"));
    }
}
