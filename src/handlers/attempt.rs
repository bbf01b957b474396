// src/handlers/attempt.rs

use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;

use crate::{
    error::AppError,
    handlers::{activity, can_manage, quiz::fetch_quiz},
    models::{
        activity_log::ActivityTarget,
        question::Question,
        quiz::{AttemptGate, Quiz},
        quiz_attempt::{
            AttemptResponse, AttemptStatus, QuizAnswer, QuizAttempt, SaveAnswerRequest,
        },
    },
    scoring::GradeScale,
    utils::jwt::Claims,
};

const ATTEMPT_COLUMNS: &str = "id, quiz_id, student_id, attempt_number, started_at, completed_at, \
                               score, total_points, status";

/// One graded answer, produced when an attempt is submitted.
struct GradedAnswer {
    question_id: i64,
    is_correct: bool,
    marks_awarded: i32,
}

/// Grades recorded answers against the question bank.
/// Answers to questions no longer in the bank are ignored.
fn grade_answers(
    questions: &HashMap<i64, Question>,
    answers: &[QuizAnswer],
) -> (i32, Vec<GradedAnswer>) {
    let mut score = 0;
    let mut graded = Vec::with_capacity(answers.len());

    for answer in answers {
        if let Some(question) = questions.get(&answer.question_id) {
            let is_correct = question.is_correct(&answer.answer);
            let marks_awarded = if is_correct { question.marks } else { 0 };
            score += marks_awarded;
            graded.push(GradedAnswer {
                question_id: answer.question_id,
                is_correct,
                marks_awarded,
            });
        }
    }

    (score, graded)
}

/// Starts a new attempt on a quiz.
///
/// The gate (open window, no in-progress attempt, attempts left) and the
/// insert run inside one transaction holding a row lock on the quiz, so two
/// concurrent starts cannot both pass the gate. Enrollment in the quiz's
/// batch is checked separately from the time window.
pub async fn start_attempt(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id();

    let mut tx = pool.begin().await?;

    let quiz = sqlx::query_as::<_, Quiz>(
        "SELECT id, batch_id, teacher_id, title, description, start_time, end_time, \
         duration_minutes, total_marks, pass_marks, max_attempts, is_active, \
         randomize_questions, created_at FROM quizzes WHERE id = $1 FOR UPDATE",
    )
    .bind(quiz_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("Quiz not found".to_string()))?;

    let enrolled: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM enrollments WHERE batch_id = $1 AND student_id = $2)",
    )
    .bind(quiz.batch_id)
    .bind(student_id)
    .fetch_one(&mut *tx)
    .await?;
    if !enrolled {
        return Err(AppError::Forbidden(
            "You are not enrolled in this quiz's batch".to_string(),
        ));
    }

    let attempts = sqlx::query_as::<_, QuizAttempt>(&format!(
        "SELECT {ATTEMPT_COLUMNS} FROM quiz_attempts WHERE quiz_id = $1 AND student_id = $2"
    ))
    .bind(quiz_id)
    .bind(student_id)
    .fetch_all(&mut *tx)
    .await?;

    let now = Utc::now();
    match quiz.attempt_gate(now, &attempts) {
        AttemptGate::Allowed => {}
        AttemptGate::QuizClosed => {
            return Err(AppError::BadRequest("Quiz is not open".to_string()));
        }
        AttemptGate::InProgressExists => {
            return Err(AppError::Conflict(
                "An attempt is already in progress".to_string(),
            ));
        }
        AttemptGate::MaxAttemptsReached => {
            return Err(AppError::Conflict(
                "No attempts remaining for this quiz".to_string(),
            ));
        }
    }

    let total_points: i64 =
        sqlx::query_scalar("SELECT COALESCE(SUM(marks), 0) FROM questions WHERE quiz_id = $1")
            .bind(quiz_id)
            .fetch_one(&mut *tx)
            .await?;

    let attempt = sqlx::query_as::<_, QuizAttempt>(&format!(
        "INSERT INTO quiz_attempts (quiz_id, student_id, attempt_number, started_at, total_points) \
         VALUES ($1, $2, $3, $4, $5) RETURNING {ATTEMPT_COLUMNS}"
    ))
    .bind(quiz_id)
    .bind(student_id)
    .bind(Quiz::next_attempt_number(&attempts))
    .bind(now)
    .bind(total_points as i32)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    activity::record(
        &pool,
        student_id,
        "quiz_attempt.started",
        Some(ActivityTarget::QuizAttempt(attempt.id)),
        json!({ "quiz_id": quiz_id, "attempt_number": attempt.attempt_number }),
        &headers,
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(AttemptResponse::from_attempt(attempt, quiz.pass_marks)),
    ))
}

/// Records (or replaces) an answer inside an in-progress attempt.
/// Grading happens at submission, not here.
pub async fn save_answer(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
    Json(payload): Json<SaveAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = fetch_attempt(&pool, attempt_id).await?;
    if attempt.student_id != claims.user_id() {
        return Err(AppError::Forbidden("Not your attempt".to_string()));
    }
    if attempt.status != AttemptStatus::InProgress {
        return Err(AppError::Conflict(
            "Attempt has already been submitted".to_string(),
        ));
    }

    let belongs: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM questions WHERE id = $1 AND quiz_id = $2)",
    )
    .bind(payload.question_id)
    .bind(attempt.quiz_id)
    .fetch_one(&pool)
    .await?;
    if !belongs {
        return Err(AppError::BadRequest(
            "Question does not belong to this quiz".to_string(),
        ));
    }

    sqlx::query(
        r#"
        INSERT INTO quiz_answers (attempt_id, question_id, answer)
        VALUES ($1, $2, $3)
        ON CONFLICT (attempt_id, question_id) DO UPDATE SET
            answer = EXCLUDED.answer,
            is_correct = FALSE,
            marks_awarded = 0
        "#,
    )
    .bind(attempt_id)
    .bind(payload.question_id)
    .bind(&payload.answer)
    .execute(&pool)
    .await?;

    Ok(StatusCode::OK)
}

/// Submits an in-progress attempt: grades every recorded answer, finalizes
/// the score and flips the attempt to its terminal state. Submitting twice
/// is a conflict — there is no transition back.
pub async fn submit_attempt(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id();

    let mut tx = pool.begin().await?;

    let attempt = sqlx::query_as::<_, QuizAttempt>(&format!(
        "SELECT {ATTEMPT_COLUMNS} FROM quiz_attempts WHERE id = $1 FOR UPDATE"
    ))
    .bind(attempt_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("Attempt not found".to_string()))?;

    if attempt.student_id != student_id {
        return Err(AppError::Forbidden("Not your attempt".to_string()));
    }
    if attempt.status != AttemptStatus::InProgress {
        return Err(AppError::Conflict(
            "Attempt has already been submitted".to_string(),
        ));
    }

    let questions = sqlx::query_as::<_, Question>(
        "SELECT id, quiz_id, question_type, question_text, options, correct_answer, marks, \
         sort_order FROM questions WHERE quiz_id = $1",
    )
    .bind(attempt.quiz_id)
    .fetch_all(&mut *tx)
    .await?;

    let answers = sqlx::query_as::<_, QuizAnswer>(
        "SELECT attempt_id, question_id, answer, is_correct, marks_awarded \
         FROM quiz_answers WHERE attempt_id = $1",
    )
    .bind(attempt_id)
    .fetch_all(&mut *tx)
    .await?;

    let total_points: i32 = questions.iter().map(|q| q.marks).sum();
    let question_map: HashMap<i64, Question> =
        questions.into_iter().map(|q| (q.id, q)).collect();
    let (score, graded) = grade_answers(&question_map, &answers);

    for g in &graded {
        sqlx::query(
            "UPDATE quiz_answers SET is_correct = $1, marks_awarded = $2 \
             WHERE attempt_id = $3 AND question_id = $4",
        )
        .bind(g.is_correct)
        .bind(g.marks_awarded)
        .bind(attempt_id)
        .bind(g.question_id)
        .execute(&mut *tx)
        .await?;
    }

    let now = Utc::now();
    let attempt = sqlx::query_as::<_, QuizAttempt>(&format!(
        "UPDATE quiz_attempts SET score = $1, total_points = $2, status = $3, completed_at = $4 \
         WHERE id = $5 RETURNING {ATTEMPT_COLUMNS}"
    ))
    .bind(score)
    .bind(total_points)
    .bind(AttemptStatus::Submitted)
    .bind(now)
    .bind(attempt_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    activity::record(
        &pool,
        student_id,
        "quiz_attempt.submitted",
        Some(ActivityTarget::QuizAttempt(attempt_id)),
        json!({ "quiz_id": attempt.quiz_id, "score": score, "total_points": total_points }),
        &headers,
    )
    .await;

    let quiz = fetch_quiz(&pool, attempt.quiz_id).await?;
    let scale = GradeScale::default();
    let response = AttemptResponse::from_attempt(attempt, quiz.pass_marks);
    let grade = scale.letter_for(response.percentage).to_string();

    Ok(Json(json!({
        "attempt": response,
        "grade": grade,
    })))
}

/// Retrieves an attempt with its answers. Visible to the attempt's owner
/// and to whoever manages the quiz.
pub async fn get_attempt(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = fetch_attempt(&pool, attempt_id).await?;
    let quiz = fetch_quiz(&pool, attempt.quiz_id).await?;

    let is_owner = attempt.student_id == claims.user_id();
    if !is_owner && !can_manage(&claims, quiz.teacher_id) {
        return Err(AppError::Forbidden("Not your attempt".to_string()));
    }

    let answers = sqlx::query_as::<_, QuizAnswer>(
        "SELECT attempt_id, question_id, answer, is_correct, marks_awarded \
         FROM quiz_answers WHERE attempt_id = $1 ORDER BY question_id",
    )
    .bind(attempt_id)
    .fetch_all(&pool)
    .await?;

    let response = AttemptResponse::from_attempt(attempt, quiz.pass_marks);
    let grade = GradeScale::default()
        .letter_for(response.percentage)
        .to_string();

    Ok(Json(json!({
        "attempt": response,
        "grade": grade,
        "answers": answers,
    })))
}

async fn fetch_attempt(pool: &PgPool, id: i64) -> Result<QuizAttempt, AppError> {
    sqlx::query_as::<_, QuizAttempt>(&format!(
        "SELECT {ATTEMPT_COLUMNS} FROM quiz_attempts WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Attempt not found".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::QuestionType;
    use sqlx::types::Json as SqlJson;

    fn question(id: i64, question_type: QuestionType, correct_answer: &str, marks: i32) -> Question {
        Question {
            id,
            quiz_id: 1,
            question_type,
            question_text: format!("Question {}", id),
            options: SqlJson(vec!["A".to_string(), "B".to_string()]),
            correct_answer: correct_answer.to_string(),
            marks,
            sort_order: 0,
        }
    }

    fn answer(question_id: i64, answer: &str) -> QuizAnswer {
        QuizAnswer {
            attempt_id: 1,
            question_id,
            answer: answer.to_string(),
            is_correct: false,
            marks_awarded: 0,
        }
    }

    #[test]
    fn grades_sum_marks_of_correct_answers() {
        let questions: HashMap<i64, Question> = [
            (1, question(1, QuestionType::Mcq, "A", 10)),
            (2, question(2, QuestionType::Mcq, "B", 5)),
            (3, question(3, QuestionType::ShortAnswer, "ohm", 5)),
        ]
        .into();

        let answers = [answer(1, "A"), answer(2, "A"), answer(3, "Ohm")];
        let (score, graded) = grade_answers(&questions, &answers);

        assert_eq!(score, 15);
        assert_eq!(graded.len(), 3);
        assert!(graded[0].is_correct);
        assert!(!graded[1].is_correct);
        assert_eq!(graded[1].marks_awarded, 0);
        assert!(graded[2].is_correct);
    }

    #[test]
    fn answers_to_removed_questions_are_ignored() {
        let questions: HashMap<i64, Question> =
            [(1, question(1, QuestionType::Mcq, "A", 10))].into();

        let answers = [answer(1, "A"), answer(99, "A")];
        let (score, graded) = grade_answers(&questions, &answers);

        assert_eq!(score, 10);
        assert_eq!(graded.len(), 1);
    }

    #[test]
    fn empty_answer_sheet_scores_zero() {
        let questions: HashMap<i64, Question> =
            [(1, question(1, QuestionType::Mcq, "A", 10))].into();
        let (score, graded) = grade_answers(&questions, &[]);
        assert_eq!(score, 0);
        assert!(graded.is_empty());
    }
}
