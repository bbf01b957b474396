// src/scoring.rs
//
// Aggregate scoring over quiz attempts. Everything here is pure: callers
// fetch the attempt rows and pass them in.

use serde::Serialize;

use crate::models::quiz_attempt::QuizAttempt;

/// Attempts that count toward aggregate statistics: submitted, with a
/// positive number of attainable points.
fn gradable(attempts: &[QuizAttempt]) -> impl Iterator<Item = &QuizAttempt> {
    attempts
        .iter()
        .filter(|a| a.is_submitted() && a.total_points > 0)
}

fn mean_percentage(attempts: &[QuizAttempt]) -> f64 {
    let percentages: Vec<f64> = gradable(attempts).map(|a| a.percentage()).collect();
    if percentages.is_empty() {
        return 0.0;
    }
    percentages.iter().sum::<f64>() / percentages.len() as f64
}

/// Average score across attempts as a percentage, rounded to two decimals.
/// This is the quiz-statistics precision; the student dashboard uses
/// `dashboard_average_percentage`. The two call sites round differently and
/// are kept as distinct functions.
pub fn average_percentage(attempts: &[QuizAttempt]) -> f64 {
    round_to(mean_percentage(attempts), 2)
}

/// Average score as shown on the student dashboard: one decimal.
pub fn dashboard_average_percentage(attempts: &[QuizAttempt]) -> f64 {
    round_to(mean_percentage(attempts), 1)
}

/// Share of submitted attempts reaching `pass_marks`, as a percentage with
/// two decimals. An empty set reports 0.
pub fn pass_rate(attempts: &[QuizAttempt], pass_marks: i32) -> f64 {
    let submitted: Vec<&QuizAttempt> = attempts.iter().filter(|a| a.is_submitted()).collect();
    if submitted.is_empty() {
        return 0.0;
    }
    let passed = submitted.iter().filter(|a| a.passed(pass_marks)).count();
    round_to(passed as f64 / submitted.len() as f64 * 100.0, 2)
}

/// Letter-grade banding table. Display concern only — nothing server-side
/// depends on the letters, so the cutoffs are data, not an invariant.
#[derive(Debug, Clone)]
pub struct GradeScale {
    /// (minimum percentage, letter), sorted descending by minimum.
    bands: Vec<(f64, String)>,
}

impl Default for GradeScale {
    fn default() -> Self {
        Self::new(vec![
            (95.0, "A+"),
            (90.0, "A"),
            (85.0, "B+"),
            (80.0, "B"),
            (75.0, "C+"),
            (70.0, "C"),
            (60.0, "D"),
            (0.0, "F"),
        ])
    }
}

impl GradeScale {
    pub fn new(bands: Vec<(f64, &str)>) -> Self {
        let mut bands: Vec<(f64, String)> = bands
            .into_iter()
            .map(|(min, letter)| (min, letter.to_string()))
            .collect();
        bands.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Self { bands }
    }

    pub fn letter_for(&self, percentage: f64) -> &str {
        for (min, letter) in &self.bands {
            if percentage >= *min {
                return letter;
            }
        }
        self.bands
            .last()
            .map(|(_, letter)| letter.as_str())
            .unwrap_or("F")
    }

    pub fn letters(&self) -> impl Iterator<Item = &str> {
        self.bands.iter().map(|(_, letter)| letter.as_str())
    }
}

#[derive(Debug, Serialize)]
pub struct DistributionBucket {
    pub letter: String,
    pub count: usize,
}

/// Counts submitted attempts per letter band, in scale order.
pub fn score_distribution(attempts: &[QuizAttempt], scale: &GradeScale) -> Vec<DistributionBucket> {
    let mut buckets: Vec<DistributionBucket> = scale
        .letters()
        .map(|letter| DistributionBucket {
            letter: letter.to_string(),
            count: 0,
        })
        .collect();

    for attempt in gradable(attempts) {
        let letter = scale.letter_for(attempt.percentage());
        if let Some(bucket) = buckets.iter_mut().find(|b| b.letter == letter) {
            bucket.count += 1;
        }
    }

    buckets
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::quiz_attempt::AttemptStatus;
    use chrono::Utc;

    fn attempt(score: i32, total_points: i32, status: AttemptStatus) -> QuizAttempt {
        QuizAttempt {
            id: 0,
            quiz_id: 1,
            student_id: 1,
            attempt_number: 1,
            started_at: Utc::now(),
            completed_at: None,
            score,
            total_points,
            status,
        }
    }

    #[test]
    fn empty_set_averages_to_zero() {
        assert_eq!(average_percentage(&[]), 0.0);
        assert_eq!(dashboard_average_percentage(&[]), 0.0);
        assert_eq!(pass_rate(&[], 30), 0.0);
    }

    #[test]
    fn in_progress_and_zero_point_attempts_are_excluded() {
        let attempts = [
            attempt(40, 50, AttemptStatus::Submitted),
            // Not submitted: ignored even with a perfect score.
            attempt(50, 50, AttemptStatus::InProgress),
            // Zero-point quiz: ignored rather than dragging the mean to 0.
            attempt(0, 0, AttemptStatus::Submitted),
        ];
        assert_eq!(average_percentage(&attempts), 80.0);
    }

    #[test]
    fn only_unscorable_attempts_average_to_zero() {
        let attempts = [
            attempt(10, 50, AttemptStatus::InProgress),
            attempt(0, 0, AttemptStatus::Submitted),
        ];
        assert_eq!(average_percentage(&attempts), 0.0);
    }

    #[test]
    fn the_two_call_sites_round_differently() {
        // 1/3 of the points: 33.333...%
        let attempts = [attempt(1, 3, AttemptStatus::Submitted)];
        assert_eq!(average_percentage(&attempts), 33.33);
        assert_eq!(dashboard_average_percentage(&attempts), 33.3);
    }

    #[test]
    fn average_of_mixed_results() {
        let attempts = [
            attempt(45, 50, AttemptStatus::Submitted), // 90%
            attempt(25, 50, AttemptStatus::Submitted), // 50%
        ];
        assert_eq!(average_percentage(&attempts), 70.0);
        assert_eq!(dashboard_average_percentage(&attempts), 70.0);
    }

    #[test]
    fn pass_rate_counts_submitted_attempts() {
        let attempts = [
            attempt(45, 50, AttemptStatus::Submitted),
            attempt(25, 50, AttemptStatus::Submitted),
            attempt(50, 50, AttemptStatus::InProgress),
        ];
        assert_eq!(pass_rate(&attempts, 30), 50.0);
    }

    #[test]
    fn pass_rate_rounds_to_two_decimals() {
        let attempts = [
            attempt(45, 50, AttemptStatus::Submitted),
            attempt(25, 50, AttemptStatus::Submitted),
            attempt(20, 50, AttemptStatus::Submitted),
        ];
        // 1 of 3 passing.
        assert_eq!(pass_rate(&attempts, 30), 33.33);
    }

    #[test]
    fn default_scale_boundaries() {
        let scale = GradeScale::default();
        assert_eq!(scale.letter_for(100.0), "A+");
        assert_eq!(scale.letter_for(95.0), "A+");
        assert_eq!(scale.letter_for(94.9), "A");
        assert_eq!(scale.letter_for(90.0), "A");
        assert_eq!(scale.letter_for(60.0), "D");
        assert_eq!(scale.letter_for(59.9), "F");
        assert_eq!(scale.letter_for(0.0), "F");
    }

    #[test]
    fn custom_scale_is_respected() {
        let scale = GradeScale::new(vec![(50.0, "pass"), (0.0, "fail")]);
        assert_eq!(scale.letter_for(50.0), "pass");
        assert_eq!(scale.letter_for(49.9), "fail");
    }

    #[test]
    fn distribution_buckets_follow_the_scale() {
        let scale = GradeScale::default();
        let attempts = [
            attempt(48, 50, AttemptStatus::Submitted), // 96% -> A+
            attempt(46, 50, AttemptStatus::Submitted), // 92% -> A
            attempt(45, 50, AttemptStatus::Submitted), // 90% -> A
            attempt(10, 50, AttemptStatus::Submitted), // 20% -> F
            attempt(50, 50, AttemptStatus::InProgress), // ignored
        ];
        let buckets = score_distribution(&attempts, &scale);

        let count_of = |letter: &str| {
            buckets
                .iter()
                .find(|b| b.letter == letter)
                .map(|b| b.count)
                .unwrap()
        };
        assert_eq!(count_of("A+"), 1);
        assert_eq!(count_of("A"), 2);
        assert_eq!(count_of("F"), 1);
        assert_eq!(buckets.iter().map(|b| b.count).sum::<usize>(), 4);
    }
}
