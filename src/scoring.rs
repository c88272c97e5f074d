// src/scoring.rs

use crate::{
    config::MAX_SCORE,
    error::{ExamError, ExamResult},
    models::{
        answer::AnswerRecord,
        result::{QuestionContribution, ScoreResult},
    },
};

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Weighted percentage scoring over per-question test results.
#[derive(Debug, Clone, Copy)]
pub struct ScoringEngine {
    question_count: usize,
}

/// Equal weight for every question, `1 / n` each.
pub fn uniform_weights(question_count: usize) -> Vec<f64> {
    if question_count == 0 {
        return Vec::new();
    }
    vec![1.0 / question_count as f64; question_count]
}

/// Fraction of tests passed. Zero when there are no tests;
/// `tests_passed` is clamped so it can never exceed `tests_total`.
fn pass_ratio(answer: &AnswerRecord) -> f64 {
    if answer.tests_total <= 0 {
        return 0.0;
    }
    let passed = answer.tests_passed.clamp(0, answer.tests_total);
    passed as f64 / answer.tests_total as f64
}

impl ScoringEngine {
    pub fn new(question_count: usize) -> Self {
        Self { question_count }
    }

    /// Computes the weighted score.
    ///
    /// * `weights` defaults to [`uniform_weights`]; an explicit vector must have
    ///   one finite, non-negative entry per question and sum to 1.
    /// * Answers bind by `question_index`, so their order is irrelevant.
    ///   Out-of-range indices are dropped; if an index repeats, the best
    ///   attempt counts.
    /// * `total_score = round(100 * sum(weight[i] * passed[i] / total[i]))`.
    pub fn compute_weighted_score(
        &self,
        answers: &[AnswerRecord],
        weights: Option<&[f64]>,
    ) -> ExamResult<ScoreResult> {
        let n = self.question_count;
        let weights = match weights {
            Some(explicit) => {
                validate_weights(explicit, n)?;
                explicit.to_vec()
            }
            None => uniform_weights(n),
        };

        if answers.len() != n {
            tracing::warn!(
                "Scoring inconsistency: {} answers for {} questions, scoring the available subset",
                answers.len(),
                n
            );
        }

        let mut best: Vec<Option<&AnswerRecord>> = vec![None; n];
        for answer in answers {
            let slot = usize::try_from(answer.question_index)
                .ok()
                .and_then(|index| best.get_mut(index));
            let Some(slot) = slot else {
                tracing::warn!(
                    "Scoring inconsistency: question index {} outside 0..{}, ignored",
                    answer.question_index,
                    n
                );
                continue;
            };
            let replace = match *slot {
                None => true,
                Some(current) => rank(answer) > rank(current),
            };
            if replace {
                *slot = Some(answer);
            }
        }

        let contributions: Vec<QuestionContribution> = best
            .iter()
            .zip(&weights)
            .enumerate()
            .map(|(index, (answer, weight))| {
                let (tests_passed, tests_total, ratio) = match answer {
                    Some(a) => (a.tests_passed, a.tests_total, pass_ratio(a)),
                    None => (0, 0, 0.0),
                };
                QuestionContribution {
                    question_index: index as i32,
                    weight: *weight,
                    tests_passed,
                    tests_total,
                    points: weight * ratio * f64::from(MAX_SCORE),
                }
            })
            .collect();

        let sum: f64 = contributions.iter().map(|c| c.points).sum();
        let total_score = (sum.round() as i32).clamp(0, MAX_SCORE);

        Ok(ScoreResult {
            total_score,
            max_score: MAX_SCORE,
            contributions,
        })
    }
}

/// Total order over attempts at the same question, independent of input order.
fn rank(answer: &AnswerRecord) -> (f64, i32, i32) {
    (pass_ratio(answer), answer.tests_total, answer.tests_passed)
}

fn validate_weights(weights: &[f64], question_count: usize) -> ExamResult<()> {
    if weights.len() != question_count {
        return Err(ExamError::Configuration(format!(
            "weight vector has {} entries for {} questions",
            weights.len(),
            question_count
        )));
    }
    if let Some(bad) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
        return Err(ExamError::Configuration(format!(
            "weights must be finite and non-negative, got {}",
            bad
        )));
    }
    let sum: f64 = weights.iter().sum();
    if question_count > 0 && (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(ExamError::Configuration(format!(
            "weights must sum to 1.0, got {}",
            sum
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(question_index: i32, tests_passed: i32, tests_total: i32) -> AnswerRecord {
        AnswerRecord {
            session_id: 1,
            question_index,
            tests_passed,
            tests_total,
            compilation_errors: 0,
            runtime_errors: 0,
            is_correct: tests_total > 0 && tests_passed == tests_total,
        }
    }

    #[test]
    fn test_all_passed_scores_100() {
        for n in 1..=7 {
            let answers: Vec<_> = (0..n).map(|i| answer(i, 5, 5)).collect();
            let result = ScoringEngine::new(n as usize)
                .compute_weighted_score(&answers, None)
                .unwrap();
            assert_eq!(result.total_score, 100, "n = {}", n);
            assert_eq!(result.max_score, 100);
        }
    }

    #[test]
    fn test_partial_credit_is_proportional() {
        // (1/3)(1/2) + (1/3)(1) + (1/3)(1/4) = 0.5833 -> 58
        let answers = vec![answer(0, 2, 4), answer(1, 3, 3), answer(2, 1, 4)];
        let result = ScoringEngine::new(3).compute_weighted_score(&answers, None).unwrap();
        assert_eq!(result.total_score, 58);
        assert_eq!(result.contributions.len(), 3);
        assert!((result.contributions[1].points - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_tests_contributes_zero() {
        let answers = vec![answer(0, 0, 0), answer(1, 4, 4)];
        let result = ScoringEngine::new(2).compute_weighted_score(&answers, None).unwrap();
        assert_eq!(result.total_score, 50);
        assert_eq!(result.contributions[0].points, 0.0);
    }

    #[test]
    fn test_answer_order_is_irrelevant() {
        let forward = vec![answer(0, 1, 3), answer(1, 2, 2), answer(2, 0, 5)];
        let mut reversed = forward.clone();
        reversed.reverse();

        let engine = ScoringEngine::new(3);
        let a = engine.compute_weighted_score(&forward, None).unwrap();
        let b = engine.compute_weighted_score(&reversed, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_weight_order_matters() {
        let answers = vec![answer(0, 1, 1), answer(1, 0, 1)];
        let engine = ScoringEngine::new(2);
        let a = engine.compute_weighted_score(&answers, Some(&[0.7, 0.3])).unwrap();
        let b = engine.compute_weighted_score(&answers, Some(&[0.3, 0.7])).unwrap();
        assert_eq!(a.total_score, 70);
        assert_eq!(b.total_score, 30);
    }

    #[test]
    fn test_explicit_uniform_matches_default() {
        let answers = vec![answer(0, 3, 4), answer(1, 1, 2), answer(2, 2, 2)];
        let engine = ScoringEngine::new(3);
        let implicit = engine.compute_weighted_score(&answers, None).unwrap();
        let explicit = engine
            .compute_weighted_score(&answers, Some(&uniform_weights(3)))
            .unwrap();
        assert_eq!(implicit, explicit);
    }

    #[test]
    fn test_mismatched_weights_fail_loudly() {
        let answers = vec![answer(0, 1, 1)];
        let engine = ScoringEngine::new(3);

        let err = engine.compute_weighted_score(&answers, Some(&[0.5, 0.5])).unwrap_err();
        assert!(matches!(err, ExamError::Configuration(_)));

        let err = engine
            .compute_weighted_score(&answers, Some(&[0.5, 0.5, 0.5]))
            .unwrap_err();
        assert!(matches!(err, ExamError::Configuration(_)));

        let err = engine
            .compute_weighted_score(&answers, Some(&[1.5, -0.5, 0.0]))
            .unwrap_err();
        assert!(matches!(err, ExamError::Configuration(_)));
    }

    #[test]
    fn test_passed_is_clamped_to_total() {
        let answers = vec![answer(0, 9, 3), answer(1, 0, 3)];
        let result = ScoringEngine::new(2).compute_weighted_score(&answers, None).unwrap();
        assert_eq!(result.total_score, 50);
    }

    #[test]
    fn test_missing_and_stray_answers() {
        // Only question 1 answered; index 5 is out of range and ignored.
        let answers = vec![answer(1, 2, 2), answer(5, 2, 2), answer(-1, 2, 2)];
        let result = ScoringEngine::new(4).compute_weighted_score(&answers, None).unwrap();
        assert_eq!(result.total_score, 25);
        assert_eq!(result.contributions.len(), 4);
        assert_eq!(result.contributions[0].tests_total, 0);
    }

    #[test]
    fn test_duplicate_index_keeps_best_attempt() {
        let a = vec![answer(0, 1, 4), answer(0, 4, 4)];
        let b = vec![answer(0, 4, 4), answer(0, 1, 4)];
        let engine = ScoringEngine::new(1);
        assert_eq!(engine.compute_weighted_score(&a, None).unwrap().total_score, 100);
        assert_eq!(
            engine.compute_weighted_score(&a, None).unwrap(),
            engine.compute_weighted_score(&b, None).unwrap()
        );
    }

    #[test]
    fn test_weighted_average_of_75() {
        let answers = vec![answer(0, 3, 4), answer(1, 3, 4), answer(2, 3, 4)];
        let result = ScoringEngine::new(3).compute_weighted_score(&answers, None).unwrap();
        assert_eq!(result.total_score, 75);
    }

    #[test]
    fn test_no_questions() {
        let result = ScoringEngine::new(0).compute_weighted_score(&[], None).unwrap();
        assert_eq!(result.total_score, 0);
        assert_eq!(result.max_score, 100);
        assert!(result.contributions.is_empty());
    }
}
