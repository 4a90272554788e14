use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One user's vote on a book. At most one entry per user may exist in a
/// book's rating list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    pub user_id: Uuid,
    pub grade: i32,
}

pub const MIN_GRADE: i32 = 1;
pub const MAX_GRADE: i32 = 5;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum RatingError {
    #[error("Grade must be an integer between {MIN_GRADE} and {MAX_GRADE}")]
    GradeOutOfRange,
    #[error("You have already rated this book")]
    AlreadyRated,
}

pub fn grade_valid(grade: i32) -> bool {
    (MIN_GRADE..=MAX_GRADE).contains(&grade)
}

/// Arithmetic mean of all grades, rounded half-away-from-zero to one decimal.
/// An empty list averages to 0.
pub fn average(ratings: &[Rating]) -> f64 {
    if ratings.is_empty() {
        return 0.0;
    }
    let sum: i64 = ratings.iter().map(|r| r.grade as i64).sum();
    let mean = sum as f64 / ratings.len() as f64;
    (mean * 10.0).round() / 10.0
}

/// Appends a vote and returns the recomputed average. A second vote from the
/// same user or an out-of-range grade is rejected and leaves the list
/// untouched.
pub fn add_rating(
    ratings: &mut Vec<Rating>,
    user_id: Uuid,
    grade: i32,
) -> Result<f64, RatingError> {
    if !grade_valid(grade) {
        return Err(RatingError::GradeOutOfRange);
    }
    if ratings.iter().any(|r| r.user_id == user_id) {
        return Err(RatingError::AlreadyRated);
    }
    ratings.push(Rating { user_id, grade });
    Ok(average(ratings))
}

/// Initial ratings for a freshly created book. An absent or invalid initial
/// grade is silently ignored: the book simply starts unrated.
pub fn seed(owner_id: Uuid, initial_grade: Option<i32>) -> (Vec<Rating>, f64) {
    match initial_grade {
        Some(grade) if grade_valid(grade) => {
            let ratings = vec![Rating {
                user_id: owner_id,
                grade,
            }];
            let avg = average(&ratings);
            (ratings, avg)
        }
        _ => (Vec::new(), 0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_ratings_average_to_zero() {
        assert_eq!(average(&[]), 0.0);
    }

    #[test]
    fn average_rounds_half_away_from_zero_to_one_decimal() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        // 8/3 = 2.666... -> 2.7
        let ratings = vec![
            Rating { user_id: a, grade: 2 },
            Rating { user_id: b, grade: 3 },
            Rating { user_id: c, grade: 3 },
        ];
        assert_eq!(average(&ratings), 2.7);
        // 3/2 = 1.5 stays 1.5
        let ratings = vec![
            Rating { user_id: a, grade: 1 },
            Rating { user_id: b, grade: 2 },
        ];
        assert_eq!(average(&ratings), 1.5);
        // 13/4 = 3.25 -> 3.3 (half rounds up)
        let ratings = vec![
            Rating { user_id: a, grade: 3 },
            Rating { user_id: b, grade: 3 },
            Rating { user_id: c, grade: 3 },
            Rating { user_id: Uuid::new_v4(), grade: 4 },
        ];
        assert_eq!(average(&ratings), 3.3);
    }

    #[test]
    fn rating_scenario_from_unrated_to_two_voters() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut ratings = Vec::new();

        let avg = add_rating(&mut ratings, a, 4).unwrap();
        assert_eq!(ratings, vec![Rating { user_id: a, grade: 4 }]);
        assert_eq!(avg, 4.0);

        let avg = add_rating(&mut ratings, b, 5).unwrap();
        assert_eq!(avg, 4.5);

        // Resubmission from A is rejected and changes nothing.
        let before = ratings.clone();
        assert_eq!(
            add_rating(&mut ratings, a, 1),
            Err(RatingError::AlreadyRated)
        );
        assert_eq!(ratings, before);
        assert_eq!(average(&ratings), 4.5);
    }

    #[test]
    fn out_of_range_grades_are_rejected_without_mutation() {
        let mut ratings = Vec::new();
        for grade in [0, -1, 6, 100] {
            assert_eq!(
                add_rating(&mut ratings, Uuid::new_v4(), grade),
                Err(RatingError::GradeOutOfRange)
            );
        }
        assert!(ratings.is_empty());
    }

    #[test]
    fn seed_with_valid_grade_creates_single_vote() {
        let owner = Uuid::new_v4();
        let (ratings, avg) = seed(owner, Some(3));
        assert_eq!(ratings, vec![Rating { user_id: owner, grade: 3 }]);
        assert_eq!(avg, 3.0);
    }

    #[test]
    fn seed_ignores_absent_zero_and_out_of_range_grades() {
        let owner = Uuid::new_v4();
        for initial in [None, Some(0), Some(-2), Some(6)] {
            let (ratings, avg) = seed(owner, initial);
            assert!(ratings.is_empty());
            assert_eq!(avg, 0.0);
        }
    }
}
