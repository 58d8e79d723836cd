//! Enrollment progress computation.
//!
//! The [`ProgressTracker`] turns "how many lessons exist" and "how many has
//! this enrollment completed" into a percentage and a completion timestamp.
//! It is pure: stores call it inside their write transaction, after the
//! idempotent insert of the triggering completed-lesson row, and persist
//! both returned fields together.
//!
//! # Rules
//!
//! 1. `percentage = floor(completed * 100 / total)`, clamped to `0..=100`.
//! 2. A course with zero lessons is counted as one lesson under
//!    [`EmptyCoursePolicy::Guard`] (yielding 0%), or rejected under
//!    [`EmptyCoursePolicy::Reject`].
//! 3. `completed_at` is set to `now` the first time the percentage reaches
//!    100 and is never cleared afterwards, even when lessons are added later.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProgressError;
use crate::models::Enrollment;

/// What to do when a course currently has no lessons.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyCoursePolicy {
    /// Divide by one instead of zero; progress stays at 0%.
    #[default]
    Guard,
    /// Fail with [`ProgressError::InvalidTotalLessonCount`].
    Reject,
}

/// Output of [`ProgressTracker::recompute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recomputed {
    pub percentage: u8,
    pub completed_at: Option<DateTime<Utc>>,
    /// `completed_at` was set by this computation.
    pub transitioned: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressTracker {
    policy: EmptyCoursePolicy,
}

impl ProgressTracker {
    pub fn new(policy: EmptyCoursePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> EmptyCoursePolicy {
        self.policy
    }

    /// Compute the new percentage and completion timestamp for `enrollment`.
    pub fn recompute(
        &self,
        enrollment: &Enrollment,
        total_lessons: u64,
        completed: u64,
        now: DateTime<Utc>,
    ) -> Result<Recomputed, ProgressError> {
        let total = match (total_lessons, self.policy) {
            (0, EmptyCoursePolicy::Guard) => 1,
            (0, EmptyCoursePolicy::Reject) => {
                return Err(ProgressError::InvalidTotalLessonCount(enrollment.course_id))
            }
            (n, _) => n,
        };

        let percentage = percentage_of(completed, total);

        let (completed_at, transitioned) = match enrollment.completed_at {
            Some(at) => (Some(at), false),
            None if percentage >= 100 => (Some(now), true),
            None => (None, false),
        };

        Ok(Recomputed {
            percentage,
            completed_at,
            transitioned,
        })
    }
}

/// Integer floor of `completed / total * 100`, capped at 100.
///
/// `total` must be non-zero.
fn percentage_of(completed: u64, total: u64) -> u8 {
    let pct = completed.saturating_mul(100) / total;
    pct.min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn enrollment(completed_at: Option<DateTime<Utc>>) -> Enrollment {
        Enrollment {
            id: 1,
            user_id: 7,
            course_id: 3,
            progress_percentage: 0,
            completed_at,
            is_active: true,
            enrolled_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn quarter_steps_for_four_lessons() {
        let tracker = ProgressTracker::default();
        let e = enrollment(None);
        let pcts: Vec<u8> = (1..=4)
            .map(|n| tracker.recompute(&e, 4, n, at(1)).unwrap().percentage)
            .collect();
        assert_eq!(pcts, vec![25, 50, 75, 100]);
    }

    #[test]
    fn completion_sets_timestamp_once() {
        let tracker = ProgressTracker::default();
        let r = tracker.recompute(&enrollment(None), 4, 4, at(9)).unwrap();
        assert_eq!(r.percentage, 100);
        assert_eq!(r.completed_at, Some(at(9)));
        assert!(r.transitioned);

        let r2 = tracker
            .recompute(&enrollment(Some(at(9))), 4, 4, at(12))
            .unwrap();
        assert_eq!(r2.completed_at, Some(at(9)));
        assert!(!r2.transitioned);
    }

    #[test]
    fn completed_at_survives_added_lessons() {
        let tracker = ProgressTracker::default();
        let r = tracker
            .recompute(&enrollment(Some(at(9))), 5, 4, at(12))
            .unwrap();
        assert_eq!(r.percentage, 80);
        assert_eq!(r.completed_at, Some(at(9)));
    }

    #[test]
    fn below_full_leaves_completed_at_empty() {
        let tracker = ProgressTracker::default();
        let r = tracker.recompute(&enrollment(None), 3, 2, at(1)).unwrap();
        assert_eq!(r.percentage, 66);
        assert_eq!(r.completed_at, None);
        assert!(!r.transitioned);
    }

    #[test]
    fn zero_lessons_guarded_to_zero_percent() {
        let tracker = ProgressTracker::new(EmptyCoursePolicy::Guard);
        let r = tracker.recompute(&enrollment(None), 0, 0, at(1)).unwrap();
        assert_eq!(r.percentage, 0);
        assert_eq!(r.completed_at, None);
    }

    #[test]
    fn zero_lessons_rejected_under_reject_policy() {
        let tracker = ProgressTracker::new(EmptyCoursePolicy::Reject);
        let err = tracker.recompute(&enrollment(None), 0, 0, at(1)).unwrap_err();
        assert_eq!(err, ProgressError::InvalidTotalLessonCount(3));
    }

    #[test]
    fn over_completion_is_clamped() {
        let tracker = ProgressTracker::default();
        let r = tracker.recompute(&enrollment(None), 2, 5, at(1)).unwrap();
        assert_eq!(r.percentage, 100);
    }

    #[test]
    fn policy_parses_from_lowercase() {
        let p: EmptyCoursePolicy = serde_json::from_str("\"reject\"").unwrap();
        assert_eq!(p, EmptyCoursePolicy::Reject);
    }
}
