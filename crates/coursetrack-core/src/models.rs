//! Core data models.
//!
//! The catalog is a strict containment hierarchy: a [`Course`] owns
//! [`Module`]s, a module owns [`Lesson`]s. Learner state hangs off an
//! [`Enrollment`]; each finished lesson is an immutable [`CompletedLesson`]
//! fact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub slug: String,
    pub title: String,
    /// Owning teacher, if any.
    pub teacher_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub id: i64,
    pub course_id: i64,
    pub slug: String,
    pub title: String,
    pub position: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: i64,
    pub module_id: i64,
    pub slug: String,
    pub title: String,
    pub position: i64,
}

/// A learner's enrollment in one course.
///
/// `(user_id, course_id)` is unique. `progress_percentage` and
/// `completed_at` are only ever written by progress recomputation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: i64,
    pub user_id: i64,
    pub course_id: i64,
    /// Always within `0..=100`.
    pub progress_percentage: u8,
    /// Set the first time the percentage reaches 100; never cleared.
    pub completed_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub enrolled_at: DateTime<Utc>,
}

/// "This lesson was completed under this enrollment." Created at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedLesson {
    pub enrollment_id: i64,
    pub lesson_id: i64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    /// UUID v4.
    pub id: String,
    pub enrollment_id: i64,
    pub verification_code: String,
    pub issued_at: DateTime<Utc>,
}

/// Modules and lessons of a course, in position order.
#[derive(Debug, Clone, Serialize)]
pub struct CourseOutline {
    pub course: Course,
    pub modules: Vec<ModuleOutline>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleOutline {
    pub module: Module,
    pub lessons: Vec<Lesson>,
}

impl CourseOutline {
    pub fn lesson_count(&self) -> usize {
        self.modules.iter().map(|m| m.lessons.len()).sum()
    }
}

/// Read view of an enrollment's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub enrollment_id: i64,
    pub course_id: i64,
    pub progress_percentage: u8,
    pub completed_at: Option<DateTime<Utc>>,
    /// Slugs of completed lessons still in the course, in catalog order.
    pub completed_lessons: Vec<String>,
    /// Current total lesson count of the course.
    pub total_lessons: u64,
}

/// Result of a `complete_lesson` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressUpdate {
    #[serde(flatten)]
    pub snapshot: ProgressSnapshot,
    /// The completed-lesson row was inserted by this call.
    pub newly_completed: bool,
    /// This call moved the enrollment into the completed state.
    pub course_completed: bool,
}

/// One row of a learner's dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrollmentSummary {
    pub enrollment_id: i64,
    pub course_slug: String,
    pub course_title: String,
    pub progress_percentage: u8,
    pub completed_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

/// Per-course aggregate for the teacher dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseReport {
    pub course_slug: String,
    pub title: String,
    pub total_lessons: u64,
    pub active_enrollments: u64,
    pub completed_enrollments: u64,
    /// Mean stored percentage over active enrollments, `0.0` when none.
    pub average_percentage: f64,
}
