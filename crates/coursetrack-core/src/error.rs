//! Domain errors raised by the progress, catalog, and certificate operations.
//!
//! Store methods return `anyhow::Result`; these variants travel inside the
//! `anyhow::Error` and are recovered with `downcast_ref::<ProgressError>()`
//! by callers that need to map them (e.g. to HTTP status codes).

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProgressError {
    #[error("course not found: {0}")]
    CourseNotFound(String),

    #[error("module not found: {0}")]
    ModuleNotFound(String),

    #[error("lesson not found: {0}")]
    LessonNotFound(String),

    #[error("enrollment not found: {0}")]
    EnrollmentNotFound(i64),

    #[error("enrollment {0} is inactive")]
    EnrollmentInactive(i64),

    #[error("lesson {lesson} does not belong to the course of enrollment {enrollment_id}")]
    LessonNotInCourse { enrollment_id: i64, lesson: String },

    /// Only raised under [`EmptyCoursePolicy::Reject`](crate::progress::EmptyCoursePolicy::Reject).
    #[error("course {0} has no lessons; progress cannot be computed")]
    InvalidTotalLessonCount(i64),

    #[error("enrollment {0} has not completed its course")]
    NotEligibleForCertificate(i64),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("forbidden: {0}")]
    Forbidden(String),
}
