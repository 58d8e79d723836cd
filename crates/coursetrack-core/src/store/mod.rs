//! Storage abstraction for Coursetrack.
//!
//! The [`Store`] trait defines every persistence operation the progress,
//! certificate and search pipelines need, enabling pluggable backends
//! (SQLite in the app crate, [`memory::InMemoryStore`] for tests).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! # Atomicity
//!
//! [`complete_lesson`](Store::complete_lesson) is the one compound write:
//! the insert-if-absent of the completed-lesson row, the count of
//! completed lessons, the [`ProgressTracker`] recompute and the write-back
//! of `progress_percentage`/`completed_at` happen as a single unit. No
//! caller can observe a completed-lesson row without its progress update,
//! and two concurrent completions for the same enrollment are serialized.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    Certificate, Course, CourseOutline, CourseReport, Enrollment, EnrollmentSummary, Lesson,
    Module, ProgressSnapshot, ProgressUpdate,
};
use crate::progress::ProgressTracker;
use crate::search::MatchTier;

/// Abstract storage backend for Coursetrack.
///
/// Domain failures are returned as [`ProgressError`](crate::ProgressError)
/// values wrapped in `anyhow::Error`.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`create_course`](Store::create_course) | Add a course |
/// | [`add_module`](Store::add_module) | Append a module to a course |
/// | [`add_lesson`](Store::add_lesson) | Append a lesson to a module |
/// | [`remove_lesson`](Store::remove_lesson) | Delete a lesson and its completions |
/// | [`course_lesson_count`](Store::course_lesson_count) | Current total lessons of a course |
/// | [`enroll`](Store::enroll) | Insert-if-absent an enrollment, reactivating it |
/// | [`complete_lesson`](Store::complete_lesson) | Atomic mark-complete + recompute |
/// | [`refresh_progress`](Store::refresh_progress) | Recompute without a new completion |
/// | [`get_progress`](Store::get_progress) | Read-only progress view |
/// | [`issue_certificate`](Store::issue_certificate) | Idempotent certificate issuance |
/// | [`resolve_parent_course`](Store::resolve_parent_course) | Module/lesson slug → course slug |
#[async_trait]
pub trait Store: Send + Sync {
    // ── Catalog ──

    async fn create_course(
        &self,
        slug: &str,
        title: &str,
        teacher_id: Option<i64>,
    ) -> Result<Course>;

    async fn add_module(&self, course_slug: &str, slug: &str, title: &str) -> Result<Module>;

    async fn add_lesson(&self, module_slug: &str, slug: &str, title: &str) -> Result<Lesson>;

    /// Delete a lesson. Its completed-lesson rows go with it; stored
    /// percentages are left until the next recompute.
    async fn remove_lesson(&self, lesson_slug: &str) -> Result<()>;

    async fn get_course(&self, slug: &str) -> Result<Option<Course>>;

    async fn get_course_by_id(&self, id: i64) -> Result<Option<Course>>;

    async fn course_outline(&self, slug: &str) -> Result<Option<CourseOutline>>;

    /// Sum of lesson counts across all modules of the course.
    async fn course_lesson_count(&self, course_id: i64) -> Result<u64>;

    /// Module or lesson slug → owning course slug. Course tier returns the
    /// slug itself if the course exists.
    async fn resolve_parent_course(&self, tier: MatchTier, slug: &str) -> Result<Option<String>>;

    // ── Enrollments and progress ──

    async fn enroll(&self, user_id: i64, course_slug: &str, now: DateTime<Utc>)
        -> Result<Enrollment>;

    async fn deactivate_enrollment(&self, enrollment_id: i64) -> Result<()>;

    async fn get_enrollment(&self, enrollment_id: i64) -> Result<Option<Enrollment>>;

    async fn complete_lesson(
        &self,
        enrollment_id: i64,
        lesson_slug: &str,
        tracker: &ProgressTracker,
        now: DateTime<Utc>,
    ) -> Result<ProgressUpdate>;

    async fn refresh_progress(
        &self,
        enrollment_id: i64,
        tracker: &ProgressTracker,
        now: DateTime<Utc>,
    ) -> Result<ProgressSnapshot>;

    async fn get_progress(&self, enrollment_id: i64) -> Result<ProgressSnapshot>;

    async fn list_enrollments(&self, user_id: i64) -> Result<Vec<EnrollmentSummary>>;

    async fn course_report(&self, course_slug: &str) -> Result<CourseReport>;

    // ── Certificates ──

    async fn issue_certificate(&self, enrollment_id: i64, now: DateTime<Utc>)
        -> Result<Certificate>;

    async fn find_certificate(&self, verification_code: &str) -> Result<Option<Certificate>>;
}
