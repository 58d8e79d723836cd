//! In-memory [`Store`] implementation for testing and embedding.
//!
//! All tables live in one [`State`] behind a `std::sync::RwLock`. Every
//! write takes the write lock for its whole duration, which serializes
//! concurrent completions; reads share the read lock.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::certificate;
use crate::error::ProgressError;
use crate::models::{
    Certificate, CompletedLesson, Course, CourseOutline, CourseReport, Enrollment,
    EnrollmentSummary, Lesson, Module, ModuleOutline, ProgressSnapshot, ProgressUpdate,
};
use crate::progress::ProgressTracker;
use crate::search::MatchTier;

use super::Store;

#[derive(Default)]
struct State {
    courses: Vec<Course>,
    modules: Vec<Module>,
    lessons: Vec<Lesson>,
    enrollments: Vec<Enrollment>,
    completions: Vec<CompletedLesson>,
    certificates: Vec<Certificate>,
}

fn next_id<T>(items: &[T], id: impl Fn(&T) -> i64) -> i64 {
    items.iter().map(id).max().unwrap_or(0) + 1
}

impl State {
    fn course(&self, slug: &str) -> Option<&Course> {
        self.courses.iter().find(|c| c.slug == slug)
    }

    fn course_by_id(&self, id: i64) -> Option<&Course> {
        self.courses.iter().find(|c| c.id == id)
    }

    fn module(&self, slug: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.slug == slug)
    }

    fn module_by_id(&self, id: i64) -> Option<&Module> {
        self.modules.iter().find(|m| m.id == id)
    }

    fn lesson(&self, slug: &str) -> Option<&Lesson> {
        self.lessons.iter().find(|l| l.slug == slug)
    }

    fn enrollment_index(&self, id: i64) -> Result<usize, ProgressError> {
        self.enrollments
            .iter()
            .position(|e| e.id == id)
            .ok_or(ProgressError::EnrollmentNotFound(id))
    }

    fn lesson_course_id(&self, lesson: &Lesson) -> Option<i64> {
        self.module_by_id(lesson.module_id).map(|m| m.course_id)
    }

    /// Lessons of a course in catalog order (module position, lesson position).
    fn course_lessons(&self, course_id: i64) -> Vec<&Lesson> {
        let mut modules: Vec<&Module> = self
            .modules
            .iter()
            .filter(|m| m.course_id == course_id)
            .collect();
        modules.sort_by_key(|m| (m.position, m.id));
        let mut out = Vec::new();
        for m in modules {
            let mut lessons: Vec<&Lesson> =
                self.lessons.iter().filter(|l| l.module_id == m.id).collect();
            lessons.sort_by_key(|l| (l.position, l.id));
            out.extend(lessons);
        }
        out
    }

    fn lesson_count(&self, course_id: i64) -> u64 {
        self.course_lessons(course_id).len() as u64
    }

    fn is_completed(&self, enrollment_id: i64, lesson_id: i64) -> bool {
        self.completions
            .iter()
            .any(|c| c.enrollment_id == enrollment_id && c.lesson_id == lesson_id)
    }

    /// Slugs of completed lessons that are still part of the course.
    fn completed_slugs(&self, enrollment: &Enrollment) -> Vec<String> {
        self.course_lessons(enrollment.course_id)
            .into_iter()
            .filter(|l| self.is_completed(enrollment.id, l.id))
            .map(|l| l.slug.clone())
            .collect()
    }

    fn snapshot(&self, enrollment: &Enrollment) -> ProgressSnapshot {
        ProgressSnapshot {
            enrollment_id: enrollment.id,
            course_id: enrollment.course_id,
            progress_percentage: enrollment.progress_percentage,
            completed_at: enrollment.completed_at,
            completed_lessons: self.completed_slugs(enrollment),
            total_lessons: self.lesson_count(enrollment.course_id),
        }
    }
}

/// In-memory store for tests and single-process use.
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state.read().map_err(|_| anyhow!("store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state.write().map_err(|_| anyhow!("store lock poisoned"))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_course(
        &self,
        slug: &str,
        title: &str,
        teacher_id: Option<i64>,
    ) -> Result<Course> {
        let mut st = self.write()?;
        if st.course(slug).is_some() {
            return Err(ProgressError::AlreadyExists(format!("course {}", slug)).into());
        }
        let course = Course {
            id: next_id(&st.courses, |c| c.id),
            slug: slug.to_string(),
            title: title.to_string(),
            teacher_id,
        };
        st.courses.push(course.clone());
        Ok(course)
    }

    async fn add_module(&self, course_slug: &str, slug: &str, title: &str) -> Result<Module> {
        let mut st = self.write()?;
        let course_id = st
            .course(course_slug)
            .map(|c| c.id)
            .ok_or_else(|| ProgressError::CourseNotFound(course_slug.to_string()))?;
        if st.module(slug).is_some() {
            return Err(ProgressError::AlreadyExists(format!("module {}", slug)).into());
        }
        let position = st
            .modules
            .iter()
            .filter(|m| m.course_id == course_id)
            .map(|m| m.position + 1)
            .max()
            .unwrap_or(0);
        let module = Module {
            id: next_id(&st.modules, |m| m.id),
            course_id,
            slug: slug.to_string(),
            title: title.to_string(),
            position,
        };
        st.modules.push(module.clone());
        Ok(module)
    }

    async fn add_lesson(&self, module_slug: &str, slug: &str, title: &str) -> Result<Lesson> {
        let mut st = self.write()?;
        let module_id = st
            .module(module_slug)
            .map(|m| m.id)
            .ok_or_else(|| ProgressError::ModuleNotFound(module_slug.to_string()))?;
        if st.lesson(slug).is_some() {
            return Err(ProgressError::AlreadyExists(format!("lesson {}", slug)).into());
        }
        let position = st
            .lessons
            .iter()
            .filter(|l| l.module_id == module_id)
            .map(|l| l.position + 1)
            .max()
            .unwrap_or(0);
        let lesson = Lesson {
            id: next_id(&st.lessons, |l| l.id),
            module_id,
            slug: slug.to_string(),
            title: title.to_string(),
            position,
        };
        st.lessons.push(lesson.clone());
        Ok(lesson)
    }

    async fn remove_lesson(&self, lesson_slug: &str) -> Result<()> {
        let mut st = self.write()?;
        let lesson_id = st
            .lesson(lesson_slug)
            .map(|l| l.id)
            .ok_or_else(|| ProgressError::LessonNotFound(lesson_slug.to_string()))?;
        st.completions.retain(|c| c.lesson_id != lesson_id);
        st.lessons.retain(|l| l.id != lesson_id);
        Ok(())
    }

    async fn get_course(&self, slug: &str) -> Result<Option<Course>> {
        Ok(self.read()?.course(slug).cloned())
    }

    async fn get_course_by_id(&self, id: i64) -> Result<Option<Course>> {
        Ok(self.read()?.course_by_id(id).cloned())
    }

    async fn course_outline(&self, slug: &str) -> Result<Option<CourseOutline>> {
        let st = self.read()?;
        let Some(course) = st.course(slug).cloned() else {
            return Ok(None);
        };
        let mut modules: Vec<&Module> = st
            .modules
            .iter()
            .filter(|m| m.course_id == course.id)
            .collect();
        modules.sort_by_key(|m| (m.position, m.id));
        let modules = modules
            .into_iter()
            .map(|m| {
                let mut lessons: Vec<Lesson> = st
                    .lessons
                    .iter()
                    .filter(|l| l.module_id == m.id)
                    .cloned()
                    .collect();
                lessons.sort_by_key(|l| (l.position, l.id));
                ModuleOutline {
                    module: m.clone(),
                    lessons,
                }
            })
            .collect();
        Ok(Some(CourseOutline { course, modules }))
    }

    async fn course_lesson_count(&self, course_id: i64) -> Result<u64> {
        Ok(self.read()?.lesson_count(course_id))
    }

    async fn resolve_parent_course(&self, tier: MatchTier, slug: &str) -> Result<Option<String>> {
        let st = self.read()?;
        let course_id = match tier {
            MatchTier::Course => st.course(slug).map(|c| c.id),
            MatchTier::Module => st.module(slug).map(|m| m.course_id),
            MatchTier::Lesson => st.lesson(slug).and_then(|l| st.lesson_course_id(l)),
        };
        Ok(course_id
            .and_then(|id| st.course_by_id(id))
            .map(|c| c.slug.clone()))
    }

    async fn enroll(
        &self,
        user_id: i64,
        course_slug: &str,
        now: DateTime<Utc>,
    ) -> Result<Enrollment> {
        let mut st = self.write()?;
        let course_id = st
            .course(course_slug)
            .map(|c| c.id)
            .ok_or_else(|| ProgressError::CourseNotFound(course_slug.to_string()))?;

        if let Some(existing) = st
            .enrollments
            .iter_mut()
            .find(|e| e.user_id == user_id && e.course_id == course_id)
        {
            existing.is_active = true;
            return Ok(existing.clone());
        }

        let enrollment = Enrollment {
            id: next_id(&st.enrollments, |e| e.id),
            user_id,
            course_id,
            progress_percentage: 0,
            completed_at: None,
            is_active: true,
            enrolled_at: now,
        };
        st.enrollments.push(enrollment.clone());
        Ok(enrollment)
    }

    async fn deactivate_enrollment(&self, enrollment_id: i64) -> Result<()> {
        let mut st = self.write()?;
        let idx = st.enrollment_index(enrollment_id)?;
        st.enrollments[idx].is_active = false;
        Ok(())
    }

    async fn get_enrollment(&self, enrollment_id: i64) -> Result<Option<Enrollment>> {
        Ok(self
            .read()?
            .enrollments
            .iter()
            .find(|e| e.id == enrollment_id)
            .cloned())
    }

    async fn complete_lesson(
        &self,
        enrollment_id: i64,
        lesson_slug: &str,
        tracker: &ProgressTracker,
        now: DateTime<Utc>,
    ) -> Result<ProgressUpdate> {
        let mut st = self.write()?;
        let idx = st.enrollment_index(enrollment_id)?;
        let enrollment = st.enrollments[idx].clone();
        if !enrollment.is_active {
            return Err(ProgressError::EnrollmentInactive(enrollment_id).into());
        }

        let lesson = st
            .lesson(lesson_slug)
            .cloned()
            .ok_or_else(|| ProgressError::LessonNotFound(lesson_slug.to_string()))?;
        if st.lesson_course_id(&lesson) != Some(enrollment.course_id) {
            return Err(ProgressError::LessonNotInCourse {
                enrollment_id,
                lesson: lesson_slug.to_string(),
            }
            .into());
        }

        // Compute before writing anything so a rejected recompute leaves no trace.
        let newly_completed = !st.is_completed(enrollment_id, lesson.id);
        let completed =
            st.completed_slugs(&enrollment).len() as u64 + u64::from(newly_completed);
        let total = st.lesson_count(enrollment.course_id);
        let result = tracker.recompute(&enrollment, total, completed, now)?;

        if newly_completed {
            st.completions.push(CompletedLesson {
                enrollment_id,
                lesson_id: lesson.id,
                completed_at: now,
            });
        }
        let e = &mut st.enrollments[idx];
        e.progress_percentage = result.percentage;
        e.completed_at = result.completed_at;
        let updated = e.clone();

        Ok(ProgressUpdate {
            snapshot: st.snapshot(&updated),
            newly_completed,
            course_completed: result.transitioned,
        })
    }

    async fn refresh_progress(
        &self,
        enrollment_id: i64,
        tracker: &ProgressTracker,
        now: DateTime<Utc>,
    ) -> Result<ProgressSnapshot> {
        let mut st = self.write()?;
        let idx = st.enrollment_index(enrollment_id)?;
        let enrollment = st.enrollments[idx].clone();
        let completed = st.completed_slugs(&enrollment).len() as u64;
        let total = st.lesson_count(enrollment.course_id);
        let result = tracker.recompute(&enrollment, total, completed, now)?;

        let e = &mut st.enrollments[idx];
        e.progress_percentage = result.percentage;
        e.completed_at = result.completed_at;
        let updated = e.clone();
        Ok(st.snapshot(&updated))
    }

    async fn get_progress(&self, enrollment_id: i64) -> Result<ProgressSnapshot> {
        let st = self.read()?;
        let idx = st.enrollment_index(enrollment_id)?;
        Ok(st.snapshot(&st.enrollments[idx]))
    }

    async fn list_enrollments(&self, user_id: i64) -> Result<Vec<EnrollmentSummary>> {
        let st = self.read()?;
        let mut out: Vec<EnrollmentSummary> = st
            .enrollments
            .iter()
            .filter(|e| e.user_id == user_id)
            .filter_map(|e| {
                st.course_by_id(e.course_id).map(|c| EnrollmentSummary {
                    enrollment_id: e.id,
                    course_slug: c.slug.clone(),
                    course_title: c.title.clone(),
                    progress_percentage: e.progress_percentage,
                    completed_at: e.completed_at,
                    is_active: e.is_active,
                })
            })
            .collect();
        out.sort_by_key(|s| s.enrollment_id);
        Ok(out)
    }

    async fn course_report(&self, course_slug: &str) -> Result<CourseReport> {
        let st = self.read()?;
        let course = st
            .course(course_slug)
            .ok_or_else(|| ProgressError::CourseNotFound(course_slug.to_string()))?;
        let active: Vec<&Enrollment> = st
            .enrollments
            .iter()
            .filter(|e| e.course_id == course.id && e.is_active)
            .collect();
        let completed = active.iter().filter(|e| e.completed_at.is_some()).count() as u64;
        let average_percentage = if active.is_empty() {
            0.0
        } else {
            active
                .iter()
                .map(|e| f64::from(e.progress_percentage))
                .sum::<f64>()
                / active.len() as f64
        };
        Ok(CourseReport {
            course_slug: course.slug.clone(),
            title: course.title.clone(),
            total_lessons: st.lesson_count(course.id),
            active_enrollments: active.len() as u64,
            completed_enrollments: completed,
            average_percentage,
        })
    }

    async fn issue_certificate(
        &self,
        enrollment_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Certificate> {
        let mut st = self.write()?;
        if let Some(existing) = st
            .certificates
            .iter()
            .find(|c| c.enrollment_id == enrollment_id)
        {
            return Ok(existing.clone());
        }
        let idx = st.enrollment_index(enrollment_id)?;
        let cert = certificate::new_certificate(&st.enrollments[idx], now)?;
        st.certificates.push(cert.clone());
        Ok(cert)
    }

    async fn find_certificate(&self, verification_code: &str) -> Result<Option<Certificate>> {
        Ok(self
            .read()?
            .certificates
            .iter()
            .find(|c| c.verification_code == verification_code)
            .cloned())
    }
}
