//! Catalog commands: `ctrack course ...`.
//!
//! The CLI is an operator tool and runs with full rights; access checks
//! apply to the HTTP API only.

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use coursetrack_core::search::MatchTier;
use coursetrack_core::store::Store;
use coursetrack_core::ProgressError;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

pub async fn run_course_add(
    config: &Config,
    slug: &str,
    title: &str,
    teacher_id: Option<i64>,
) -> Result<()> {
    let store = SqliteStore::connect(config).await?;
    let course = store.create_course(slug, title, teacher_id).await?;
    info!(course = %course.slug, "course created");
    println!("Created course {} (id {})", course.slug, course.id);
    store.close().await;
    Ok(())
}

pub async fn run_module_add(config: &Config, course: &str, slug: &str, title: &str) -> Result<()> {
    let store = SqliteStore::connect(config).await?;
    let module = store.add_module(course, slug, title).await?;
    println!(
        "Added module {} to {} (position {})",
        module.slug, course, module.position
    );
    store.close().await;
    Ok(())
}

pub async fn run_lesson_add(config: &Config, module: &str, slug: &str, title: &str) -> Result<()> {
    let store = SqliteStore::connect(config).await?;
    let lesson = store.add_lesson(module, slug, title).await?;
    println!(
        "Added lesson {} to {} (position {})",
        lesson.slug, module, lesson.position
    );
    store.close().await;
    Ok(())
}

/// Remove a lesson, then optionally recompute every enrollment of its course.
///
/// Enrollments whose progress cannot be computed (an emptied course under
/// the `reject` policy) are skipped and counted; the rest are still
/// recomputed.
pub async fn run_remove_lesson(config: &Config, slug: &str, refresh: bool) -> Result<()> {
    let store = SqliteStore::connect(config).await?;

    let course_slug = store
        .resolve_parent_course(MatchTier::Lesson, slug)
        .await?
        .ok_or_else(|| ProgressError::LessonNotFound(slug.to_string()))?;

    store.remove_lesson(slug).await?;
    println!("Removed lesson {} from {}", slug, course_slug);

    if refresh {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT e.id FROM enrollments e JOIN courses c ON c.id = e.course_id WHERE c.slug = ?",
        )
        .bind(&course_slug)
        .fetch_all(store.pool())
        .await?;

        let tracker = config.tracker();
        let mut recomputed = 0usize;
        let mut skipped = 0usize;
        for &id in &ids {
            match store.refresh_progress(id, &tracker, Utc::now()).await {
                Ok(_) => recomputed += 1,
                Err(err)
                    if matches!(
                        err.downcast_ref::<ProgressError>(),
                        Some(ProgressError::InvalidTotalLessonCount(_))
                    ) =>
                {
                    warn!(enrollment_id = id, error = %err, "progress not recomputed");
                    skipped += 1;
                }
                Err(err) => return Err(err),
            }
        }
        println!("Recomputed {} enrollment(s)", recomputed);
        if skipped > 0 {
            println!("Skipped {} enrollment(s): course has no lessons", skipped);
        }
    }

    store.close().await;
    Ok(())
}

pub async fn run_show(config: &Config, slug: &str) -> Result<()> {
    let store = SqliteStore::connect(config).await?;
    let outline = store
        .course_outline(slug)
        .await?
        .ok_or_else(|| ProgressError::CourseNotFound(slug.to_string()))?;

    println!("{} — {}", outline.course.slug, outline.course.title);
    if let Some(teacher) = outline.course.teacher_id {
        println!("teacher: {}", teacher);
    }
    println!("lessons: {}", outline.lesson_count());
    println!();
    for m in &outline.modules {
        println!("[{}] {}", m.module.slug, m.module.title);
        for l in &m.lessons {
            println!("    {} {}", l.slug, l.title);
        }
    }

    store.close().await;
    Ok(())
}

pub async fn run_report(config: &Config, slug: &str) -> Result<()> {
    let store = SqliteStore::connect(config).await?;
    let report = store.course_report(slug).await?;

    println!("Course:      {} ({})", report.course_slug, report.title);
    println!("Lessons:     {}", report.total_lessons);
    println!("Enrolled:    {}", report.active_enrollments);
    println!("Completed:   {}", report.completed_enrollments);
    println!("Average:     {:.1}%", report.average_percentage);

    store.close().await;
    Ok(())
}
