//! Enrollment and progress commands: `ctrack enroll`, `ctrack complete`,
//! `ctrack progress`, `ctrack enrollments`.
//!
//! Results go to stdout; state-transition logs go to stderr through
//! `tracing` so stdout stays parseable for scripts.

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::info;

use coursetrack_core::models::ProgressSnapshot;
use coursetrack_core::store::Store;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

pub(crate) fn format_ts(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn print_snapshot(snap: &ProgressSnapshot) {
    println!("enrollment:   {}", snap.enrollment_id);
    println!("progress:     {}%", snap.progress_percentage);
    println!(
        "lessons:      {} / {}",
        snap.completed_lessons.len(),
        snap.total_lessons
    );
    println!("completed_at: {}", format_ts(snap.completed_at));
}

pub async fn run_enroll(config: &Config, user_id: i64, course: &str) -> Result<()> {
    let store = SqliteStore::connect(config).await?;
    let enrollment = store.enroll(user_id, course, Utc::now()).await?;
    info!(enrollment_id = enrollment.id, user_id, course, "enrollment active");
    println!(
        "Enrollment {} (user {} in {}): {}%",
        enrollment.id, user_id, course, enrollment.progress_percentage
    );
    store.close().await;
    Ok(())
}

pub async fn run_unenroll(config: &Config, enrollment_id: i64) -> Result<()> {
    let store = SqliteStore::connect(config).await?;
    store.deactivate_enrollment(enrollment_id).await?;
    println!("Enrollment {} deactivated", enrollment_id);
    store.close().await;
    Ok(())
}

pub async fn run_complete(config: &Config, enrollment_id: i64, lesson: &str) -> Result<()> {
    let store = SqliteStore::connect(config).await?;
    let update = store
        .complete_lesson(enrollment_id, lesson, &config.tracker(), Utc::now())
        .await?;

    if update.newly_completed {
        println!("Completed lesson {}", lesson);
    } else {
        println!("Lesson {} was already completed", lesson);
    }
    print_snapshot(&update.snapshot);
    if update.course_completed {
        println!("Course completed.");
    }

    store.close().await;
    Ok(())
}

pub async fn run_progress(config: &Config, enrollment_id: i64, refresh: bool) -> Result<()> {
    let store = SqliteStore::connect(config).await?;
    let snap = if refresh {
        store
            .refresh_progress(enrollment_id, &config.tracker(), Utc::now())
            .await?
    } else {
        store.get_progress(enrollment_id).await?
    };

    print_snapshot(&snap);
    if !snap.completed_lessons.is_empty() {
        println!("done:         {}", snap.completed_lessons.join(", "));
    }

    store.close().await;
    Ok(())
}

pub async fn run_enrollments(config: &Config, user_id: i64) -> Result<()> {
    let store = SqliteStore::connect(config).await?;
    let rows = store.list_enrollments(user_id).await?;

    if rows.is_empty() {
        println!("No enrollments.");
    } else {
        println!(
            "  {:<6} {:<24} {:>5}  {:<8} COMPLETED",
            "ID", "COURSE", "PCT", "STATUS"
        );
        for r in &rows {
            println!(
                "  {:<6} {:<24} {:>4}%  {:<8} {}",
                r.enrollment_id,
                r.course_slug,
                r.progress_percentage,
                if r.is_active { "active" } else { "inactive" },
                format_ts(r.completed_at)
            );
        }
    }

    store.close().await;
    Ok(())
}
