//! Database statistics overview.
//!
//! Summarizes the catalog and learner state: course, lesson and enrollment
//! counts, completion rates, and a per-course breakdown. Used by
//! `ctrack stats`.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;

/// Per-course breakdown of catalog size and learner progress.
struct CourseStats {
    slug: String,
    lesson_count: i64,
    enrolled: i64,
    completed: i64,
    last_enrolled_ts: Option<i64>,
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let total_courses: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM courses")
        .fetch_one(&pool)
        .await?;

    let total_lessons: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lessons")
        .fetch_one(&pool)
        .await?;

    let active_enrollments: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM enrollments WHERE is_active = 1")
            .fetch_one(&pool)
            .await?;

    let completed_enrollments: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM enrollments WHERE is_active = 1 AND completed_at IS NOT NULL",
    )
    .fetch_one(&pool)
    .await?;

    let certificates: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM certificates")
        .fetch_one(&pool)
        .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Coursetrack — Database Stats");
    println!("============================");
    println!();
    println!("  Database:     {}", config.db.path.display());
    println!("  Size:         {}", format_bytes(db_size));
    println!();
    println!("  Courses:      {}", total_courses);
    println!("  Lessons:      {}", total_lessons);
    println!(
        "  Completed:    {} / {} ({}%)",
        completed_enrollments,
        active_enrollments,
        if active_enrollments > 0 {
            (completed_enrollments * 100) / active_enrollments
        } else {
            0
        }
    );
    println!("  Certificates: {}", certificates);

    let course_rows = sqlx::query(
        r#"
        SELECT
            c.slug AS slug,
            (SELECT COUNT(*) FROM lessons l JOIN modules m ON m.id = l.module_id
             WHERE m.course_id = c.id) AS lesson_count,
            COUNT(e.id) AS enrolled,
            COALESCE(SUM(CASE WHEN e.completed_at IS NOT NULL THEN 1 ELSE 0 END), 0) AS completed,
            MAX(e.enrolled_at) AS last_enrolled
        FROM courses c
        LEFT JOIN enrollments e ON e.course_id = c.id AND e.is_active = 1
        GROUP BY c.id
        ORDER BY enrolled DESC, c.slug
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let course_stats: Vec<CourseStats> = course_rows
        .iter()
        .map(|row| CourseStats {
            slug: row.get("slug"),
            lesson_count: row.get("lesson_count"),
            enrolled: row.get("enrolled"),
            completed: row.get("completed"),
            last_enrolled_ts: row.get("last_enrolled"),
        })
        .collect();

    if !course_stats.is_empty() {
        println!();
        println!("  By course:");
        println!(
            "  {:<24} {:>7} {:>8} {:>9}   {}",
            "COURSE", "LESSONS", "ENROLLED", "COMPLETED", "LAST ENROLLMENT"
        );
        println!("  {}", "-".repeat(76));

        for s in &course_stats {
            let last = match s.last_enrolled_ts {
                Some(ts) => format_ts_relative(ts),
                None => "never".to_string(),
            };
            println!(
                "  {:<24} {:>7} {:>8} {:>9}   {}",
                s.slug, s.lesson_count, s.enrolled, s.completed, last
            );
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_are_humanized() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn recent_timestamps_are_relative() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 7200), "2 hours ago");
    }
}
