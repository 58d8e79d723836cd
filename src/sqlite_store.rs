//! SQLite-backed [`Store`] implementation.
//!
//! Timestamps are stored as unix seconds. Compound writes run inside a
//! single transaction that takes the database write lock with its first
//! statement, so concurrent completions for the same enrollment queue on
//! the busy timeout and never interleave their count and write-back.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use coursetrack_core::certificate;
use coursetrack_core::models::{
    Certificate, Course, CourseOutline, CourseReport, Enrollment, EnrollmentSummary, Lesson,
    Module, ModuleOutline, ProgressSnapshot, ProgressUpdate,
};
use coursetrack_core::progress::ProgressTracker;
use coursetrack_core::search::MatchTier;
use coursetrack_core::store::Store;
use coursetrack_core::ProgressError;

use crate::config::Config;
use crate::db;

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open the configured database. Run migrations first.
    pub async fn connect(config: &Config) -> Result<Self> {
        Ok(Self::new(db::connect(config).await?))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn from_ts(ts: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0).ok_or_else(|| anyhow!("invalid stored timestamp: {}", ts))
}

fn unique_violation(err: sqlx::Error, what: String) -> anyhow::Error {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return ProgressError::AlreadyExists(what).into();
        }
    }
    err.into()
}

fn course_from_row(row: &SqliteRow) -> Course {
    Course {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        teacher_id: row.get("teacher_id"),
    }
}

fn module_from_row(row: &SqliteRow) -> Module {
    Module {
        id: row.get("id"),
        course_id: row.get("course_id"),
        slug: row.get("slug"),
        title: row.get("title"),
        position: row.get("position"),
    }
}

fn lesson_from_row(row: &SqliteRow) -> Lesson {
    Lesson {
        id: row.get("id"),
        module_id: row.get("module_id"),
        slug: row.get("slug"),
        title: row.get("title"),
        position: row.get("position"),
    }
}

fn enrollment_from_row(row: &SqliteRow) -> Result<Enrollment> {
    let pct: i64 = row.get("progress_percentage");
    let completed_at: Option<i64> = row.get("completed_at");
    Ok(Enrollment {
        id: row.get("id"),
        user_id: row.get("user_id"),
        course_id: row.get("course_id"),
        progress_percentage: pct.clamp(0, 100) as u8,
        completed_at: completed_at.map(from_ts).transpose()?,
        is_active: row.get("is_active"),
        enrolled_at: from_ts(row.get("enrolled_at"))?,
    })
}

fn certificate_from_row(row: &SqliteRow) -> Result<Certificate> {
    Ok(Certificate {
        id: row.get("id"),
        enrollment_id: row.get("enrollment_id"),
        verification_code: row.get("verification_code"),
        issued_at: from_ts(row.get("issued_at"))?,
    })
}

const ENROLLMENT_COLUMNS: &str =
    "id, user_id, course_id, progress_percentage, completed_at, is_active, enrolled_at";

async fn load_enrollment(conn: &mut SqliteConnection, id: i64) -> Result<Enrollment> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM enrollments WHERE id = ?",
        ENROLLMENT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    match row {
        Some(row) => enrollment_from_row(&row),
        None => Err(ProgressError::EnrollmentNotFound(id).into()),
    }
}

async fn lesson_count(conn: &mut SqliteConnection, course_id: i64) -> Result<u64> {
    let n: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM lessons l
        JOIN modules m ON m.id = l.module_id
        WHERE m.course_id = ?
        "#,
    )
    .bind(course_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(n as u64)
}

/// Completed lessons that are still part of the enrollment's course.
async fn completed_slugs(
    conn: &mut SqliteConnection,
    enrollment: &Enrollment,
) -> Result<Vec<String>> {
    let slugs = sqlx::query_scalar(
        r#"
        SELECT l.slug FROM completed_lessons cl
        JOIN lessons l ON l.id = cl.lesson_id
        JOIN modules m ON m.id = l.module_id
        WHERE cl.enrollment_id = ? AND m.course_id = ?
        ORDER BY m.position, m.id, l.position, l.id
        "#,
    )
    .bind(enrollment.id)
    .bind(enrollment.course_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(slugs)
}

async fn snapshot(conn: &mut SqliteConnection, enrollment_id: i64) -> Result<ProgressSnapshot> {
    let e = load_enrollment(conn, enrollment_id).await?;
    let completed_lessons = completed_slugs(conn, &e).await?;
    let total_lessons = lesson_count(conn, e.course_id).await?;
    Ok(ProgressSnapshot {
        enrollment_id: e.id,
        course_id: e.course_id,
        progress_percentage: e.progress_percentage,
        completed_at: e.completed_at,
        completed_lessons,
        total_lessons,
    })
}

/// Take the database write lock before any read in the transaction.
async fn lock_for_write(conn: &mut SqliteConnection, enrollment_id: i64) -> Result<()> {
    sqlx::query("UPDATE enrollments SET is_active = is_active WHERE id = ?")
        .bind(enrollment_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn write_progress(
    conn: &mut SqliteConnection,
    enrollment_id: i64,
    percentage: u8,
    completed_at: Option<DateTime<Utc>>,
) -> Result<()> {
    sqlx::query(
        "UPDATE enrollments SET progress_percentage = ?, completed_at = ? WHERE id = ?",
    )
    .bind(i64::from(percentage))
    .bind(completed_at.map(|t| t.timestamp()))
    .bind(enrollment_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_course(
        &self,
        slug: &str,
        title: &str,
        teacher_id: Option<i64>,
    ) -> Result<Course> {
        let id = sqlx::query("INSERT INTO courses (slug, title, teacher_id) VALUES (?, ?, ?)")
            .bind(slug)
            .bind(title)
            .bind(teacher_id)
            .execute(&self.pool)
            .await
            .map_err(|e| unique_violation(e, format!("course {}", slug)))?
            .last_insert_rowid();

        Ok(Course {
            id,
            slug: slug.to_string(),
            title: title.to_string(),
            teacher_id,
        })
    }

    async fn add_module(&self, course_slug: &str, slug: &str, title: &str) -> Result<Module> {
        let mut tx = self.pool.begin().await?;

        let course_id: i64 = sqlx::query_scalar("SELECT id FROM courses WHERE slug = ?")
            .bind(course_slug)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| ProgressError::CourseNotFound(course_slug.to_string()))?;

        let position: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM modules WHERE course_id = ?",
        )
        .bind(course_id)
        .fetch_one(&mut *tx)
        .await?;

        let id = sqlx::query(
            "INSERT INTO modules (course_id, slug, title, position) VALUES (?, ?, ?, ?)",
        )
        .bind(course_id)
        .bind(slug)
        .bind(title)
        .bind(position)
        .execute(&mut *tx)
        .await
        .map_err(|e| unique_violation(e, format!("module {}", slug)))?
        .last_insert_rowid();

        tx.commit().await?;
        Ok(Module {
            id,
            course_id,
            slug: slug.to_string(),
            title: title.to_string(),
            position,
        })
    }

    async fn add_lesson(&self, module_slug: &str, slug: &str, title: &str) -> Result<Lesson> {
        let mut tx = self.pool.begin().await?;

        let module_id: i64 = sqlx::query_scalar("SELECT id FROM modules WHERE slug = ?")
            .bind(module_slug)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| ProgressError::ModuleNotFound(module_slug.to_string()))?;

        let position: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM lessons WHERE module_id = ?",
        )
        .bind(module_id)
        .fetch_one(&mut *tx)
        .await?;

        let id = sqlx::query(
            "INSERT INTO lessons (module_id, slug, title, position) VALUES (?, ?, ?, ?)",
        )
        .bind(module_id)
        .bind(slug)
        .bind(title)
        .bind(position)
        .execute(&mut *tx)
        .await
        .map_err(|e| unique_violation(e, format!("lesson {}", slug)))?
        .last_insert_rowid();

        tx.commit().await?;
        Ok(Lesson {
            id,
            module_id,
            slug: slug.to_string(),
            title: title.to_string(),
            position,
        })
    }

    async fn remove_lesson(&self, lesson_slug: &str) -> Result<()> {
        // completed_lessons rows go with it via ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM lessons WHERE slug = ?")
            .bind(lesson_slug)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ProgressError::LessonNotFound(lesson_slug.to_string()).into());
        }
        Ok(())
    }

    async fn get_course(&self, slug: &str) -> Result<Option<Course>> {
        let row = sqlx::query("SELECT id, slug, title, teacher_id FROM courses WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(course_from_row))
    }

    async fn get_course_by_id(&self, id: i64) -> Result<Option<Course>> {
        let row = sqlx::query("SELECT id, slug, title, teacher_id FROM courses WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(course_from_row))
    }

    async fn course_outline(&self, slug: &str) -> Result<Option<CourseOutline>> {
        let Some(course) = self.get_course(slug).await? else {
            return Ok(None);
        };

        let module_rows = sqlx::query(
            "SELECT id, course_id, slug, title, position FROM modules WHERE course_id = ? ORDER BY position, id",
        )
        .bind(course.id)
        .fetch_all(&self.pool)
        .await?;

        let mut modules = Vec::with_capacity(module_rows.len());
        for row in &module_rows {
            let module = module_from_row(row);
            let lessons = sqlx::query(
                "SELECT id, module_id, slug, title, position FROM lessons WHERE module_id = ? ORDER BY position, id",
            )
            .bind(module.id)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(lesson_from_row)
            .collect();
            modules.push(ModuleOutline { module, lessons });
        }

        Ok(Some(CourseOutline { course, modules }))
    }

    async fn course_lesson_count(&self, course_id: i64) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        lesson_count(&mut conn, course_id).await
    }

    async fn resolve_parent_course(&self, tier: MatchTier, slug: &str) -> Result<Option<String>> {
        let sql = match tier {
            MatchTier::Course => "SELECT slug FROM courses WHERE slug = ?",
            MatchTier::Module => {
                "SELECT c.slug FROM modules m JOIN courses c ON c.id = m.course_id WHERE m.slug = ?"
            }
            MatchTier::Lesson => {
                r#"
                SELECT c.slug FROM lessons l
                JOIN modules m ON m.id = l.module_id
                JOIN courses c ON c.id = m.course_id
                WHERE l.slug = ?
                "#
            }
        };
        let parent: Option<String> = sqlx::query_scalar(sql)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(parent)
    }

    async fn enroll(
        &self,
        user_id: i64,
        course_slug: &str,
        now: DateTime<Utc>,
    ) -> Result<Enrollment> {
        let mut tx = self.pool.begin().await?;

        // Upsert first so the transaction starts as a writer.
        let affected = sqlx::query(
            r#"
            INSERT INTO enrollments (user_id, course_id, enrolled_at)
            SELECT ?, id, ? FROM courses WHERE slug = ?
            ON CONFLICT(user_id, course_id) DO UPDATE SET is_active = 1
            "#,
        )
        .bind(user_id)
        .bind(now.timestamp())
        .bind(course_slug)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if affected == 0 {
            return Err(ProgressError::CourseNotFound(course_slug.to_string()).into());
        }

        let row = sqlx::query(
            r#"
            SELECT e.id AS id, e.user_id AS user_id, e.course_id AS course_id,
                   e.progress_percentage AS progress_percentage,
                   e.completed_at AS completed_at, e.is_active AS is_active,
                   e.enrolled_at AS enrolled_at
            FROM enrollments e JOIN courses c ON c.id = e.course_id
            WHERE e.user_id = ? AND c.slug = ?
            "#,
        )
        .bind(user_id)
        .bind(course_slug)
        .fetch_one(&mut *tx)
        .await?;
        let enrollment = enrollment_from_row(&row)?;

        tx.commit().await?;
        debug!(enrollment_id = enrollment.id, user_id, course_slug, "enrolled");
        Ok(enrollment)
    }

    async fn deactivate_enrollment(&self, enrollment_id: i64) -> Result<()> {
        let result = sqlx::query("UPDATE enrollments SET is_active = 0 WHERE id = ?")
            .bind(enrollment_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ProgressError::EnrollmentNotFound(enrollment_id).into());
        }
        Ok(())
    }

    async fn get_enrollment(&self, enrollment_id: i64) -> Result<Option<Enrollment>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM enrollments WHERE id = ?",
            ENROLLMENT_COLUMNS
        ))
        .bind(enrollment_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(enrollment_from_row).transpose()
    }

    async fn complete_lesson(
        &self,
        enrollment_id: i64,
        lesson_slug: &str,
        tracker: &ProgressTracker,
        now: DateTime<Utc>,
    ) -> Result<ProgressUpdate> {
        let mut tx = self.pool.begin().await?;
        lock_for_write(&mut tx, enrollment_id).await?;

        let enrollment = load_enrollment(&mut tx, enrollment_id).await?;
        if !enrollment.is_active {
            return Err(ProgressError::EnrollmentInactive(enrollment_id).into());
        }

        let lesson = sqlx::query(
            r#"
            SELECT l.id AS lesson_id, m.course_id AS course_id
            FROM lessons l JOIN modules m ON m.id = l.module_id
            WHERE l.slug = ?
            "#,
        )
        .bind(lesson_slug)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ProgressError::LessonNotFound(lesson_slug.to_string()))?;
        let lesson_id: i64 = lesson.get("lesson_id");
        let lesson_course: i64 = lesson.get("course_id");
        if lesson_course != enrollment.course_id {
            return Err(ProgressError::LessonNotInCourse {
                enrollment_id,
                lesson: lesson_slug.to_string(),
            }
            .into());
        }

        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO completed_lessons (enrollment_id, lesson_id, completed_at) VALUES (?, ?, ?)",
        )
        .bind(enrollment_id)
        .bind(lesson_id)
        .bind(now.timestamp())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let completed = completed_slugs(&mut tx, &enrollment).await?.len() as u64;
        let total = lesson_count(&mut tx, enrollment.course_id).await?;
        // A rejected recompute drops `tx`, rolling back the insert above.
        let result = tracker.recompute(&enrollment, total, completed, now)?;
        write_progress(&mut tx, enrollment_id, result.percentage, result.completed_at).await?;

        let snap = snapshot(&mut tx, enrollment_id).await?;
        tx.commit().await?;

        debug!(
            enrollment_id,
            lesson = lesson_slug,
            percentage = result.percentage,
            "lesson completed"
        );
        if result.transitioned {
            info!(enrollment_id, course_id = enrollment.course_id, "course completed");
        }

        Ok(ProgressUpdate {
            snapshot: snap,
            newly_completed: inserted > 0,
            course_completed: result.transitioned,
        })
    }

    async fn refresh_progress(
        &self,
        enrollment_id: i64,
        tracker: &ProgressTracker,
        now: DateTime<Utc>,
    ) -> Result<ProgressSnapshot> {
        let mut tx = self.pool.begin().await?;
        lock_for_write(&mut tx, enrollment_id).await?;

        let enrollment = load_enrollment(&mut tx, enrollment_id).await?;
        let completed = completed_slugs(&mut tx, &enrollment).await?.len() as u64;
        let total = lesson_count(&mut tx, enrollment.course_id).await?;
        let result = tracker.recompute(&enrollment, total, completed, now)?;
        write_progress(&mut tx, enrollment_id, result.percentage, result.completed_at).await?;

        let snap = snapshot(&mut tx, enrollment_id).await?;
        tx.commit().await?;

        if result.transitioned {
            info!(enrollment_id, course_id = enrollment.course_id, "course completed");
        }
        Ok(snap)
    }

    async fn get_progress(&self, enrollment_id: i64) -> Result<ProgressSnapshot> {
        let mut conn = self.pool.acquire().await?;
        snapshot(&mut conn, enrollment_id).await
    }

    async fn list_enrollments(&self, user_id: i64) -> Result<Vec<EnrollmentSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT e.id AS id, c.slug AS slug, c.title AS title,
                   e.progress_percentage AS progress_percentage,
                   e.completed_at AS completed_at, e.is_active AS is_active
            FROM enrollments e JOIN courses c ON c.id = e.course_id
            WHERE e.user_id = ?
            ORDER BY e.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let pct: i64 = row.get("progress_percentage");
                let completed_at: Option<i64> = row.get("completed_at");
                Ok(EnrollmentSummary {
                    enrollment_id: row.get("id"),
                    course_slug: row.get("slug"),
                    course_title: row.get("title"),
                    progress_percentage: pct.clamp(0, 100) as u8,
                    completed_at: completed_at.map(from_ts).transpose()?,
                    is_active: row.get("is_active"),
                })
            })
            .collect()
    }

    async fn course_report(&self, course_slug: &str) -> Result<CourseReport> {
        let course = self
            .get_course(course_slug)
            .await?
            .ok_or_else(|| ProgressError::CourseNotFound(course_slug.to_string()))?;

        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS active,
                   SUM(CASE WHEN completed_at IS NOT NULL THEN 1 ELSE 0 END) AS completed,
                   AVG(progress_percentage) AS average
            FROM enrollments
            WHERE course_id = ? AND is_active = 1
            "#,
        )
        .bind(course.id)
        .fetch_one(&self.pool)
        .await?;

        let active: i64 = row.get("active");
        let completed: Option<i64> = row.get("completed");
        let average: Option<f64> = row.get("average");

        Ok(CourseReport {
            course_slug: course.slug,
            title: course.title,
            total_lessons: self.course_lesson_count(course.id).await?,
            active_enrollments: active as u64,
            completed_enrollments: completed.unwrap_or(0) as u64,
            average_percentage: average.unwrap_or(0.0),
        })
    }

    async fn issue_certificate(
        &self,
        enrollment_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Certificate> {
        let mut tx = self.pool.begin().await?;
        lock_for_write(&mut tx, enrollment_id).await?;

        let existing = sqlx::query(
            "SELECT id, enrollment_id, verification_code, issued_at FROM certificates WHERE enrollment_id = ?",
        )
        .bind(enrollment_id)
        .fetch_optional(&mut *tx)
        .await?;
        if let Some(row) = existing {
            return certificate_from_row(&row);
        }

        let enrollment = load_enrollment(&mut tx, enrollment_id).await?;
        // Stored at second precision; issue with the same so the code re-derives.
        let issued_at = from_ts(now.timestamp())?;
        let cert = certificate::new_certificate(&enrollment, issued_at)?;

        sqlx::query(
            "INSERT INTO certificates (id, enrollment_id, verification_code, issued_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&cert.id)
        .bind(cert.enrollment_id)
        .bind(&cert.verification_code)
        .bind(cert.issued_at.timestamp())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(enrollment_id, code = %cert.verification_code, "certificate issued");
        Ok(cert)
    }

    async fn find_certificate(&self, verification_code: &str) -> Result<Option<Certificate>> {
        let row = sqlx::query(
            "SELECT id, enrollment_id, verification_code, issued_at FROM certificates WHERE verification_code = ?",
        )
        .bind(verification_code)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(certificate_from_row).transpose()
    }
}
