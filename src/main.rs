//! # Coursetrack CLI (`ctrack`)
//!
//! ## Usage
//!
//! ```bash
//! ctrack --config ./config/ctrack.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ctrack init` | Create the SQLite database and run schema migrations |
//! | `ctrack course <action>` | Manage courses, modules and lessons |
//! | `ctrack enroll <user> <course>` | Enroll a user (reactivates a past enrollment) |
//! | `ctrack unenroll <enrollment>` | Deactivate an enrollment |
//! | `ctrack enrollments <user>` | List a user's enrollments |
//! | `ctrack complete <enrollment> <lesson>` | Mark a lesson complete |
//! | `ctrack progress <enrollment>` | Show progress, optionally recomputing it |
//! | `ctrack certificate <action>` | Issue or verify a completion certificate |
//! | `ctrack search <file.json>` | Aggregate course/module/lesson matches |
//! | `ctrack stats` | Database overview |
//! | `ctrack serve` | Start the HTTP API |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use coursetrack::{catalog, certificate, config, migrate, progress, search, server, stats};

/// Coursetrack CLI: course progress tracking and course search.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file.
#[derive(Parser)]
#[command(name = "ctrack", about = "Coursetrack — course progress tracking and course search", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ctrack.toml")]
    config: PathBuf,

    /// Log at debug level (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Manage the course catalog.
    Course {
        #[command(subcommand)]
        action: CourseAction,
    },

    /// Enroll a user in a course.
    ///
    /// Re-enrolling reactivates a deactivated enrollment and keeps its
    /// progress.
    Enroll { user_id: i64, course: String },

    /// Deactivate an enrollment.
    Unenroll { enrollment_id: i64 },

    /// List a user's enrollments with their progress.
    Enrollments { user_id: i64 },

    /// Mark a lesson complete and recompute progress.
    ///
    /// Completing an already completed lesson changes nothing.
    Complete { enrollment_id: i64, lesson: String },

    /// Show an enrollment's progress.
    Progress {
        enrollment_id: i64,

        /// Recompute against the current lesson count before showing.
        #[arg(long)]
        refresh: bool,
    },

    /// Completion certificates.
    Certificate {
        #[command(subcommand)]
        action: CertificateAction,
    },

    /// Aggregate course, module and lesson matches from a JSON file.
    Search {
        /// JSON file with `course`, `module` and `lesson` match lists.
        input: PathBuf,

        /// Maximum results (defaults to `[search].final_limit`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show database statistics.
    Stats,

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum CourseAction {
    /// Create a course.
    Add {
        slug: String,
        title: String,
        /// Owning teacher's user id.
        #[arg(long)]
        teacher: Option<i64>,
    },
    /// Append a module to a course.
    Module {
        course: String,
        slug: String,
        title: String,
    },
    /// Append a lesson to a module.
    Lesson {
        module: String,
        slug: String,
        title: String,
    },
    /// Delete a lesson and its completion records.
    RemoveLesson {
        slug: String,
        /// Recompute every enrollment of the course afterwards. Enrollments
        /// of a course left without lessons under the `reject` policy are
        /// skipped and reported.
        #[arg(long)]
        refresh: bool,
    },
    /// Print a course outline.
    Show { slug: String },
    /// Print enrollment and completion figures for a course.
    Report { slug: String },
}

#[derive(Subcommand)]
enum CertificateAction {
    /// Issue the certificate for a completed enrollment (idempotent).
    Issue { enrollment_id: i64 },
    /// Look up a certificate by verification code.
    Verify { code: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Course { action } => match action {
            CourseAction::Add {
                slug,
                title,
                teacher,
            } => catalog::run_course_add(&cfg, &slug, &title, teacher).await?,
            CourseAction::Module {
                course,
                slug,
                title,
            } => catalog::run_module_add(&cfg, &course, &slug, &title).await?,
            CourseAction::Lesson {
                module,
                slug,
                title,
            } => catalog::run_lesson_add(&cfg, &module, &slug, &title).await?,
            CourseAction::RemoveLesson { slug, refresh } => {
                catalog::run_remove_lesson(&cfg, &slug, refresh).await?
            }
            CourseAction::Show { slug } => catalog::run_show(&cfg, &slug).await?,
            CourseAction::Report { slug } => catalog::run_report(&cfg, &slug).await?,
        },
        Commands::Enroll { user_id, course } => {
            progress::run_enroll(&cfg, user_id, &course).await?;
        }
        Commands::Unenroll { enrollment_id } => {
            progress::run_unenroll(&cfg, enrollment_id).await?;
        }
        Commands::Enrollments { user_id } => {
            progress::run_enrollments(&cfg, user_id).await?;
        }
        Commands::Complete {
            enrollment_id,
            lesson,
        } => {
            progress::run_complete(&cfg, enrollment_id, &lesson).await?;
        }
        Commands::Progress {
            enrollment_id,
            refresh,
        } => {
            progress::run_progress(&cfg, enrollment_id, refresh).await?;
        }
        Commands::Certificate { action } => match action {
            CertificateAction::Issue { enrollment_id } => {
                certificate::run_issue(&cfg, enrollment_id).await?
            }
            CertificateAction::Verify { code } => certificate::run_verify(&cfg, &code).await?,
        },
        Commands::Search { input, limit } => {
            search::run_search(&cfg, &input, limit).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
