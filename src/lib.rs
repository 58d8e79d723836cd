//! # Coursetrack
//!
//! Course progress tracking and multi-tier course search for learning
//! platforms.
//!
//! Coursetrack records which lessons a learner has completed, keeps each
//! enrollment's progress percentage and completion timestamp consistent
//! with the catalog, issues verifiable completion certificates, and folds
//! course/module/lesson hits from an external semantic index into a single
//! course ranking. It is exposed through a CLI and a JSON HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌──────────┐
//! │  CLI / HTTP  │──▶│ coursetrack-core │──▶│  SQLite  │
//! │ ctrack/axum  │   │ tracker + search │   │  (sqlx)  │
//! └──────────────┘   └──────────────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ctrack init
//! ctrack course add rust-101 "Rust 101" --teacher 100
//! ctrack course module rust-101 basics "Basics"
//! ctrack course lesson basics ownership "Ownership"
//! ctrack enroll 7 rust-101
//! ctrack complete 1 ownership
//! ctrack serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite [`Store`](coursetrack_core::store::Store) backend |
//! | [`catalog`] | Course/module/lesson commands |
//! | [`progress`] | Enrollment and progress commands |
//! | [`certificate`] | Certificate commands |
//! | [`search`] | Search aggregation command |
//! | [`stats`] | Database statistics |
//! | [`server`] | JSON HTTP API |

pub mod catalog;
pub mod certificate;
pub mod config;
pub mod db;
pub mod migrate;
pub mod progress;
pub mod search;
pub mod server;
pub mod sqlite_store;
pub mod stats;
