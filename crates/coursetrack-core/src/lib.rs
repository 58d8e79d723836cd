//! # Coursetrack Core
//!
//! Shared, runtime-free logic for Coursetrack: data models, the progress
//! tracker, the multi-tier search aggregator, certificate issuance rules,
//! role-based access checks, and the storage abstraction.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or other
//! native-only dependencies. Persistence lives behind the [`store::Store`]
//! trait; the `coursetrack` app crate provides the SQLite backend.

pub mod access;
pub mod certificate;
pub mod error;
pub mod models;
pub mod progress;
pub mod search;
pub mod store;

pub use error::ProgressError;
