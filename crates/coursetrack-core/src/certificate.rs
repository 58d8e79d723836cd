//! Completion certificates.
//!
//! A certificate can be issued once an enrollment is active and has a
//! `completed_at` timestamp. Issuance is idempotent at the store level: one
//! certificate per enrollment. Rendering (PDF etc.) is not handled here.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::ProgressError;
use crate::models::{Certificate, Enrollment};
use crate::store::Store;

/// Length of the public verification code, in hex characters.
pub const CODE_LEN: usize = 16;

pub fn is_eligible(enrollment: &Enrollment) -> bool {
    enrollment.is_active && enrollment.completed_at.is_some()
}

/// Deterministic verification code for an enrollment issued at `issued_at`.
pub fn verification_code(enrollment: &Enrollment, issued_at: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(
        format!(
            "{}:{}:{}:{}",
            enrollment.id,
            enrollment.user_id,
            enrollment.course_id,
            issued_at.timestamp()
        )
        .as_bytes(),
    );
    let digest = hex::encode(hasher.finalize());
    digest[..CODE_LEN].to_string()
}

/// Build a new certificate for `enrollment`, or fail if it is not eligible.
pub fn new_certificate(
    enrollment: &Enrollment,
    now: DateTime<Utc>,
) -> Result<Certificate, ProgressError> {
    if !is_eligible(enrollment) {
        return Err(ProgressError::NotEligibleForCertificate(enrollment.id));
    }
    Ok(Certificate {
        id: Uuid::new_v4().to_string(),
        enrollment_id: enrollment.id,
        verification_code: verification_code(enrollment, now),
        issued_at: now,
    })
}

/// Look up a certificate by its public verification code.
///
/// Malformed codes short-circuit to `None` without touching the store.
pub async fn verify_certificate<S: Store + ?Sized>(
    store: &S,
    code: &str,
) -> anyhow::Result<Option<Certificate>> {
    let code = code.trim().to_ascii_lowercase();
    if code.len() != CODE_LEN || !code.chars().all(|c| c.is_ascii_hexdigit()) {
        return Ok(None);
    }
    store.find_certificate(&code).await
}
