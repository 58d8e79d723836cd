//! Role-based access checks.
//!
//! Callers are identified by an explicit [`Principal`] passed into every
//! operation. Roles form a closed set and every check matches on all of
//! them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ProgressError;
use crate::models::{Course, Enrollment};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: '{}'", other)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        };
        f.write_str(s)
    }
}

/// The authenticated caller of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: i64,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: i64, role: Role) -> Self {
        Self { user_id, role }
    }

    fn owns_course(&self, course: &Course) -> bool {
        course.teacher_id == Some(self.user_id)
    }
}

/// May `principal` read `enrollment` (which belongs to `course`)?
///
/// Students may only read their own enrollments; teachers may also read
/// enrollments in courses they own.
pub fn authorize_enrollment_read(
    principal: &Principal,
    enrollment: &Enrollment,
    course: &Course,
) -> Result<(), ProgressError> {
    let allowed = match principal.role {
        Role::Admin => true,
        Role::Teacher => principal.owns_course(course) || enrollment.user_id == principal.user_id,
        Role::Student => enrollment.user_id == principal.user_id,
    };
    if allowed {
        Ok(())
    } else {
        Err(denied(principal, "read", enrollment))
    }
}

/// May `principal` change `enrollment`: complete lessons or request its
/// certificate? Only the enrolled user or an admin.
pub fn authorize_enrollment_write(
    principal: &Principal,
    enrollment: &Enrollment,
) -> Result<(), ProgressError> {
    let allowed = match principal.role {
        Role::Admin => true,
        Role::Teacher | Role::Student => enrollment.user_id == principal.user_id,
    };
    if allowed {
        Ok(())
    } else {
        Err(denied(principal, "modify", enrollment))
    }
}

fn denied(principal: &Principal, action: &str, enrollment: &Enrollment) -> ProgressError {
    ProgressError::Forbidden(format!(
        "{} {} may not {} enrollment {}",
        principal.role, principal.user_id, action, enrollment.id
    ))
}

/// May `principal` manage `course` or read its aggregate report?
pub fn authorize_course(principal: &Principal, course: &Course) -> Result<(), ProgressError> {
    let allowed = match principal.role {
        Role::Admin => true,
        Role::Teacher => principal.owns_course(course),
        Role::Student => false,
    };
    if allowed {
        Ok(())
    } else {
        Err(ProgressError::Forbidden(format!(
            "{} {} may not manage course {}",
            principal.role, principal.user_id, course.slug
        )))
    }
}
