use chrono::{DateTime, Utc};
use core_types::{GradeKey, GradeValue, SemesterId, StudentId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GradeChangeKind {
    Created,
    Updated,
    Deleted,
}

/// One grade mutation inside a committed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeChange {
    pub key: GradeKey,
    pub kind: GradeChangeKind,
    /// The value before the change. `None` for a created grade.
    pub previous: Option<GradeValue>,
    /// The value after the change. `None` for a deleted grade.
    pub current: Option<GradeValue>,
}

impl GradeChange {
    pub fn created(key: GradeKey, value: GradeValue) -> Self {
        Self {
            key,
            kind: GradeChangeKind::Created,
            previous: None,
            current: Some(value),
        }
    }

    pub fn updated(key: GradeKey, previous: GradeValue, value: GradeValue) -> Self {
        Self {
            key,
            kind: GradeChangeKind::Updated,
            previous: Some(previous),
            current: Some(value),
        }
    }

    pub fn deleted(key: GradeKey, previous: GradeValue) -> Self {
        Self {
            key,
            kind: GradeChangeKind::Deleted,
            previous: Some(previous),
            current: None,
        }
    }
}

/// Published once per committed grade transaction, after the commit.
///
/// The `actor` is whoever performed the write; it travels with the event
/// instead of living in any ambient context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeCommitted {
    pub event_id: Uuid,
    pub committed_at: DateTime<Utc>,
    pub actor: UserId,
    pub changes: Vec<GradeChange>,
}

impl GradeCommitted {
    pub fn new(actor: UserId, changes: Vec<GradeChange>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            committed_at: Utc::now(),
            actor,
            changes,
        }
    }

    /// The distinct (student, semester) pairs whose indicators this commit
    /// invalidates, in ascending order.
    pub fn affected_pairs(&self) -> BTreeSet<(StudentId, SemesterId)> {
        self.changes
            .iter()
            .map(|change| (change.key.student_id, change.key.semester_id))
            .collect()
    }
}
