use serde::{Deserialize, Serialize};
use std::fmt;

/// Declares a transparent integer identifier for a directory entity.
///
/// Ids are ordered so they can serve as the deterministic tie-break when
/// ranking students, and as keys in ordered maps.
macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
        )]
        #[serde(transparent)]
        #[sqlx(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

entity_id!(
    /// Primary key of a student.
    StudentId
);
entity_id!(
    /// Primary key of a subject.
    SubjectId
);
entity_id!(
    /// Primary key of a semester.
    SemesterId
);
entity_id!(
    /// Primary key of a class (a group of students).
    ClassId
);
entity_id!(
    /// The user acting on a grade. Passed explicitly through the write path.
    UserId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_order_numerically() {
        let mut ids = vec![StudentId(12), StudentId(3), StudentId(7)];
        ids.sort();
        assert_eq!(ids, vec![StudentId(3), StudentId(7), StudentId(12)]);
    }

    #[test]
    fn ids_display_as_plain_numbers() {
        assert_eq!(SemesterId(42).to_string(), "42");
    }
}
