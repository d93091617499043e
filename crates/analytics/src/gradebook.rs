use core_types::{GradeKey, SemesterId, StudentId, SubjectId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One grade joined with the coefficient of its subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeEntry {
    pub key: GradeKey,
    pub value: Decimal,
    pub coefficient: Decimal,
}

impl GradeEntry {
    pub fn new(key: GradeKey, value: Decimal, coefficient: Decimal) -> Self {
        Self {
            key,
            value,
            coefficient,
        }
    }
}

/// An immutable snapshot of grades, keyed by (student, subject, semester).
///
/// The key is unique, so inserting a second grade for the same triple
/// replaces the first. This is what makes a "subject average" a lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeBook {
    entries: BTreeMap<GradeKey, GradeEntry>,
}

impl GradeBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry, returning the one it replaced if the key was taken.
    pub fn insert(&mut self, entry: GradeEntry) -> Option<GradeEntry> {
        self.entries.insert(entry.key, entry)
    }

    pub fn get(&self, key: &GradeKey) -> Option<&GradeEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All grades of one student in one semester, ordered by subject id.
    pub fn grades_of(
        &self,
        student_id: StudentId,
        semester_id: SemesterId,
    ) -> impl Iterator<Item = &GradeEntry> + '_ {
        let lower = GradeKey {
            student_id,
            subject_id: SubjectId(i64::MIN),
            semester_id: SemesterId(i64::MIN),
        };
        let upper = GradeKey {
            student_id,
            subject_id: SubjectId(i64::MAX),
            semester_id: SemesterId(i64::MAX),
        };
        self.entries
            .range(lower..=upper)
            .map(|(_, entry)| entry)
            .filter(move |entry| entry.key.semester_id == semester_id)
    }

    /// Subjects the student has a grade for in the semester.
    pub fn subjects_of(&self, student_id: StudentId, semester_id: SemesterId) -> Vec<SubjectId> {
        self.grades_of(student_id, semester_id)
            .map(|entry| entry.key.subject_id)
            .collect()
    }
}

impl FromIterator<GradeEntry> for GradeBook {
    fn from_iter<T: IntoIterator<Item = GradeEntry>>(iter: T) -> Self {
        let mut book = GradeBook::new();
        for entry in iter {
            book.insert(entry);
        }
        book
    }
}

impl Extend<GradeEntry> for GradeBook {
    fn extend<T: IntoIterator<Item = GradeEntry>>(&mut self, iter: T) {
        for entry in iter {
            self.insert(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn key(student: i64, subject: i64, semester: i64) -> GradeKey {
        GradeKey {
            student_id: StudentId(student),
            subject_id: SubjectId(subject),
            semester_id: SemesterId(semester),
        }
    }

    #[test]
    fn one_grade_per_key() {
        let mut book = GradeBook::new();
        assert!(book.insert(GradeEntry::new(key(1, 1, 1), dec!(12), dec!(1))).is_none());
        let replaced = book.insert(GradeEntry::new(key(1, 1, 1), dec!(15), dec!(1)));
        assert_eq!(replaced.map(|e| e.value), Some(dec!(12)));
        assert_eq!(book.len(), 1);
        assert_eq!(book.get(&key(1, 1, 1)).map(|e| e.value), Some(dec!(15)));
    }

    #[test]
    fn grades_of_filters_student_and_semester() {
        let book: GradeBook = vec![
            GradeEntry::new(key(1, 1, 1), dec!(10), dec!(1)),
            GradeEntry::new(key(1, 2, 1), dec!(11), dec!(1)),
            GradeEntry::new(key(1, 2, 2), dec!(12), dec!(1)),
            GradeEntry::new(key(2, 1, 1), dec!(13), dec!(1)),
        ]
        .into_iter()
        .collect();

        let values: Vec<Decimal> = book
            .grades_of(StudentId(1), SemesterId(1))
            .map(|e| e.value)
            .collect();
        assert_eq!(values, vec![dec!(10), dec!(11)]);
        assert_eq!(
            book.subjects_of(StudentId(1), SemesterId(2)),
            vec![SubjectId(2)]
        );
        assert!(book.subjects_of(StudentId(3), SemesterId(1)).is_empty());
    }
}
