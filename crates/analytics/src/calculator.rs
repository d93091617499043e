use crate::gradebook::GradeBook;
use crate::statistics::ClassStatistics;
use core_types::{round_half_even, GradeKey, SemesterId, StudentId, SubjectId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A student's position in the class ranking for one semester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    pub student_id: StudentId,
    pub average: Decimal,
    /// 1 is the highest average.
    pub rank: u32,
}

/// A stateless calculator for deriving performance indicators from grades.
///
/// Every method is a pure function of the `GradeBook` it is given. Business
/// edge cases (no grades, empty class, zero weights) yield `None`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PerformanceCalculator {}

impl PerformanceCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The grade of the student in that subject and semester.
    ///
    /// There is at most one grade per (student, subject, semester), so the
    /// "average" is that grade itself.
    pub fn subject_average(
        &self,
        book: &GradeBook,
        student_id: StudentId,
        subject_id: SubjectId,
        semester_id: SemesterId,
    ) -> Option<Decimal> {
        let key = GradeKey {
            student_id,
            subject_id,
            semester_id,
        };
        book.get(&key).map(|entry| entry.value)
    }

    /// Coefficient-weighted mean of the student's grades in the semester:
    /// `Σ(value × coefficient) / Σ(coefficient)`, rounded half-to-even to
    /// two decimals.
    pub fn overall_average(
        &self,
        book: &GradeBook,
        student_id: StudentId,
        semester_id: SemesterId,
    ) -> Option<Decimal> {
        let mut weighted_sum = Decimal::ZERO;
        let mut total_coefficient = Decimal::ZERO;
        let mut grade_count = 0usize;

        for entry in book.grades_of(student_id, semester_id) {
            weighted_sum += entry.value * entry.coefficient;
            total_coefficient += entry.coefficient;
            grade_count += 1;
        }

        if grade_count == 0 {
            return None;
        }

        if total_coefficient.is_zero() {
            tracing::warn!(
                student_id = %student_id,
                semester_id = %semester_id,
                "Total coefficient is zero; overall average is undefined."
            );
            return None;
        }

        Some(round_half_even(weighted_sum / total_coefficient))
    }

    /// Percentage change of the overall average from `previous` to `current`.
    pub fn progression(
        &self,
        book: &GradeBook,
        student_id: StudentId,
        current_semester_id: SemesterId,
        previous_semester_id: SemesterId,
    ) -> Option<Decimal> {
        let current = self.overall_average(book, student_id, current_semester_id)?;
        let previous = self.overall_average(book, student_id, previous_semester_id)?;
        let progression = Self::progression_between(previous, current);
        if progression.is_none() {
            tracing::warn!(
                student_id = %student_id,
                semester_id = %previous_semester_id,
                "Previous average is zero; progression is undefined."
            );
        }
        progression
    }

    /// `((current − previous) / previous) × 100`, rounded half-to-even.
    /// `None` when `previous` is zero.
    pub fn progression_between(previous: Decimal, current: Decimal) -> Option<Decimal> {
        if previous.is_zero() {
            return None;
        }
        Some(round_half_even(
            (current - previous) / previous * Decimal::ONE_HUNDRED,
        ))
    }

    /// Mean and population standard deviation of the overall averages of the
    /// rostered students. Students without an average are left out of both
    /// the figures and `student_count`.
    pub fn class_statistics(
        &self,
        book: &GradeBook,
        roster: &[StudentId],
        semester_id: SemesterId,
    ) -> ClassStatistics {
        let averages: Vec<Decimal> = roster
            .iter()
            .filter_map(|student_id| self.overall_average(book, *student_id, semester_id))
            .collect();

        ClassStatistics::from_averages(&averages, roster.len())
    }

    /// Ranks every rostered student that has an overall average.
    ///
    /// Sorted by average descending; equal averages are ordered by student
    /// id ascending so the ranking is reproducible. Ranks are 1..=N.
    pub fn class_standings(
        &self,
        book: &GradeBook,
        roster: &[StudentId],
        semester_id: SemesterId,
    ) -> Vec<Standing> {
        let averages = roster
            .iter()
            .filter_map(|id| {
                self.overall_average(book, *id, semester_id)
                    .map(|average| (*id, average))
            })
            .collect();
        rank(averages)
    }

    /// Rank of `student_id` among its classmates. The student's own entry
    /// uses `student_average`, the value the caller is about to store.
    ///
    /// `None` if the student is not on the roster (e.g. inactive).
    pub fn class_rank(
        &self,
        book: &GradeBook,
        roster: &[StudentId],
        student_id: StudentId,
        semester_id: SemesterId,
        student_average: Decimal,
    ) -> Option<u32> {
        let averages = roster
            .iter()
            .filter_map(|id| {
                if *id == student_id {
                    Some((*id, student_average))
                } else {
                    self.overall_average(book, *id, semester_id)
                        .map(|average| (*id, average))
                }
            })
            .collect();

        rank(averages)
            .into_iter()
            .find(|standing| standing.student_id == student_id)
            .map(|standing| standing.rank)
    }
}

fn rank(mut averages: Vec<(StudentId, Decimal)>) -> Vec<Standing> {
    averages.sort_by(|a, b| match b.1.cmp(&a.1) {
        Ordering::Equal => a.0.cmp(&b.0),
        other => other,
    });
    averages
        .into_iter()
        .enumerate()
        .map(|(position, (student_id, average))| Standing {
            student_id,
            average,
            rank: position as u32 + 1,
        })
        .collect()
}
