use core_types::round_half_even;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Dispersion of the overall averages of a class for one semester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassStatistics {
    pub mean: Option<Decimal>,
    /// Population standard deviation (divides by N).
    pub standard_deviation: Option<Decimal>,
    /// Students whose overall average could be computed.
    pub student_count: usize,
    /// Active students on the roster, averaged or not.
    pub roster_size: usize,
}

impl ClassStatistics {
    /// The "no data" result: no student of the roster has an average.
    pub fn empty(roster_size: usize) -> Self {
        Self {
            mean: None,
            standard_deviation: None,
            student_count: 0,
            roster_size,
        }
    }

    /// Computes mean and population standard deviation over `averages`.
    /// Both are rounded half-to-even to two decimals.
    pub fn from_averages(averages: &[Decimal], roster_size: usize) -> Self {
        match population_mean_and_deviation(averages) {
            Some((mean, deviation)) => Self {
                mean: Some(round_half_even(mean)),
                standard_deviation: Some(round_half_even(deviation)),
                student_count: averages.len(),
                roster_size,
            },
            None => Self::empty(roster_size),
        }
    }
}

/// Unrounded population mean and standard deviation. `None` for an empty
/// slice.
pub fn population_mean_and_deviation(values: &[Decimal]) -> Option<(Decimal, Decimal)> {
    if values.is_empty() {
        return None;
    }
    let count = Decimal::from(values.len());
    let mean = values.iter().sum::<Decimal>() / count;

    let variance = values
        .iter()
        .map(|v| (*v - mean) * (*v - mean))
        .sum::<Decimal>()
        / count;

    // The variance of a non-empty set is never negative, so the root exists.
    let deviation = variance.sqrt().unwrap_or(Decimal::ZERO);
    Some((mean, deviation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn population_deviation_divides_by_n() {
        // Mean 5, squared deviations sum to 32, N = 8 -> variance 4 -> deviation 2.
        let values = [2, 4, 4, 4, 5, 5, 7, 9].map(Decimal::from);
        let stats = ClassStatistics::from_averages(&values, 8);
        assert_eq!(stats.mean, Some(dec!(5.00)));
        assert_eq!(stats.standard_deviation, Some(dec!(2.00)));
        assert_eq!(stats.student_count, 8);
    }

    #[test]
    fn single_student_has_zero_deviation() {
        let stats = ClassStatistics::from_averages(&[dec!(13.25)], 3);
        assert_eq!(stats.mean, Some(dec!(13.25)));
        assert_eq!(stats.standard_deviation, Some(dec!(0.00)));
        assert_eq!(stats.student_count, 1);
        assert_eq!(stats.roster_size, 3);
    }

    #[test]
    fn no_averages_means_no_statistics() {
        let stats = ClassStatistics::from_averages(&[], 4);
        assert_eq!(stats, ClassStatistics::empty(4));
        assert_eq!(stats.student_count, 0);
        assert_eq!(stats.roster_size, 4);
    }

    #[test]
    fn three_student_class() {
        let stats = ClassStatistics::from_averages(&[dec!(18.00), dec!(14.67), dec!(12.00)], 3);
        // mean = 44.67 / 3 = 14.89
        assert_eq!(stats.mean, Some(dec!(14.89)));
        // variance = (3.11^2 + 0.22^2 + 2.89^2) / 3 = 6.0242 -> deviation ≈ 2.4544
        assert_eq!(stats.standard_deviation, Some(dec!(2.45)));
    }
}
