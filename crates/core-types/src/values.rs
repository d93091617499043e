use crate::error::CoreError;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of decimal places carried by grades, coefficients and indicators.
pub const SCALE: u32 = 2;

/// Rounds to two decimal places, ties to even.
///
/// This is the single rounding rule of the system: overall averages,
/// progressions and class statistics all go through it. `10.005` becomes
/// `10.00` and `10.015` becomes `10.02`.
pub fn round_half_even(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(SCALE, RoundingStrategy::MidpointNearestEven)
}

fn check_scale(field: &str, value: Decimal) -> Result<(), CoreError> {
    if value.normalize().scale() > SCALE {
        return Err(CoreError::InvalidInput(
            field.to_string(),
            format!("{value} has more than {SCALE} decimal places"),
        ));
    }
    Ok(())
}

/// A grade on the 0–20 scale with at most two decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(try_from = "Decimal", into = "Decimal")]
#[sqlx(transparent)]
pub struct GradeValue(Decimal);

impl GradeValue {
    pub const MIN: Decimal = dec!(0);
    pub const MAX: Decimal = dec!(20);

    pub fn new(value: Decimal) -> Result<Self, CoreError> {
        if value < Self::MIN || value > Self::MAX {
            return Err(CoreError::InvalidInput(
                "grade value".to_string(),
                format!("{value} is outside [{}, {}]", Self::MIN, Self::MAX),
            ));
        }
        check_scale("grade value", value)?;
        let mut value = value;
        value.rescale(SCALE);
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for GradeValue {
    type Error = CoreError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<GradeValue> for Decimal {
    fn from(value: GradeValue) -> Self {
        value.0
    }
}

impl fmt::Display for GradeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The weight of a subject in the overall average. Strictly positive,
/// at most 9.99, two decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(try_from = "Decimal", into = "Decimal")]
#[sqlx(transparent)]
pub struct Coefficient(Decimal);

impl Coefficient {
    pub const MIN: Decimal = dec!(0.01);
    pub const MAX: Decimal = dec!(9.99);

    pub fn new(value: Decimal) -> Result<Self, CoreError> {
        if value < Self::MIN || value > Self::MAX {
            return Err(CoreError::InvalidInput(
                "coefficient".to_string(),
                format!("{value} is outside [{}, {}]", Self::MIN, Self::MAX),
            ));
        }
        check_scale("coefficient", value)?;
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl Default for Coefficient {
    fn default() -> Self {
        Self(dec!(1.00))
    }
}

impl TryFrom<Decimal> for Coefficient {
    type Error = CoreError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Coefficient> for Decimal {
    fn from(value: Coefficient) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_is_half_to_even() {
        assert_eq!(round_half_even(dec!(10.005)), dec!(10.00));
        assert_eq!(round_half_even(dec!(10.015)), dec!(10.02));
        assert_eq!(round_half_even(dec!(15.142857)), dec!(15.14));
        assert_eq!(round_half_even(dec!(-14.285)), dec!(-14.28));
    }

    #[test]
    fn grade_value_accepts_the_closed_range() {
        assert_eq!(GradeValue::new(dec!(0)).unwrap().value(), dec!(0.00));
        assert_eq!(GradeValue::new(dec!(20)).unwrap().value(), dec!(20.00));
        assert_eq!(GradeValue::new(dec!(15.5)).unwrap().to_string(), "15.50");
    }

    #[test]
    fn grade_value_rejects_out_of_range_and_extra_precision() {
        assert!(GradeValue::new(dec!(-0.01)).is_err());
        assert!(GradeValue::new(dec!(20.01)).is_err());
        assert!(GradeValue::new(dec!(12.345)).is_err());
        // Trailing zeros do not count as precision.
        assert!(GradeValue::new(dec!(12.3400)).is_ok());
    }

    #[test]
    fn coefficient_must_be_positive() {
        assert!(Coefficient::new(dec!(0)).is_err());
        assert!(Coefficient::new(dec!(10)).is_err());
        assert_eq!(Coefficient::new(dec!(1.5)).unwrap().value(), dec!(1.5));
        assert_eq!(Coefficient::default().value(), dec!(1));
    }

    #[test]
    fn grade_value_deserialization_is_validated() {
        let ok: Result<GradeValue, _> = serde_json::from_str("\"14.25\"");
        assert!(ok.is_ok());
        let bad: Result<GradeValue, _> = serde_json::from_str("\"25\"");
        assert!(bad.is_err());
    }
}
