use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Performance category of an overall average, used by the dashboard
/// distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceBand {
    /// 16 and above.
    Excellent,
    /// [14, 16)
    Good,
    /// [10, 14)
    Average,
    /// Below 10.
    Poor,
}

impl PerformanceBand {
    /// Classifies an average on the 0–20 scale.
    pub fn from_average(average: Decimal) -> Self {
        if average >= dec!(16) {
            PerformanceBand::Excellent
        } else if average >= dec!(14) {
            PerformanceBand::Good
        } else if average >= dec!(10) {
            PerformanceBand::Average
        } else {
            PerformanceBand::Poor
        }
    }
}
