//! # Acumen Analytics
//!
//! The performance-calculation engine: pure functions from raw grades to
//! derived indicators, plus the read-only rollups used by dashboards.
//!
//! ## Architectural Principles
//!
//! - **Pure logic:** this crate has no knowledge of storage. It depends only
//!   on `core-types`. Callers load a consistent `GradeBook` snapshot and hand
//!   it in.
//! - **No value, not an error:** missing grades, an empty class, a zero
//!   coefficient sum or a zero previous average all produce `None` for the
//!   affected metric. Nothing in here fails.
//! - **One rounding rule:** every derived figure is rounded half-to-even to
//!   two decimals (`core_types::round_half_even`).
//!
//! ## Public API
//!
//! - `PerformanceCalculator`: subject average, weighted overall average,
//!   progression, class statistics and class rank.
//! - `GradeBook`: the immutable grade snapshot the calculator reads.
//! - `ClassStatistics`: population mean and standard deviation of a class.
//! - `report`: dashboard summary, by-subject breakdown, evolution series and
//!   per-student detail rollups.

pub mod calculator;
pub mod gradebook;
pub mod report;
pub mod statistics;

pub use calculator::{PerformanceCalculator, Standing};
pub use gradebook::{GradeBook, GradeEntry};
pub use report::{
    DashboardSummary, EvolutionPoint, GradeRecord, IndicatorRecord, PerformanceDistribution,
    StudentPerformanceDetail, SubjectPerformance,
};
pub use statistics::ClassStatistics;
