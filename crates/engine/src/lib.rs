//! # Acumen Engine
//!
//! Keeps the derived performance indicators in step with the grade store.
//!
//! ## Architectural Principles
//!
//! - **Snapshot, derive, write:** `IndicatorOrchestrator` passes the pure
//!   `analytics` calculator to `PerformanceStore::recalculate`, which reads
//!   one consistent snapshot of the (student, semester) pair and writes the
//!   derived batch in the same locked transaction.
//! - **Post-commit triggering:** `ChangeTrigger` consumes `GradeCommitted`
//!   events published after a grade transaction commits. It never runs
//!   inside the grade write and never undoes it.
//! - **Storage agnostic:** everything here works against the `database`
//!   traits, so the same code runs on PostgreSQL and on `MemoryStore`.
//!
//! ## Public API
//!
//! - `IndicatorOrchestrator`: `recalculate_all`, `recalculate_class`, `derive`.
//! - `ChangeTrigger`: `handle`, `run`, `spawn`.
//! - `ReportingQueries`: dashboard summary, by-subject, evolution and
//!   per-student detail.
//! - `EngineError`: distinguishes missing entities from transient failures.

pub mod error;
pub mod locks;
pub mod orchestrator;
pub mod reporting;
pub mod trigger;

pub use error::EngineError;
pub use locks::KeyedLocks;
pub use orchestrator::{ClassRecalculation, IndicatorOrchestrator, RecalculationSummary};
pub use reporting::{ReportFilter, ReportingQueries};
pub use trigger::{ChangeTrigger, TriggerOutcome};
