//! # Acumen Database Crate
//!
//! The storage side of the engine: the grade store, the indicator store and
//! the academic directory, behind async traits with two implementations.
//!
//! ## Architectural Principles
//!
//! - **Adapter:** this crate encapsulates all storage-specific logic and
//!   exposes the traits in `store` to the rest of the application.
//! - **Postgres in production:** `DbRepository` implements every trait with
//!   `sqlx` against PostgreSQL, using a connection pool and transactions for
//!   every multi-row write. A recalculation holds a session advisory lock
//!   on its (student, semester) pair around its read-and-write transaction.
//! - **In-memory for tests and demos:** `MemoryStore` implements the same
//!   traits over `tokio::sync::RwLock`-guarded maps; each write takes the
//!   lock once, so it is atomic.
//! - **Post-commit events:** `GradeWriter` commits grade changes first and
//!   publishes the resulting event afterwards.
//!
//! ## Public API
//!
//! - `connect` / `run_migrations`: pool creation and schema management.
//! - `PerformanceStore`, `IndicatorReader`, `GradeStore`, `DirectoryStore`.
//! - `DbRepository`, `MemoryStore`, `GradeWriter`.
//! - `DbError`: the specific error types that can be returned from this crate.

pub mod connection;
pub mod error;
pub mod memory;
pub mod models;
pub mod repository;
pub mod store;
pub mod writer;

pub use connection::{connect, run_migrations};
pub use error::{DbError, MissingEntity};
pub use memory::MemoryStore;
pub use models::{
    AppliedIndicators, GradeCommand, IndicatorBatch, IndicatorFilter, IndicatorScope,
    OverallIndicatorWrite, RecalculatedIndicators, RecalculationScope, SubjectAverageWrite,
};
pub use repository::DbRepository;
pub use store::{DirectoryStore, GradeStore, IndicatorReader, PerformanceStore};
pub use writer::GradeWriter;
