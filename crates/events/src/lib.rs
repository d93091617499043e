//! # Acumen Events
//!
//! The change notifications emitted by the grade store after a write has
//! committed, and the channel that carries them to the change trigger.
//!
//! As a Layer 0 crate, it depends only on `core-types`. Publishing happens
//! strictly after commit, so every event describes data that is already
//! visible to readers.

pub mod bus;
pub mod error;
pub mod messages;

pub use bus::{channel, GradeEventPublisher, GradeEventReceiver};
pub use error::EventsError;
pub use messages::{GradeChange, GradeChangeKind, GradeCommitted};
