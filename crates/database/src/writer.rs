use crate::error::DbError;
use crate::models::GradeCommand;
use crate::store::GradeStore;
use core_types::{GradeKey, GradeValue, UserId};
use events::{GradeCommitted, GradeEventPublisher};
use std::sync::Arc;

/// The grade write path. Commits grade commands through a `GradeStore`
/// and, only once the commit has succeeded, publishes a `GradeCommitted`
/// event for the change trigger.
///
/// Recalculation never happens in here; the event is the hand-off.
#[derive(Clone)]
pub struct GradeWriter {
    store: Arc<dyn GradeStore>,
    publisher: GradeEventPublisher,
}

impl GradeWriter {
    pub fn new(store: Arc<dyn GradeStore>, publisher: GradeEventPublisher) -> Self {
        Self { store, publisher }
    }

    /// Commits `commands` as one transaction on behalf of `actor`.
    ///
    /// Returns the published event, or `None` when the commands changed
    /// nothing. A failed commit publishes nothing.
    pub async fn commit(
        &self,
        commands: &[GradeCommand],
        actor: UserId,
    ) -> Result<Option<GradeCommitted>, DbError> {
        let changes = self.store.commit_grades(commands, actor).await?;
        if changes.is_empty() {
            tracing::debug!(actor = %actor, "Grade commit changed nothing; no event published.");
            return Ok(None);
        }

        let event = GradeCommitted::new(actor, changes);
        tracing::info!(
            event_id = %event.event_id,
            actor = %actor,
            changes = event.changes.len(),
            "Grades committed. Performance recalculation queued."
        );

        // The grades are durable at this point. Losing the event leaves the
        // indicators stale until the next recalculation, which is logged
        // rather than undone.
        if let Err(e) = self.publisher.publish(event.clone()).await {
            tracing::error!(error = %e, "Failed to queue performance recalculation after grade commit.");
        }

        Ok(Some(event))
    }

    pub async fn record(
        &self,
        key: GradeKey,
        value: GradeValue,
        actor: UserId,
    ) -> Result<Option<GradeCommitted>, DbError> {
        self.commit(&[GradeCommand::Record { key, value }], actor).await
    }

    pub async fn remove(
        &self,
        key: GradeKey,
        actor: UserId,
    ) -> Result<Option<GradeCommitted>, DbError> {
        self.commit(&[GradeCommand::Remove { key }], actor).await
    }
}
