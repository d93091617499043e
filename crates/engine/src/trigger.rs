use crate::orchestrator::{IndicatorOrchestrator, RecalculationSummary};
use core_types::{SemesterId, StudentId};
use events::{GradeCommitted, GradeEventReceiver};
use futures::future::join_all;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// What the trigger did for one committed grade transaction.
#[derive(Debug, Default)]
pub struct TriggerOutcome {
    pub recalculated: Vec<RecalculationSummary>,
    /// Pairs whose indicators are stale until the next recalculation.
    pub failed: Vec<(StudentId, SemesterId)>,
}

/// Reacts to committed grade changes by recalculating every affected
/// (student, semester) pair exactly once per commit.
///
/// The grade change is already durable when the event arrives. A failed
/// recalculation is logged and left; it is neither retried nor undone.
#[derive(Clone)]
pub struct ChangeTrigger {
    orchestrator: Arc<IndicatorOrchestrator>,
}

impl ChangeTrigger {
    pub fn new(orchestrator: Arc<IndicatorOrchestrator>) -> Self {
        Self { orchestrator }
    }

    pub async fn handle(&self, event: &GradeCommitted) -> TriggerOutcome {
        let pairs: Vec<(StudentId, SemesterId)> = event.affected_pairs().into_iter().collect();
        tracing::debug!(
            event_id = %event.event_id,
            pairs = pairs.len(),
            "Handling committed grade changes."
        );

        let results = join_all(
            pairs
                .iter()
                .map(|(student_id, semester_id)| {
                    self.orchestrator.recalculate_all(*student_id, *semester_id)
                }),
        )
        .await;

        let mut outcome = TriggerOutcome::default();
        for ((student_id, semester_id), result) in pairs.into_iter().zip(results) {
            match result {
                Ok(summary) => outcome.recalculated.push(summary),
                Err(e) => {
                    tracing::error!(
                        event_id = %event.event_id,
                        actor = %event.actor,
                        student_id = %student_id,
                        semester_id = %semester_id,
                        transient = e.is_transient(),
                        error = %e,
                        "Performance recalculation failed after grade commit. Indicators are stale."
                    );
                    outcome.failed.push((student_id, semester_id));
                }
            }
        }
        outcome
    }

    /// Consumes events until every publisher is dropped.
    pub async fn run(self, mut events: GradeEventReceiver) {
        tracing::info!("Change trigger started.");
        while let Some(event) = events.recv().await {
            self.handle(&event).await;
        }
        tracing::info!("Grade event channel closed. Change trigger stopped.");
    }

    pub fn spawn(self, events: GradeEventReceiver) -> JoinHandle<()> {
        tokio::spawn(self.run(events))
    }
}
