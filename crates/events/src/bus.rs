use crate::error::EventsError;
use crate::messages::GradeCommitted;
use tokio::sync::mpsc;

/// Receiving half of the grade event channel, consumed by the change trigger.
pub type GradeEventReceiver = mpsc::Receiver<GradeCommitted>;

/// Sending half of the grade event channel, held by the grade write path.
#[derive(Debug, Clone)]
pub struct GradeEventPublisher {
    tx: mpsc::Sender<GradeCommitted>,
}

/// Creates a bounded grade event channel. Publishers wait when the trigger
/// falls `capacity` commits behind.
pub fn channel(capacity: usize) -> (GradeEventPublisher, GradeEventReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (GradeEventPublisher { tx }, rx)
}

impl GradeEventPublisher {
    pub async fn publish(&self, event: GradeCommitted) -> Result<(), EventsError> {
        let event_id = event.event_id;
        tracing::debug!(
            event_id = %event_id,
            changes = event.changes.len(),
            "Publishing committed grade event."
        );
        self.tx
            .send(event)
            .await
            .map_err(|_| EventsError::ChannelClosed(event_id))
    }
}
