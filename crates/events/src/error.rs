use thiserror::Error;

#[derive(Error, Debug)]
pub enum EventsError {
    #[error("The grade event channel is closed; event {0} was not delivered")]
    ChannelClosed(uuid::Uuid),
}
