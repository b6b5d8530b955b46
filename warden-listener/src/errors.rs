use thiserror::Error;
use warden_core::WardenError;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("assignment store error: {0}")]
    Store(#[from] WardenError),

    #[error("downstream sink rejected the event: {0}")]
    Sink(String),

    #[error("listener stopped before its first successful read")]
    Stopped,
}
