use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Not connected to the message bus.")]
    NotConnected,
    #[error("Failed to connect to {target}: {message}")]
    Connect { target: String, message: String },
    #[error("Gave up connecting after {attempts} attempts: {last}")]
    ConnectExhausted {
        attempts: u32,
        #[source]
        last: Box<TransportError>,
    },
    #[error("Failed to publish to '{destination}': {message}")]
    Publish {
        destination: String,
        message: String,
    },
    #[error("Reply channel is already subscribed.")]
    AlreadySubscribed,
    #[error("Failed to subscribe to reply channel: {message}")]
    Subscribe { message: String },
    #[error("Invalid bus URI: {source}")]
    InvalidUri {
        #[source]
        source: url::ParseError,
    },
    #[error("Failed to close connection: {message}")]
    Close { message: String },
}
