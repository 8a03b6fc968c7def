use thiserror::Error;

/// Main error type for the bus
#[derive(Error, Debug)]
pub enum BusError {
    /// Subscriber queue is gone
    #[error("Channel send error: {0}")]
    ChannelSend(String),

    /// Subscription id is not attached to the topic
    #[error("Unknown subscription {id} on topic {topic}")]
    UnknownSubscription { id: u64, topic: String },

    /// Delivery gave up after the redelivery policy was exhausted
    #[error("Delivery failed after {attempts} attempts: {reason}")]
    DeliveryFailed { attempts: usize, reason: String },
}

/// Result type for bus operations
pub type Result<T> = std::result::Result<T, BusError>;

/// Error returned by a [`MessageHandler`](crate::MessageHandler)
///
/// Handlers bring their own error enums; they are boxed at the bus boundary.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;
