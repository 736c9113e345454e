use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MonitorError {
    /// Network/provider failure or timeout while talking to a data source.
    #[error("Fetch failed: {0}")]
    TransientFetch(String),

    /// The provider answered with something we could not interpret.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// Rejected at the write boundary; never reaches the store.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Storage error: {0}")]
    Storage(String),
}
