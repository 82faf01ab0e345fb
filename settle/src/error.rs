//! Error types for condition waits.
//!
//! Only genuine failures are errors. A wait that runs out of time or is
//! cancelled resolves normally with a [`crate::WaitOutcome`].

/// Boxed error produced by a fallible predicate.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    /// The request was rejected before any predicate evaluation
    #[error("Invalid wait argument: {0}")]
    InvalidArgument(String),

    /// The predicate itself failed; polling stopped at once
    #[error("Predicate failed after {polls} poll(s): {source}")]
    Predicate {
        polls: u32,
        #[source]
        source: BoxError,
    },
}

impl WaitError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        WaitError::InvalidArgument(message.into())
    }

    /// Returns true for requests rejected before polling started
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, WaitError::InvalidArgument(_))
    }
}
