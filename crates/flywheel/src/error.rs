//! Error types for Flywheel.
//!
//! The engine recovers nothing on behalf of a combiner. Domain failures belong
//! in mutation and state values; the variants here only describe misuse of the
//! pipeline itself and the one unrecoverable condition, a terminated stream.

use thiserror::Error;

/// Errors surfaced by the pipeline machinery.
#[derive(Debug, Error)]
pub enum FlywheelError {
    /// A pipeline handle was already cached for this instance.
    ///
    /// Construction is idempotent: the builder returns the cached handle on
    /// every access after the first, so this only surfaces if something tries
    /// to install a second handle directly.
    #[error("pipeline already built for combiner {0}")]
    PipelineAlreadyBuilt(uuid::Uuid),

    /// The pipeline was first accessed outside of a tokio runtime.
    #[error("no tokio runtime available to drive the pipeline")]
    NoRuntime,

    /// The state stream has terminated, or the owning combiner is gone.
    ///
    /// This is permanent for the instance. No further state will be delivered
    /// and the engine does not restart the pipeline.
    #[error("state stream terminated for combiner {0}")]
    Terminated(uuid::Uuid),

    /// Configuration failed validation.
    #[error("invalid pipeline config: {0}")]
    InvalidConfig(String),

    /// Configuration could not be parsed.
    #[error("failed to parse pipeline config: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, FlywheelError>;

impl FlywheelError {
    /// Whether this error means the instance will never deliver state again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FlywheelError::Terminated(_))
    }
}
