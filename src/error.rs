/// Convenience result type used across Lifeline.
pub type LifelineResult<T> = Result<T, LifelineError>;

/// Top-level error taxonomy used by the crate's APIs.
///
/// Acquisition failures ([`LifelineError::Generation`]) never mutate the
/// active diagram; export failures ([`LifelineError::Capture`],
/// [`LifelineError::Packaging`]) funnel through the export controller's
/// finalization path, which restores view state unconditionally.
#[derive(thiserror::Error, Debug)]
pub enum LifelineError {
    /// Invalid user-provided data, configuration, or arguments.
    #[error("validation error: {0}")]
    Validation(String),

    /// AI diagram acquisition failed (request, missing payload, bad JSON).
    #[error("generation error: {0}")]
    Generation(String),

    /// Frame rasterization failed in a non-recoverable way.
    #[error("capture error: {0}")]
    Capture(String),

    /// Export archive assembly or output IO failed.
    #[error("packaging error: {0}")]
    Packaging(String),

    /// Errors when serializing or deserializing data structures.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LifelineError {
    /// Build a [`LifelineError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`LifelineError::Generation`] value.
    pub fn generation(msg: impl Into<String>) -> Self {
        Self::Generation(msg.into())
    }

    /// Build a [`LifelineError::Capture`] value.
    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture(msg.into())
    }

    /// Build a [`LifelineError::Packaging`] value.
    pub fn packaging(msg: impl Into<String>) -> Self {
        Self::Packaging(msg.into())
    }

    /// Build a [`LifelineError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}
