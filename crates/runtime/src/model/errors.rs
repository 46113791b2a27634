use thiserror::Error;

/// Errors from LLM provider calls.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ModelError {
    /// The provider could not be reached at all.
    #[error("network: {0}")]
    Network(String),

    /// The LLM provider answered with a non-success status.
    #[error("provider api: HTTP {status}: {body}")]
    Api { status: u16, body: String },

    /// The provider response could not be parsed.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    /// A remote backend was requested without a credential.
    #[error("no credential configured for {0}")]
    MissingCredential(String),
}
