use thiserror::Error;

/// Errors surfaced to features consuming the storage engine.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Metadata tier failure.
    #[error("Store error: {0}")]
    Store(#[from] vellum_store::StoreError),

    /// Content tier failure.
    #[error("Content error: {0}")]
    Content(#[from] vellum_content::ContentError),

    /// All three read fallback tiers are exhausted.  The only condition
    /// shown to the user as an actionable error; carries the document's
    /// display name.
    #[error("Content for \"{0}\" is unavailable")]
    ContentUnavailable(String),

    /// Malformed inline data (e.g. a bad base64 data URL).  Not
    /// retryable; logged where encountered.
    #[error("Invalid inline encoding: {0}")]
    InvalidEncoding(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StorageError>;
