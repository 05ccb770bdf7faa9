//! Error types for the collaborator boundary.

use thiserror::Error;

/// Errors crossing the chat transport or data-source boundary.
///
/// Absence of a channel or message is NOT an error; the gateway methods
/// return `None` for those. These variants are real transport failures.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The transport could not deliver or fetch.
    #[error("transport error: {0}")]
    Transport(String),

    /// The upstream data source rejected or failed the request.
    #[error("source error: {0}")]
    Source(String),
}
