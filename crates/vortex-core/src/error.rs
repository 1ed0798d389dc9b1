//! Error types shared across the Vortex pipeline.

use thiserror::Error;

/// Errors with a small, named set of variants the pipeline matches on.
///
/// Everything else that only needs to be logged and propagated to a fatal shutdown
/// path travels as a plain [`anyhow::Error`] instead (see [`VortexError::Other`]),
/// following the same split the rest of the ambient stack uses.
#[derive(Debug, Error)]
pub enum VortexError {
    /// A channel between two pipeline tasks was closed while the other side still
    /// expected to use it — the receiving/sending task has already exited.
    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    /// A named transform stage returned an error while rewriting a document.
    #[error("transform '{stage}' failed: {source}")]
    Transform {
        stage: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// The configured log level could not be parsed.
    #[error("unknown log level '{0}'")]
    UnknownLogLevel(String),

    /// A wildcard wrapper for any other fatal error that just needs to bubble up
    /// with context and terminate the process.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
