use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Everything that can go wrong while recording or writing a trace.
///
/// Only [`TraceError::Io`] is meant to reach application code as a real
/// failure. The others describe instrumentation or sequencing mistakes and
/// are swallowed by the infallible call-site methods.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("too many open trace events (capacity is {capacity})")]
    Capacity { capacity: usize },

    #[error("duration popped without a matching push")]
    Unbalanced,

    #[error("a trace capture is already running")]
    AlreadyCapturing,

    #[error("no trace capture is running")]
    NotCapturing,

    #[error("failed to write trace to `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
