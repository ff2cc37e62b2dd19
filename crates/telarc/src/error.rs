//! Error and Result types for telarc operations.

use std::io;
use thiserror::Error;

/// A convenience `Result` type for telarc operations.
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// The error type for archive operations.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Stream ended in the middle of a frame; carries the number of bytes
    /// still required to complete it.
    #[error("truncated frame: {0} more bytes required")]
    Truncated(usize),

    /// A frame header declared a size the caller's buffer cannot hold.
    #[error("invalid frame: {size} bytes declared, buffer holds {capacity}")]
    Invalid {
        /// Total frame size (header + payload) declared by the header.
        size: usize,
        /// Capacity of the caller-supplied buffer.
        capacity: usize,
    },

    /// Caller-supplied buffer is too small for the next indexed entry.
    #[error("short buffer: {needed} bytes needed, buffer holds {capacity}")]
    ShortBuffer {
        /// Size of the next entry in bytes.
        needed: usize,
        /// Capacity of the caller-supplied buffer.
        capacity: usize,
    },

    /// Path template pattern was empty.
    #[error("empty path template")]
    EmptyPattern,

    /// Path template contains no verb.
    #[error("path template has no verb")]
    NoVerb,

    /// Path template uses a verb letter outside the supported set.
    #[error("unknown template verb {0:?}")]
    UnknownVerb(char),

    /// Path template has a dangling `%` or an unparsable numeric run.
    #[error("malformed template at byte {0}")]
    MalformedPattern(usize),

    /// Merge engine operation attempted in the wrong phase.
    #[error("merge engine out of phase: {0}")]
    OutOfPhase(&'static str),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
