//! Domain-specific error types for the mirroring pipeline.
//!
//! All fallible operations return `Result<T, MirrorError>`.
//! Stream-level conditions are split into fatal ones (surfaced to the
//! subscriber as a single terminal event) and benign ones (logged, the
//! loop exits cleanly).

use std::io;

use thiserror::Error;

/// Exit status a POSIX shell reports when a command cannot be found.
pub const EXIT_COMMAND_NOT_FOUND: i32 = 127;

/// The canonical error type for the mirroring pipeline.
#[derive(Debug, Error)]
pub enum MirrorError {
    // ── Call-site Errors ─────────────────────────────────────────
    /// A precondition of an address/window computation was violated.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Metadata returned by the remote side could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    // ── Stream Errors ────────────────────────────────────────────
    /// The compressed stream closed before yielding any data.
    #[error("stream closed without data")]
    NoData,

    /// A helper binary is missing on the remote side.
    #[error("remote helper missing (exit status {exit_code}): {stderr}")]
    ToolMissing { exit_code: i32, stderr: String },

    /// The compressed stream is malformed.
    #[error("decompression failed: {0}")]
    Decompression(#[source] io::Error),

    /// The transport underneath a stream reported an error.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    // ── Remote Errors ────────────────────────────────────────────
    /// A one-shot remote query exited unsuccessfully.
    #[error("remote command `{command}` exited with {exit_code:?}: {stderr}")]
    RemoteExit {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// A subscriber channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl MirrorError {
    /// Whether this error ends a stream with a subscriber-visible failure.
    ///
    /// `NoData` is the only benign stream condition; it is reported to the
    /// subscriber as a clean end of stream.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, MirrorError::NoData)
    }
}

impl From<String> for MirrorError {
    fn from(s: String) -> Self {
        MirrorError::Other(s)
    }
}

impl From<&str> for MirrorError {
    fn from(s: &str) -> Self {
        MirrorError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for MirrorError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        MirrorError::ChannelClosed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = MirrorError::ToolMissing {
            exit_code: EXIT_COMMAND_NOT_FOUND,
            stderr: "sh: lz4: not found".into(),
        };
        assert!(e.to_string().contains("127"));
        assert!(e.to_string().contains("lz4"));

        let e = MirrorError::InvalidInput("page size must be positive".into());
        assert!(e.to_string().contains("page size"));
    }

    #[test]
    fn only_no_data_is_benign() {
        assert!(!MirrorError::NoData.is_fatal());
        assert!(MirrorError::ChannelClosed.is_fatal());
        let corrupt = io::Error::new(io::ErrorKind::InvalidData, "bad magic");
        assert!(MirrorError::Decompression(corrupt).is_fatal());
    }

    #[test]
    fn from_io() {
        let io_err = io::Error::new(io::ErrorKind::BrokenPipe, "pipe broke");
        let e: MirrorError = io_err.into();
        assert!(matches!(e, MirrorError::Io(_)));
    }

    #[test]
    fn from_string() {
        let e: MirrorError = "something broke".into();
        assert!(matches!(e, MirrorError::Other(_)));
    }
}
