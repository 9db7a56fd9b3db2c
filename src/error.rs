//! Error types for the paged file I/O core.

use std::fmt;
use std::io;
use thiserror::Error;

/// The result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The error taxonomy for the paged file I/O core.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Open of a missing file without `CREATE`, or a directory/non-file target.
    #[error("file not found: {0}")]
    NotFound(String),

    /// The requested mode (read or write) is not permitted on this file.
    #[error("permission denied: {0}")]
    Permission(String),

    /// A positional read ran past the current file length.
    #[error("end of file at offset {offset}")]
    EndOfFile {
        /// Byte offset at which the read ran out of data.
        offset: u64,
    },

    /// An I/O error occurred while writing.
    #[error("write failed at offset {offset}{}", if *.read_only { " (file is read-only)" } else { "" })]
    WriteFailure {
        /// Byte offset of the failed write.
        offset: u64,
        /// True if the failure is attributable to the file being read-only.
        read_only: bool,
        /// Underlying OS error text.
        source: String,
    },

    /// Mapping creation failed: too large to address, OOM, or the OS refused it.
    #[error("mapping error: {0}")]
    Mapping(String),

    /// A fixed-capacity mapped array was written past its page count.
    #[error("array is full")]
    Full,

    /// Any operation attempted on a closed file or array.
    #[error("file is closed{}", .cause.as_ref().map(|c| format!(": {c}")).unwrap_or_default())]
    Closed {
        /// The cause originally recorded at close time, if any.
        cause: Option<Box<Error>>,
    },

    /// A timed wait was aborted by thread interruption.
    #[error("interrupted")]
    Interrupted,

    /// The current back-end does not implement this operation.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    /// Reserved for consumers; wraps unexpected failures encountered while
    /// closing on a prior failure.
    #[error("corrupt: {0}")]
    Corrupt(String),

    /// Catch-all for I/O errors not covered by the variants above.
    #[error("I/O error: {0}")]
    Io(String),

    /// Several sub-operations failed together (fan-out sync). The first is
    /// surfaced as the primary cause; the rest are kept for diagnostics.
    #[error("{primary}{}", if .suppressed.is_empty() { String::new() } else { format!(" ({} more suppressed)", .suppressed.len()) })]
    Aggregate {
        /// The first error encountered.
        primary: Box<Error>,
        /// Additional errors that were suppressed in favor of `primary`.
        suppressed: Vec<Error>,
    },
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Error::NotFound(err.to_string()),
            io::ErrorKind::PermissionDenied => Error::Permission(err.to_string()),
            io::ErrorKind::Interrupted => Error::Interrupted,
            _ => Error::Io(err.to_string()),
        }
    }
}

impl Error {
    /// Wraps a write-side I/O error, recording whether the array is read-only.
    pub fn write_failure(offset: u64, read_only: bool, source: impl fmt::Display) -> Self {
        Error::WriteFailure {
            offset,
            read_only,
            source: source.to_string(),
        }
    }

    /// Builds a `Closed` error, chaining an optional previously-recorded cause.
    pub fn closed(cause: Option<Error>) -> Self {
        Error::Closed {
            cause: cause.map(Box::new),
        }
    }

    /// Joins a list of fallible results into one `Result<()>`: `Ok` if every
    /// entry succeeded, otherwise the first failure wrapped in `Aggregate`
    /// with the remaining failures recorded as suppressed. Mirrors "aggregate
    /// close errors and rethrow the first".
    pub fn join(results: impl IntoIterator<Item = Result<()>>) -> Result<()> {
        let mut errors = results.into_iter().filter_map(|r| r.err());
        let Some(primary) = errors.next() else {
            return Ok(());
        };
        let suppressed: Vec<Error> = errors.collect();
        for s in &suppressed {
            tracing::warn!(error = %s, "suppressed error during fan-out join");
        }
        if suppressed.is_empty() {
            Err(primary)
        } else {
            Err(Error::Aggregate {
                primary: Box::new(primary),
                suppressed,
            })
        }
    }
}
