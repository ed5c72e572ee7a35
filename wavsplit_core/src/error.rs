use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::header::FormatDescriptor;

/// Errors that can occur while demultiplexing a recording.
///
/// Every variant is fatal to the session that produced it. Output files that
/// were already created are closed when the owning engine is dropped, but are
/// left on disk with whatever header they carried at that point.
#[derive(Debug, Error)]
pub enum WavSplitError {
    /// A required sub-chunk was never found, or a fixed-size field could not
    /// be fully read.
    #[error("malformed container: {reason}")]
    MalformedContainer { reason: String },

    /// The container carries an audio format other than integer PCM.
    #[error("unsupported audio format code {format_code} (only PCM is supported)")]
    UnsupportedFormat { format_code: u16 },

    /// A write to an output file did not complete.
    #[error("failed to write {target}")]
    WriteFailure {
        target: String,
        #[source]
        source: io::Error,
    },

    /// An expected chunk file of the session is absent or unreadable.
    #[error("failed to open chunk file '{}'", path.display())]
    MissingChunkFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The session directory does not contain any chunk files.
    #[error("no input chunk files found in '{}'", path.display())]
    NoInputChunks { path: PathBuf },

    /// A channel buffer could not be allocated.
    #[error("failed to allocate {bytes} bytes for channel buffers")]
    AllocationFailure { bytes: usize },

    /// The supplied configuration cannot be used.
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    /// A later chunk file declares a format different from the first one.
    #[error("chunk file '{}' is {found}, but the session is {expected}", path.display())]
    FormatMismatch {
        path: PathBuf,
        expected: FormatDescriptor,
        found: FormatDescriptor,
    },

    /// A channel grew beyond what the 32-bit container size fields can hold.
    #[error("channel {channel} would exceed the container size limit ({bytes} data bytes)")]
    ContainerTooLarge { channel: usize, bytes: u64 },

    /// The input path does not exist.
    #[error("input does not exist: {}", .0.display())]
    MissingInput(PathBuf),

    /// The output directory does not exist.
    #[error("output directory does not exist: {}", .0.display())]
    MissingOutputDirectory(PathBuf),

    /// An output file already exists and overwriting was not requested.
    #[error("output file already exists: {}", .0.display())]
    OutputExists(PathBuf),

    /// Error produced when a file name cannot be derived from the input path.
    #[error("failed to derive a base name for the input file")]
    InvalidInputName,

    /// Wrapper around IO errors encountered while reading or writing files.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl WavSplitError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedContainer {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    /// Rename what a [`WavSplitError::WriteFailure`] failed to write; other
    /// variants are returned unchanged.
    pub(crate) fn in_target(self, target: impl Into<String>) -> Self {
        match self {
            Self::WriteFailure { source, .. } => Self::WriteFailure {
                target: target.into(),
                source,
            },
            other => other,
        }
    }
}
