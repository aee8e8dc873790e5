//! Error types for conversion runs and frame decoding.

use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by a conversion run.
///
/// Every variant is terminal for the run. Variants that carry a path name the
/// file the failing operation was working on.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("cannot read video source {}: {reason}", .path.display())]
    SourceUnreadable { path: PathBuf, reason: String },

    #[error(
        "degenerate dimensions: source {width}x{height} at {target_width} columns gives {target_height} rows"
    )]
    DegenerateDimensions {
        width: u32,
        height: u32,
        target_width: u32,
        target_height: u32,
    },

    #[error("cannot open {} for writing", .path.display())]
    OutputUnwritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("reading {} failed after {frames} frames", .path.display())]
    MidStreamReadFailure {
        path: PathBuf,
        frames: u64,
        #[source]
        source: DecodeError,
    },

    #[error("writing {} failed", .path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn source_unreadable(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::SourceUnreadable {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Failure while pulling the next frame out of a source.
#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("truncated frame: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },

    #[error("ffmpeg exited with {status}: {stderr}")]
    Process { status: String, stderr: String },

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_the_path() {
        let err = Error::source_unreadable("/tmp/missing.mp4", "no such file");
        let msg = err.to_string();
        assert!(msg.contains("/tmp/missing.mp4"));
        assert!(msg.contains("no such file"));

        let err = Error::OutputUnwritable {
            path: PathBuf::from("/nope/out.srt"),
            source: io::Error::new(io::ErrorKind::NotFound, "missing dir"),
        };
        assert!(err.to_string().contains("/nope/out.srt"));
    }

    #[test]
    fn mid_stream_failure_keeps_its_cause() {
        use std::error::Error as _;

        let err = Error::MidStreamReadFailure {
            path: PathBuf::from("clip.mp4"),
            frames: 12,
            source: DecodeError::Truncated {
                expected: 100,
                got: 40,
            },
        };
        assert!(err.to_string().contains("after 12 frames"));
        let cause = err.source().map(|s| s.to_string()).unwrap_or_default();
        assert!(cause.contains("expected 100 bytes"));
    }

    #[test]
    fn degenerate_dimensions_reports_all_sizes() {
        let err = Error::DegenerateDimensions {
            width: 1920,
            height: 20,
            target_width: 2,
            target_height: 0,
        };
        assert_eq!(
            err.to_string(),
            "degenerate dimensions: source 1920x20 at 2 columns gives 0 rows"
        );
    }
}
