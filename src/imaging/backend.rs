//! Image tool backend trait and shared types.
//!
//! The [`ImageBackend`] trait models the two external collaborators the
//! server needs: `identify` (native dimensions of a stored image) and
//! `transform` (run the pixel tool on an argument vector, collect stdout).
//!
//! The production implementation is
//! [`ImageMagickBackend`](super::magick::ImageMagickBackend). Tests use the
//! recording [`tests::MockBackend`].

use super::args::ArgumentVector;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("`{program}` exited with {status}: {stderr}")]
    ProcessFailed {
        program: String,
        status: String,
        stderr: String,
    },
    #[error("`{program}` timed out after {secs}s")]
    Timeout { program: String, secs: u64 },
    #[error("unreadable tool output: {0}")]
    BadOutput(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Parse a `"width,height"` pair as printed by `identify -format "%w,%h"`.
///
/// Only the first line counts: multi-frame sources (GIF, PDF) print one
/// line per frame.
pub fn parse_dimensions(raw: &str) -> Result<Dimensions, BackendError> {
    let bad = || BackendError::BadOutput(format!("expected \"w,h\", got {raw:?}"));
    let line = raw.lines().next().ok_or_else(bad)?.trim();
    let (w, h) = line.split_once(',').ok_or_else(bad)?;
    Ok(Dimensions {
        width: w.trim().parse().map_err(|_| bad())?,
        height: h.trim().parse().map_err(|_| bad())?,
    })
}

/// Trait for image tool backends.
///
/// Implementations are shared across request threads, so they must be
/// `Send + Sync`. Both operations block until the tool finishes or its
/// timeout expires; neither retries.
pub trait ImageBackend: Send + Sync {
    /// Get image dimensions.
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError>;

    /// Run the transform tool and return whatever it wrote to stdout.
    fn transform(&self, args: &ArgumentVector) -> Result<Vec<u8>, BackendError>;
}
