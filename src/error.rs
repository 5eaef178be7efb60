//! Error types for the transparent-cutout crate.

use std::path::PathBuf;

use crate::segment::SegmentError;

/// Errors that can occur while turning a photo into a transparent PNG.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Source bytes or segmentation output could not be parsed as an image.
    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    /// The final buffer could not be encoded as PNG.
    #[error("failed to encode PNG: {0}")]
    Encode(#[source] image::ImageError),

    /// The decoded image has neither 3 nor 4 channels.
    #[error("unsupported channel count: {0} (expected 3 or 4)")]
    UnsupportedChannels(u8),

    /// The segmentation collaborator reported a failure.
    #[error("segmentation failed: {0}")]
    Segmentation(#[source] SegmentError),

    /// The segmentation output does not match the source dimensions.
    #[error("segmentation returned {actual_width}x{actual_height}, source is {width}x{height}")]
    DimensionMismatch {
        /// Source width in pixels.
        width: u32,
        /// Source height in pixels.
        height: u32,
        /// Width of the segmented image.
        actual_width: u32,
        /// Height of the segmented image.
        actual_height: u32,
    },

    /// Processing options are out of range.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// A per-file failure, tagged with the offending path.
    #[error("{}: {source}", .path.display())]
    File {
        /// The source file being processed.
        path: PathBuf,
        /// The underlying cause.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap an error with the path of the file that caused it.
    pub(crate) fn at(path: impl Into<PathBuf>, source: Error) -> Self {
        Self::File {
            path: path.into(),
            source: Box::new(source),
        }
    }
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
