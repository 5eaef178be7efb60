//! Batch-convert photographs into sharpened, transparent-background PNGs.
//!
//! Each image is handed to a [`Segmenter`] that marks the background as
//! transparent. The result is normalized to RGBA, its color planes are
//! sharpened with an unsharp mask, and the subject is optionally re-centered
//! on the original canvas before being written as PNG.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use transparent_cutout::{BorderKeySegmenter, CutoutEngine, ProcessOptions};
//!
//! let engine = CutoutEngine::new(BorderKeySegmenter::default(), ProcessOptions::default())
//!     .expect("default options are valid");
//! engine
//!     .process_image(Path::new("photo.jpg"), Path::new("photo_transparent.png"))
//!     .unwrap();
//! ```
//!
//! # Batches
//!
//! [`CutoutEngine::process_directory`] scans a folder, processes every
//! supported image in path order and keeps going when one of them fails.
//!
//! ```no_run
//! use std::path::Path;
//! use transparent_cutout::{CommandSegmenter, CutoutEngine, ProcessOptions};
//!
//! let segmenter = CommandSegmenter::new("rembg").args(["i", "-", "-"]);
//! let engine = CutoutEngine::new(segmenter, ProcessOptions::default()).unwrap();
//! let summary = engine
//!     .process_directory(Path::new("input"), Path::new("output"), |_| {})
//!     .unwrap();
//! println!("{} of {} written", summary.succeeded(), summary.total());
//! ```

#![deny(missing_docs)]

pub mod alpha;
pub mod center;
mod engine;
pub mod error;
pub mod segment;
pub mod sharpen;

pub use center::{bounding_box, center_subject, BoundingBox};
pub use engine::{
    collect_inputs, encode_png, is_supported_image, output_path_for, BatchEvent, BatchSummary,
    CutoutEngine, ProcessOptions, ProcessResult, OUTPUT_SUFFIX, SUPPORTED_EXTENSIONS,
};
pub use error::{Error, Result};
pub use segment::{BorderKeySegmenter, CommandSegmenter, SegmentError, Segmenter};
pub use sharpen::{unsharp_mask, SharpenOptions};
