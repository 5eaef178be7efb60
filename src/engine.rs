//! Single-image pipeline and batch orchestration.

use std::ffi::OsString;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::codecs::png::PngEncoder;
use image::{
    DynamicImage, ExtendedColorType, GenericImageView, ImageEncoder, ImageReader, RgbaImage,
};

use crate::alpha;
use crate::center;
use crate::error::{Error, Result};
use crate::segment::Segmenter;
use crate::sharpen::{self, SharpenOptions};

/// Extensions (lowercase) picked up by the directory scan.
pub const SUPPORTED_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "webp", "bmp", "tiff"];

/// Suffix appended to the input stem to name the output file.
pub const OUTPUT_SUFFIX: &str = "_transparent";

/// Options controlling the per-image transform.
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    /// Re-center the subject on the canvas after sharpening.
    pub center: bool,
    /// Unsharp-mask parameters.
    pub sharpen: SharpenOptions,
}

impl ProcessOptions {
    /// Check that the sharpening parameters are usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOptions`] for a non-finite strength, or a sigma
    /// that is not a normal positive number up to [`sharpen::MAX_SIGMA`].
    pub fn validate(&self) -> Result<()> {
        let SharpenOptions { strength, sigma } = self.sharpen;
        if !strength.is_finite() {
            return Err(Error::InvalidOptions(format!(
                "sharpen strength must be finite, got {strength}"
            )));
        }
        if !sharpen::sigma_is_usable(sigma) {
            return Err(Error::InvalidOptions(format!(
                "blur sigma must be a positive number up to {}, got {sigma}",
                sharpen::MAX_SIGMA
            )));
        }
        Ok(())
    }
}

/// Outcome of processing one input file.
#[derive(Debug)]
pub struct ProcessResult {
    /// Source file.
    pub path: PathBuf,
    /// Destination the PNG was (or would have been) written to.
    pub output: PathBuf,
    /// The failure, if any. `None` means the PNG was written.
    pub error: Option<Error>,
}

impl ProcessResult {
    /// Whether the output file was written.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// File name of the source, for display.
    #[must_use]
    pub fn file_name(&self) -> String {
        display_name(&self.path)
    }
}

/// Progress notifications from [`CutoutEngine::process_directory`].
#[derive(Debug, Clone, Copy)]
pub enum BatchEvent<'a> {
    /// Inputs were collected and processing is about to begin. Not sent
    /// when there is nothing to process.
    Started {
        /// Number of eligible inputs.
        total: usize,
    },
    /// One input has been processed, successfully or not.
    Finished {
        /// Zero-based position of the input.
        index: usize,
        /// Number of eligible inputs.
        total: usize,
        /// The outcome.
        result: &'a ProcessResult,
    },
}

/// Accumulated results of one batch run.
#[derive(Debug)]
pub struct BatchSummary {
    /// Directory the PNGs were written to.
    pub output_dir: PathBuf,
    /// One entry per eligible input, in processing order.
    pub results: Vec<ProcessResult>,
}

impl BatchSummary {
    /// Number of eligible inputs found.
    #[must_use]
    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// Number of inputs written successfully.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    /// Number of inputs that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    /// Iterate over the failed results.
    pub fn failures(&self) -> impl Iterator<Item = &ProcessResult> {
        self.results.iter().filter(|r| !r.is_success())
    }
}

/// Background removal engine wrapping a segmentation collaborator.
///
/// Create once and reuse for every image in a batch. Items are processed
/// strictly one after another; only one image's buffers are alive at a time.
pub struct CutoutEngine<S> {
    segmenter: S,
    options: ProcessOptions,
}

impl<S: Segmenter> CutoutEngine<S> {
    /// Create an engine from a segmenter and validated options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOptions`] if `options` fail validation.
    pub fn new(segmenter: S, options: ProcessOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { segmenter, options })
    }

    /// The options this engine was built with.
    #[must_use]
    pub fn options(&self) -> &ProcessOptions {
        &self.options
    }

    /// Run the pixel stages on an already segmented image: alpha
    /// normalization, sharpening of the color planes, and optional centering.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedChannels`] for images that are not RGB or RGBA.
    pub fn transform(&self, image: DynamicImage) -> Result<RgbaImage> {
        let rgba = alpha::normalize(image)?;
        let (color, alpha_plane) = alpha::split_alpha(&rgba);
        drop(rgba);

        let sharpened = sharpen::unsharp_mask(&color, &self.options.sharpen);
        let merged = alpha::merge_alpha(&sharpened, &alpha_plane);

        if self.options.center {
            Ok(center::center_subject(merged))
        } else {
            Ok(merged)
        }
    }

    /// Process a single image file: read, segment, transform, write PNG.
    ///
    /// The destination's parent directory is created if needed. The PNG is
    /// written next to the destination and renamed into place, so a failure
    /// never leaves a truncated output.
    ///
    /// # Errors
    ///
    /// Returns [`Error::File`] naming `input` and wrapping the failing stage.
    pub fn process_image(&self, input: &Path, output: &Path) -> Result<()> {
        self.run(input, output).map_err(|e| Error::at(input, e))
    }

    fn run(&self, input: &Path, output: &Path) -> Result<()> {
        let source = fs::read(input)?;
        let (width, height) = read_dimensions(&source)?;
        tracing::debug!(file = %display_name(input), width, height, "segmenting");

        let segmented = self
            .segmenter
            .segment(&source)
            .map_err(Error::Segmentation)?;
        drop(source);

        let decoded = image::load_from_memory(&segmented).map_err(Error::Decode)?;
        drop(segmented);

        let (actual_width, actual_height) = decoded.dimensions();
        if (actual_width, actual_height) != (width, height) {
            return Err(Error::DimensionMismatch {
                width,
                height,
                actual_width,
                actual_height,
            });
        }

        let rgba = self.transform(decoded)?;
        let png = encode_png(&rgba)?;

        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        write_atomically(output, &png)?;

        tracing::debug!(output = %output.display(), bytes = png.len(), "wrote PNG");
        Ok(())
    }

    /// Process every supported image directly inside `input_dir`.
    ///
    /// The input directory is created if missing. Inputs are handled in
    /// lexicographic path order, one at a time. A failing item is logged and
    /// recorded, and the loop moves on. `on_event` receives
    /// [`BatchEvent::Started`] once before the first item and
    /// [`BatchEvent::Finished`] after every item.
    ///
    /// # Errors
    ///
    /// Only fails if the input directory cannot be created or listed.
    pub fn process_directory<F>(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        mut on_event: F,
    ) -> Result<BatchSummary>
    where
        F: FnMut(BatchEvent<'_>),
    {
        if !input_dir.exists() {
            fs::create_dir_all(input_dir)?;
            tracing::debug!(dir = %input_dir.display(), "created input directory");
        }

        let inputs = collect_inputs(input_dir)?;
        let total = inputs.len();
        let mut summary = BatchSummary {
            output_dir: output_dir.to_path_buf(),
            results: Vec::with_capacity(total),
        };

        if inputs.is_empty() {
            tracing::info!(
                "No images found. Drop images into '{}' and rerun.",
                absolute(input_dir).display()
            );
            return Ok(summary);
        }

        tracing::info!(count = total, "found images to process");
        on_event(BatchEvent::Started { total });

        for (index, path) in inputs.into_iter().enumerate() {
            let output = output_path_for(&path, output_dir);
            let error = self.process_image(&path, &output).err();

            if let Some(e) = &error {
                tracing::warn!(
                    file = %display_name(&path),
                    error = %e,
                    "failed to process image"
                );
            }

            let result = ProcessResult {
                path,
                output,
                error,
            };
            on_event(BatchEvent::Finished {
                index,
                total,
                result: &result,
            });
            summary.results.push(result);
        }

        tracing::info!(
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            "Finished. Files saved to: {}",
            absolute(output_dir).display()
        );

        Ok(summary)
    }
}

/// List the supported images directly inside `dir`, sorted by path.
///
/// Subdirectories are never descended into. One whose name carries an image
/// extension (e.g. `album.png/`) is skipped with a warning.
///
/// # Errors
///
/// Returns [`Error::Io`] if the directory cannot be read.
pub fn collect_inputs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut inputs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !is_supported_image(&path) {
            continue;
        }
        if path.is_file() {
            inputs.push(path);
        } else {
            tracing::warn!(
                path = %path.display(),
                "skipping non-file entry with an image extension"
            );
        }
    }
    inputs.sort();
    Ok(inputs)
}

/// Check if a file has a supported image extension (case-insensitive).
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()),
        None => false,
    }
}

/// Destination for `input` inside `output_dir`.
///
/// Example: `"photo.JPG"` becomes `"<output_dir>/photo_transparent.png"`.
#[must_use]
pub fn output_path_for(input: &Path, output_dir: &Path) -> PathBuf {
    let mut name = input.file_stem().unwrap_or_default().to_os_string();
    name.push(OUTPUT_SUFFIX);
    name.push(".png");
    output_dir.join(name)
}

/// Encode an RGBA buffer as an 8-bit, four-channel PNG.
///
/// # Errors
///
/// Returns [`Error::Encode`] if the encoder rejects the buffer.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgba8,
        )
        .map_err(Error::Encode)?;
    Ok(buf)
}

fn read_dimensions(bytes: &[u8]) -> Result<(u32, u32)> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_dimensions()
        .map_err(Error::Decode)
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut partial_name = OsString::from(".");
    partial_name.push(path.file_name().unwrap_or_default());
    partial_name.push(".partial");
    let partial = path.with_file_name(partial_name);

    if let Err(e) = fs::write(&partial, bytes).and_then(|()| fs::rename(&partial, path)) {
        let _ = fs::remove_file(&partial);
        return Err(e.into());
    }
    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    )
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
