//! Background segmentation collaborators.
//!
//! A [`Segmenter`] takes an encoded image (any container format) and returns
//! an encoded image whose alpha channel marks the background as transparent.
//! The pipeline treats it as a black box and propagates its errors verbatim.

use std::ffi::OsString;
use std::io::Write;
use std::process::{Command, Stdio};
use std::thread;

use image::{Rgba, RgbaImage};

use crate::engine::encode_png;

/// Opaque failure reported by a segmenter.
pub type SegmentError = Box<dyn std::error::Error + Send + Sync>;

/// Turns encoded image bytes into encoded RGBA image bytes.
pub trait Segmenter {
    /// Segment one encoded image.
    ///
    /// # Errors
    ///
    /// Any failure of the underlying model or process.
    fn segment(&self, encoded: &[u8]) -> Result<Vec<u8>, SegmentError>;
}

impl<F> Segmenter for F
where
    F: Fn(&[u8]) -> Result<Vec<u8>, SegmentError>,
{
    fn segment(&self, encoded: &[u8]) -> Result<Vec<u8>, SegmentError> {
        self(encoded)
    }
}

/// Delegates segmentation to an external program.
///
/// The encoded image is written to the program's stdin and the encoded RGBA
/// result is read from its stdout, e.g. `rembg i` or any model wrapper with
/// the same contract.
#[derive(Debug, Clone)]
pub struct CommandSegmenter {
    program: OsString,
    args: Vec<OsString>,
}

impl CommandSegmenter {
    /// Run `program` with no arguments.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl Segmenter for CommandSegmenter {
    fn segment(&self, encoded: &[u8]) -> Result<Vec<u8>, SegmentError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let mut stdin = child.stdin.take().ok_or("child stdin unavailable")?;

        // Feed stdin from a separate thread so a child that streams its
        // output early cannot deadlock on a full pipe.
        let (written, output) = thread::scope(|s| {
            let writer = s.spawn(move || stdin.write_all(encoded));
            let output = child.wait_with_output();
            (writer.join(), output)
        });
        let output = output?;

        let program = self.program.to_string_lossy();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(
                format!("{program} exited with {}: {}", output.status, stderr.trim()).into(),
            );
        }
        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err("stdin writer thread panicked".into()),
        }
        if output.stdout.is_empty() {
            return Err(format!("{program} produced no output").into());
        }

        Ok(output.stdout)
    }
}

/// Keys out the background color sampled from the image corners.
///
/// A crude stand-in for a real model: it only works on photos shot against a
/// roughly uniform backdrop, but it needs no external process.
#[derive(Debug, Clone, Copy)]
pub struct BorderKeySegmenter {
    /// Maximum per-channel distance from the backdrop color that is still
    /// treated as background.
    pub tolerance: u8,
}

impl Default for BorderKeySegmenter {
    fn default() -> Self {
        Self { tolerance: 24 }
    }
}

impl BorderKeySegmenter {
    #[allow(clippy::cast_possible_truncation)]
    fn backdrop(image: &RgbaImage) -> [u8; 3] {
        let (w, h) = image.dimensions();
        let corners = [(0, 0), (w - 1, 0), (0, h - 1), (w - 1, h - 1)];

        let mut sum = [0u32; 3];
        for (x, y) in corners {
            let px = image.get_pixel(x, y);
            for (acc, &c) in sum.iter_mut().zip(&px.0[..3]) {
                *acc += u32::from(c);
            }
        }

        sum.map(|s| ((s + 2) / 4) as u8)
    }

    /// Apply the key to a decoded image in place.
    pub fn key(&self, image: &mut RgbaImage) {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return;
        }

        let backdrop = Self::backdrop(image);
        for px in image.pixels_mut() {
            let Rgba([r, g, b, _]) = *px;
            let distance = [r, g, b]
                .iter()
                .zip(backdrop)
                .map(|(&c, bg)| c.abs_diff(bg))
                .max()
                .unwrap_or(0);
            if distance <= self.tolerance {
                px[3] = 0;
            }
        }
    }
}

impl Segmenter for BorderKeySegmenter {
    fn segment(&self, encoded: &[u8]) -> Result<Vec<u8>, SegmentError> {
        let mut rgba = image::load_from_memory(encoded)?.into_rgba8();
        self.key(&mut rgba);
        Ok(encode_png(&rgba)?)
    }
}
