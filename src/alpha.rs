//! Alpha channel normalization.
//!
//! Every image entering the pipeline leaves this module as 8-bit RGBA. A
//! source without transparency gets a fully opaque alpha plane; an alpha plane
//! supplied by the segmenter is trusted as-is.

use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};

use crate::error::{Error, Result};

/// Alpha value for a fully opaque pixel.
pub const OPAQUE: u8 = 255;

/// Guarantee a four-channel buffer of the same dimensions.
///
/// # Errors
///
/// Returns [`Error::UnsupportedChannels`] if the image has neither 3 nor 4 channels.
pub fn normalize(image: DynamicImage) -> Result<RgbaImage> {
    match image.color().channel_count() {
        4 => Ok(image.into_rgba8()),
        3 => {
            let rgb = image.into_rgb8();
            let alpha = GrayImage::from_pixel(rgb.width(), rgb.height(), Luma([OPAQUE]));
            Ok(merge_alpha(&rgb, &alpha))
        }
        n => Err(Error::UnsupportedChannels(n)),
    }
}

/// Split an RGBA buffer into its color planes and its alpha plane.
#[must_use]
pub fn split_alpha(image: &RgbaImage) -> (RgbImage, GrayImage) {
    let (w, h) = image.dimensions();
    let mut color = RgbImage::new(w, h);
    let mut alpha = GrayImage::new(w, h);

    for ((src, dst), a) in image
        .pixels()
        .zip(color.pixels_mut())
        .zip(alpha.pixels_mut())
    {
        let [r, g, b, al] = src.0;
        *dst = Rgb([r, g, b]);
        *a = Luma([al]);
    }

    (color, alpha)
}

/// Recombine color planes with an alpha plane.
///
/// # Panics
///
/// Panics if `color` and `alpha` have different dimensions.
#[must_use]
pub fn merge_alpha(color: &RgbImage, alpha: &GrayImage) -> RgbaImage {
    assert_eq!(
        color.dimensions(),
        alpha.dimensions(),
        "color and alpha planes must share dimensions"
    );

    let (w, h) = color.dimensions();
    let mut out = RgbaImage::new(w, h);
    for ((dst, c), a) in out.pixels_mut().zip(color.pixels()).zip(alpha.pixels()) {
        let [r, g, b] = c.0;
        *dst = Rgba([r, g, b, a.0[0]]);
    }
    out
}
