//! Unsharp-mask sharpening of color planes.
//!
//! `sharpened = strength * original + (1 - strength) * blurred`
//!
//! With `strength > 1` the blurred low-frequency estimate is subtracted,
//! which raises local contrast at edges. Only color planes pass through here;
//! alpha is split off by the caller.
//!
//! The kernel comes from `image::imageops::blur` (17 taps at sigma 3.0) and
//! blended values round half away from zero, so results can differ by a
//! level or so from OpenCV's `GaussianBlur` + `addWeighted`.

use image::RgbImage;

/// Default blend weight of the original image.
pub const DEFAULT_STRENGTH: f32 = 1.5;

/// Default Gaussian sigma, in pixels, for the low-frequency estimate.
pub const DEFAULT_SIGMA: f32 = 3.0;

/// Largest accepted sigma. Beyond this the blur kernel grows without bound.
pub const MAX_SIGMA: f32 = 1000.0;

/// Whether `sigma` can be handed to the Gaussian blur.
///
/// The blur rejects zero, subnormal and non-finite values, and very large
/// values make it allocate an enormous kernel.
#[must_use]
pub fn sigma_is_usable(sigma: f32) -> bool {
    sigma.is_normal() && sigma > 0.0 && sigma <= MAX_SIGMA
}

/// Parameters of the unsharp mask.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SharpenOptions {
    /// Weight of the original image in the blend.
    pub strength: f32,
    /// Gaussian blur sigma, symmetric in both axes.
    pub sigma: f32,
}

impl Default for SharpenOptions {
    fn default() -> Self {
        Self {
            strength: DEFAULT_STRENGTH,
            sigma: DEFAULT_SIGMA,
        }
    }
}

/// Sharpen an RGB image, returning a new buffer of the same dimensions.
///
/// The kernel size is derived from `sigma` by [`image::imageops::blur`].
/// A sigma rejected by [`sigma_is_usable`] disables the blur, which makes the
/// mask an identity.
#[must_use]
pub fn unsharp_mask(image: &RgbImage, opts: &SharpenOptions) -> RgbImage {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 || !sigma_is_usable(opts.sigma) {
        return image.clone();
    }

    let blurred = image::imageops::blur(image, opts.sigma);
    let mut out = RgbImage::new(w, h);
    let row_len = w as usize * 3;

    #[cfg(feature = "cli")]
    {
        use rayon::prelude::*;
        out.par_chunks_mut(row_len)
            .zip(image.par_chunks(row_len))
            .zip(blurred.par_chunks(row_len))
            .for_each(|((dst, src), low)| blend_row(dst, src, low, opts.strength));
    }

    #[cfg(not(feature = "cli"))]
    {
        out.chunks_mut(row_len)
            .zip(image.chunks(row_len))
            .zip(blurred.chunks(row_len))
            .for_each(|((dst, src), low)| blend_row(dst, src, low, opts.strength));
    }

    out
}

fn blend_row(dst: &mut [u8], src: &[u8], low: &[u8], strength: f32) {
    let low_weight = 1.0 - strength;
    for ((d, &s), &l) in dst.iter_mut().zip(src).zip(low) {
        let value = strength * f32::from(s) + low_weight * f32::from(l);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        {
            *d = value.round().clamp(0.0, 255.0) as u8;
        }
    }
}
