//! Re-centering of the visible subject on its original canvas.

use image::{imageops, RgbaImage};

/// Inclusive bounds of all pixels with non-zero alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    /// Leftmost visible column.
    pub x_min: u32,
    /// Rightmost visible column.
    pub x_max: u32,
    /// Topmost visible row.
    pub y_min: u32,
    /// Bottommost visible row.
    pub y_max: u32,
}

impl BoundingBox {
    /// Width of the box in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.x_max - self.x_min + 1
    }

    /// Height of the box in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.y_max - self.y_min + 1
    }
}

/// Compute the tight bounding box of the non-transparent pixels.
///
/// Returns `None` when every pixel is fully transparent.
#[must_use]
pub fn bounding_box(image: &RgbaImage) -> Option<BoundingBox> {
    let mut bounds: Option<BoundingBox> = None;

    for (x, y, px) in image.enumerate_pixels() {
        if px[3] == 0 {
            continue;
        }
        let b = bounds.get_or_insert(BoundingBox {
            x_min: x,
            x_max: x,
            y_min: y,
            y_max: y,
        });
        b.x_min = b.x_min.min(x);
        b.x_max = b.x_max.max(x);
        b.y_min = b.y_min.min(y);
        b.y_max = b.y_max.max(y);
    }

    bounds
}

/// Move the subject to the middle of a transparent canvas of the same size.
///
/// Odd leftover padding lands on the right and bottom. A fully transparent
/// image is returned unchanged.
#[must_use]
pub fn center_subject(image: RgbaImage) -> RgbaImage {
    let Some(bbox) = bounding_box(&image) else {
        return image;
    };

    let (width, height) = image.dimensions();
    let (w, h) = (bbox.width(), bbox.height());
    let offset_x = (width - w) / 2;
    let offset_y = (height - h) / 2;

    let roi = imageops::crop_imm(&image, bbox.x_min, bbox.y_min, w, h).to_image();
    let mut canvas = RgbaImage::new(width, height);
    imageops::replace(&mut canvas, &roi, i64::from(offset_x), i64::from(offset_y));

    tracing::debug!(
        from_x = bbox.x_min,
        from_y = bbox.y_min,
        to_x = offset_x,
        to_y = offset_y,
        "centered subject"
    );

    canvas
}
