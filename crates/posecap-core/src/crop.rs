//! Square normalization: deterministic, face-centered square crops.
//!
//! Cropping is a best-effort enhancement. Whenever the requested square
//! cannot be produced (degenerate box, empty source, square larger than the
//! source) the original image is returned unchanged rather than failing the
//! capture.

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType, GenericImageView, ImageEncoder};

use crate::types::BoundingBox;

/// Default padding factor: the square is 50% larger than the face box.
pub const DEFAULT_PADDING: f32 = 0.5;

/// JPEG quality for stored stills (the capture flow's 0.9).
const JPEG_QUALITY: u8 = 90;

/// Crop `image` to a square centered on the face `bbox`, padded by
/// `padding` and clamped to the source bounds.
///
/// The result is `squareSize x squareSize` with
/// `squareSize = round(max(w, h) * (1 + padding))`. Degenerate inputs return
/// the original image unchanged.
pub fn crop_to_square(image: &DynamicImage, bbox: &BoundingBox, padding: f32) -> DynamicImage {
    let (img_w, img_h) = image.dimensions();
    if img_w == 0 || img_h == 0 {
        return image.clone();
    }

    let face_size = bbox.width.max(bbox.height);
    let square_size = (face_size * (1.0 + padding)).round();
    if square_size <= 0.0 {
        return image.clone();
    }
    // The requested square does not fit inside the source at all.
    if square_size > img_w as f32 || square_size > img_h as f32 {
        tracing::debug!(square_size, img_w, img_h, "square exceeds source; skipping crop");
        return image.clone();
    }

    let center = bbox.center();
    let crop_x = (center.x - square_size / 2.0)
        .min(img_w as f32 - square_size)
        .max(0.0);
    let crop_y = (center.y - square_size / 2.0)
        .min(img_h as f32 - square_size)
        .max(0.0);

    let side = square_size as u32;
    image.crop_imm(crop_x as u32, crop_y as u32, side, side)
}

/// Encode an image as JPEG bytes at the capture quality.
pub fn encode_jpeg(image: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let rgb = image.to_rgb8();
    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
    encoder.write_image(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)?;
    Ok(out)
}
