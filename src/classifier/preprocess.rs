use image::imageops::{self, FilterType};
use image::RgbImage;

use super::artifact::InputShape;
use super::CropAndScale;

const FILTER: FilterType = FilterType::Triangle;

/// Fits `image` to the model input shape. Returns `None` for an empty image.
pub fn prepare(image: &RgbImage, mode: CropAndScale, shape: InputShape) -> Option<RgbImage> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 || shape.width == 0 || shape.height == 0 {
        return None;
    }

    let prepared = match mode {
        CropAndScale::CenterCrop => center_crop(image, shape),
        CropAndScale::ScaleFit => scale_fit(image, shape),
        CropAndScale::ScaleFill => imageops::resize(image, shape.width, shape.height, FILTER),
    };
    Some(prepared)
}

/// Largest centered region with the input's aspect ratio, scaled to the input.
fn center_crop(image: &RgbImage, shape: InputShape) -> RgbImage {
    let (x, y, crop_width, crop_height) = center_crop_region(image.dimensions(), shape);
    let cropped = imageops::crop_imm(image, x, y, crop_width, crop_height).to_image();
    imageops::resize(&cropped, shape.width, shape.height, FILTER)
}

fn center_crop_region((width, height): (u32, u32), shape: InputShape) -> (u32, u32, u32, u32) {
    let (w, h) = (width as u64, height as u64);
    let (tw, th) = (shape.width as u64, shape.height as u64);

    let (crop_width, crop_height) = if w * th > h * tw {
        // Wider than the input: trim the sides.
        (((h * tw) / th).clamp(1, w), h)
    } else {
        (w, ((w * th) / tw).clamp(1, h))
    };

    (
        ((w - crop_width) / 2) as u32,
        ((h - crop_height) / 2) as u32,
        crop_width as u32,
        crop_height as u32,
    )
}

fn scale_fit(image: &RgbImage, shape: InputShape) -> RgbImage {
    let (width, height) = image.dimensions();
    let scale = f64::min(
        shape.width as f64 / width as f64,
        shape.height as f64 / height as f64,
    );
    let fit_width = ((width as f64 * scale).round() as u32).clamp(1, shape.width);
    let fit_height = ((height as f64 * scale).round() as u32).clamp(1, shape.height);

    let resized = imageops::resize(image, fit_width, fit_height, FILTER);
    let mut canvas = RgbImage::new(shape.width, shape.height);
    imageops::overlay(
        &mut canvas,
        &resized,
        ((shape.width - fit_width) / 2) as i64,
        ((shape.height - fit_height) / 2) as i64,
    );
    canvas
}
