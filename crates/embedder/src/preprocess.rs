//! CLIP image preprocessing: resize, center crop, per-channel normalize.

use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array4;

/// Channel means of the CLIP training distribution.
const CLIP_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];
/// Channel standard deviations of the CLIP training distribution.
const CLIP_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_11];

/// Converts a decoded image into a normalized NCHW tensor of shape
/// `(1, 3, size, size)`.
///
/// The shorter side is scaled to `size`, then a center crop of
/// `size x size` is taken, matching the CLIP reference pipeline.
pub fn preprocess(image: &DynamicImage, size: u32) -> Array4<f32> {
    let (width, height) = (image.width().max(1), image.height().max(1));
    let scale = size as f32 / width.min(height) as f32;
    let scaled_w = ((width as f32 * scale).round() as u32).max(size);
    let scaled_h = ((height as f32 * scale).round() as u32).max(size);

    let resized = image.resize_exact(scaled_w, scaled_h, FilterType::CatmullRom);
    let left = (scaled_w - size) / 2;
    let top = (scaled_h - size) / 2;
    let cropped = resized.crop_imm(left, top, size, size).to_rgb8();

    let mut tensor = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
    for (x, y, pixel) in cropped.enumerate_pixels() {
        for channel in 0..3 {
            let value = pixel.0[channel] as f32 / 255.0;
            tensor[[0, channel, y as usize, x as usize]] =
                (value - CLIP_MEAN[channel]) / CLIP_STD[channel];
        }
    }
    tensor
}
