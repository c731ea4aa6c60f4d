//! Image bytes -> model input batch

use image::imageops::FilterType;
use ndarray::Array4;
use serde::Deserialize;

use super::ClassifyError;

/// Memory layout of the model's image input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputLayout {
    /// `[batch, height, width, channels]` (Keras/TensorFlow exports)
    #[default]
    Nhwc,
    /// `[batch, channels, height, width]` (PyTorch exports)
    Nchw,
}

/// Decode an image and build a single-item batch for the classifier.
///
/// The image is converted to RGB, resized to `size`x`size` with Catmull-Rom
/// (bicubic) resampling and scaled from [0,255] to [0,1].
pub fn prepare_batch(
    bytes: &[u8],
    size: u32,
    layout: InputLayout,
) -> Result<Array4<f32>, ClassifyError> {
    let decoded = image::load_from_memory(bytes)?;
    let rgb = decoded.to_rgb8();
    let resized = image::imageops::resize(&rgb, size, size, FilterType::CatmullRom);

    let side = size as usize;
    let scale = |x: usize, y: usize, c: usize| -> f32 {
        f32::from(resized.get_pixel(x as u32, y as u32)[c]) / 255.0
    };

    let batch = match layout {
        InputLayout::Nhwc => Array4::from_shape_fn((1, side, side, 3), |(_, y, x, c)| scale(x, y, c)),
        InputLayout::Nchw => Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| scale(x, y, c)),
    };

    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgb, RgbImage};
    use std::io::Cursor;

    fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_nhwc_shape_and_scale() {
        let img = RgbImage::from_pixel(40, 30, Rgb([255, 0, 51]));
        let bytes = encode(DynamicImage::ImageRgb8(img), ImageFormat::Png);

        let batch = prepare_batch(&bytes, 224, InputLayout::Nhwc).unwrap();
        assert_eq!(batch.shape(), &[1, 224, 224, 3]);
        assert_relative_eq!(batch[[0, 10, 20, 0]], 1.0);
        assert_relative_eq!(batch[[0, 10, 20, 1]], 0.0);
        assert_relative_eq!(batch[[0, 10, 20, 2]], 0.2);
    }

    #[test]
    fn test_nchw_shape() {
        let img = RgbImage::from_pixel(8, 8, Rgb([0, 255, 0]));
        let bytes = encode(DynamicImage::ImageRgb8(img), ImageFormat::Png);

        let batch = prepare_batch(&bytes, 16, InputLayout::Nchw).unwrap();
        assert_eq!(batch.shape(), &[1, 3, 16, 16]);
        assert_relative_eq!(batch[[0, 1, 5, 5]], 1.0);
        assert_relative_eq!(batch[[0, 0, 5, 5]], 0.0);
    }

    #[test]
    fn test_grayscale_expands_to_three_channels() {
        let img = GrayImage::from_pixel(500, 20, Luma([255]));
        let bytes = encode(DynamicImage::ImageLuma8(img), ImageFormat::Png);

        let batch = prepare_batch(&bytes, 32, InputLayout::Nhwc).unwrap();
        assert_eq!(batch.shape(), &[1, 32, 32, 3]);
        assert!(batch.iter().all(|&v| (v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_values_stay_in_unit_range() {
        let img = RgbImage::from_fn(64, 64, |x, y| {
            if (x + y) % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        });
        let bytes = encode(DynamicImage::ImageRgb8(img), ImageFormat::Png);

        let batch = prepare_batch(&bytes, 224, InputLayout::Nhwc).unwrap();
        assert!(batch.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let result = prepare_batch(b"definitely not an image", 224, InputLayout::Nhwc);
        assert!(matches!(result, Err(ClassifyError::Decode(_))));
    }
}
