use burn::prelude::*;
use burn::tensor::TensorData;
use image::imageops::{self, FilterType};
use image::DynamicImage;

/// Convert an image to a normalized grayscale plane of `width x height`.
///
/// Pixels are scaled to [0, 1] and then mapped to [-1, 1] with
/// `(x - 0.5) / 0.5`. The result is row-major.
pub fn resize_normalize(image: &DynamicImage, width: u32, height: u32) -> Vec<f32> {
    let gray = image.to_luma8();
    let resized = imageops::resize(&gray, width, height, FilterType::Triangle);
    resized
        .pixels()
        .map(|p| (p.0[0] as f32 / 255.0 - 0.5) / 0.5)
        .collect()
}

/// Encode a single image as a tensor of shape [1, 1, height, width].
pub fn image_to_tensor<B: Backend>(
    image: &DynamicImage,
    width: u32,
    height: u32,
    device: &B::Device,
) -> Tensor<B, 4> {
    let data = resize_normalize(image, width, height);
    Tensor::<B, 1>::from_data(TensorData::from(data.as_slice()), device).reshape([
        1,
        1,
        height as usize,
        width as usize,
    ])
}
