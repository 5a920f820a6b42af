use std::io::Cursor;

use anyhow::{Context, Result};
use atelier_contracts::media::{AspectRatio, EncodedImage, UploadedImage};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

pub const PLACEHOLDER_FILL: [u8; 3] = [0x80, 0x80, 0x80];

/// Neutral gray fill that pins the output canvas to `ratio`.
pub fn placeholder_for(ratio: AspectRatio) -> Result<UploadedImage> {
    let (width, height) = ratio.placeholder_dimensions();
    let data = solid_png(width, height, PLACEHOLDER_FILL)?;
    Ok(UploadedImage::placeholder(
        data,
        width,
        height,
        format!("placeholder-{ratio}.png"),
    ))
}

pub fn solid_png(width: u32, height: u32, rgb: [u8; 3]) -> Result<EncodedImage> {
    let mut image = RgbImage::new(width.max(1), height.max(1));
    for pixel in image.pixels_mut() {
        *pixel = Rgb(rgb);
    }
    encode_png(&DynamicImage::ImageRgb8(image))
}

pub fn encode_png(image: &DynamicImage) -> Result<EncodedImage> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageFormat::Png)
        .context("png encode failed")?;
    Ok(EncodedImage::png(buf.into_inner()))
}

pub fn decode(image: &EncodedImage) -> Result<DynamicImage> {
    image::load_from_memory(&image.bytes).context("image decode failed")
}

pub fn dimensions(image: &EncodedImage) -> Option<(u32, u32)> {
    let decoded = decode(image).ok()?;
    Some((decoded.width(), decoded.height()))
}

/// Builds an upload from an encoded image, filling dimensions when decodable.
pub fn uploaded(data: EncodedImage, file_name: impl Into<String>) -> UploadedImage {
    let dims = dimensions(&data);
    let upload = UploadedImage::new(data, file_name);
    match dims {
        Some((width, height)) => upload.with_dimensions(width, height),
        None => upload,
    }
}
