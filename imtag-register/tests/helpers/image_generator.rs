//! Test image generation

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::Path;

/// Encode a solid-colour PNG; distinct `(width, height, shade)` give distinct content
pub fn encode_png(width: u32, height: u32, shade: u8) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([shade, shade, shade]));
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

/// Write a generated PNG under `dir`, returning its bytes
pub fn write_png(dir: &Path, name: &str, width: u32, height: u32, shade: u8) -> Vec<u8> {
    let png = encode_png(width, height, shade);
    std::fs::write(dir.join(name), &png).unwrap();
    png
}
