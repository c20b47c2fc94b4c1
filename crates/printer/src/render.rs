//! Rasterizing an image onto a page.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};

use crate::PageBounds;

/// Stretches `image` to fill the page area.
///
/// Aspect ratio is not preserved; the image covers the full page bounds.
pub fn render_to_page(image: &DynamicImage, page: PageBounds) -> DynamicImage {
    let (width, height) = page.pixel_size();
    if image.width() == width && image.height() == height {
        return image.clone();
    }
    image.resize_exact(width, height, FilterType::Triangle)
}

/// Encodes an image as PNG.
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    image.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}
