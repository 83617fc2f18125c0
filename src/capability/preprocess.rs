//! Image normalisation shared by image capabilities.

use anyhow::{Context, Result};
use bytes::Bytes;
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use std::io::Cursor;

pub(crate) const SAMPLE_WIDTH: u32 = 320;
pub(crate) const SAMPLE_HEIGHT: u32 = 240;

/// Decode any supported image and convert it to 8-bit RGB.
pub(crate) fn to_rgb(raw: &[u8]) -> Result<RgbImage> {
    let img = image::load_from_memory(raw).context("decode image")?;
    Ok(img.to_rgb8())
}

pub(crate) fn encode_png(img: RgbImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
        .context("encode png")?;
    Ok(buf)
}

/// Decode, drop alpha/palette/greyscale, and re-encode as PNG.
pub(crate) fn normalize_to_rgb_png(raw: &[u8]) -> Result<Vec<u8>> {
    encode_png(to_rgb(raw)?)
}

/// Plain light-blue placeholder used when no sample asset is shipped.
pub(crate) fn sample_image() -> Result<Bytes> {
    let img = RgbImage::from_pixel(SAMPLE_WIDTH, SAMPLE_HEIGHT, Rgb([220, 230, 240]));
    encode_png(img).map(Bytes::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayAlphaImage, LumaA};

    #[test]
    fn sample_image_decodes_to_expected_size() {
        let png = sample_image().unwrap();
        let rgb = to_rgb(&png).unwrap();
        assert_eq!(rgb.dimensions(), (SAMPLE_WIDTH, SAMPLE_HEIGHT));
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([220, 230, 240]));
    }

    #[test]
    fn greyscale_alpha_is_normalised_to_rgb() {
        let grey = GrayAlphaImage::from_pixel(4, 4, LumaA([100, 128]));
        let mut raw = Vec::new();
        DynamicImage::ImageLumaA8(grey)
            .write_to(&mut Cursor::new(&mut raw), ImageOutputFormat::Png)
            .unwrap();

        let normalised = normalize_to_rgb_png(&raw).unwrap();
        let back = image::load_from_memory(&normalised).unwrap();
        assert!(matches!(back, DynamicImage::ImageRgb8(_)));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(normalize_to_rgb_png(b"definitely not an image").is_err());
    }
}
