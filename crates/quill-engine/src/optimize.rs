use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use quill_contracts::errors::ProviderError;
use quill_contracts::results::ThumbnailAsset;

use crate::images::GeneratedImage;

pub const PREVIEW_MAX_WIDTH: u32 = 800;
pub const PREVIEW_JPEG_QUALITY: u8 = 85;

/// Preview-sized copy of a generated image.
///
/// Wider than `max_width` -> proportional resize + JPEG. Otherwise the bytes are
/// kept as-is. Undecodable input passes through with zero dimensions.
pub fn optimize(image: &GeneratedImage, max_width: u32, jpeg_quality: u8) -> ThumbnailAsset {
    let mime_type = if image.mime_type.trim().is_empty() {
        "image/png".to_string()
    } else {
        image.mime_type.trim().to_string()
    };
    let passthrough = |width: u32, height: u32| ThumbnailAsset {
        mime_type: mime_type.clone(),
        data: image.data.clone(),
        data_original: image.data.clone(),
        width,
        height,
    };

    let Some(decoded) = decode_base64_image(&image.data) else {
        return passthrough(0, 0);
    };
    let (width, height) = decoded.dimensions();
    if width <= max_width.max(1) {
        return passthrough(width, height);
    }

    let resized = resize_to_width(&decoded, max_width.max(1));
    match encode_jpeg(&resized, jpeg_quality) {
        Ok(bytes) => ThumbnailAsset {
            mime_type: "image/jpeg".to_string(),
            data: BASE64.encode(bytes),
            data_original: image.data.clone(),
            width: resized.width(),
            height: resized.height(),
        },
        Err(_) => passthrough(width, height),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageFormat {
    WebP,
    Jpeg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageOptions {
    pub max_width: u32,
    /// JPEG only; WebP output is lossless.
    pub quality: u8,
    pub format: StorageFormat,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            max_width: 1000,
            quality: 80,
            format: StorageFormat::WebP,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub extension: &'static str,
    pub width: u32,
    pub height: u32,
}

/// Re-encodes an image for persistence. Decode failure is an error here.
pub fn optimize_for_storage(data: &str, options: StorageOptions) -> Result<StoredImage, ProviderError> {
    let bytes = BASE64
        .decode(data.trim().as_bytes())
        .map_err(|err| ProviderError::Decode(format!("thumbnail base64 decode failed: {err}")))?;
    let decoded = image::load_from_memory(&bytes)
        .map_err(|err| ProviderError::Decode(format!("thumbnail image decode failed: {err}")))?;

    let max_width = options.max_width.max(1);
    let prepared = if decoded.width() > max_width {
        resize_to_width(&decoded, max_width)
    } else {
        decoded
    };

    let (bytes, mime_type, extension) = match options.format {
        StorageFormat::WebP => {
            let mut out = Vec::new();
            let rgba = DynamicImage::ImageRgba8(prepared.to_rgba8());
            rgba.write_with_encoder(WebPEncoder::new_lossless(&mut out))
                .map_err(|err| ProviderError::Decode(format!("webp encode failed: {err}")))?;
            (out, "image/webp", "webp")
        }
        StorageFormat::Jpeg => {
            let out = encode_jpeg(&prepared, options.quality)
                .map_err(|err| ProviderError::Decode(format!("jpeg encode failed: {err}")))?;
            (out, "image/jpeg", "jpg")
        }
    };

    Ok(StoredImage {
        bytes,
        mime_type,
        extension,
        width: prepared.width(),
        height: prepared.height(),
    })
}

fn decode_base64_image(data: &str) -> Option<DynamicImage> {
    let bytes = BASE64.decode(data.trim().as_bytes()).ok()?;
    image::load_from_memory(&bytes).ok()
}

fn resize_to_width(image: &DynamicImage, max_width: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    let scaled_height = ((height as f64) * (max_width as f64) / (width as f64)).round() as u32;
    image.resize_exact(max_width, scaled_height.max(1), FilterType::Triangle)
}

/// Flattens alpha onto white, then encodes as baseline JPEG.
fn encode_jpeg(image: &DynamicImage, quality: u8) -> image::ImageResult<Vec<u8>> {
    let rgba = image.to_rgba8();
    let mut flattened = RgbaImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = u16::from(pixel[3]);
        let blend =
            |channel: u8| -> u8 { (((u16::from(channel) * alpha) + (255 * (255 - alpha))) / 255) as u8 };
        flattened.put_pixel(
            x,
            y,
            Rgba([blend(pixel[0]), blend(pixel[1]), blend(pixel[2]), 255]),
        );
    }
    let rgb = DynamicImage::ImageRgba8(flattened).to_rgb8();
    let mut bytes = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100));
    encoder.encode_image(&DynamicImage::ImageRgb8(rgb))?;
    Ok(bytes)
}
