//! 图像编码与缩略图生成

use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};
use mirs_core::{MirsError, Result};
use std::io::Cursor;

/// 编码选项
#[derive(Debug, Clone)]
pub struct EncodeOptions {
    /// 全尺寸图像的最大边长，超出时等比缩小
    pub max_dimension: u32,
    /// 缩略图边界（保持纵横比）
    pub thumbnail_size: (u32, u32),
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            max_dimension: 4096,
            thumbnail_size: (200, 200),
        }
    }
}

/// 编码结果：全尺寸WebP和缩略图WebP
#[derive(Debug, Clone)]
pub struct EncodedPair {
    pub image: Vec<u8>,
    pub thumbnail: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// 将8位灰度缓冲区编码为WebP图像对
pub fn encode_gray(
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    opts: &EncodeOptions,
) -> Result<EncodedPair> {
    let gray = GrayImage::from_raw(width, height, pixels)
        .ok_or_else(|| MirsError::Imaging("灰度缓冲区与图像尺寸不匹配".to_string()))?;
    encode_dynamic(DynamicImage::ImageLuma8(gray), opts)
}

/// 解码标准格式（PNG/JPEG/GIF/WebP等）后重新编码
pub fn encode_standard(data: &[u8], opts: &EncodeOptions) -> Result<EncodedPair> {
    let img = image::load_from_memory(data)
        .map_err(|e| MirsError::Imaging(format!("图像解码失败: {}", e)))?;
    encode_dynamic(img, opts)
}

/// 通用编码路径：尺寸上限、缩略图、WebP输出
pub fn encode_dynamic(img: DynamicImage, opts: &EncodeOptions) -> Result<EncodedPair> {
    let img = if img.width().max(img.height()) > opts.max_dimension {
        img.resize(opts.max_dimension, opts.max_dimension, FilterType::Lanczos3)
    } else {
        img
    };

    // 小于边界的图像不放大，缩略图保持原尺寸
    let (tw, th) = opts.thumbnail_size;
    let thumb = if img.width() > tw || img.height() > th {
        img.resize(tw, th, FilterType::Lanczos3)
    } else {
        img.clone()
    };

    Ok(EncodedPair {
        width: img.width(),
        height: img.height(),
        image: encode_webp(&img)?,
        thumbnail: encode_webp(&thumb)?,
    })
}

/// 无损WebP编码。编码器只接受RGB8/RGBA8，灰度图先展开
fn encode_webp(img: &DynamicImage) -> Result<Vec<u8>> {
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut out = Cursor::new(Vec::new());
    rgb.write_with_encoder(WebPEncoder::new_lossless(&mut out))
        .map_err(|e| MirsError::Imaging(format!("WebP编码失败: {}", e)))?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> Vec<u8> {
        (0..width * height).map(|i| (i % 256) as u8).collect()
    }

    #[test]
    fn test_encode_gray_produces_webp_magic() {
        let pair = encode_gray(gradient(64, 64), 64, 64, &EncodeOptions::default()).unwrap();
        assert_eq!(&pair.image[..4], b"RIFF");
        assert_eq!(&pair.image[8..12], b"WEBP");
        assert_eq!(&pair.thumbnail[..4], b"RIFF");
    }

    #[test]
    fn test_thumbnail_fits_bounds_preserving_aspect() {
        let opts = EncodeOptions::default();
        let pair = encode_gray(gradient(400, 100), 400, 100, &opts).unwrap();
        let thumb = image::load_from_memory(&pair.thumbnail).unwrap();
        assert!(thumb.width() <= 200 && thumb.height() <= 200);
        // 4:1纵横比保持
        assert_eq!(thumb.width(), 200);
        assert_eq!(thumb.height(), 50);
    }

    #[test]
    fn test_small_image_thumbnail_not_upscaled() {
        let pair = encode_gray(gradient(16, 16), 16, 16, &EncodeOptions::default()).unwrap();
        let thumb = image::load_from_memory(&pair.thumbnail).unwrap();
        assert_eq!(thumb.width(), 16);
        assert_eq!(thumb.height(), 16);
    }

    #[test]
    fn test_oversized_image_capped() {
        let opts = EncodeOptions {
            max_dimension: 128,
            thumbnail_size: (32, 32),
        };
        let pair = encode_gray(gradient(512, 256), 512, 256, &opts).unwrap();
        assert_eq!(pair.width, 128);
        assert_eq!(pair.height, 64);
    }

    #[test]
    fn test_encode_standard_roundtrip() {
        // 先产出一个合法PNG作为上传样本
        let gray = GrayImage::from_raw(16, 16, gradient(16, 16)).unwrap();
        let mut png = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(gray)
            .write_to(&mut png, image::ImageFormat::Png)
            .unwrap();

        let pair = encode_standard(png.get_ref(), &EncodeOptions::default()).unwrap();
        assert_eq!(pair.width, 16);
        assert_eq!(&pair.image[8..12], b"WEBP");
    }

    #[test]
    fn test_encode_standard_rejects_garbage() {
        assert!(encode_standard(b"not an image", &EncodeOptions::default()).is_err());
    }

    #[test]
    fn test_mismatched_buffer_rejected() {
        assert!(encode_gray(vec![0u8; 10], 64, 64, &EncodeOptions::default()).is_err());
    }
}
