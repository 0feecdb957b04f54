//! # MIRS影像处理模块
//!
//! 负责医学影像的解析和归一化：DICOM元数据提取、像素窗宽窗位映射、
//! 灰度归一化，以及WebP编码和缩略图生成。

pub mod dicom;
pub mod encode;
pub mod pixel;

pub use dicom::{process_dicom, process_standard, ProcessedUpload};
pub use encode::{EncodeOptions, EncodedPair};
pub use pixel::{normalize_pixels, PixelBuffer, PixelDescriptor};
