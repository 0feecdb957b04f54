//! 像素归一化
//!
//! 将DICOM原始像素数据映射为8位灰度：可选的RGB塌缩、Modality LUT
//! （rescale斜率/截距）、窗宽窗位裁剪，最后做min-max归一化。

use mirs_core::{MirsError, Result};

/// Rec.601亮度权重，用于RGB转灰度
const LUMA_WEIGHTS: [f64; 3] = [0.299, 0.587, 0.114];

/// 像素数据描述符，来自DICOM图像模块标签
#[derive(Debug, Clone)]
pub struct PixelDescriptor {
    pub rows: u32,
    pub columns: u32,
    pub samples_per_pixel: u16,
    pub bits_allocated: u16,
    /// 0 = 无符号, 1 = 二进制补码有符号
    pub pixel_representation: u16,
    pub rescale_slope: Option<f64>,
    pub rescale_intercept: Option<f64>,
    pub window_center: Option<f64>,
    pub window_width: Option<f64>,
}

impl PixelDescriptor {
    /// 单帧的采样点数
    pub fn frame_samples(&self) -> usize {
        self.rows as usize * self.columns as usize * self.samples_per_pixel.max(1) as usize
    }
}

/// 原始像素缓冲区。未压缩的PixelData元素以OB(8位)或OW(16位)编码
#[derive(Debug, Clone)]
pub enum PixelBuffer {
    U8(Vec<u8>),
    U16(Vec<u16>),
}

impl PixelBuffer {
    pub fn sample_count(&self, bits_allocated: u16) -> usize {
        match self {
            // OB缓冲区装16位数据时，两字节为一个采样
            PixelBuffer::U8(data) if bits_allocated == 16 => data.len() / 2,
            PixelBuffer::U8(data) => data.len(),
            PixelBuffer::U16(data) => data.len(),
        }
    }
}

/// 将原始像素归一化为8位灰度，返回 rows*columns 长度的缓冲区。
///
/// 多帧数据只取第一帧。恒定图像（min == max）映射为中灰128。
pub fn normalize_pixels(buf: &PixelBuffer, desc: &PixelDescriptor) -> Result<Vec<u8>> {
    let frame = desc.frame_samples();
    if frame == 0 {
        return Err(MirsError::Imaging("图像尺寸为零".to_string()));
    }
    if buf.sample_count(desc.bits_allocated) < frame {
        return Err(MirsError::Imaging(format!(
            "像素数据不足: 需要{}个采样, 实际{}个",
            frame,
            buf.sample_count(desc.bits_allocated)
        )));
    }

    let mut samples = decode_samples(buf, desc, frame)?;

    if desc.samples_per_pixel == 3 {
        samples = collapse_rgb(&samples);
    }

    // Modality LUT: 存储值 -> 输出单位（如CT的HU值）
    let slope = desc.rescale_slope.unwrap_or(1.0);
    let intercept = desc.rescale_intercept.unwrap_or(0.0);
    if slope != 1.0 || intercept != 0.0 {
        for v in &mut samples {
            *v = *v * slope + intercept;
        }
    }

    // 窗宽窗位裁剪
    if let (Some(center), Some(width)) = (desc.window_center, desc.window_width) {
        if width > 0.0 {
            let lo = center - width / 2.0;
            let hi = center + width / 2.0;
            for v in &mut samples {
                *v = v.clamp(lo, hi);
            }
        }
    }

    Ok(rescale_to_u8(&samples))
}

/// 按位深和符号位解码为浮点采样，只取第一帧
fn decode_samples(buf: &PixelBuffer, desc: &PixelDescriptor, frame: usize) -> Result<Vec<f64>> {
    let signed = desc.pixel_representation == 1;

    let samples = match (buf, desc.bits_allocated) {
        (PixelBuffer::U16(data), 16) => data[..frame]
            .iter()
            .map(|&v| if signed { v as i16 as f64 } else { v as f64 })
            .collect(),
        (PixelBuffer::U8(data), 16) => data[..frame * 2]
            .chunks_exact(2)
            .map(|pair| {
                let v = u16::from_le_bytes([pair[0], pair[1]]);
                if signed {
                    v as i16 as f64
                } else {
                    v as f64
                }
            })
            .collect(),
        (PixelBuffer::U8(data), 8) => data[..frame]
            .iter()
            .map(|&v| if signed { v as i8 as f64 } else { v as f64 })
            .collect(),
        (_, bits) => {
            return Err(MirsError::Imaging(format!("不支持的位深: {}", bits)));
        }
    };

    Ok(samples)
}

/// RGB交错采样塌缩为灰度
fn collapse_rgb(samples: &[f64]) -> Vec<f64> {
    samples
        .chunks_exact(3)
        .map(|px| px[0] * LUMA_WEIGHTS[0] + px[1] * LUMA_WEIGHTS[1] + px[2] * LUMA_WEIGHTS[2])
        .collect()
}

/// min-max归一化到0..=255
fn rescale_to_u8(samples: &[f64]) -> Vec<u8> {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for &v in samples {
        if v < min {
            min = v;
        }
        if v > max {
            max = v;
        }
    }

    if max <= min {
        return vec![128u8; samples.len()];
    }

    let range = max - min;
    samples
        .iter()
        .map(|&v| ((v - min) / range * 255.0).round() as u8)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(rows: u32, cols: u32) -> PixelDescriptor {
        PixelDescriptor {
            rows,
            columns: cols,
            samples_per_pixel: 1,
            bits_allocated: 16,
            pixel_representation: 0,
            rescale_slope: None,
            rescale_intercept: None,
            window_center: None,
            window_width: None,
        }
    }

    #[test]
    fn test_minmax_rescale_spans_full_range() {
        let buf = PixelBuffer::U16(vec![0, 50, 100, 200]);
        let out = normalize_pixels(&buf, &desc(2, 2)).unwrap();
        assert_eq!(out[0], 0);
        assert_eq!(out[3], 255);
        assert!(out[1] < out[2]);
    }

    #[test]
    fn test_constant_image_maps_to_midgray() {
        let buf = PixelBuffer::U16(vec![777; 4]);
        let out = normalize_pixels(&buf, &desc(2, 2)).unwrap();
        assert_eq!(out, vec![128; 4]);
    }

    #[test]
    fn test_windowing_clips_before_rescale() {
        // 窗位100/窗宽100 => 裁剪到[50, 150]，窗外值贴边
        let mut d = desc(2, 2);
        d.window_center = Some(100.0);
        d.window_width = Some(100.0);
        let buf = PixelBuffer::U16(vec![0, 50, 150, 4000]);
        let out = normalize_pixels(&buf, &d).unwrap();
        assert_eq!(out[0], 0); // 裁剪到50 => min
        assert_eq!(out[1], 0);
        assert_eq!(out[2], 255); // 裁剪到150 => max
        assert_eq!(out[3], 255);
    }

    #[test]
    fn test_signed_pixels_interpreted_as_twos_complement() {
        let mut d = desc(1, 2);
        d.pixel_representation = 1;
        // -1 (0xFFFF) 应小于 1，而非被当作65535
        let buf = PixelBuffer::U16(vec![0xFFFF, 1]);
        let out = normalize_pixels(&buf, &d).unwrap();
        assert_eq!(out[0], 0);
        assert_eq!(out[1], 255);
    }

    #[test]
    fn test_rescale_slope_intercept_applied() {
        // CT典型：slope 1, intercept -1024后再开窗
        let mut d = desc(1, 2);
        d.rescale_slope = Some(1.0);
        d.rescale_intercept = Some(-1024.0);
        d.window_center = Some(0.0);
        d.window_width = Some(100.0);
        let buf = PixelBuffer::U16(vec![1024, 2048]); // HU: 0, 1024
        let out = normalize_pixels(&buf, &d).unwrap();
        assert_eq!(out[0], 0);
        assert_eq!(out[1], 255);
    }

    #[test]
    fn test_rgb_collapses_with_luma_weights() {
        let mut d = desc(1, 2);
        d.samples_per_pixel = 3;
        d.bits_allocated = 8;
        // 纯绿(0.587)应亮于纯蓝(0.114)
        let buf = PixelBuffer::U8(vec![0, 255, 0, 0, 0, 255]);
        let out = normalize_pixels(&buf, &d).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out[0] > out[1]);
    }

    #[test]
    fn test_sixteen_bit_in_byte_buffer_reassembled() {
        // OB编码的16位数据：小端双字节
        let mut d = desc(1, 2);
        let buf = PixelBuffer::U8(vec![0x00, 0x00, 0xFF, 0x0F]); // 0, 4095
        let out = normalize_pixels(&buf, &d).unwrap();
        assert_eq!(out, vec![0, 255]);
    }

    #[test]
    fn test_short_buffer_rejected() {
        let buf = PixelBuffer::U16(vec![1, 2]);
        assert!(normalize_pixels(&buf, &desc(2, 2)).is_err());
    }

    #[test]
    fn test_multiframe_takes_first_frame() {
        let buf = PixelBuffer::U16(vec![0, 100, 200, 300, 9000, 9000, 9000, 9000]);
        let out = normalize_pixels(&buf, &desc(2, 2)).unwrap();
        assert_eq!(out.len(), 4);
        assert_eq!(out[0], 0);
        assert_eq!(out[3], 255);
    }
}
