//! DICOM解析与处理
//!
//! 从上传的DICOM字节流中提取关键元数据标签，读取原始像素数据，
//! 归一化后交给编码器产出WebP图像和缩略图。

use dicom::core::value::{PrimitiveValue, Value};
use dicom::core::Tag;
use dicom::dictionary_std::tags;
use dicom::object::{from_reader, DefaultDicomObject, InMemDicomObject};
use mirs_core::{MirsError, Result};
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, warn};

use crate::encode::{encode_gray, encode_standard, EncodeOptions, EncodedPair};
use crate::pixel::{normalize_pixels, PixelBuffer, PixelDescriptor};

/// 上传处理结果：元数据 + 可选的编码图像
#[derive(Debug)]
pub struct ProcessedUpload {
    /// 关键DICOM标签的字符串映射；标准图像为空对象
    pub metadata: JsonValue,
    pub window_center: Option<f64>,
    pub window_width: Option<f64>,
    /// 像素处理失败时为None，上传仍然成功（仅存元数据）
    pub encoded: Option<EncodedPair>,
    pub format: &'static str,
}

/// 元数据提取的关键标签集合
const ESSENTIAL_TAGS: &[(Tag, &str)] = &[
    (tags::PATIENT_NAME, "PatientName"),
    (tags::PATIENT_ID, "PatientID"),
    (tags::PATIENT_BIRTH_DATE, "PatientBirthDate"),
    (tags::PATIENT_SEX, "PatientSex"),
    (tags::STUDY_DATE, "StudyDate"),
    (tags::STUDY_TIME, "StudyTime"),
    (tags::MODALITY, "Modality"),
    (tags::BODY_PART_EXAMINED, "BodyPartExamined"),
    (tags::STUDY_DESCRIPTION, "StudyDescription"),
    (tags::INSTITUTION_NAME, "InstitutionName"),
    (tags::REFERRING_PHYSICIAN_NAME, "ReferringPhysicianName"),
    (tags::SERIES_DESCRIPTION, "SeriesDescription"),
    (tags::SLICE_THICKNESS, "SliceThickness"),
    (tags::STUDY_INSTANCE_UID, "StudyInstanceUID"),
    (tags::SERIES_INSTANCE_UID, "SeriesInstanceUID"),
    (tags::SOP_INSTANCE_UID, "SOPInstanceUID"),
    (tags::WINDOW_CENTER, "WindowCenter"),
    (tags::WINDOW_WIDTH, "WindowWidth"),
];

/// 处理DICOM上传：解析、提取元数据、归一化像素并编码
pub fn process_dicom(bytes: &[u8], opts: &EncodeOptions) -> Result<ProcessedUpload> {
    let obj = read_object(bytes)?;

    let metadata = extract_metadata(&obj);
    let window_center = f64_value(&obj, tags::WINDOW_CENTER);
    let window_width = f64_value(&obj, tags::WINDOW_WIDTH);

    let encoded = match render_pixels(&obj, opts) {
        Ok(pair) => Some(pair),
        Err(e) => {
            // 像素渲染失败不阻断上传，保留元数据记录
            warn!("DICOM像素处理失败，仅保留元数据: {}", e);
            None
        }
    };

    Ok(ProcessedUpload {
        metadata: JsonValue::Object(metadata),
        window_center,
        window_width,
        encoded,
        format: "webp",
    })
}

/// 处理标准图像上传（PNG/JPEG/GIF/WebP等）
pub fn process_standard(bytes: &[u8], opts: &EncodeOptions) -> Result<ProcessedUpload> {
    let encoded = encode_standard(bytes, opts)?;
    Ok(ProcessedUpload {
        metadata: JsonValue::Object(Map::new()),
        window_center: None,
        window_width: None,
        encoded: Some(encoded),
        format: "webp",
    })
}

/// 从字节流解析DICOM对象，兼容带128字节前导的标准文件
fn read_object(bytes: &[u8]) -> Result<DefaultDicomObject> {
    let stream = if bytes.len() > 132 && &bytes[128..132] == b"DICM" {
        &bytes[128..]
    } else {
        bytes
    };

    let obj = from_reader(stream)
        .map_err(|e| MirsError::DicomParse(format!("无法解析DICOM数据: {:?}", e)))?;

    debug!("成功解析DICOM对象");
    Ok(obj)
}

/// 提取关键标签为字符串映射
fn extract_metadata(obj: &InMemDicomObject) -> Map<String, JsonValue> {
    let mut metadata = Map::new();
    for (tag, name) in ESSENTIAL_TAGS {
        if let Some(value) = string_value(obj, *tag) {
            metadata.insert((*name).to_string(), JsonValue::String(value));
        }
    }
    metadata
}

/// 读取像素描述符、归一化并编码
fn render_pixels(obj: &InMemDicomObject, opts: &EncodeOptions) -> Result<EncodedPair> {
    let desc = build_descriptor(obj)?;
    let buf = pixel_buffer(obj)?;
    let gray = normalize_pixels(&buf, &desc)?;
    encode_gray(gray, desc.columns, desc.rows, opts)
}

/// 从图像模块标签组装像素描述符
fn build_descriptor(obj: &InMemDicomObject) -> Result<PixelDescriptor> {
    let rows = int_value(obj, tags::ROWS)
        .ok_or_else(|| MirsError::DicomParse("缺少Rows标签".to_string()))?;
    let columns = int_value(obj, tags::COLUMNS)
        .ok_or_else(|| MirsError::DicomParse("缺少Columns标签".to_string()))?;
    if rows <= 0 || columns <= 0 {
        return Err(MirsError::DicomParse("图像尺寸无效".to_string()));
    }

    Ok(PixelDescriptor {
        rows: rows as u32,
        columns: columns as u32,
        samples_per_pixel: int_value(obj, tags::SAMPLES_PER_PIXEL).unwrap_or(1) as u16,
        bits_allocated: int_value(obj, tags::BITS_ALLOCATED).unwrap_or(16) as u16,
        pixel_representation: int_value(obj, tags::PIXEL_REPRESENTATION).unwrap_or(0) as u16,
        rescale_slope: f64_value(obj, tags::RESCALE_SLOPE),
        rescale_intercept: f64_value(obj, tags::RESCALE_INTERCEPT),
        window_center: f64_value(obj, tags::WINDOW_CENTER),
        window_width: f64_value(obj, tags::WINDOW_WIDTH),
    })
}

/// 提取未压缩的原始像素缓冲区
fn pixel_buffer(obj: &InMemDicomObject) -> Result<PixelBuffer> {
    let element = obj
        .element(tags::PIXEL_DATA)
        .map_err(|_| MirsError::DicomParse("缺少PixelData标签".to_string()))?;

    match element.value() {
        Value::Primitive(PrimitiveValue::U8(data)) => Ok(PixelBuffer::U8(data.to_vec())),
        Value::Primitive(PrimitiveValue::U16(data)) => Ok(PixelBuffer::U16(data.to_vec())),
        _ => Err(MirsError::DicomParse(
            "不支持压缩传输语法的像素数据".to_string(),
        )),
    }
}

/// 获取字符串类型元素的值，多值取首个
fn string_value(obj: &InMemDicomObject, tag: Tag) -> Option<String> {
    match obj.element(tag) {
        Ok(element) => match element.value() {
            Value::Primitive(PrimitiveValue::Str(s)) => Some(s.trim().to_string()),
            Value::Primitive(PrimitiveValue::Strs(strings)) => {
                strings.first().map(|s| s.trim().to_string())
            }
            Value::Primitive(p) => {
                let s = p.to_string();
                if s.is_empty() {
                    None
                } else {
                    Some(s)
                }
            }
            _ => None,
        },
        Err(_) => None,
    }
}

/// 获取整数类型元素的值
fn int_value(obj: &InMemDicomObject, tag: Tag) -> Option<i32> {
    match obj.element(tag) {
        Ok(element) => match element.value() {
            Value::Primitive(PrimitiveValue::I32(v)) => v.first().copied(),
            Value::Primitive(PrimitiveValue::U32(v)) => v.first().map(|&x| x as i32),
            Value::Primitive(PrimitiveValue::I16(v)) => v.first().map(|&x| x as i32),
            Value::Primitive(PrimitiveValue::U16(v)) => v.first().map(|&x| x as i32),
            Value::Primitive(PrimitiveValue::Str(s)) => s.trim().parse().ok(),
            Value::Primitive(PrimitiveValue::Strs(v)) => {
                v.first().and_then(|s| s.trim().parse().ok())
            }
            _ => None,
        },
        Err(_) => None,
    }
}

/// 获取浮点类型元素的值。DS(十进制字符串)按数字解析，多值取首个
fn f64_value(obj: &InMemDicomObject, tag: Tag) -> Option<f64> {
    match obj.element(tag) {
        Ok(element) => match element.value() {
            Value::Primitive(PrimitiveValue::F64(v)) => v.first().copied(),
            Value::Primitive(PrimitiveValue::F32(v)) => v.first().map(|&x| x as f64),
            Value::Primitive(PrimitiveValue::I32(v)) => v.first().map(|&x| x as f64),
            Value::Primitive(PrimitiveValue::U16(v)) => v.first().map(|&x| x as f64),
            Value::Primitive(PrimitiveValue::I16(v)) => v.first().map(|&x| x as f64),
            Value::Primitive(PrimitiveValue::Str(s)) => s.trim().parse().ok(),
            Value::Primitive(PrimitiveValue::Strs(v)) => {
                v.first().and_then(|s| s.trim().parse().ok())
            }
            _ => None,
        },
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom::core::{DataElement, VR};

    fn sample_object() -> InMemDicomObject {
        let mut obj = InMemDicomObject::new_empty();
        obj.put(DataElement::new(
            tags::MODALITY,
            VR::CS,
            PrimitiveValue::from("CT"),
        ));
        obj.put(DataElement::new(
            tags::ROWS,
            VR::US,
            PrimitiveValue::from(2_u16),
        ));
        obj.put(DataElement::new(
            tags::COLUMNS,
            VR::US,
            PrimitiveValue::from(2_u16),
        ));
        obj.put(DataElement::new(
            tags::BITS_ALLOCATED,
            VR::US,
            PrimitiveValue::from(16_u16),
        ));
        obj.put(DataElement::new(
            tags::PIXEL_REPRESENTATION,
            VR::US,
            PrimitiveValue::from(0_u16),
        ));
        obj.put(DataElement::new(
            tags::WINDOW_CENTER,
            VR::DS,
            PrimitiveValue::from("40 "),
        ));
        obj.put(DataElement::new(
            tags::WINDOW_WIDTH,
            VR::DS,
            PrimitiveValue::from("400"),
        ));
        obj.put(DataElement::new(
            tags::PIXEL_DATA,
            VR::OW,
            PrimitiveValue::U16(vec![0_u16, 100, 200, 4000].into()),
        ));
        obj
    }

    #[test]
    fn test_string_value_trims_padding() {
        let obj = sample_object();
        assert_eq!(string_value(&obj, tags::MODALITY), Some("CT".to_string()));
        assert_eq!(string_value(&obj, tags::STUDY_DATE), None);
    }

    #[test]
    fn test_f64_value_parses_decimal_strings() {
        let obj = sample_object();
        assert_eq!(f64_value(&obj, tags::WINDOW_CENTER), Some(40.0));
        assert_eq!(f64_value(&obj, tags::WINDOW_WIDTH), Some(400.0));
    }

    #[test]
    fn test_descriptor_from_tags() {
        let desc = build_descriptor(&sample_object()).unwrap();
        assert_eq!(desc.rows, 2);
        assert_eq!(desc.columns, 2);
        assert_eq!(desc.bits_allocated, 16);
        assert_eq!(desc.window_center, Some(40.0));
    }

    #[test]
    fn test_pixel_buffer_extraction() {
        let buf = pixel_buffer(&sample_object()).unwrap();
        match buf {
            PixelBuffer::U16(data) => assert_eq!(data.len(), 4),
            _ => panic!("expected 16-bit buffer"),
        }
    }

    #[test]
    fn test_render_pixels_outputs_webp() {
        let pair = render_pixels(&sample_object(), &EncodeOptions::default()).unwrap();
        assert_eq!(&pair.image[8..12], b"WEBP");
        assert_eq!(pair.width, 2);
        assert_eq!(pair.height, 2);
    }

    #[test]
    fn test_metadata_extraction_skips_missing_tags() {
        let metadata = extract_metadata(&sample_object());
        assert_eq!(metadata.get("Modality").unwrap(), "CT");
        assert!(!metadata.contains_key("PatientName"));
    }

    #[test]
    fn test_read_object_rejects_garbage() {
        assert!(read_object(b"definitely not dicom").is_err());
    }
}
