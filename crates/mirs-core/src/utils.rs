//! 通用工具函数

/// 根据文件头魔数识别图像媒体类型
pub fn sniff_media_type(data: &[u8]) -> &'static str {
    if data.starts_with(b"\x89PNG") {
        "image/png"
    } else if data.starts_with(b"\xff\xd8\xff") {
        "image/jpeg"
    } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        "image/gif"
    } else if data.starts_with(b"RIFF") {
        "image/webp"
    } else {
        "application/octet-stream"
    }
}

/// 判断上传文件是否为DICOM：按扩展名或内容类型
pub fn is_dicom_upload(filename: &str, content_type: Option<&str>) -> bool {
    filename.to_ascii_lowercase().ends_with(".dcm") || content_type == Some("application/dicom")
}

/// 验证DICOM UID格式
pub fn is_valid_dicom_uid(uid: &str) -> bool {
    !uid.is_empty() && uid.len() <= 64 && uid.chars().all(|c| c.is_numeric() || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_media_type() {
        assert_eq!(sniff_media_type(b"\x89PNG\r\n\x1a\n...."), "image/png");
        assert_eq!(sniff_media_type(b"\xff\xd8\xff\xe0...."), "image/jpeg");
        assert_eq!(sniff_media_type(b"GIF89a...."), "image/gif");
        assert_eq!(sniff_media_type(b"RIFF....WEBP"), "image/webp");
        assert_eq!(sniff_media_type(b"DICM"), "application/octet-stream");
    }

    #[test]
    fn test_is_dicom_upload() {
        assert!(is_dicom_upload("scan.DCM", None));
        assert!(is_dicom_upload("scan.bin", Some("application/dicom")));
        assert!(!is_dicom_upload("photo.png", Some("image/png")));
    }

    #[test]
    fn test_is_valid_dicom_uid() {
        assert!(is_valid_dicom_uid("1.2.840.10008.5.1.4.1.1.4"));
        assert!(!is_valid_dicom_uid(""));
        assert!(!is_valid_dicom_uid("invalid.uid.with.letters"));
    }
}
