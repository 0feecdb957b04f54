//! 核心数据模型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 用户角色
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// 管理员 - 完全访问权限
    Admin,
    /// 放射科医生 - 诊断和查看权限
    Radiologist,
    /// 技师 - 上传和基础查看权限
    Technician,
    /// 只读用户 - 仅查看权限
    Viewer,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Radiologist => "radiologist",
            UserRole::Technician => "technician",
            UserRole::Viewer => "viewer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(UserRole::Admin),
            "radiologist" => Some(UserRole::Radiologist),
            "technician" => Some(UserRole::Technician),
            "viewer" => Some(UserRole::Viewer),
            _ => None,
        }
    }
}

/// 用户信息（不包含密码哈希）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub role: UserRole,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// 患者档案
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub patient_id: String, // 医院内部患者ID
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: String,
    pub gender: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: String,
    pub medical_record_number: String,
    pub primary_physician: String,
    pub allergies: Vec<String>,
    pub medications: Vec<String>,
    pub medical_history: Vec<String>,
    pub insurance_provider: String,
    pub insurance_policy_number: String,
    pub insurance_group_number: Option<String>,
    pub consent_given: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Uuid,
    pub last_accessed: Option<DateTime<Utc>>,
}

/// 患者创建/更新载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientDraft {
    pub patient_id: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: String,
    pub gender: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: String,
    pub medical_record_number: String,
    pub primary_physician: String,
    #[serde(default)]
    pub allergies: Vec<String>,
    #[serde(default)]
    pub medications: Vec<String>,
    #[serde(default)]
    pub medical_history: Vec<String>,
    pub insurance_provider: String,
    pub insurance_policy_number: String,
    pub insurance_group_number: Option<String>,
    #[serde(default)]
    pub consent_given: bool,
}

/// 医学影像记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicalImage {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub study_id: String,
    pub series_id: String,
    pub instance_id: String,
    pub modality: String, // CT, MR, DR等
    pub body_part: String,
    pub study_date: String,
    pub study_time: String,
    pub institution_name: String,
    pub referring_physician: String,
    pub dicom_metadata: serde_json::Value,
    pub original_filename: String,
    pub file_size: i64,
    pub file_sha256: String,
    pub image_format: String,
    pub window_center: Option<f64>,
    pub window_width: Option<f64>,
    pub uploaded_at: DateTime<Utc>,
    pub uploaded_by: Uuid,
}

/// 影像列表摘要（不含二进制数据）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicalImageSummary {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub study_id: String,
    pub modality: String,
    pub body_part: String,
    pub study_date: String,
    pub original_filename: String,
    pub uploaded_at: DateTime<Utc>,
}

/// 医学设备
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: Uuid,
    pub name: String,
    pub model: String,
    pub manufacturer: String,
    pub device_type: String, // CT, MRI, X-Ray, Ultrasound等
    pub serial_number: Option<String>,
    pub installation_date: Option<String>,
    pub last_calibration: Option<String>,
    pub status: String, // active, maintenance, inactive
    pub location: String,
    pub specifications: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 设备创建载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceDraft {
    pub name: String,
    pub model: String,
    pub manufacturer: String,
    pub device_type: String,
    pub serial_number: Option<String>,
    pub installation_date: Option<String>,
    pub last_calibration: Option<String>,
    #[serde(default = "default_device_status")]
    pub status: String,
    pub location: String,
    #[serde(default = "empty_object")]
    pub specifications: serde_json::Value,
}

fn default_device_status() -> String {
    "active".to_string()
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// 检查记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Examination {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub examination_type: String, // CT Scan, MRI, X-Ray等
    pub examination_date: String,
    pub examination_time: String,
    pub device_id: Uuid,
    pub device_name: String, // 冗余存储，便于快速展示
    pub referring_physician: String,
    pub performing_physician: String,
    pub body_part_examined: String,
    pub clinical_indication: String,
    pub examination_protocol: String,
    pub contrast_agent: Option<String>,
    pub contrast_amount: Option<String>,
    pub patient_position: Option<String>,
    pub radiation_dose: Option<String>,
    pub image_count: i32,
    pub status: String,   // pending, in_progress, completed, reported, archived
    pub priority: String, // urgent, high, normal, low
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Uuid,
}

/// 检查创建载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExaminationDraft {
    pub patient_id: Uuid,
    pub examination_type: String,
    pub examination_date: String,
    pub examination_time: String,
    pub device_id: Uuid,
    pub referring_physician: String,
    pub performing_physician: String,
    pub body_part_examined: String,
    pub clinical_indication: String,
    pub examination_protocol: String,
    pub contrast_agent: Option<String>,
    pub contrast_amount: Option<String>,
    pub patient_position: Option<String>,
    pub radiation_dose: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: String,
}

fn default_priority() -> String {
    "normal".to_string()
}

/// 检查详情视图：附带设备信息和影像/报告计数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExaminationDetails {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub examination_type: String,
    pub examination_date: String,
    pub examination_time: String,
    pub device_id: Uuid,
    pub device_name: String,
    pub device_model: String,
    pub device_manufacturer: String,
    pub device_type: String,
    pub device_location: String,
    pub referring_physician: String,
    pub performing_physician: String,
    pub body_part_examined: String,
    pub clinical_indication: String,
    pub examination_protocol: String,
    pub contrast_agent: Option<String>,
    pub image_count: i64,
    pub status: String,
    pub priority: String,
    pub created_at: DateTime<Utc>,
    pub has_reports: bool,
    pub report_count: i64,
}

/// 检查报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExaminationReport {
    pub id: Uuid,
    pub examination_id: Uuid,
    pub report_type: String,   // preliminary, final, addendum
    pub report_status: String, // draft, pending, approved, signed
    pub findings: String,
    pub impression: String,
    pub recommendations: String,
    pub report_date: String,
    pub report_time: String,
    pub reporting_physician: String,
    pub dictated_by: Option<String>,
    pub transcribed_by: Option<String>,
    pub technical_quality: String, // excellent, good, adequate, poor
    pub limitations: Option<String>,
    pub comparison_studies: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Uuid,
}

/// 报告创建载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportDraft {
    #[serde(default = "default_report_type")]
    pub report_type: String,
    pub findings: String,
    pub impression: String,
    pub recommendations: String,
    pub report_date: String,
    pub report_time: String,
    pub reporting_physician: String,
    pub dictated_by: Option<String>,
    pub transcribed_by: Option<String>,
    #[serde(default = "default_technical_quality")]
    pub technical_quality: String,
    pub limitations: Option<String>,
    pub comparison_studies: Option<String>,
}

fn default_report_type() -> String {
    "final".to_string()
}

fn default_technical_quality() -> String {
    "adequate".to_string()
}

/// 审计日志条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub action: String,        // create_patient, upload_image等
    pub resource_type: String, // patient, image, examination...
    pub resource_id: String,
    pub user_id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_roundtrip() {
        for role in [
            UserRole::Admin,
            UserRole::Radiologist,
            UserRole::Technician,
            UserRole::Viewer,
        ] {
            assert_eq!(UserRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(UserRole::parse("superuser"), None);
    }

    #[test]
    fn test_patient_draft_defaults() {
        let draft: PatientDraft = serde_json::from_value(serde_json::json!({
            "patient_id": "PAT001",
            "first_name": "John",
            "last_name": "Doe",
            "date_of_birth": "1980-01-01",
            "gender": "M",
            "phone": "555-0100",
            "address": "1 Main St",
            "medical_record_number": "MRN001",
            "primary_physician": "Dr. Smith",
            "insurance_provider": "Acme Health",
            "insurance_policy_number": "POL-1"
        }))
        .unwrap();

        assert!(draft.allergies.is_empty());
        assert!(!draft.consent_given);
        assert!(draft.email.is_none());
    }

    #[test]
    fn test_report_draft_defaults() {
        let draft: ReportDraft = serde_json::from_value(serde_json::json!({
            "findings": "unremarkable",
            "impression": "normal study",
            "recommendations": "none",
            "report_date": "2024-06-01",
            "report_time": "09:30",
            "reporting_physician": "Dr. Jones"
        }))
        .unwrap();

        assert_eq!(draft.report_type, "final");
        assert_eq!(draft.technical_quality, "adequate");
    }
}
