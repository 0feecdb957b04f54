//! 数据库模型

use chrono::{DateTime, Utc};
use mirs_core::models::*;
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

// 数据库表模型 - 使用FromRow trait用于SQL查询。
// 列表字段（过敏史、用药史等）和DICOM元数据以JSON文本列存储，
// 读取时反序列化，损坏的JSON退化为空值而不是报错。

fn parse_string_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn parse_json_object(raw: &str) -> JsonValue {
    serde_json::from_str(raw).unwrap_or_else(|_| JsonValue::Object(serde_json::Map::new()))
}

/// 数据库用户表（包含密码哈希，不对外序列化）
#[derive(Debug, FromRow)]
pub struct DbUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub role: String,
    pub hashed_password: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<DbUser> for User {
    fn from(db_user: DbUser) -> Self {
        User {
            id: db_user.id,
            username: db_user.username,
            email: db_user.email,
            full_name: db_user.full_name,
            role: UserRole::parse(&db_user.role).unwrap_or(UserRole::Viewer),
            is_active: db_user.is_active,
            created_at: db_user.created_at,
            last_login: db_user.last_login,
        }
    }
}

/// 新用户插入模型
#[derive(Debug)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub role: UserRole,
    pub hashed_password: String,
}

/// 数据库患者表
#[derive(Debug, FromRow)]
pub struct DbPatient {
    pub id: Uuid,
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
    pub allergies: String,
    pub medications: String,
    pub medical_history: String,
    pub insurance_provider: String,
    pub insurance_policy_number: String,
    pub insurance_group_number: Option<String>,
    pub consent_given: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Uuid,
    pub last_accessed: Option<DateTime<Utc>>,
}

impl From<DbPatient> for Patient {
    fn from(db_patient: DbPatient) -> Self {
        Patient {
            id: db_patient.id,
            patient_id: db_patient.patient_id,
            first_name: db_patient.first_name,
            last_name: db_patient.last_name,
            date_of_birth: db_patient.date_of_birth,
            gender: db_patient.gender,
            phone: db_patient.phone,
            email: db_patient.email,
            address: db_patient.address,
            medical_record_number: db_patient.medical_record_number,
            primary_physician: db_patient.primary_physician,
            allergies: parse_string_list(&db_patient.allergies),
            medications: parse_string_list(&db_patient.medications),
            medical_history: parse_string_list(&db_patient.medical_history),
            insurance_provider: db_patient.insurance_provider,
            insurance_policy_number: db_patient.insurance_policy_number,
            insurance_group_number: db_patient.insurance_group_number,
            consent_given: db_patient.consent_given,
            created_at: db_patient.created_at,
            updated_at: db_patient.updated_at,
            created_by: db_patient.created_by,
            last_accessed: db_patient.last_accessed,
        }
    }
}

/// 数据库影像表（元数据部分，不含base64二进制列）
#[derive(Debug, FromRow)]
pub struct DbMedicalImage {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub study_id: String,
    pub series_id: String,
    pub instance_id: String,
    pub modality: String,
    pub body_part: String,
    pub study_date: String,
    pub study_time: String,
    pub institution_name: String,
    pub referring_physician: String,
    pub dicom_metadata: String,
    pub original_filename: String,
    pub file_size: i64,
    pub file_sha256: String,
    pub image_format: String,
    pub window_center: Option<f64>,
    pub window_width: Option<f64>,
    pub uploaded_at: DateTime<Utc>,
    pub uploaded_by: Uuid,
}

impl From<DbMedicalImage> for MedicalImage {
    fn from(db_image: DbMedicalImage) -> Self {
        MedicalImage {
            id: db_image.id,
            patient_id: db_image.patient_id,
            study_id: db_image.study_id,
            series_id: db_image.series_id,
            instance_id: db_image.instance_id,
            modality: db_image.modality,
            body_part: db_image.body_part,
            study_date: db_image.study_date,
            study_time: db_image.study_time,
            institution_name: db_image.institution_name,
            referring_physician: db_image.referring_physician,
            dicom_metadata: parse_json_object(&db_image.dicom_metadata),
            original_filename: db_image.original_filename,
            file_size: db_image.file_size,
            file_sha256: db_image.file_sha256,
            image_format: db_image.image_format,
            window_center: db_image.window_center,
            window_width: db_image.window_width,
            uploaded_at: db_image.uploaded_at,
            uploaded_by: db_image.uploaded_by,
        }
    }
}

/// 影像列表查询行
#[derive(Debug, FromRow)]
pub struct DbMedicalImageSummary {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub study_id: String,
    pub modality: String,
    pub body_part: String,
    pub study_date: String,
    pub original_filename: String,
    pub uploaded_at: DateTime<Utc>,
}

impl From<DbMedicalImageSummary> for MedicalImageSummary {
    fn from(row: DbMedicalImageSummary) -> Self {
        MedicalImageSummary {
            id: row.id,
            patient_id: row.patient_id,
            study_id: row.study_id,
            modality: row.modality,
            body_part: row.body_part,
            study_date: row.study_date,
            original_filename: row.original_filename,
            uploaded_at: row.uploaded_at,
        }
    }
}

/// 数据库设备表
#[derive(Debug, FromRow)]
pub struct DbDevice {
    pub id: Uuid,
    pub name: String,
    pub model: String,
    pub manufacturer: String,
    pub device_type: String,
    pub serial_number: Option<String>,
    pub installation_date: Option<String>,
    pub last_calibration: Option<String>,
    pub status: String,
    pub location: String,
    pub specifications: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbDevice> for Device {
    fn from(db_device: DbDevice) -> Self {
        Device {
            id: db_device.id,
            name: db_device.name,
            model: db_device.model,
            manufacturer: db_device.manufacturer,
            device_type: db_device.device_type,
            serial_number: db_device.serial_number,
            installation_date: db_device.installation_date,
            last_calibration: db_device.last_calibration,
            status: db_device.status,
            location: db_device.location,
            specifications: parse_json_object(&db_device.specifications),
            created_at: db_device.created_at,
            updated_at: db_device.updated_at,
        }
    }
}

/// 数据库检查表
#[derive(Debug, FromRow)]
pub struct DbExamination {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub examination_type: String,
    pub examination_date: String,
    pub examination_time: String,
    pub device_id: Uuid,
    pub device_name: String,
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
    pub status: String,
    pub priority: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Uuid,
}

impl From<DbExamination> for Examination {
    fn from(db_exam: DbExamination) -> Self {
        Examination {
            id: db_exam.id,
            patient_id: db_exam.patient_id,
            examination_type: db_exam.examination_type,
            examination_date: db_exam.examination_date,
            examination_time: db_exam.examination_time,
            device_id: db_exam.device_id,
            device_name: db_exam.device_name,
            referring_physician: db_exam.referring_physician,
            performing_physician: db_exam.performing_physician,
            body_part_examined: db_exam.body_part_examined,
            clinical_indication: db_exam.clinical_indication,
            examination_protocol: db_exam.examination_protocol,
            contrast_agent: db_exam.contrast_agent,
            contrast_amount: db_exam.contrast_amount,
            patient_position: db_exam.patient_position,
            radiation_dose: db_exam.radiation_dose,
            image_count: db_exam.image_count,
            status: db_exam.status,
            priority: db_exam.priority,
            created_at: db_exam.created_at,
            updated_at: db_exam.updated_at,
            created_by: db_exam.created_by,
        }
    }
}

/// 检查详情查询行：检查表与设备表联查，附带影像/报告计数
#[derive(Debug, FromRow)]
pub struct DbExaminationDetails {
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
    pub report_count: i64,
}

impl From<DbExaminationDetails> for ExaminationDetails {
    fn from(row: DbExaminationDetails) -> Self {
        ExaminationDetails {
            id: row.id,
            patient_id: row.patient_id,
            examination_type: row.examination_type,
            examination_date: row.examination_date,
            examination_time: row.examination_time,
            device_id: row.device_id,
            device_name: row.device_name,
            device_model: row.device_model,
            device_manufacturer: row.device_manufacturer,
            device_type: row.device_type,
            device_location: row.device_location,
            referring_physician: row.referring_physician,
            performing_physician: row.performing_physician,
            body_part_examined: row.body_part_examined,
            clinical_indication: row.clinical_indication,
            examination_protocol: row.examination_protocol,
            contrast_agent: row.contrast_agent,
            image_count: row.image_count,
            status: row.status,
            priority: row.priority,
            created_at: row.created_at,
            has_reports: row.report_count > 0,
            report_count: row.report_count,
        }
    }
}

/// 数据库报告表
#[derive(Debug, FromRow)]
pub struct DbExaminationReport {
    pub id: Uuid,
    pub examination_id: Uuid,
    pub report_type: String,
    pub report_status: String,
    pub findings: String,
    pub impression: String,
    pub recommendations: String,
    pub report_date: String,
    pub report_time: String,
    pub reporting_physician: String,
    pub dictated_by: Option<String>,
    pub transcribed_by: Option<String>,
    pub technical_quality: String,
    pub limitations: Option<String>,
    pub comparison_studies: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Uuid,
}

impl From<DbExaminationReport> for ExaminationReport {
    fn from(db_report: DbExaminationReport) -> Self {
        ExaminationReport {
            id: db_report.id,
            examination_id: db_report.examination_id,
            report_type: db_report.report_type,
            report_status: db_report.report_status,
            findings: db_report.findings,
            impression: db_report.impression,
            recommendations: db_report.recommendations,
            report_date: db_report.report_date,
            report_time: db_report.report_time,
            reporting_physician: db_report.reporting_physician,
            dictated_by: db_report.dictated_by,
            transcribed_by: db_report.transcribed_by,
            technical_quality: db_report.technical_quality,
            limitations: db_report.limitations,
            comparison_studies: db_report.comparison_studies,
            created_at: db_report.created_at,
            updated_at: db_report.updated_at,
            created_by: db_report.created_by,
        }
    }
}

/// 数据库审计日志表
#[derive(Debug, FromRow)]
pub struct DbAuditEntry {
    pub id: Uuid,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub user_id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

impl From<DbAuditEntry> for AuditEntry {
    fn from(db_entry: DbAuditEntry) -> Self {
        AuditEntry {
            id: db_entry.id,
            action: db_entry.action,
            resource_type: db_entry.resource_type,
            resource_id: db_entry.resource_id,
            user_id: db_entry.user_id,
            username: db_entry.username,
            created_at: db_entry.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_string_list_tolerates_bad_json() {
        assert_eq!(parse_string_list(r#"["a","b"]"#), vec!["a", "b"]);
        assert!(parse_string_list("not json").is_empty());
        assert!(parse_string_list("").is_empty());
    }

    #[test]
    fn test_parse_json_object_fallback() {
        assert_eq!(
            parse_json_object(r#"{"k":1}"#),
            serde_json::json!({"k": 1})
        );
        assert_eq!(parse_json_object("garbage"), serde_json::json!({}));
    }

    #[test]
    fn test_unknown_role_defaults_to_viewer() {
        let db_user = DbUser {
            id: Uuid::new_v4(),
            username: "u".into(),
            email: "u@example.com".into(),
            full_name: "U".into(),
            role: "superhero".into(),
            hashed_password: "$argon2id$...".into(),
            is_active: true,
            created_at: Utc::now(),
            last_login: None,
        };
        let user = User::from(db_user);
        assert_eq!(user.role, UserRole::Viewer);
    }
}
