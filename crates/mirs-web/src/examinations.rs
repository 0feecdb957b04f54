//! 设备、检查与报告接口

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::Extension;
use chrono::Utc;
use mirs_core::{
    Device, DeviceDraft, Examination, ExaminationDetails, ExaminationDraft, ExaminationReport,
    MedicalImageSummary, MirsError, ReportDraft, User,
};
use mirs_database::DatabaseQueries;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::audit;
use crate::error::ApiResult;
use crate::server::AppState;

/// 登记医学设备
pub async fn create_device(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(draft): Json<DeviceDraft>,
) -> ApiResult<impl IntoResponse> {
    if draft.name.trim().is_empty() {
        return Err(MirsError::Validation("设备名称不能为空".to_string()).into());
    }

    let now = Utc::now();
    let device = Device {
        id: Uuid::new_v4(),
        name: draft.name,
        model: draft.model,
        manufacturer: draft.manufacturer,
        device_type: draft.device_type,
        serial_number: draft.serial_number,
        installation_date: draft.installation_date,
        last_calibration: draft.last_calibration,
        status: draft.status,
        location: draft.location,
        specifications: draft.specifications,
        created_at: now,
        updated_at: now,
    };

    DatabaseQueries::new(&state.db).create_device(&device).await?;
    audit::record(&state, &user, "create_device", "device", &device.id.to_string());
    info!("设备登记: {} ({})", device.name, device.id);

    Ok((StatusCode::CREATED, Json(device)))
}

/// 获取设备列表
pub async fn list_devices(
    State(state): State<Arc<AppState>>,
    Extension(_user): Extension<User>,
) -> ApiResult<Json<Vec<Device>>> {
    let devices = DatabaseQueries::new(&state.db).list_devices().await?;
    Ok(Json(devices))
}

/// 创建检查记录
pub async fn create_examination(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(draft): Json<ExaminationDraft>,
) -> ApiResult<impl IntoResponse> {
    let queries = DatabaseQueries::new(&state.db);

    queries
        .get_patient(&draft.patient_id)
        .await?
        .ok_or_else(|| MirsError::NotFound("患者不存在".to_string()))?;
    let device = queries
        .get_device(&draft.device_id)
        .await?
        .ok_or_else(|| MirsError::NotFound("设备不存在".to_string()))?;

    let now = Utc::now();
    let exam = Examination {
        id: Uuid::new_v4(),
        patient_id: draft.patient_id,
        examination_type: draft.examination_type,
        examination_date: draft.examination_date,
        examination_time: draft.examination_time,
        device_id: device.id,
        device_name: device.name,
        referring_physician: draft.referring_physician,
        performing_physician: draft.performing_physician,
        body_part_examined: draft.body_part_examined,
        clinical_indication: draft.clinical_indication,
        examination_protocol: draft.examination_protocol,
        contrast_agent: draft.contrast_agent,
        contrast_amount: draft.contrast_amount,
        patient_position: draft.patient_position,
        radiation_dose: draft.radiation_dose,
        image_count: 0,
        status: "pending".to_string(),
        priority: draft.priority,
        created_at: now,
        updated_at: now,
        created_by: user.id,
    };

    queries.create_examination(&exam).await?;
    audit::record(&state, &user, "create_examination", "examination", &exam.id.to_string());
    info!("检查记录创建: {} ({})", exam.examination_type, exam.id);

    Ok((StatusCode::CREATED, Json(exam)))
}

/// 获取患者的检查列表（含设备信息与影像/报告计数）
pub async fn list_patient_examinations(
    State(state): State<Arc<AppState>>,
    Extension(_user): Extension<User>,
    Path(patient_id): Path<Uuid>,
) -> ApiResult<Json<Vec<ExaminationDetails>>> {
    let queries = DatabaseQueries::new(&state.db);
    queries
        .get_patient(&patient_id)
        .await?
        .ok_or_else(|| MirsError::NotFound("患者不存在".to_string()))?;

    let exams = queries
        .list_examination_details_by_patient(&patient_id)
        .await?;
    Ok(Json(exams))
}

/// 获取单个检查的详情视图
pub async fn get_examination(
    State(state): State<Arc<AppState>>,
    Extension(_user): Extension<User>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ExaminationDetails>> {
    let details = DatabaseQueries::new(&state.db)
        .get_examination_details(&id)
        .await?
        .ok_or_else(|| MirsError::NotFound("检查不存在".to_string()))?;
    Ok(Json(details))
}

/// 获取检查关联的影像列表
pub async fn get_examination_images(
    State(state): State<Arc<AppState>>,
    Extension(_user): Extension<User>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<MedicalImageSummary>>> {
    let queries = DatabaseQueries::new(&state.db);
    let exam = queries
        .get_examination(&id)
        .await?
        .ok_or_else(|| MirsError::NotFound("检查不存在".to_string()))?;

    // 影像通过study_id关联到检查
    let images = queries.list_images_by_study(&exam.id.to_string()).await?;
    Ok(Json(images))
}

/// 创建检查报告
pub async fn create_report(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(examination_id): Path<Uuid>,
    Json(draft): Json<ReportDraft>,
) -> ApiResult<impl IntoResponse> {
    let queries = DatabaseQueries::new(&state.db);
    queries
        .get_examination(&examination_id)
        .await?
        .ok_or_else(|| MirsError::NotFound("检查不存在".to_string()))?;

    let now = Utc::now();
    let report = ExaminationReport {
        id: Uuid::new_v4(),
        examination_id,
        report_type: draft.report_type,
        // 新报告从草稿状态开始，签发流程在后续版本
        report_status: "draft".to_string(),
        findings: draft.findings,
        impression: draft.impression,
        recommendations: draft.recommendations,
        report_date: draft.report_date,
        report_time: draft.report_time,
        reporting_physician: draft.reporting_physician,
        dictated_by: draft.dictated_by,
        transcribed_by: draft.transcribed_by,
        technical_quality: draft.technical_quality,
        limitations: draft.limitations,
        comparison_studies: draft.comparison_studies,
        created_at: now,
        updated_at: now,
        created_by: user.id,
    };

    queries.create_report(&report).await?;
    audit::record(&state, &user, "create_report", "report", &report.id.to_string());
    info!("检查报告创建: {} (检查 {})", report.id, examination_id);

    Ok((StatusCode::CREATED, Json(report)))
}

/// 获取检查的全部报告
pub async fn list_examination_reports(
    State(state): State<Arc<AppState>>,
    Extension(_user): Extension<User>,
    Path(examination_id): Path<Uuid>,
) -> ApiResult<Json<Vec<ExaminationReport>>> {
    let queries = DatabaseQueries::new(&state.db);
    queries
        .get_examination(&examination_id)
        .await?
        .ok_or_else(|| MirsError::NotFound("检查不存在".to_string()))?;

    let reports = queries
        .list_reports_by_examination(&examination_id)
        .await?;
    Ok(Json(reports))
}
