//! 患者档案接口

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::Extension;
use chrono::Utc;
use mirs_core::{MirsError, Patient, PatientDraft, User};
use mirs_database::DatabaseQueries;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::audit;
use crate::cache::{TtlCache, PATIENT_TTL};
use crate::error::ApiResult;
use crate::server::{json_body, AppState};

fn validate_draft(draft: &PatientDraft) -> ApiResult<()> {
    if draft.patient_id.trim().is_empty() {
        return Err(MirsError::Validation("患者编号不能为空".to_string()).into());
    }
    if draft.first_name.trim().is_empty() || draft.last_name.trim().is_empty() {
        return Err(MirsError::Validation("患者姓名不能为空".to_string()).into());
    }
    Ok(())
}

fn patient_from_draft(draft: PatientDraft, id: Uuid, created_by: Uuid) -> Patient {
    let now = Utc::now();
    Patient {
        id,
        patient_id: draft.patient_id,
        first_name: draft.first_name,
        last_name: draft.last_name,
        date_of_birth: draft.date_of_birth,
        gender: draft.gender,
        phone: draft.phone,
        email: draft.email,
        address: draft.address,
        medical_record_number: draft.medical_record_number,
        primary_physician: draft.primary_physician,
        allergies: draft.allergies,
        medications: draft.medications,
        medical_history: draft.medical_history,
        insurance_provider: draft.insurance_provider,
        insurance_policy_number: draft.insurance_policy_number,
        insurance_group_number: draft.insurance_group_number,
        consent_given: draft.consent_given,
        created_at: now,
        updated_at: now,
        created_by,
        last_accessed: None,
    }
}

/// 创建患者档案
pub async fn create_patient(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(draft): Json<PatientDraft>,
) -> ApiResult<impl IntoResponse> {
    validate_draft(&draft)?;

    let queries = DatabaseQueries::new(&state.db);
    if queries
        .get_patient_by_patient_id(&draft.patient_id)
        .await?
        .is_some()
    {
        return Err(MirsError::Validation("患者编号已存在".to_string()).into());
    }

    let patient = patient_from_draft(draft, Uuid::new_v4(), user.id);
    queries.create_patient(&patient).await?;

    state.cache.remove("patients:all").await;
    audit::record(&state, &user, "create_patient", "patient", &patient.id.to_string());
    info!("患者档案创建: {} ({})", patient.patient_id, patient.id);

    Ok((StatusCode::CREATED, Json(patient)))
}

/// 获取患者列表
pub async fn list_patients(
    State(state): State<Arc<AppState>>,
    Extension(_user): Extension<User>,
) -> ApiResult<Response> {
    if let Some(cached) = state.cache.get("patients:all").await {
        return Ok(json_body(cached));
    }

    let patients = DatabaseQueries::new(&state.db).list_patients().await?;
    let raw = serde_json::to_string(&patients)?;
    state
        .cache
        .set("patients:all", raw.clone(), PATIENT_TTL)
        .await;

    Ok(json_body(raw))
}

/// 获取单个患者档案
pub async fn get_patient(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> ApiResult<Response> {
    let queries = DatabaseQueries::new(&state.db);
    let cache_key = format!("patient:{}", id);

    // 缓存命中说明患者存在，记录访问审计
    if let Some(cached) = state.cache.get(&cache_key).await {
        queries.touch_patient_last_accessed(&id).await?;
        audit::record(&state, &user, "view_patient", "patient", &id.to_string());
        return Ok(json_body(cached));
    }

    let patient = queries
        .get_patient(&id)
        .await?
        .ok_or_else(|| MirsError::NotFound("患者不存在".to_string()))?;
    queries.touch_patient_last_accessed(&id).await?;
    audit::record(&state, &user, "view_patient", "patient", &id.to_string());

    let raw = serde_json::to_string(&patient)?;
    state.cache.set(cache_key, raw.clone(), PATIENT_TTL).await;

    Ok(json_body(raw))
}

/// 更新患者档案
pub async fn update_patient(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    Json(draft): Json<PatientDraft>,
) -> ApiResult<Json<Patient>> {
    validate_draft(&draft)?;

    let queries = DatabaseQueries::new(&state.db);
    let existing = queries
        .get_patient(&id)
        .await?
        .ok_or_else(|| MirsError::NotFound("患者不存在".to_string()))?;

    // 患者编号变更时检查新编号未被占用
    if draft.patient_id != existing.patient_id
        && queries
            .get_patient_by_patient_id(&draft.patient_id)
            .await?
            .is_some()
    {
        return Err(MirsError::Validation("患者编号已存在".to_string()).into());
    }

    let mut updated = patient_from_draft(draft, id, existing.created_by);
    updated.created_at = existing.created_at;
    updated.last_accessed = existing.last_accessed;
    queries.update_patient(&updated).await?;

    state.cache.remove("patients:all").await;
    state.cache.remove(&format!("patient:{}", id)).await;
    audit::record(&state, &user, "update_patient", "patient", &id.to_string());

    Ok(Json(updated))
}

/// 删除患者后清除全部相关缓存键：列表、档案、影像列表和每张影像的元数据
async fn invalidate_patient_caches(cache: &TtlCache, patient_id: Uuid, image_ids: &[Uuid]) {
    cache.remove("patients:all").await;
    cache.remove(&format!("patient:{}", patient_id)).await;
    cache.remove(&format!("images:patient:{}", patient_id)).await;
    for image_id in image_ids {
        cache.remove(&format!("image:{}", image_id)).await;
    }
}

/// 删除患者档案及其全部影像
pub async fn delete_patient(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let queries = DatabaseQueries::new(&state.db);
    if queries.get_patient(&id).await?.is_none() {
        return Err(MirsError::NotFound("患者不存在".to_string()).into());
    }

    let image_ids = queries.delete_images_by_patient(&id).await?;
    for image_id in &image_ids {
        state.store.delete(*image_id).await;
    }
    queries.delete_patient(&id).await?;

    invalidate_patient_caches(&state.cache, id, &image_ids).await;
    audit::record(&state, &user, "delete_patient", "patient", &id.to_string());
    info!("患者档案删除: {} (连带{}张影像)", id, image_ids.len());

    Ok(Json(json!({
        "message": "患者已删除",
        "deleted_images": image_ids.len()
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_delete_invalidation_covers_image_meta_keys() {
        let cache = TtlCache::new();
        let ttl = Duration::from_secs(60);
        let patient_id = Uuid::new_v4();
        let image_ids = vec![Uuid::new_v4(), Uuid::new_v4()];

        cache.set("patients:all", "[]".to_string(), ttl).await;
        cache
            .set(format!("patient:{}", patient_id), "{}".to_string(), ttl)
            .await;
        cache
            .set(format!("images:patient:{}", patient_id), "[]".to_string(), ttl)
            .await;
        for image_id in &image_ids {
            cache
                .set(format!("image:{}", image_id), "{}".to_string(), ttl)
                .await;
        }
        let other = Uuid::new_v4();
        cache.set(format!("image:{}", other), "{}".to_string(), ttl).await;

        invalidate_patient_caches(&cache, patient_id, &image_ids).await;

        assert!(cache.get("patients:all").await.is_none());
        assert!(cache.get(&format!("patient:{}", patient_id)).await.is_none());
        assert!(cache
            .get(&format!("images:patient:{}", patient_id))
            .await
            .is_none());
        // 被删患者的每张影像元数据键都已失效
        for image_id in &image_ids {
            assert!(cache.get(&format!("image:{}", image_id)).await.is_none());
        }
        // 其他患者的影像不受影响
        assert!(cache.get(&format!("image:{}", other)).await.is_some());
    }
}
