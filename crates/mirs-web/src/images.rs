//! 影像上传与分发
//!
//! 上传走DICOM或标准图像两条处理路径，产出WebP全图和缩略图。
//! 二进制分发以磁盘文件为首选，数据库base64列作为回退。

use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::Extension;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use mirs_core::utils::{is_dicom_upload, is_valid_dicom_uid, sniff_media_type};
use mirs_core::{MedicalImage, MirsError, User};
use mirs_database::DatabaseQueries;
use mirs_imaging::{process_dicom, process_standard};
use mirs_storage::{sha256_hex, ImageStore};
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit;
use crate::cache::{IMAGE_LIST_TTL, IMAGE_META_TTL};
use crate::error::ApiResult;
use crate::server::{json_body, AppState};

fn meta_str(metadata: &JsonValue, key: &str) -> Option<String> {
    metadata
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

fn binary_response(data: Vec<u8>, format: &str) -> Response {
    (
        [
            (header::CONTENT_TYPE, format!("image/{}", format)),
            (header::CACHE_CONTROL, "public, max-age=3600".to_string()),
        ],
        data,
    )
        .into_response()
}

/// 上传医学影像（multipart的file字段）
pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<Uuid>,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let queries = DatabaseQueries::new(&state.db);
    queries
        .get_patient(&patient_id)
        .await?
        .ok_or_else(|| MirsError::NotFound("患者不存在".to_string()))?;

    // file字段之外的文本字段作为元数据覆盖（优先于DICOM标签）
    let mut upload: Option<(String, Option<String>, Vec<u8>)> = None;
    let mut overrides: HashMap<String, String> = HashMap::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| MirsError::Validation(format!("解析multipart失败: {}", e)))?
    {
        match field.name() {
            Some("file") => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(|s| s.to_string());
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| MirsError::Validation(format!("读取上传内容失败: {}", e)))?;
                upload = Some((filename, content_type, data.to_vec()));
            }
            Some(name) => {
                let name = name.to_string();
                if let Ok(value) = field.text().await {
                    if !value.trim().is_empty() {
                        overrides.insert(name, value);
                    }
                }
            }
            None => {}
        }
    }

    let (filename, content_type, data) =
        upload.ok_or_else(|| MirsError::Validation("缺少file字段".to_string()))?;
    if data.is_empty() {
        return Err(MirsError::Validation("上传内容为空".to_string()).into());
    }

    let file_size = data.len() as i64;
    let file_sha256 = sha256_hex(&data);
    let is_dicom = is_dicom_upload(&filename, content_type.as_deref());

    if !is_dicom && sniff_media_type(&data) == "application/octet-stream" {
        return Err(MirsError::Validation("不支持的图像格式".to_string()).into());
    }

    // 像素归一化和WebP编码是CPU密集操作，移出异步运行时
    let opts = state.encode_opts.clone();
    let processed = tokio::task::spawn_blocking(move || {
        if is_dicom {
            process_dicom(&data, &opts)
        } else {
            process_standard(&data, &opts)
        }
    })
    .await
    .map_err(|e| MirsError::Internal(format!("影像处理任务中断: {}", e)))??;

    let image_id = Uuid::new_v4();
    let now = Utc::now();
    let meta = &processed.metadata;
    // 取值优先级：表单字段 > DICOM标签 > 默认值
    let pick = |field: &str, tag: &str| {
        overrides
            .get(field)
            .cloned()
            .or_else(|| meta_str(meta, tag))
    };

    let image = MedicalImage {
        id: image_id,
        patient_id,
        // 表单可传检查UUID作为study_id；DICOM标签值须是合法UID
        study_id: overrides
            .get("study_id")
            .cloned()
            .or_else(|| meta_str(meta, "StudyInstanceUID").filter(|uid| is_valid_dicom_uid(uid)))
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        series_id: overrides
            .get("series_id")
            .cloned()
            .or_else(|| meta_str(meta, "SeriesInstanceUID").filter(|uid| is_valid_dicom_uid(uid)))
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        instance_id: overrides
            .get("instance_id")
            .cloned()
            .or_else(|| meta_str(meta, "SOPInstanceUID").filter(|uid| is_valid_dicom_uid(uid)))
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        modality: pick("modality", "Modality").unwrap_or_else(|| "OT".to_string()),
        body_part: pick("body_part", "BodyPartExamined")
            .unwrap_or_else(|| "UNKNOWN".to_string()),
        study_date: pick("study_date", "StudyDate")
            .unwrap_or_else(|| now.format("%Y%m%d").to_string()),
        study_time: pick("study_time", "StudyTime").unwrap_or_default(),
        institution_name: pick("institution_name", "InstitutionName").unwrap_or_default(),
        referring_physician: pick("referring_physician", "ReferringPhysicianName")
            .unwrap_or_default(),
        dicom_metadata: processed.metadata.clone(),
        original_filename: filename,
        file_size,
        file_sha256,
        image_format: processed.format.to_string(),
        window_center: processed.window_center,
        window_width: processed.window_width,
        uploaded_at: now,
        uploaded_by: user.id,
    };

    let (image_b64, thumb_b64) = match &processed.encoded {
        Some(pair) => {
            if let Err(e) = state.store.save_image(image_id, &pair.image).await {
                warn!("影像文件写入失败，保留数据库回退: {}", e);
            }
            if let Err(e) = state.store.save_thumbnail(image_id, &pair.thumbnail).await {
                warn!("缩略图文件写入失败: {}", e);
            }
            (
                Some(BASE64.encode(&pair.image)),
                Some(BASE64.encode(&pair.thumbnail)),
            )
        }
        None => (None, None),
    };
    let has_preview = processed.encoded.is_some();

    queries
        .create_image(&image, image_b64.as_deref(), thumb_b64.as_deref())
        .await?;

    state
        .cache
        .remove(&format!("images:patient:{}", patient_id))
        .await;
    audit::record(&state, &user, "upload_image", "image", &image_id.to_string());
    info!(
        "影像上传成功: {} ({} bytes, preview={})",
        image_id, file_size, has_preview
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "影像上传成功",
            "image_id": image_id,
            "has_preview": has_preview,
            "image": image
        })),
    ))
}

/// 获取患者的影像列表
pub async fn list_patient_images(
    State(state): State<Arc<AppState>>,
    Extension(_user): Extension<User>,
    Path(patient_id): Path<Uuid>,
) -> ApiResult<Response> {
    let cache_key = format!("images:patient:{}", patient_id);
    if let Some(cached) = state.cache.get(&cache_key).await {
        return Ok(json_body(cached));
    }

    let queries = DatabaseQueries::new(&state.db);
    queries
        .get_patient(&patient_id)
        .await?
        .ok_or_else(|| MirsError::NotFound("患者不存在".to_string()))?;

    let images = queries.list_images_by_patient(&patient_id).await?;
    let raw = serde_json::to_string(&images)?;
    state.cache.set(cache_key, raw.clone(), IMAGE_LIST_TTL).await;

    Ok(json_body(raw))
}

/// 获取影像元数据
pub async fn get_image_meta(
    State(state): State<Arc<AppState>>,
    Extension(_user): Extension<User>,
    Path(id): Path<Uuid>,
) -> ApiResult<Response> {
    let cache_key = format!("image:{}", id);
    if let Some(cached) = state.cache.get(&cache_key).await {
        return Ok(json_body(cached));
    }

    let image = DatabaseQueries::new(&state.db)
        .get_image(&id)
        .await?
        .ok_or_else(|| MirsError::NotFound("影像不存在".to_string()))?;

    let raw = serde_json::to_string(&image)?;
    state.cache.set(cache_key, raw.clone(), IMAGE_META_TTL).await;

    Ok(json_body(raw))
}

/// 解码base64回退数据并把文件写回磁盘，后续读取不再经过数据库
async fn restore_from_base64(
    store: &ImageStore,
    id: Uuid,
    raw: &str,
    thumbnail: bool,
) -> ApiResult<Vec<u8>> {
    let data = BASE64
        .decode(raw.as_bytes())
        .map_err(|e| MirsError::Internal(format!("影像回退数据解码失败: {}", e)))?;

    let saved = if thumbnail {
        store.save_thumbnail(id, &data).await
    } else {
        store.save_image(id, &data).await
    };
    if let Err(e) = saved {
        warn!("回退影像写回磁盘失败 {}: {}", id, e);
    }

    Ok(data)
}

/// 加载全图二进制：磁盘文件优先，数据库base64回退
async fn load_image_bytes(state: &AppState, id: Uuid) -> ApiResult<Vec<u8>> {
    if let Some(data) = state.store.load_image(id).await? {
        return Ok(data);
    }

    let (image_b64, _) = DatabaseQueries::new(&state.db)
        .get_image_binary(&id)
        .await?
        .ok_or_else(|| MirsError::NotFound("影像不存在".to_string()))?;
    let raw = image_b64
        .ok_or_else(|| MirsError::NotFound("该影像没有可用的图像数据".to_string()))?;

    restore_from_base64(&state.store, id, &raw, false).await
}

/// 加载缩略图二进制
async fn load_thumbnail_bytes(state: &AppState, id: Uuid) -> ApiResult<Vec<u8>> {
    if let Some(data) = state.store.load_thumbnail(id).await? {
        return Ok(data);
    }

    let (_, thumb_b64) = DatabaseQueries::new(&state.db)
        .get_image_binary(&id)
        .await?
        .ok_or_else(|| MirsError::NotFound("影像不存在".to_string()))?;
    let raw = thumb_b64
        .ok_or_else(|| MirsError::NotFound("该影像没有可用的缩略图".to_string()))?;

    restore_from_base64(&state.store, id, &raw, true).await
}

/// 获取全图二进制
pub async fn get_image_data(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> ApiResult<Response> {
    let image = DatabaseQueries::new(&state.db)
        .get_image(&id)
        .await?
        .ok_or_else(|| MirsError::NotFound("影像不存在".to_string()))?;

    let data = load_image_bytes(&state, id).await?;
    audit::record(&state, &user, "view_image", "image", &id.to_string());

    Ok(binary_response(data, &image.image_format))
}

/// 获取全图base64编码
pub async fn get_image_data_base64(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<JsonValue>> {
    let image = DatabaseQueries::new(&state.db)
        .get_image(&id)
        .await?
        .ok_or_else(|| MirsError::NotFound("影像不存在".to_string()))?;

    let data = load_image_bytes(&state, id).await?;
    audit::record(&state, &user, "view_image", "image", &id.to_string());

    Ok(Json(json!({
        "image_id": id,
        "media_type": sniff_media_type(&data),
        "format": image.image_format,
        "image_data": BASE64.encode(&data)
    })))
}

/// 获取缩略图二进制
pub async fn get_thumbnail(
    State(state): State<Arc<AppState>>,
    Extension(_user): Extension<User>,
    Path(id): Path<Uuid>,
) -> ApiResult<Response> {
    let image = DatabaseQueries::new(&state.db)
        .get_image(&id)
        .await?
        .ok_or_else(|| MirsError::NotFound("影像不存在".to_string()))?;

    let data = load_thumbnail_bytes(&state, id).await?;
    Ok(binary_response(data, &image.image_format))
}

/// 获取缩略图base64编码
pub async fn get_thumbnail_base64(
    State(state): State<Arc<AppState>>,
    Extension(_user): Extension<User>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<JsonValue>> {
    let image = DatabaseQueries::new(&state.db)
        .get_image(&id)
        .await?
        .ok_or_else(|| MirsError::NotFound("影像不存在".to_string()))?;

    let data = load_thumbnail_bytes(&state, id).await?;
    Ok(Json(json!({
        "image_id": id,
        "media_type": sniff_media_type(&data),
        "format": image.image_format,
        "image_data": BASE64.encode(&data)
    })))
}

/// 删除影像
pub async fn delete_image(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<JsonValue>> {
    let queries = DatabaseQueries::new(&state.db);
    let image = queries
        .get_image(&id)
        .await?
        .ok_or_else(|| MirsError::NotFound("影像不存在".to_string()))?;

    queries.delete_image(&id).await?;
    state.store.delete(id).await;

    state.cache.remove(&format!("image:{}", id)).await;
    state
        .cache
        .remove(&format!("images:patient:{}", image.patient_id))
        .await;
    audit::record(&state, &user, "delete_image", "image", &id.to_string());
    info!("影像删除: {}", id);

    Ok(Json(json!({ "message": "影像已删除" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_str_reads_only_strings() {
        let meta = json!({"Modality": "CT", "Rows": 512});
        assert_eq!(meta_str(&meta, "Modality").as_deref(), Some("CT"));
        assert_eq!(meta_str(&meta, "Rows"), None);
        assert_eq!(meta_str(&meta, "Missing"), None);
    }

    #[tokio::test]
    async fn test_base64_fallback_rewrites_disk_file() {
        let dir = std::env::temp_dir().join(format!("mirs-web-fallback-{}", Uuid::new_v4()));
        let store = ImageStore::new(&dir);
        let id = Uuid::new_v4();
        let raw = BASE64.encode(b"RIFF-restored");

        assert!(store.load_image(id).await.unwrap().is_none());

        let data = restore_from_base64(&store, id, &raw, false).await.unwrap();
        assert_eq!(data, b"RIFF-restored");
        // 回退路径读取后文件已写回，下次命中磁盘
        assert_eq!(
            store.load_image(id).await.unwrap().unwrap(),
            b"RIFF-restored"
        );

        let thumb = restore_from_base64(&store, id, &raw, true).await.unwrap();
        assert_eq!(store.load_thumbnail(id).await.unwrap().unwrap(), thumb);

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn test_invalid_base64_fallback_is_internal_error() {
        let store = ImageStore::new(std::env::temp_dir().join("mirs-web-fallback-bad"));
        let id = Uuid::new_v4();
        assert!(restore_from_base64(&store, id, "not base64!!", false)
            .await
            .is_err());
        assert!(store.load_image(id).await.unwrap().is_none());
    }

    #[test]
    fn test_binary_response_headers() {
        let resp = binary_response(vec![1, 2, 3], "webp");
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).map(|v| v.to_str().ok()),
            Some(Some("image/webp"))
        );
        assert_eq!(
            resp.headers().get(header::CACHE_CONTROL).map(|v| v.to_str().ok()),
            Some(Some("public, max-age=3600"))
        );
    }
}
