//! 审计日志

use axum::extract::{Query, State};
use axum::response::Json;
use axum::Extension;
use chrono::Utc;
use mirs_core::{AuditEntry, User};
use mirs_database::DatabaseQueries;
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::auth::require_admin;
use crate::error::ApiResult;
use crate::server::AppState;

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1000;

/// 记录审计条目。写入在后台进行，失败只记警告，不影响业务响应
pub fn record(
    state: &Arc<AppState>,
    user: &User,
    action: &str,
    resource_type: &str,
    resource_id: &str,
) {
    let entry = AuditEntry {
        id: Uuid::new_v4(),
        action: action.to_string(),
        resource_type: resource_type.to_string(),
        resource_id: resource_id.to_string(),
        user_id: user.id,
        username: user.username.clone(),
        created_at: Utc::now(),
    };

    let state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = DatabaseQueries::new(&state.db)
            .insert_audit_entry(&entry)
            .await
        {
            warn!("审计日志写入失败 ({}): {}", entry.action, e);
        }
    });
}

#[derive(Debug, Deserialize)]
pub struct AuditQueryParams {
    pub limit: Option<i64>,
}

/// 查询最近审计日志（仅管理员）
pub async fn list_audit_logs(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Query(params): Query<AuditQueryParams>,
) -> ApiResult<Json<Vec<AuditEntry>>> {
    require_admin(&user)?;

    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let entries = DatabaseQueries::new(&state.db)
        .list_audit_entries(limit)
        .await?;

    Ok(Json(entries))
}
