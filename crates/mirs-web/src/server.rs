//! Web服务器

use axum::extract::{DefaultBodyLimit, State};
use axum::http::header;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::{middleware, Router};
use mirs_core::Result;
use mirs_database::{DatabasePool, DatabaseQueries};
use mirs_imaging::EncodeOptions;
use mirs_storage::ImageStore;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::{self, auth_middleware, AuthService};
use crate::cache::TtlCache;
use crate::{audit, examinations, images, patients};

/// 单个上传请求的大小上限
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// 应用共享状态
pub struct AppState {
    pub db: DatabasePool,
    pub store: ImageStore,
    pub auth: AuthService,
    pub cache: TtlCache,
    pub encode_opts: EncodeOptions,
}

/// 已序列化JSON的直接响应（缓存命中路径）
pub(crate) fn json_body(raw: String) -> Response {
    ([(header::CONTENT_TYPE, "application/json")], raw).into_response()
}

pub struct WebServer {
    addr: SocketAddr,
    app: Router,
}

impl WebServer {
    pub fn new(addr: SocketAddr, state: Arc<AppState>) -> Self {
        Self {
            addr,
            app: build_router(state),
        }
    }

    pub async fn run(self) -> Result<()> {
        info!("Web服务器启动: {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.app).await?;

        Ok(())
    }
}

/// 组装完整路由
pub fn build_router(state: Arc<AppState>) -> Router {
    // 认证路由（无需token）
    let public = Router::new()
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/login", post(auth::login_handler));

    // 需要认证的路由
    let protected = Router::new()
        .route("/auth/me", get(auth::me_handler))
        .route(
            "/patients",
            post(patients::create_patient).get(patients::list_patients),
        )
        .route(
            "/patients/:id",
            get(patients::get_patient)
                .put(patients::update_patient)
                .delete(patients::delete_patient),
        )
        .route(
            "/patients/:id/images",
            post(images::upload_image).get(images::list_patient_images),
        )
        .route(
            "/patients/:id/examinations",
            get(examinations::list_patient_examinations),
        )
        .route(
            "/images/:id",
            get(images::get_image_meta).delete(images::delete_image),
        )
        .route("/images/:id/data", get(images::get_image_data))
        .route("/images/:id/data-base64", get(images::get_image_data_base64))
        .route("/images/:id/thumbnail", get(images::get_thumbnail))
        .route(
            "/images/:id/thumbnail-base64",
            get(images::get_thumbnail_base64),
        )
        .route(
            "/devices",
            post(examinations::create_device).get(examinations::list_devices),
        )
        .route("/examinations", post(examinations::create_examination))
        .route("/examinations/:id", get(examinations::get_examination))
        .route(
            "/examinations/:id/images",
            get(examinations::get_examination_images),
        )
        .route(
            "/examinations/:id/reports",
            post(examinations::create_report).get(examinations::list_examination_reports),
        )
        .route("/audit-logs", get(audit::list_audit_logs))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/", get(service_root))
        .route("/health", get(health))
        .nest("/api", public.merge(protected))
        // 全局中间件
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                )
                .layer(DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
        .with_state(state)
}

/// 服务根路径
async fn service_root() -> impl IntoResponse {
    Json(json!({
        "service": "Medical Imaging Record System API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "database": "postgresql",
        "storage": "local filesystem + database fallback",
        "endpoints": {
            "health": "/health",
            "auth": "/api/auth",
            "patients": "/api/patients",
            "images": "/api/images",
            "examinations": "/api/examinations"
        }
    }))
}

/// 健康检查：以用户计数探测数据库，同时检查存储目录与缓存
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let users = DatabaseQueries::new(&state.db).count_users().await.ok();
    let storage_ok = state.store.root().exists();
    let cache_entries = state.cache.len().await;

    Json(health_body(users, storage_ok, cache_entries))
}

fn health_body(users: Option<i64>, storage_ok: bool, cache_entries: usize) -> serde_json::Value {
    let db_ok = users.is_some();
    json!({
        "status": if db_ok && storage_ok { "healthy" } else { "unhealthy" },
        "database": if db_ok { "connected" } else { "unavailable" },
        "registered_users": users,
        "storage": if storage_ok { "available" } else { "missing" },
        "cache_entries": cache_entries,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_body_all_subsystems_up() {
        let body = health_body(Some(3), true, 7);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["database"], "connected");
        assert_eq!(body["registered_users"], 3);
        assert_eq!(body["cache_entries"], 7);
    }

    #[test]
    fn test_health_body_db_down_is_unhealthy() {
        let body = health_body(None, true, 0);
        assert_eq!(body["status"], "unhealthy");
        assert_eq!(body["database"], "unavailable");
        assert!(body["registered_users"].is_null());
    }

    #[test]
    fn test_health_body_missing_storage_is_unhealthy() {
        let body = health_body(Some(1), false, 0);
        assert_eq!(body["status"], "unhealthy");
        assert_eq!(body["storage"], "missing");
    }
}
