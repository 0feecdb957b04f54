//! API错误响应

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use mirs_core::MirsError;
use serde_json::json;

/// HTTP层错误包装，负责把领域错误映射为状态码和JSON响应体
#[derive(Debug)]
pub struct ApiError(pub MirsError);

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl<E: Into<MirsError>> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            MirsError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            MirsError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            MirsError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            MirsError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            MirsError::Imaging(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            MirsError::DicomParse(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            other => {
                tracing::error!("内部错误: {}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        };

        let body = Json(json!({
            "error": true,
            "message": message,
            "status": status.as_u16()
        }));

        if status == StatusCode::UNAUTHORIZED {
            // 认证失败时附带质询头
            (status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_404() {
        let resp = ApiError(MirsError::NotFound("患者不存在".into())).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_unauthorized_includes_challenge_header() {
        let resp = ApiError(MirsError::Unauthorized("无效凭证".into())).into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            resp.headers().get(header::WWW_AUTHENTICATE).map(|v| v.to_str().ok()),
            Some(Some("Bearer"))
        );
    }

    #[test]
    fn test_database_error_is_internal() {
        let resp = ApiError(MirsError::Database("boom".into())).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
