//! 用户认证和授权系统

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use mirs_core::{MirsError, Result, User, UserRole};
use mirs_database::{DatabaseQueries, NewUser};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit;
use crate::cache::TOKEN_USER_TTL;
use crate::error::ApiResult;
use crate::server::AppState;

/// 注册请求
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password: String,
    pub role: Option<String>,
}

/// 登录请求
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// 登录响应
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

/// JWT Claims
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,  // 用户名
    pub uid: String,  // 用户ID
    pub role: String, // 角色
    pub exp: usize,   // 过期时间
    pub iat: usize,   // 签发时间
    pub jti: String,  // JWT ID
}

/// 认证服务：密码哈希与JWT签发/验证
#[derive(Clone)]
pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_expiry_minutes: i64,
}

impl AuthService {
    pub fn new(secret: &str, token_expiry_minutes: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            token_expiry_minutes,
        }
    }

    pub fn token_expiry_minutes(&self) -> i64 {
        self.token_expiry_minutes
    }

    /// 生成argon2id密码哈希（PHC格式）
    pub fn hash_password(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| MirsError::Internal(format!("密码哈希失败: {}", e)))
    }

    /// 校验密码。哈希格式非法一律视为不匹配
    pub fn verify_password(&self, password: &str, hash: &str) -> bool {
        PasswordHash::new(hash)
            .map(|parsed| {
                Argon2::default()
                    .verify_password(password.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    }

    /// 签发JWT token
    pub fn issue_token(&self, user: &User) -> Result<(String, DateTime<Utc>)> {
        let now = Utc::now();
        let expires_at = now + Duration::minutes(self.token_expiry_minutes);

        let claims = Claims {
            sub: user.username.clone(),
            uid: user.id.to_string(),
            role: user.role.as_str().to_string(),
            exp: expires_at.timestamp() as usize,
            iat: now.timestamp() as usize,
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| MirsError::Internal(format!("token签发失败: {}", e)))?;

        Ok((token, expires_at))
    }

    /// 验证并解析JWT token
    pub fn decode_token(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(
            token,
            &self.decoding_key,
            &Validation::new(Algorithm::HS256),
        )
        .map(|data| data.claims)
        .map_err(|_| MirsError::Unauthorized("token无效或已过期".to_string()))
    }
}

/// 认证中间件：验证Bearer token并把用户信息注入请求扩展。
/// 已验证token对应的用户短期缓存，减少每个请求的数据库往返。
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> std::result::Result<Response, crate::error::ApiError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| MirsError::Unauthorized("缺少认证token".to_string()))?
        .to_string();

    let claims = state.auth.decode_token(&token)?;

    let cache_key = format!("auth:{}", claims.jti);
    let user: User = match state.cache.get(&cache_key).await {
        Some(raw) => serde_json::from_str(&raw)?,
        None => {
            let uid = Uuid::parse_str(&claims.uid)
                .map_err(|_| MirsError::Unauthorized("token主体无效".to_string()))?;
            let db_user = DatabaseQueries::new(&state.db)
                .get_user_by_id(&uid)
                .await?
                .ok_or_else(|| MirsError::Unauthorized("用户不存在".to_string()))?;
            let user = User::from(db_user);
            if !user.is_active {
                return Err(MirsError::Unauthorized("账户已停用".to_string()).into());
            }
            state
                .cache
                .set(cache_key, serde_json::to_string(&user)?, TOKEN_USER_TTL)
                .await;
            user
        }
    };

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// 管理员权限检查
pub fn require_admin(user: &User) -> ApiResult<()> {
    if user.role != UserRole::Admin {
        return Err(MirsError::Forbidden("需要管理员权限".to_string()).into());
    }
    Ok(())
}

/// 用户注册
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.username.len() < 3 {
        return Err(MirsError::Validation("用户名至少3个字符".to_string()).into());
    }
    if req.password.len() < 8 {
        return Err(MirsError::Validation("密码至少8个字符".to_string()).into());
    }

    let queries = DatabaseQueries::new(&state.db);

    if queries.get_user_by_username(&req.username).await?.is_some() {
        return Err(MirsError::Validation("用户名已存在".to_string()).into());
    }

    let role = match &req.role {
        Some(raw) => UserRole::parse(raw)
            .ok_or_else(|| MirsError::Validation(format!("未知角色: {}", raw)))?,
        None => UserRole::Viewer,
    };

    let new_user = NewUser {
        id: Uuid::new_v4(),
        username: req.username.clone(),
        email: req.email,
        full_name: req.full_name,
        role,
        hashed_password: state.auth.hash_password(&req.password)?,
    };
    queries.create_user(&new_user).await?;

    let db_user = queries
        .get_user_by_id(&new_user.id)
        .await?
        .ok_or_else(|| MirsError::Internal("用户创建后读取失败".to_string()))?;
    let user = User::from(db_user);

    info!("新用户注册: {} ({})", user.username, user.role.as_str());
    audit::record(&state, &user, "register_user", "user", &user.id.to_string());

    Ok((StatusCode::CREATED, Json(user)))
}

/// 用户登录
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let queries = DatabaseQueries::new(&state.db);

    let db_user = match queries.get_user_by_username(&req.username).await? {
        Some(u) => u,
        None => {
            warn!("登录失败，用户不存在: {}", req.username);
            return Err(MirsError::Unauthorized("用户名或密码错误".to_string()).into());
        }
    };

    if !state.auth.verify_password(&req.password, &db_user.hashed_password) {
        warn!("登录失败，密码错误: {}", req.username);
        return Err(MirsError::Unauthorized("用户名或密码错误".to_string()).into());
    }

    let user = User::from(db_user);
    if !user.is_active {
        return Err(MirsError::Unauthorized("账户已停用".to_string()).into());
    }

    let (access_token, expires_at) = state.auth.issue_token(&user)?;
    queries.update_last_login(&user.id).await?;

    info!("用户登录成功: {}", user.username);
    audit::record(&state, &user, "login", "user", &user.id.to_string());

    Ok(Json(LoginResponse {
        access_token,
        token_type: "bearer".to_string(),
        expires_in: state.auth.token_expiry_minutes() * 60,
        expires_at,
        user,
    }))
}

/// 获取当前用户信息
pub async fn me_handler(Extension(user): Extension<User>) -> Json<User> {
    Json(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "dr_chen".to_string(),
            email: "chen@hospital.example".to_string(),
            full_name: "Chen Wei".to_string(),
            role: UserRole::Radiologist,
            is_active: true,
            created_at: Utc::now(),
            last_login: None,
        }
    }

    #[test]
    fn test_password_hash_and_verify() {
        let auth = AuthService::new("test-secret", 30);
        let hash = auth.hash_password("correct horse battery").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(auth.verify_password("correct horse battery", &hash));
        assert!(!auth.verify_password("wrong password", &hash));
    }

    #[test]
    fn test_verify_rejects_malformed_hash() {
        let auth = AuthService::new("test-secret", 30);
        assert!(!auth.verify_password("anything", "not-a-phc-hash"));
    }

    #[test]
    fn test_token_roundtrip() {
        let auth = AuthService::new("test-secret", 30);
        let user = sample_user();
        let (token, expires_at) = auth.issue_token(&user).unwrap();

        let claims = auth.decode_token(&token).unwrap();
        assert_eq!(claims.sub, "dr_chen");
        assert_eq!(claims.uid, user.id.to_string());
        assert_eq!(claims.role, "radiologist");
        assert_eq!(claims.exp as i64, expires_at.timestamp());
    }

    #[test]
    fn test_expired_token_rejected() {
        let auth = AuthService::new("test-secret", -5);
        let (token, _) = auth.issue_token(&sample_user()).unwrap();
        assert!(auth.decode_token(&token).is_err());
    }

    #[test]
    fn test_token_from_other_secret_rejected() {
        let issuer = AuthService::new("secret-a", 30);
        let verifier = AuthService::new("secret-b", 30);
        let (token, _) = issuer.issue_token(&sample_user()).unwrap();
        assert!(verifier.decode_token(&token).is_err());
    }
}
