//! JWT 认证中间件

use crate::{auth::jwt::JwtVerifier, error::AppError};
use axum::{
    extract::{FromRequestParts, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use secrecy::{ExposeSecret, Secret};
use std::sync::Arc;
use uuid::Uuid;

/// 认证上下文（附加到请求扩展）
#[derive(Debug, Clone, Copy)]
pub struct AuthContext {
    pub user_id: Uuid,
}

// 实现 FromRequestParts 以便在 handler 中直接提取 AuthContext
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .copied()
            .ok_or(AppError::Unauthenticated)
    }
}

/// 从 Authorization 头提取 Bearer 令牌
pub fn extract_token(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or(AppError::Unauthenticated)
}

/// JWT 认证中间件 - 必须认证
pub async fn jwt_auth_middleware(
    State(verifier): State<Arc<JwtVerifier>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(req.headers())?;
    let claims = verifier.verify(&token)?;

    let auth_context = AuthContext {
        user_id: claims.user_id()?,
    };
    req.extensions_mut().insert(auth_context);

    Ok(next.run(req).await)
}

/// 定时任务端点的 API Key 校验
pub fn verify_cron_key(headers: &HeaderMap, expected: &Secret<String>) -> Result<(), AppError> {
    let provided = extract_token(headers)?;
    let expected = expected.expose_secret();

    // 逐字节比较，不提前返回
    let matches = provided.len() == expected.len()
        && provided
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0;

    if matches {
        Ok(())
    } else {
        tracing::warn!("Rejected cron request with invalid API key");
        Err(AppError::Unauthenticated)
    }
}
