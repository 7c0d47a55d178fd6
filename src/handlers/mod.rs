//! HTTP handlers

pub mod health;
pub mod hierarchy;
pub mod permits;
pub mod risk_assessments;
pub mod tasks;

use crate::{
    auth::AuthContext,
    error::{AppError, Result},
    middleware::AppState,
    models::user::User,
};

/// 令牌对应的用户；不存在时视为认证失败
pub(crate) async fn current_user(state: &AppState, auth: AuthContext) -> Result<User> {
    state
        .store
        .get_user(auth.user_id)
        .await?
        .ok_or(AppError::Unauthenticated)
}
