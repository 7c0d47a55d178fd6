//! 定时任务触发端点（由外部调度器调用）

use axum::{extract::State, http::HeaderMap, response::IntoResponse, Json};
use chrono::Utc;
use std::sync::Arc;

use crate::{auth::verify_cron_key, error::Result, middleware::AppState};

/// 到期清扫
pub async fn expire_permits(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    verify_cron_key(&headers, &state.config.security.cron_api_key)?;

    let report = state.expiration_service.sweep(Utc::now()).await?;
    Ok(Json(report))
}
