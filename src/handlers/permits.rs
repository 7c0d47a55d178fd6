//! Permit API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use super::current_user;
use crate::{
    auth::AuthContext,
    error::Result,
    middleware::AppState,
    models::permit::{
        ActionRequest, AssignPartiesRequest, CreatePermitRequest, PermitAction,
        UpdateExpiryRequest,
    },
};

/// 创建许可（申请人为当前用户）
pub async fn create_permit(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Json(request): Json<CreatePermitRequest>,
) -> Result<impl IntoResponse> {
    let user = current_user(&state, auth).await?;
    let permit = state
        .permit_service
        .create(request.into_new_permit(user.id, user.company_id))
        .await?;

    Ok((StatusCode::CREATED, Json(permit)))
}

/// 当前用户可见的许可
pub async fn list_permits(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
) -> Result<impl IntoResponse> {
    let permits = state.permit_service.list_visible_to(auth.user_id).await?;
    Ok(Json(permits))
}

pub async fn get_permit(
    State(state): State<Arc<AppState>>,
    Path(permit_id): Path<Uuid>,
    auth: AuthContext,
) -> Result<impl IntoResponse> {
    let permit = state
        .permit_service
        .get_visible(auth.user_id, permit_id)
        .await?;
    Ok(Json(permit))
}

pub async fn get_permit_by_number(
    State(state): State<Arc<AppState>>,
    Path(permit_number): Path<String>,
    auth: AuthContext,
) -> Result<impl IntoResponse> {
    let permit = state
        .permit_service
        .get_by_number(auth.user_id, &permit_number)
        .await?;
    Ok(Json(permit))
}

fn to_action(permit_id: Uuid, auth: AuthContext, request: ActionRequest) -> PermitAction {
    PermitAction {
        kind: request.kind,
        actor_id: auth.user_id,
        permit_id,
        comment: request.comment,
    }
}

/// 执行状态动作
pub async fn execute_action(
    State(state): State<Arc<AppState>>,
    Path(permit_id): Path<Uuid>,
    auth: AuthContext,
    Json(request): Json<ActionRequest>,
) -> Result<impl IntoResponse> {
    let permit = state
        .permit_service
        .execute(&to_action(permit_id, auth, request))
        .await?;
    Ok(Json(permit))
}

/// 仅校验动作，不修改数据
pub async fn validate_action(
    State(state): State<Arc<AppState>>,
    Path(permit_id): Path<Uuid>,
    auth: AuthContext,
    Json(request): Json<ActionRequest>,
) -> Result<impl IntoResponse> {
    let validation = state
        .permit_service
        .validate_action(&to_action(permit_id, auth, request))
        .await?;
    Ok(Json(validation))
}

pub async fn assign_parties(
    State(state): State<Arc<AppState>>,
    Path(permit_id): Path<Uuid>,
    auth: AuthContext,
    Json(request): Json<AssignPartiesRequest>,
) -> Result<impl IntoResponse> {
    let permit = state
        .permit_service
        .assign_parties(permit_id, auth.user_id, request.holder_id, request.pic_id)
        .await?;
    Ok(Json(permit))
}

/// 修改到期时间
pub async fn update_expiry(
    State(state): State<Arc<AppState>>,
    Path(permit_id): Path<Uuid>,
    auth: AuthContext,
    Json(request): Json<UpdateExpiryRequest>,
) -> Result<impl IntoResponse> {
    let permit = state
        .expiration_service
        .update_expiry(permit_id, request.end_date, auth.user_id)
        .await?;
    Ok(Json(permit))
}

/// 许可活动历史
pub async fn get_permit_activity(
    State(state): State<Arc<AppState>>,
    Path(permit_id): Path<Uuid>,
    auth: AuthContext,
) -> Result<impl IntoResponse> {
    state
        .permit_service
        .get_visible(auth.user_id, permit_id)
        .await?;
    let history = state.audit_service.history(permit_id).await?;
    Ok(Json(history))
}

/// 许可关联的风险评估
pub async fn get_permit_risk_assessment(
    State(state): State<Arc<AppState>>,
    Path(permit_id): Path<Uuid>,
    auth: AuthContext,
) -> Result<impl IntoResponse> {
    let assessment = state
        .risk_assessment_service
        .get_visible_for_permit(auth.user_id, permit_id)
        .await?;
    Ok(Json(assessment))
}
