//! Hierarchy API handlers

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use super::current_user;
use crate::{
    auth::AuthContext,
    error::{AppError, Result},
    middleware::AppState,
    models::user::{Role, UpdateSupervisorRequest, User, UserSummary},
};

/// 可以调整汇报关系的角色
const HIERARCHY_ADMIN_ROLES: &[Role] = &[Role::Admin, Role::CompanyAdmin];

#[derive(Debug, Deserialize)]
pub struct SubordinatesQuery {
    #[serde(default)]
    pub recursive: bool,
}

/// 目标用户必须与当前用户同公司
async fn same_company_user(state: &AppState, actor: &User, user_id: Uuid) -> Result<User> {
    let user = state
        .store
        .get_user(user_id)
        .await?
        .filter(|u| u.company_id == actor.company_id)
        .ok_or_else(|| AppError::not_found(format!("user {}", user_id)))?;
    Ok(user)
}

pub async fn list_subordinates(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<SubordinatesQuery>,
    auth: AuthContext,
) -> Result<impl IntoResponse> {
    let actor = current_user(&state, auth).await?;
    same_company_user(&state, &actor, user_id).await?;

    let users = state
        .hierarchy_service
        .subordinates(user_id, query.recursive)
        .await?;
    Ok(Json(users.into_iter().map(UserSummary::from).collect::<Vec<_>>()))
}

pub async fn list_supervisors(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
    auth: AuthContext,
) -> Result<impl IntoResponse> {
    let actor = current_user(&state, auth).await?;
    same_company_user(&state, &actor, user_id).await?;

    let users = state.hierarchy_service.supervisors(user_id).await?;
    Ok(Json(users.into_iter().map(UserSummary::from).collect::<Vec<_>>()))
}

pub async fn validate_supervisor_change(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
    auth: AuthContext,
    Json(request): Json<UpdateSupervisorRequest>,
) -> Result<impl IntoResponse> {
    let actor = current_user(&state, auth).await?;
    same_company_user(&state, &actor, user_id).await?;

    let check = state
        .hierarchy_service
        .validate_hierarchy_change(user_id, request.supervisor_id)
        .await?;
    Ok(Json(check))
}

/// 调整直属上级（仅管理员）
pub async fn update_supervisor(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
    auth: AuthContext,
    Json(request): Json<UpdateSupervisorRequest>,
) -> Result<impl IntoResponse> {
    let actor = current_user(&state, auth).await?;
    same_company_user(&state, &actor, user_id).await?;

    if !HIERARCHY_ADMIN_ROLES.contains(&actor.role) {
        return Err(AppError::unauthorized(
            "Only administrators can change reporting lines",
        ));
    }

    let user = state
        .hierarchy_service
        .update_hierarchy(user_id, request.supervisor_id, actor.id)
        .await?;
    Ok(Json(UserSummary::from(user)))
}

/// 公司组织架构
pub async fn company_hierarchy(
    State(state): State<Arc<AppState>>,
    Path(company_id): Path<Uuid>,
    auth: AuthContext,
) -> Result<impl IntoResponse> {
    let actor = current_user(&state, auth).await?;
    if actor.company_id != company_id {
        return Err(AppError::unauthorized(
            "Cannot view another company's hierarchy",
        ));
    }

    let forest = state.hierarchy_service.company_hierarchy(company_id).await?;
    Ok(Json(forest))
}
