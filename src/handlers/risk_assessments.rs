//! Risk assessment API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    auth::AuthContext,
    error::Result,
    middleware::AppState,
    models::risk::{CreateRiskAssessmentRequest, ReviewRequest},
};

/// 为许可提交风险评估（评估人为当前用户）
pub async fn create_risk_assessment(
    State(state): State<Arc<AppState>>,
    Path(permit_id): Path<Uuid>,
    auth: AuthContext,
    Json(request): Json<CreateRiskAssessmentRequest>,
) -> Result<impl IntoResponse> {
    let service = &state.risk_assessment_service;
    service.require_assessor(auth.user_id, permit_id).await?;

    let assessment = service
        .create(permit_id, auth.user_id, request.hazards)
        .await?;

    Ok((StatusCode::CREATED, Json(assessment)))
}

pub async fn list_risk_assessments(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
) -> Result<impl IntoResponse> {
    let assessments = state
        .risk_assessment_service
        .list_visible_to(auth.user_id)
        .await?;
    Ok(Json(assessments))
}

/// HSE 复核
pub async fn review_risk_assessment(
    State(state): State<Arc<AppState>>,
    Path(assessment_id): Path<Uuid>,
    auth: AuthContext,
    Json(request): Json<ReviewRequest>,
) -> Result<impl IntoResponse> {
    let assessment = state
        .risk_assessment_service
        .review(assessment_id, auth.user_id, request.approved)
        .await?;
    Ok(Json(assessment))
}
