//! 路由注册
//! 创建所有 API 路由并应用中间件

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, limit::RequestBodyLimitLayer};

use crate::{handlers, middleware::AppState};

/// 请求体上限（风险评估的危害列表是最大的请求）
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// 创建应用路由
pub fn create_router(state: Arc<AppState>) -> Router {
    // 公开端点（健康检查）
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check));

    // 定时任务端点（API Key 校验在处理器内完成）
    let task_routes = Router::new().route(
        "/api/v1/tasks/expire-permits",
        post(handlers::tasks::expire_permits),
    );

    // 需要认证的路由
    let authenticated_routes = Router::new()
        // 许可
        .route(
            "/api/v1/permits",
            get(handlers::permits::list_permits).post(handlers::permits::create_permit),
        )
        .route("/api/v1/permits/{id}", get(handlers::permits::get_permit))
        .route(
            "/api/v1/permits/by-number/{number}",
            get(handlers::permits::get_permit_by_number),
        )
        .route(
            "/api/v1/permits/{id}/actions",
            post(handlers::permits::execute_action),
        )
        .route(
            "/api/v1/permits/{id}/actions/validate",
            post(handlers::permits::validate_action),
        )
        .route(
            "/api/v1/permits/{id}/parties",
            put(handlers::permits::assign_parties),
        )
        .route(
            "/api/v1/permits/{id}/expiry",
            put(handlers::permits::update_expiry),
        )
        .route(
            "/api/v1/permits/{id}/activity",
            get(handlers::permits::get_permit_activity),
        )
        .route(
            "/api/v1/permits/{id}/risk-assessment",
            get(handlers::permits::get_permit_risk_assessment)
                .post(handlers::risk_assessments::create_risk_assessment),
        )
        // 风险评估
        .route(
            "/api/v1/risk-assessments",
            get(handlers::risk_assessments::list_risk_assessments),
        )
        .route(
            "/api/v1/risk-assessments/{id}/review",
            post(handlers::risk_assessments::review_risk_assessment),
        )
        // 组织层级
        .route(
            "/api/v1/users/{id}/subordinates",
            get(handlers::hierarchy::list_subordinates),
        )
        .route(
            "/api/v1/users/{id}/supervisors",
            get(handlers::hierarchy::list_supervisors),
        )
        .route(
            "/api/v1/users/{id}/supervisor",
            put(handlers::hierarchy::update_supervisor),
        )
        .route(
            "/api/v1/users/{id}/supervisor/validate",
            post(handlers::hierarchy::validate_supervisor_change),
        )
        .route(
            "/api/v1/companies/{id}/hierarchy",
            get(handlers::hierarchy::company_hierarchy),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.jwt_verifier.clone(),
            crate::auth::middleware::jwt_auth_middleware,
        ));

    // 组合所有路由
    Router::new()
        .merge(public_routes)
        .merge(task_routes)
        .merge(authenticated_routes)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(CompressionLayer::new())
        .layer(axum::middleware::from_fn(crate::middleware::request_tracking_middleware))
        .with_state(state)
}
