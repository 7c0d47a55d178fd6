//! HTTP 中间件与应用状态
//! 请求追踪

use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    auth::JwtVerifier,
    config::AppConfig,
    error::AppError,
    notifications::{NotificationGateway, Notifier},
    repository::Store,
    services::{
        AuditService, ExpirationService, HierarchyService, PermitService, RiskAssessmentService,
    },
};

/// 应用状态
///
/// 存储句柄显式构造后注入各个服务，不使用全局单例。
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn Store>,
    pub jwt_verifier: Arc<JwtVerifier>,
    pub audit_service: Arc<AuditService>,
    pub hierarchy_service: Arc<HierarchyService>,
    pub risk_assessment_service: Arc<RiskAssessmentService>,
    pub permit_service: Arc<PermitService>,
    pub expiration_service: Arc<ExpirationService>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, AppError> {
        let jwt_verifier = Arc::new(JwtVerifier::from_config(&config.security)?);
        let notifications = NotificationGateway::new(notifier);

        let audit_service = Arc::new(AuditService::new(store.clone()));
        let hierarchy_service = Arc::new(HierarchyService::new(
            store.clone(),
            audit_service.clone(),
        ));
        let risk_assessment_service = Arc::new(RiskAssessmentService::new(
            store.clone(),
            audit_service.clone(),
            config.workflow.review_policy,
        ));
        let permit_service = Arc::new(PermitService::new(
            store.clone(),
            hierarchy_service.clone(),
            audit_service.clone(),
            notifications.clone(),
        ));
        let expiration_service = Arc::new(ExpirationService::new(
            store.clone(),
            audit_service.clone(),
            notifications,
        ));

        Ok(Self {
            config,
            store,
            jwt_verifier,
            audit_service,
            hierarchy_service,
            risk_assessment_service,
            permit_service,
            expiration_service,
            started_at: Instant::now(),
        })
    }
}

/// 请求追踪中间件
/// 为每个请求生成 trace_id 和 request_id，并记录指标
pub async fn request_tracking_middleware(req: Request, next: Next) -> Response {
    let trace_id = extract_or_generate_trace_id(req.headers());
    let request_id = Uuid::new_v4().to_string();

    let method = req.method().clone();
    let uri = req.uri().path().to_string();

    let span = tracing::info_span!(
        "http_request",
        trace_id = %trace_id,
        request_id = %request_id,
        method = %method,
        uri = %uri,
    );

    async move {
        let start = Instant::now();

        let mut response = next.run(req).await;

        let elapsed = start.elapsed();

        // 指标标签只使用有限取值
        let status = response.status().as_u16();
        let method_name = match method.as_str() {
            "GET" => "GET",
            "POST" => "POST",
            "PUT" => "PUT",
            "DELETE" => "DELETE",
            "PATCH" => "PATCH",
            _ => "UNKNOWN",
        };
        let status_class = match status {
            200..=299 => "2xx",
            400..=499 => "4xx",
            500..=599 => "5xx",
            _ => "other",
        };

        metrics::counter!("http_requests_total", "method" => method_name, "status" => status_class)
            .increment(1);
        metrics::histogram!("http_request_duration_seconds").record(elapsed.as_secs_f64());

        tracing::info!(
            method = %method,
            uri = %uri,
            status = status,
            elapsed_ms = elapsed.as_millis() as u64,
            "Request completed"
        );

        if let Ok(value) = HeaderValue::from_str(&trace_id) {
            response.headers_mut().insert("x-trace-id", value);
        }
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert("x-request-id", value);
        }

        response
    }
    .instrument(span)
    .await
}

/// 从请求头中提取或生成 trace_id
fn extract_or_generate_trace_id(headers: &HeaderMap) -> String {
    headers
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty() && s.len() <= 128)
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}
