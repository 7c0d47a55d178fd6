//! 日志与追踪
//!
//! 结构化日志：生产环境输出 JSON，开发环境输出 pretty 格式。
//! 许可相关的 span 字段（permit_id、actor_id、action）由服务层的 `#[instrument]` 提供。

use crate::config::AppConfig;
use crate::error::AppError;
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

/// 默认压低依赖库的日志，业务模块使用配置级别
fn default_directives(level: &str) -> String {
    format!("{level},sqlx=warn,tower_http=warn,hyper=warn")
}

/// 初始化全局 subscriber；重复调用返回 Config 错误
pub fn init_telemetry(config: &AppConfig) -> Result<(), AppError> {
    // RUST_LOG 优先
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(&config.logging.level)))
        .map_err(|e| AppError::Config(format!("Invalid log filter: {}", e)))?;

    let log_layer = if config.logging.format.eq_ignore_ascii_case("pretty") {
        tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_events(FmtSpan::CLOSE)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(log_layer)
        .try_init()
        .map_err(|e| AppError::Config(format!("Telemetry already initialized: {}", e)))?;

    tracing::info!(
        service = env!("CARGO_PKG_NAME"),
        level = %config.logging.level,
        format = %config.logging.format,
        backend = ?config.storage.backend,
        review_policy = ?config.workflow.review_policy,
        "Telemetry initialized"
    );
    Ok(())
}
