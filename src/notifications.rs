//! 通知网关
//!
//! 引擎只依赖 [`Notifier`] trait；投递失败只记录日志和指标，
//! 不会让已经提交的状态变更回滚或报错。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    PermitExpiration,
    PermitExpiryChanged,
    PermitStatusChanged,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::PermitExpiration => "PERMIT_EXPIRATION",
            NotificationKind::PermitExpiryChanged => "PERMIT_EXPIRY_CHANGED",
            NotificationKind::PermitStatusChanged => "PERMIT_STATUS_CHANGED",
        }
    }
}

/// 单条通知
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub link_url: Option<String>,
    pub data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        user_id: Uuid,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            kind,
            title: title.into(),
            message: message.into(),
            link_url: None,
            data: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_link(mut self, link_url: impl Into<String>) -> Self {
        self.link_url = Some(link_url.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// 通知投递错误
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification store error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;

    /// 批量投递，按输入顺序逐条返回结果；默认并发调用 [`Notifier::notify`]
    async fn notify_many(&self, notifications: &[Notification]) -> Vec<Result<(), NotifyError>> {
        join_all(notifications.iter().map(|n| self.notify(n))).await
    }
}

/// 投递失败记录
#[derive(Debug)]
pub struct DeliveryFailure {
    pub user_id: Uuid,
    pub error: NotifyError,
}

/// 通知网关：并发扇出，失败只记录
#[derive(Clone)]
pub struct NotificationGateway {
    notifier: Arc<dyn Notifier>,
}

impl NotificationGateway {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// 整批交给 [`Notifier::notify_many`]，返回失败条目供调用方汇总
    pub async fn deliver(&self, notifications: Vec<Notification>) -> Vec<DeliveryFailure> {
        if notifications.is_empty() {
            return Vec::new();
        }

        let results = self.notifier.notify_many(&notifications).await;

        let mut failures = Vec::new();
        for (notification, result) in notifications.iter().zip(results) {
            if let Err(error) = result {
                tracing::warn!(
                    user_id = %notification.user_id,
                    kind = notification.kind.as_str(),
                    error = %error,
                    "Failed to deliver notification"
                );
                metrics::counter!("notification_failures_total").increment(1);
                failures.push(DeliveryFailure {
                    user_id: notification.user_id,
                    error,
                });
            }
        }

        tracing::debug!(
            total = notifications.len(),
            failed = failures.len(),
            "Notifications dispatched"
        );

        failures
    }
}

/// 写入 notifications 表，由前端轮询展示
pub struct PgNotificationSink {
    db: PgPool,
}

impl PgNotificationSink {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Notifier for PgNotificationSink {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, kind, title, message, link_url, data, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(notification.id)
        .bind(notification.user_id)
        .bind(notification.kind.as_str())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(&notification.link_url)
        .bind(&notification.data)
        .bind(notification.created_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }
}

/// 仅输出日志（内存模式使用）
#[derive(Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            user_id = %notification.user_id,
            kind = notification.kind.as_str(),
            title = %notification.title,
            "Notification"
        );
        Ok(())
    }
}
