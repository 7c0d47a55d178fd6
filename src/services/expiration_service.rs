//! 到期处理服务
//!
//! 由外部定时任务触发清扫，不在进程内调度。清扫绕过操作人授权，
//! 与普通动作一样通过条件状态写入保证 ACTIVE 只会被一方消费。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{
    permit::{Permit, PermitStatus, StatusChange},
    user::Role,
};
use crate::notifications::{Notification, NotificationGateway, NotificationKind};
use crate::repository::Store;
use crate::services::audit_service::{AuditAction, AuditService};

/// 可以修改到期时间的角色
const EXPIRY_EDITOR_ROLES: &[Role] = &[Role::HseLead, Role::HseEngineer, Role::Pic];

/// 需要收到到期相关通知的公司角色
const EXPIRY_WATCHER_ROLES: &[Role] = &[Role::HseLead, Role::HseEngineer];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepStage {
    Transition,
    Notification,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepFailure {
    pub permit_id: Uuid,
    pub stage: SweepStage,
    pub reason: String,
}

/// 单次清扫结果
#[derive(Debug, Default, Serialize)]
pub struct SweepReport {
    pub expired: Vec<Uuid>,
    pub failures: Vec<SweepFailure>,
}

impl SweepReport {
    pub fn expired_count(&self) -> usize {
        self.expired.len()
    }
}

pub struct ExpirationService {
    store: Arc<dyn Store>,
    audit: Arc<AuditService>,
    notifications: NotificationGateway,
}

impl ExpirationService {
    pub fn new(
        store: Arc<dyn Store>,
        audit: Arc<AuditService>,
        notifications: NotificationGateway,
    ) -> Self {
        Self {
            store,
            audit,
            notifications,
        }
    }

    /// 收件人：申请人、负责人以及公司所有 HSE_LEAD / HSE_ENGINEER（去重）
    async fn recipients(&self, permit: &Permit) -> Result<Vec<Uuid>> {
        let mut ids = vec![permit.requester_id];
        ids.extend(permit.pic_id);

        for watcher in self
            .store
            .list_users_with_roles(permit.company_id, EXPIRY_WATCHER_ROLES)
            .await?
        {
            ids.push(watcher.id);
        }

        let mut seen = std::collections::HashSet::new();
        ids.retain(|id| seen.insert(*id));
        Ok(ids)
    }

    /// 把所有 end_date < now 的 ACTIVE 许可置为 EXPIRED
    ///
    /// 单个许可失败只记入报告，不中断整批。
    #[instrument(skip(self))]
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let candidates = self.store.find_active_permits_past_end_date(now).await?;
        let mut report = SweepReport::default();

        for permit in candidates {
            let change = StatusChange {
                permit_id: permit.id,
                from: PermitStatus::Active,
                to: PermitStatus::Expired,
                approver_id: None,
            };

            let expired = match self.store.update_permit_status(&change).await {
                Ok(Some(expired)) => expired,
                Ok(None) => {
                    warn!(permit_id = %permit.id, "Permit left ACTIVE before expiry");
                    report.failures.push(SweepFailure {
                        permit_id: permit.id,
                        stage: SweepStage::Transition,
                        reason: "Permit is no longer active".to_string(),
                    });
                    continue;
                }
                Err(e) => {
                    error!(permit_id = %permit.id, error = %e, "Failed to expire permit");
                    report.failures.push(SweepFailure {
                        permit_id: permit.id,
                        stage: SweepStage::Transition,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            report.expired.push(expired.id);

            self.audit
                .log_action(
                    None,
                    AuditAction::PermitExpired,
                    expired.id,
                    format!("Permit automatically expired on {}", now.to_rfc3339()),
                )
                .await;

            if let Err(reason) = self.notify_expired(&expired).await {
                report.failures.push(SweepFailure {
                    permit_id: expired.id,
                    stage: SweepStage::Notification,
                    reason,
                });
            }
        }

        metrics::counter!("permit_sweep_expired_total").increment(report.expired.len() as u64);
        metrics::counter!("permit_sweep_failures_total").increment(report.failures.len() as u64);

        info!(
            expired = report.expired_count(),
            failures = report.failures.len(),
            "Expiration sweep finished"
        );
        Ok(report)
    }

    async fn notify_expired(&self, permit: &Permit) -> std::result::Result<(), String> {
        let recipients = self.recipients(permit).await.map_err(|e| e.to_string())?;

        let batch = recipients
            .into_iter()
            .map(|user_id| {
                Notification::new(
                    user_id,
                    NotificationKind::PermitExpiration,
                    "Permit Expired",
                    format!("Permit {} has expired.", permit.permit_number),
                )
                .with_link(format!("/permits/{}", permit.id))
                .with_data(serde_json::json!({
                    "permit_id": permit.id,
                    "permit_number": permit.permit_number,
                    "expiry_date": permit.end_date.to_rfc3339(),
                }))
            })
            .collect();

        let failures = self.notifications.deliver(batch).await;
        if failures.is_empty() {
            Ok(())
        } else {
            Err(format!(
                "{} notification(s) failed: {}",
                failures.len(),
                failures
                    .iter()
                    .map(|f| format!("{} ({})", f.user_id, f.error))
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        }
    }

    /// 修改到期时间，不改变状态
    #[instrument(skip(self))]
    pub async fn update_expiry(
        &self,
        permit_id: Uuid,
        new_end_date: DateTime<Utc>,
        actor_id: Uuid,
    ) -> Result<Permit> {
        let actor = self
            .store
            .get_user(actor_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("user {}", actor_id)))?;

        if !EXPIRY_EDITOR_ROLES.contains(&actor.role) {
            return Err(AppError::unauthorized(
                "User does not have permission to modify permit expiry date",
            ));
        }

        let permit = self
            .store
            .get_permit(permit_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("permit {}", permit_id)))?;

        if actor.company_id != permit.company_id {
            return Err(AppError::unauthorized(
                "User does not belong to the permit's company",
            ));
        }

        if new_end_date <= permit.start_date {
            return Err(AppError::InvalidRange(
                "End date must be after start date".to_string(),
            ));
        }

        let updated = self
            .store
            .update_permit_end_date(permit_id, new_end_date)
            .await?
            .ok_or_else(|| AppError::not_found(format!("permit {}", permit_id)))?;

        self.audit
            .log_action(
                Some(actor.id),
                AuditAction::ExpiryDateModified,
                permit_id,
                format!("Permit expiry date changed to {}", new_end_date.to_rfc3339()),
            )
            .await;

        let recipients = match self.recipients(&updated).await {
            Ok(recipients) => recipients,
            Err(e) => {
                warn!(
                    permit_id = %permit_id,
                    error = %e,
                    "Failed to resolve expiry change recipients"
                );
                metrics::counter!("notification_failures_total").increment(1);
                Vec::new()
            }
        };
        let batch = recipients
            .into_iter()
            .filter(|id| *id != actor.id)
            .map(|user_id| {
                Notification::new(
                    user_id,
                    NotificationKind::PermitExpiryChanged,
                    "Permit Expiry Date Changed",
                    format!(
                        "The expiry date for permit {} has been changed to {} by {}.",
                        updated.permit_number,
                        new_end_date.format("%Y-%m-%d %H:%M UTC"),
                        actor.name
                    ),
                )
                .with_link(format!("/permits/{}", updated.id))
                .with_data(serde_json::json!({
                    "permit_id": updated.id,
                    "permit_number": updated.permit_number,
                    "new_expiry_date": new_end_date.to_rfc3339(),
                    "changed_by": actor.id,
                }))
            })
            .collect();
        self.notifications.deliver(batch).await;

        info!(permit_id = %permit_id, end_date = %new_end_date, "Permit expiry updated");
        Ok(updated)
    }
}
