//! 活动日志服务
//!
//! 状态变更提交之后才写日志，写入失败只记录告警，不影响已提交的变更。

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{error::AppError, models::activity::ActivityEntry, repository::Store};

/// 活动类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    PermitCreated,
    PermitSubmitted,
    PermitApproved,
    PermitRejected,
    PermitActivated,
    PermitSuspended,
    PermitCompleted,
    PermitCancelled,
    PermitExpired,
    PartiesAssigned,
    ExpiryDateModified,
    RiskAssessmentCreated,
    RiskAssessmentReviewed,
    SupervisorChanged,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::PermitCreated => "PERMIT_CREATED",
            AuditAction::PermitSubmitted => "PERMIT_SUBMITTED",
            AuditAction::PermitApproved => "PERMIT_APPROVED",
            AuditAction::PermitRejected => "PERMIT_REJECTED",
            AuditAction::PermitActivated => "PERMIT_ACTIVATED",
            AuditAction::PermitSuspended => "PERMIT_SUSPENDED",
            AuditAction::PermitCompleted => "PERMIT_COMPLETED",
            AuditAction::PermitCancelled => "PERMIT_CANCELLED",
            AuditAction::PermitExpired => "PERMIT_EXPIRED",
            AuditAction::PartiesAssigned => "PARTIES_ASSIGNED",
            AuditAction::ExpiryDateModified => "EXPIRY_DATE_MODIFIED",
            AuditAction::RiskAssessmentCreated => "RISK_ASSESSMENT_CREATED",
            AuditAction::RiskAssessmentReviewed => "RISK_ASSESSMENT_REVIEWED",
            AuditAction::SupervisorChanged => "SUPERVISOR_CHANGED",
        }
    }

    pub fn entity_type(&self) -> &'static str {
        match self {
            AuditAction::RiskAssessmentCreated | AuditAction::RiskAssessmentReviewed => {
                "RISK_ASSESSMENT"
            }
            AuditAction::SupervisorChanged => "USER",
            _ => "PERMIT",
        }
    }
}

pub struct AuditService {
    store: Arc<dyn Store>,
}

impl AuditService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// 记录一条活动；`performed_by = None` 表示系统操作
    pub async fn log_action(
        &self,
        performed_by: Option<Uuid>,
        action: AuditAction,
        entity_id: Uuid,
        details: impl Into<String>,
    ) {
        let entry = ActivityEntry {
            id: Uuid::new_v4(),
            entity_type: action.entity_type().to_string(),
            entity_id,
            action: action.as_str().to_string(),
            performed_by,
            details: details.into(),
            occurred_at: Utc::now(),
        };

        if let Err(e) = self.store.insert_activity(&entry).await {
            tracing::warn!(
                entity_id = %entity_id,
                action = action.as_str(),
                error = %e,
                "Failed to write activity log"
            );
        }
    }

    /// 查询实体的活动历史（按时间正序）
    pub async fn history(&self, entity_id: Uuid) -> Result<Vec<ActivityEntry>, AppError> {
        self.store.list_activity(entity_id).await
    }
}
