//! 工作许可服务
//! 许可创建、编号、状态迁移和可见性查询

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::models::{
    permit::{
        format_permit_number, is_valid_permit_number, ActionKind, ActionValidation, NewPermit,
        Permit, PermitAction, PermitStatus, StatusChange,
    },
    user::{Role, User},
};
use crate::notifications::{Notification, NotificationGateway, NotificationKind};
use crate::repository::Store;
use crate::services::audit_service::{AuditAction, AuditService};
use crate::services::hierarchy_service::HierarchyService;
use crate::workflow::{rules, visibility};

/// 可以指派持证人 / 负责人的角色（申请人本人也可以）
const ASSIGNMENT_ROLES: &[Role] = &[Role::Admin, Role::HseLead, Role::Pic];

fn audit_action_for(kind: ActionKind) -> AuditAction {
    match kind {
        ActionKind::Approve => AuditAction::PermitApproved,
        ActionKind::Reject => AuditAction::PermitRejected,
        ActionKind::Suspend => AuditAction::PermitSuspended,
        ActionKind::Complete => AuditAction::PermitCompleted,
        ActionKind::Cancel => AuditAction::PermitCancelled,
        ActionKind::Submit => AuditAction::PermitSubmitted,
        ActionKind::Activate => AuditAction::PermitActivated,
    }
}

pub struct PermitService {
    store: Arc<dyn Store>,
    hierarchy: Arc<HierarchyService>,
    audit: Arc<AuditService>,
    notifications: NotificationGateway,
}

impl PermitService {
    pub fn new(
        store: Arc<dyn Store>,
        hierarchy: Arc<HierarchyService>,
        audit: Arc<AuditService>,
        notifications: NotificationGateway,
    ) -> Self {
        Self {
            store,
            hierarchy,
            audit,
            notifications,
        }
    }

    async fn require_user(&self, user_id: Uuid) -> Result<User> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("user {}", user_id)))
    }

    async fn require_permit(&self, permit_id: Uuid) -> Result<Permit> {
        self.store
            .get_permit(permit_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("permit {}", permit_id)))
    }

    /// 创建许可（DRAFT）
    #[instrument(skip(self, new_permit), fields(requester_id = %new_permit.requester_id))]
    pub async fn create(&self, new_permit: NewPermit) -> Result<Permit> {
        new_permit.validate()?;

        if new_permit.end_date <= new_permit.start_date {
            return Err(AppError::InvalidRange(
                "End date must be after start date".to_string(),
            ));
        }

        let requester = self.require_user(new_permit.requester_id).await?;
        if requester.company_id != new_permit.company_id {
            return Err(AppError::validation(
                "Requester does not belong to the permit's company",
            ));
        }

        let now = Utc::now();
        let sequence = self.store.next_permit_sequence(new_permit.company_id).await?;
        let permit = Permit {
            id: Uuid::new_v4(),
            permit_number: format_permit_number(new_permit.company_id, now, sequence),
            work_type: new_permit.work_type,
            location: new_permit.location,
            start_date: new_permit.start_date,
            end_date: new_permit.end_date,
            status: PermitStatus::Draft,
            requester_id: requester.id,
            approver_id: None,
            holder_id: None,
            pic_id: None,
            company_id: new_permit.company_id,
            description: new_permit.description,
            equipment: new_permit.equipment,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        let permit = self.store.insert_permit(&permit).await?;

        self.audit
            .log_action(
                Some(requester.id),
                AuditAction::PermitCreated,
                permit.id,
                format!("Permit {} created for {}", permit.permit_number, permit.work_type),
            )
            .await;

        info!(
            permit_id = %permit.id,
            permit_number = %permit.permit_number,
            "Permit created"
        );
        Ok(permit)
    }

    /// 校验动作，不修改任何数据
    #[instrument(skip(self, action), fields(action = %action.kind, permit_id = %action.permit_id))]
    pub async fn validate_action(&self, action: &PermitAction) -> Result<ActionValidation> {
        let actor = self.require_user(action.actor_id).await?;
        let permit = self.require_permit(action.permit_id).await?;

        match rules::authorize(&permit, &actor, action.kind) {
            Ok(_) => Ok(ActionValidation {
                valid: true,
                reason: format!("{} is allowed", action.kind),
            }),
            Err(e @ (AppError::InvalidState(_) | AppError::Unauthorized(_))) => {
                Ok(ActionValidation {
                    valid: false,
                    reason: e.user_message(),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// 执行动作；授权在这里重新判定
    #[instrument(
        skip(self, action),
        fields(action = %action.kind, permit_id = %action.permit_id, actor_id = %action.actor_id)
    )]
    pub async fn execute(&self, action: &PermitAction) -> Result<Permit> {
        let actor = self.require_user(action.actor_id).await?;
        let permit = self.require_permit(action.permit_id).await?;

        let target = rules::authorize(&permit, &actor, action.kind)?;

        let change = StatusChange {
            permit_id: permit.id,
            from: permit.status,
            to: target,
            approver_id: (action.kind == ActionKind::Approve).then_some(actor.id),
        };

        let Some(updated) = self.store.update_permit_status(&change).await? else {
            let current = self.require_permit(permit.id).await?;
            warn!(
                permit_id = %permit.id,
                expected = %permit.status,
                actual = %current.status,
                "Lost status race"
            );
            return Err(AppError::invalid_state(format!(
                "Permit status changed concurrently (now {})",
                current.status
            )));
        };

        let details = match &action.comment {
            Some(comment) if !comment.trim().is_empty() => {
                format!("{} -> {}: {}", permit.status, target, comment.trim())
            }
            _ => format!("{} -> {}", permit.status, target),
        };
        self.audit
            .log_action(Some(actor.id), audit_action_for(action.kind), updated.id, details)
            .await;

        self.notify_status_change(&updated, actor.id, action.comment.as_deref())
            .await;

        metrics::counter!("permit_transitions_total", "action" => action.kind.as_str())
            .increment(1);

        info!(
            permit_id = %updated.id,
            from = %permit.status,
            to = %updated.status,
            "Permit transitioned"
        );
        Ok(updated)
    }

    async fn notify_status_change(&self, permit: &Permit, actor_id: Uuid, comment: Option<&str>) {
        let batch = permit
            .stakeholders()
            .into_iter()
            .filter(|id| *id != actor_id)
            .map(|user_id| {
                Notification::new(
                    user_id,
                    NotificationKind::PermitStatusChanged,
                    format!("Permit {}", permit.status),
                    format!("Permit {} is now {}.", permit.permit_number, permit.status),
                )
                .with_link(format!("/permits/{}", permit.id))
                .with_data(serde_json::json!({
                    "permit_id": permit.id,
                    "permit_number": permit.permit_number,
                    "status": permit.status,
                    "comment": comment,
                }))
            })
            .collect();

        self.notifications.deliver(batch).await;
    }

    /// 用户可见的许可
    #[instrument(skip(self))]
    pub async fn list_visible_to(&self, user_id: Uuid) -> Result<Vec<Permit>> {
        let user = self.require_user(user_id).await?;
        let team = self.team_of(&user).await?;

        Ok(self
            .store
            .list_company_permits(user.company_id)
            .await?
            .into_iter()
            .filter(|p| visibility::permit_visible(&user, p, &team))
            .collect())
    }

    async fn team_of(&self, user: &User) -> Result<HashSet<Uuid>> {
        if visibility::scope_includes_subordinates(user.role) {
            self.hierarchy.team_ids(user.id).await
        } else {
            Ok(HashSet::new())
        }
    }

    /// 单个许可；不可见时与不存在同样返回 NotFound
    pub async fn get_visible(&self, user_id: Uuid, permit_id: Uuid) -> Result<Permit> {
        let user = self.require_user(user_id).await?;
        let permit = self.require_permit(permit_id).await?;
        self.ensure_visible(&user, permit).await
    }

    /// 按编号查询
    pub async fn get_by_number(&self, user_id: Uuid, permit_number: &str) -> Result<Permit> {
        if !is_valid_permit_number(permit_number) {
            return Err(AppError::validation(format!(
                "Malformed permit number: {}",
                permit_number
            )));
        }

        let user = self.require_user(user_id).await?;
        let permit = self
            .store
            .get_permit_by_number(permit_number)
            .await?
            .ok_or_else(|| AppError::not_found(format!("permit {}", permit_number)))?;
        self.ensure_visible(&user, permit).await
    }

    async fn ensure_visible(&self, user: &User, permit: Permit) -> Result<Permit> {
        let team = self.team_of(user).await?;
        if visibility::permit_visible(user, &permit, &team) {
            Ok(permit)
        } else {
            Err(AppError::not_found(format!("permit {}", permit.id)))
        }
    }

    /// 指派持证人 / 负责人
    #[instrument(skip(self))]
    pub async fn assign_parties(
        &self,
        permit_id: Uuid,
        actor_id: Uuid,
        holder_id: Option<Uuid>,
        pic_id: Option<Uuid>,
    ) -> Result<Permit> {
        if holder_id.is_none() && pic_id.is_none() {
            return Err(AppError::validation("Nothing to assign"));
        }

        let actor = self.require_user(actor_id).await?;
        let permit = self.require_permit(permit_id).await?;

        if permit.status.is_terminal() {
            return Err(AppError::invalid_state(format!(
                "Permit {} is {} and no longer accepts changes",
                permit.permit_number, permit.status
            )));
        }

        let allowed = actor.company_id == permit.company_id
            && (permit.requester_id == actor.id || ASSIGNMENT_ROLES.contains(&actor.role));
        if !allowed {
            return Err(AppError::unauthorized(
                "User does not have authority to assign permit parties",
            ));
        }

        for assignee_id in [holder_id, pic_id].into_iter().flatten() {
            let assignee = self.require_user(assignee_id).await?;
            if assignee.company_id != permit.company_id {
                return Err(AppError::validation(format!(
                    "User {} does not belong to the permit's company",
                    assignee.id
                )));
            }
        }

        let updated = self
            .store
            .update_permit_parties(permit.id, holder_id, pic_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("permit {}", permit.id)))?;

        self.audit
            .log_action(
                Some(actor.id),
                AuditAction::PartiesAssigned,
                permit.id,
                format!("holder={:?} pic={:?}", updated.holder_id, updated.pic_id),
            )
            .await;

        Ok(updated)
    }
}
