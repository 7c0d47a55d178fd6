//! 风险评估服务
//! 危害打分、评估创建与 HSE 复核

use std::sync::Arc;

use chrono::Utc;
use sqlx::types::Json;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::config::ReviewPolicy;
use crate::error::{AppError, Result};
use crate::models::{
    permit::{Permit, PermitStatus},
    risk::{Hazard, ReviewRecord, RiskAssessment, RiskLevel},
    user::{Role, User},
};
use crate::repository::Store;
use crate::services::audit_service::{AuditAction, AuditService};
use crate::workflow::visibility;

/// 有权复核的角色
const REVIEWER_ROLES: &[Role] = &[Role::HseLead, Role::HseManager];

/// 有权评估的角色
const ASSESSOR_ROLES: &[Role] = &[Role::HseLead, Role::HseEngineer, Role::HseOfficer];

/// 总体风险等级取所有危害中的最高等级，空列表为 LOW
pub fn calculate_risk_level(hazards: &[Hazard]) -> RiskLevel {
    hazards
        .iter()
        .map(Hazard::risk_level)
        .max()
        .unwrap_or(RiskLevel::Low)
}

pub struct RiskAssessmentService {
    store: Arc<dyn Store>,
    audit: Arc<AuditService>,
    review_policy: ReviewPolicy,
}

impl RiskAssessmentService {
    pub fn new(store: Arc<dyn Store>, audit: Arc<AuditService>, review_policy: ReviewPolicy) -> Self {
        Self {
            store,
            audit,
            review_policy,
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

    /// 创建评估并把许可推进到 RISK_ASSESSMENT_COMPLETED
    #[instrument(skip(self, hazards), fields(hazards = hazards.len()))]
    pub async fn create(
        &self,
        permit_id: Uuid,
        assessor_id: Uuid,
        hazards: Vec<Hazard>,
    ) -> Result<RiskAssessment> {
        let permit = self.require_permit(permit_id).await?;

        if permit.status != PermitStatus::PendingRiskAssessment {
            return Err(AppError::invalid_state(format!(
                "Risk assessment requires a permit pending risk assessment (current status: {})",
                permit.status
            )));
        }

        if hazards.is_empty() {
            return Err(AppError::validation("At least one hazard is required"));
        }
        for hazard in &hazards {
            hazard.validate()?;
        }

        let assessor = self.require_user(assessor_id).await?;
        if assessor.company_id != permit.company_id {
            return Err(AppError::unauthorized(
                "Assessor does not belong to the permit's company",
            ));
        }

        let risk_level = calculate_risk_level(&hazards);
        let now = Utc::now();
        let assessment = RiskAssessment {
            id: Uuid::new_v4(),
            permit_id,
            assessor_id,
            reviewer_id: None,
            review_approved: None,
            risk_level,
            hazards: Json(hazards),
            reviewed_at: None,
            created_at: now,
            updated_at: now,
        };

        let Some(saved) = self.store.create_risk_assessment(&assessment).await? else {
            let current = self.require_permit(permit_id).await?;
            return Err(AppError::invalid_state(format!(
                "Permit status changed concurrently (now {})",
                current.status
            )));
        };

        self.audit
            .log_action(
                Some(assessor_id),
                AuditAction::RiskAssessmentCreated,
                saved.id,
                format!(
                    "Risk assessment for {} rated {}",
                    permit.permit_number,
                    risk_level.as_str()
                ),
            )
            .await;

        info!(
            permit_id = %permit_id,
            assessment_id = %saved.id,
            risk_level = risk_level.as_str(),
            "Risk assessment created"
        );
        Ok(saved)
    }

    /// HSE 复核：通过进入 PENDING_APPROVAL，退回则回到 DRAFT
    #[instrument(skip(self))]
    pub async fn review(
        &self,
        assessment_id: Uuid,
        reviewer_id: Uuid,
        approved: bool,
    ) -> Result<RiskAssessment> {
        let reviewer = self.require_user(reviewer_id).await?;
        if !REVIEWER_ROLES.contains(&reviewer.role) {
            return Err(AppError::unauthorized(
                "Only HSE Lead or HSE Manager can review risk assessments",
            ));
        }

        let assessment = self
            .store
            .get_risk_assessment(assessment_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("risk assessment {}", assessment_id)))?;
        let permit = self.require_permit(assessment.permit_id).await?;

        if reviewer.company_id != permit.company_id {
            return Err(AppError::unauthorized(
                "Reviewer does not belong to the permit's company",
            ));
        }

        if let Some(previous) = assessment.reviewer_id {
            if self.review_policy == ReviewPolicy::RejectRepeat {
                return Err(AppError::AlreadyReviewed(previous));
            }
        }

        let re_review = assessment.reviewer_id.is_some()
            && permit.status == PermitStatus::PendingApproval;
        if permit.status != PermitStatus::RiskAssessmentCompleted && !re_review {
            return Err(AppError::invalid_state(format!(
                "Permit is not awaiting risk review (current status: {})",
                permit.status
            )));
        }

        let target = if approved {
            PermitStatus::PendingApproval
        } else {
            PermitStatus::Draft
        };
        let record = ReviewRecord {
            assessment_id,
            reviewer_id,
            approved,
            permit_id: permit.id,
            permit_from: permit.status,
            permit_to: target,
            reviewed_at: Utc::now(),
        };

        let Some(saved) = self.store.record_review(&record).await? else {
            let current = self.require_permit(permit.id).await?;
            return Err(AppError::invalid_state(format!(
                "Permit status changed concurrently (now {})",
                current.status
            )));
        };

        self.audit
            .log_action(
                Some(reviewer_id),
                AuditAction::RiskAssessmentReviewed,
                assessment_id,
                format!(
                    "Risk assessment {} for {}; permit moved to {}",
                    if approved { "approved" } else { "returned" },
                    permit.permit_number,
                    target
                ),
            )
            .await;

        info!(
            assessment_id = %assessment_id,
            permit_id = %permit.id,
            approved,
            status = %target,
            "Risk assessment reviewed"
        );
        Ok(saved)
    }

    /// 用户可见的风险评估
    #[instrument(skip(self))]
    pub async fn list_visible_to(&self, user_id: Uuid) -> Result<Vec<RiskAssessment>> {
        let user = self.require_user(user_id).await?;

        let permit_ids: Vec<Uuid> = self
            .store
            .list_company_permits(user.company_id)
            .await?
            .into_iter()
            .filter(|p| visibility::assessment_visible(&user, p))
            .map(|p| p.id)
            .collect();

        self.store.list_risk_assessments_for_permits(&permit_ids).await
    }

    /// 单个许可的风险评估，与 [`Self::list_visible_to`] 使用同一可见性规则
    ///
    /// 不可见与不存在一样返回 `NotFound`。
    #[instrument(skip(self))]
    pub async fn get_visible_for_permit(
        &self,
        user_id: Uuid,
        permit_id: Uuid,
    ) -> Result<RiskAssessment> {
        let user = self.require_user(user_id).await?;
        let permit = self.require_permit(permit_id).await?;

        if !visibility::assessment_visible(&user, &permit) {
            return Err(AppError::not_found(format!(
                "risk assessment for permit {}",
                permit_id
            )));
        }

        self.store
            .get_risk_assessment_for_permit(permit_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("risk assessment for permit {}", permit_id)))
    }

    /// 评估资格校验：角色、公司与许可状态，失败时给出具体原因
    pub async fn require_assessor(&self, user_id: Uuid, permit_id: Uuid) -> Result<()> {
        let user = self.require_user(user_id).await?;
        let permit = self.require_permit(permit_id).await?;

        if permit.status != PermitStatus::PendingRiskAssessment {
            return Err(AppError::invalid_state(format!(
                "Risk assessment requires a permit pending risk assessment (current status: {})",
                permit.status
            )));
        }
        if user.company_id != permit.company_id || !ASSESSOR_ROLES.contains(&user.role) {
            return Err(AppError::unauthorized(
                "User does not have risk assessment authority",
            ));
        }

        Ok(())
    }

    /// 用户是否可以为该许可做风险评估
    pub async fn can_assess(&self, user_id: Uuid, permit_id: Uuid) -> Result<bool> {
        match self.require_assessor(user_id, permit_id).await {
            Ok(()) => Ok(true),
            Err(AppError::InvalidState(_) | AppError::Unauthorized(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn get_for_permit(&self, permit_id: Uuid) -> Result<Option<RiskAssessment>> {
        self.store.get_risk_assessment_for_permit(permit_id).await
    }
}
