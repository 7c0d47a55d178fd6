//! 状态迁移规则表
//!
//! 每个动作对应一条规则：允许的起始状态、目标状态、有权角色和有权关系人。
//! [`authorize`] 是唯一的判定入口，先查状态再查授权。

use crate::error::AppError;
use crate::models::{
    permit::{ActionKind, Permit, PermitStatus},
    user::{Role, User},
};

/// 许可上的关系人
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    Requester,
    Holder,
    Pic,
    Approver,
}

impl Party {
    fn matches(&self, permit: &Permit, user_id: uuid::Uuid) -> bool {
        match self {
            Party::Requester => permit.requester_id == user_id,
            Party::Holder => permit.holder_id == Some(user_id),
            Party::Pic => permit.pic_id == Some(user_id),
            Party::Approver => permit.approver_id == Some(user_id),
        }
    }
}

#[derive(Debug)]
pub struct TransitionRule {
    pub action: ActionKind,
    pub from: &'static [PermitStatus],
    pub to: PermitStatus,
    pub roles: &'static [Role],
    pub parties: &'static [Party],
    /// 状态不符时的说明
    pub state_reason: &'static str,
    /// 授权不足时的说明
    pub authority_reason: &'static str,
}

const APPROVAL_AUTHORITY: &[Role] = &[Role::Admin, Role::HseLead, Role::Pic];

const SUSPENSION_AUTHORITY: &[Role] = &[
    Role::Admin,
    Role::HseLead,
    Role::HseOfficer,
    Role::HseEngineer,
];

const REVIEWABLE: &[PermitStatus] = &[
    PermitStatus::PendingApproval,
    PermitStatus::RiskAssessmentCompleted,
];

const CANCELLABLE: &[PermitStatus] = &[
    PermitStatus::Draft,
    PermitStatus::PendingRiskAssessment,
    PermitStatus::RiskAssessmentCompleted,
    PermitStatus::PendingApproval,
    PermitStatus::Approved,
    PermitStatus::Active,
    PermitStatus::Suspended,
];

pub static RULES: [TransitionRule; 7] = [
    TransitionRule {
        action: ActionKind::Approve,
        from: REVIEWABLE,
        to: PermitStatus::Approved,
        roles: APPROVAL_AUTHORITY,
        parties: &[],
        state_reason: "Permit is not in an approvable state",
        authority_reason: "User does not have approval authority",
    },
    TransitionRule {
        action: ActionKind::Reject,
        from: REVIEWABLE,
        to: PermitStatus::Rejected,
        roles: APPROVAL_AUTHORITY,
        parties: &[],
        state_reason: "Permit cannot be rejected in its current state",
        authority_reason: "User does not have rejection authority",
    },
    TransitionRule {
        action: ActionKind::Suspend,
        from: &[PermitStatus::Active],
        to: PermitStatus::Suspended,
        roles: SUSPENSION_AUTHORITY,
        parties: &[],
        state_reason: "Only active permits can be suspended",
        authority_reason: "User does not have suspension authority",
    },
    TransitionRule {
        action: ActionKind::Complete,
        from: &[PermitStatus::Active],
        to: PermitStatus::Completed,
        roles: &[],
        parties: &[Party::Holder, Party::Pic],
        state_reason: "Only active permits can be completed",
        authority_reason: "Only permit holder or PIC can complete the permit",
    },
    TransitionRule {
        action: ActionKind::Cancel,
        from: CANCELLABLE,
        to: PermitStatus::Cancelled,
        roles: APPROVAL_AUTHORITY,
        parties: &[Party::Requester, Party::Approver],
        state_reason: "Permit cannot be cancelled in its current state",
        authority_reason: "User does not have cancellation authority",
    },
    TransitionRule {
        action: ActionKind::Submit,
        from: &[PermitStatus::Draft],
        to: PermitStatus::PendingRiskAssessment,
        roles: &[Role::Admin],
        parties: &[Party::Requester],
        state_reason: "Only draft permits can be submitted for risk assessment",
        authority_reason: "Only the requester can submit the permit",
    },
    TransitionRule {
        action: ActionKind::Activate,
        from: &[PermitStatus::Approved],
        to: PermitStatus::Active,
        roles: APPROVAL_AUTHORITY,
        parties: &[Party::Holder, Party::Pic, Party::Approver],
        state_reason: "Only approved permits can be activated",
        authority_reason: "User does not have activation authority",
    },
];

pub fn rule_for(action: ActionKind) -> &'static TransitionRule {
    let index = match action {
        ActionKind::Approve => 0,
        ActionKind::Reject => 1,
        ActionKind::Suspend => 2,
        ActionKind::Complete => 3,
        ActionKind::Cancel => 4,
        ActionKind::Submit => 5,
        ActionKind::Activate => 6,
    };
    &RULES[index]
}

/// 判定 `actor` 能否对 `permit` 执行 `action`，成功时返回目标状态
pub fn authorize(permit: &Permit, actor: &User, action: ActionKind) -> Result<PermitStatus, AppError> {
    let rule = rule_for(action);

    if permit.status.is_terminal() {
        return Err(AppError::invalid_state(format!(
            "Permit {} is {} and no longer accepts changes",
            permit.permit_number, permit.status
        )));
    }

    if !rule.from.contains(&permit.status) {
        return Err(AppError::invalid_state(format!(
            "{} (current status: {})",
            rule.state_reason, permit.status
        )));
    }

    if actor.company_id != permit.company_id {
        return Err(AppError::unauthorized(
            "User does not belong to the permit's company",
        ));
    }

    let by_role = rule.roles.contains(&actor.role);
    let by_party = rule.parties.iter().any(|p| p.matches(permit, actor.id));
    if !by_role && !by_party {
        return Err(AppError::unauthorized(rule.authority_reason));
    }

    Ok(rule.to)
}
