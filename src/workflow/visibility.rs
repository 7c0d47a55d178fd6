//! 可见性规则（许可列表与风险评估列表共用）

use std::collections::HashSet;

use uuid::Uuid;

use crate::models::{
    permit::Permit,
    user::{Role, User},
};

/// 该角色的许可可见范围是否包含下属
pub fn scope_includes_subordinates(role: Role) -> bool {
    matches!(role, Role::HseOfficer | Role::HseEngineer)
}

/// 许可是否对用户可见
///
/// `team` 为 HSE_OFFICER / HSE_ENGINEER 的传递下属集合，其他角色传空集即可。
pub fn permit_visible(user: &User, permit: &Permit, team: &HashSet<Uuid>) -> bool {
    if user.company_id != permit.company_id {
        return false;
    }

    match user.role {
        Role::Admin | Role::HseLead => true,
        Role::HseOfficer | Role::HseEngineer => {
            let in_team = |id: Uuid| id == user.id || team.contains(&id);
            in_team(permit.requester_id)
                || permit.holder_id.is_some_and(in_team)
                || permit.pic_id.is_some_and(in_team)
        }
        _ => permit.involves(user.id) || permit.approver_id == Some(user.id),
    }
}

/// 风险评估是否对用户可见（按所属许可判断）
pub fn assessment_visible(user: &User, permit: &Permit) -> bool {
    if user.company_id != permit.company_id {
        return false;
    }

    match user.role {
        Role::Admin => true,
        role if role.is_hse() => true,
        Role::PermitRequester => permit.requester_id == user.id,
        Role::PermitHolder => permit.holder_id == Some(user.id),
        Role::Pic => permit.pic_id == Some(user.id),
        _ => false,
    }
}
