//! User domain models
//! 用户、角色与组织层级视图

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 用户角色（固定枚举）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    HseLead,
    HseManager,
    HseEngineer,
    HseOfficer,
    PermitRequester,
    PermitHolder,
    /// Person in Charge，区域负责人
    Pic,
    CompanyAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::HseLead => "HSE_LEAD",
            Role::HseManager => "HSE_MANAGER",
            Role::HseEngineer => "HSE_ENGINEER",
            Role::HseOfficer => "HSE_OFFICER",
            Role::PermitRequester => "PERMIT_REQUESTER",
            Role::PermitHolder => "PERMIT_HOLDER",
            Role::Pic => "PIC",
            Role::CompanyAdmin => "COMPANY_ADMIN",
        }
    }

    /// HSE 合规角色
    pub fn is_hse(&self) -> bool {
        matches!(
            self,
            Role::HseLead | Role::HseManager | Role::HseEngineer | Role::HseOfficer
        )
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 用户
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub company_id: Uuid,
    /// 直属上级（弱引用，仅用于上级查找）
    pub reports_to: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(name: &str, email: &str, role: Role, company_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            role,
            company_id,
            reports_to: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn reporting_to(mut self, supervisor_id: Uuid) -> Self {
        self.reports_to = Some(supervisor_id);
        self
    }
}

/// 组织架构节点（派生视图，不持久化）
#[derive(Debug, Clone, Serialize)]
pub struct HierarchyNode {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
    pub subordinates: Vec<HierarchyNode>,
}

impl HierarchyNode {
    /// 节点总数（含自身）
    pub fn size(&self) -> usize {
        1 + self.subordinates.iter().map(HierarchyNode::size).sum::<usize>()
    }
}

/// 层级调整校验结果
#[derive(Debug, Clone, Serialize)]
pub struct HierarchyCheck {
    pub valid: bool,
    pub reason: String,
}

impl HierarchyCheck {
    pub fn ok() -> Self {
        Self {
            valid: true,
            reason: "Valid hierarchy change".to_string(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: reason.into(),
        }
    }
}

/// 调整上级请求
#[derive(Debug, Deserialize)]
pub struct UpdateSupervisorRequest {
    pub supervisor_id: Option<Uuid>,
}

/// 用户摘要响应（不包含邮箱等联系方式以外的内部字段）
#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
    pub reports_to: Option<Uuid>,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            role: user.role,
            reports_to: user.reports_to,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serde_names() {
        let json = serde_json::to_string(&Role::HseLead).unwrap();
        assert_eq!(json, "\"HSE_LEAD\"");

        let role: Role = serde_json::from_str("\"PERMIT_REQUESTER\"").unwrap();
        assert_eq!(role, Role::PermitRequester);
        assert_eq!(role.as_str(), "PERMIT_REQUESTER");
    }

    #[test]
    fn test_hse_roles() {
        assert!(Role::HseOfficer.is_hse());
        assert!(Role::HseManager.is_hse());
        assert!(!Role::Pic.is_hse());
        assert!(!Role::Admin.is_hse());
    }

    #[test]
    fn test_hierarchy_node_size() {
        let leaf = HierarchyNode {
            id: Uuid::new_v4(),
            name: "leaf".to_string(),
            role: Role::PermitHolder,
            subordinates: vec![],
        };
        let root = HierarchyNode {
            id: Uuid::new_v4(),
            name: "root".to_string(),
            role: Role::HseLead,
            subordinates: vec![leaf.clone(), leaf],
        };
        assert_eq!(root.size(), 3);
    }
}
