//! 组织层级服务
//!
//! 所有上下行遍历都带 visited 集合，即使历史数据中已经存在环也能终止。

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::user::{HierarchyCheck, HierarchyNode, User};
use crate::repository::Store;
use crate::services::audit_service::{AuditAction, AuditService};

pub struct HierarchyService {
    store: Arc<dyn Store>,
    audit: Arc<AuditService>,
}

impl HierarchyService {
    pub fn new(store: Arc<dyn Store>, audit: Arc<AuditService>) -> Self {
        Self { store, audit }
    }

    async fn require_user(&self, user_id: Uuid) -> Result<User> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("user {}", user_id)))
    }

    /// 下属列表；`recursive = true` 时返回全部传递下属（广度优先）
    #[instrument(skip(self))]
    pub async fn subordinates(&self, user_id: Uuid, recursive: bool) -> Result<Vec<User>> {
        self.require_user(user_id).await?;

        if !recursive {
            return self.store.list_direct_reports(user_id).await;
        }

        let mut visited = HashSet::from([user_id]);
        let mut queue = VecDeque::from([user_id]);
        let mut result = Vec::new();

        while let Some(current) = queue.pop_front() {
            for report in self.store.list_direct_reports(current).await? {
                if visited.insert(report.id) {
                    queue.push_back(report.id);
                    result.push(report);
                }
            }
        }

        Ok(result)
    }

    /// 传递下属 ID 集合
    pub async fn team_ids(&self, user_id: Uuid) -> Result<HashSet<Uuid>> {
        Ok(self
            .subordinates(user_id, true)
            .await?
            .into_iter()
            .map(|u| u.id)
            .collect())
    }

    /// 上级链，从直属上级一直到根
    #[instrument(skip(self))]
    pub async fn supervisors(&self, user_id: Uuid) -> Result<Vec<User>> {
        let user = self.require_user(user_id).await?;

        let mut visited = HashSet::from([user.id]);
        let mut chain = Vec::new();
        let mut next = user.reports_to;

        while let Some(supervisor_id) = next {
            if !visited.insert(supervisor_id) {
                warn!(user_id = %user_id, at = %supervisor_id, "Reporting cycle detected while walking up");
                break;
            }
            let Some(supervisor) = self.store.get_user(supervisor_id).await? else {
                warn!(user_id = %user_id, missing = %supervisor_id, "Dangling supervisor reference");
                break;
            };
            next = supervisor.reports_to;
            chain.push(supervisor);
        }

        Ok(chain)
    }

    /// 校验调整；业务上的拒绝以具体错误返回
    async fn check_change(&self, user_id: Uuid, new_supervisor_id: Option<Uuid>) -> Result<()> {
        let user = self.require_user(user_id).await?;

        let Some(supervisor_id) = new_supervisor_id else {
            return Ok(());
        };

        if supervisor_id == user_id {
            return Err(AppError::CircularReference(
                "A user cannot supervise themselves".to_string(),
            ));
        }

        let supervisor = self.require_user(supervisor_id).await?;
        if supervisor.company_id != user.company_id {
            return Err(AppError::validation(
                "Supervisor must belong to the same company",
            ));
        }

        // 从新上级向上走，若回到 user 则成环
        let mut visited = HashSet::from([supervisor.id]);
        let mut next = supervisor.reports_to;
        while let Some(current) = next {
            if current == user_id {
                return Err(AppError::CircularReference(format!(
                    "Assigning {} as supervisor would create a reporting cycle",
                    supervisor.name
                )));
            }
            if !visited.insert(current) {
                warn!(at = %current, "Pre-existing reporting cycle encountered");
                break;
            }
            next = match self.store.get_user(current).await? {
                Some(u) => u.reports_to,
                None => None,
            };
        }

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn validate_hierarchy_change(
        &self,
        user_id: Uuid,
        new_supervisor_id: Option<Uuid>,
    ) -> Result<HierarchyCheck> {
        match self.check_change(user_id, new_supervisor_id).await {
            Ok(()) => Ok(HierarchyCheck::ok()),
            Err(e @ (AppError::Database(_) | AppError::Internal(_))) => Err(e),
            Err(e) => Ok(HierarchyCheck::rejected(e.user_message())),
        }
    }

    /// 提交层级调整，提交前重新校验
    #[instrument(skip(self))]
    pub async fn update_hierarchy(
        &self,
        user_id: Uuid,
        new_supervisor_id: Option<Uuid>,
        actor_id: Uuid,
    ) -> Result<User> {
        self.check_change(user_id, new_supervisor_id).await?;

        let user = self
            .store
            .update_user_supervisor(user_id, new_supervisor_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("user {}", user_id)))?;

        let details = match new_supervisor_id {
            Some(id) => format!("Supervisor set to {}", id),
            None => "Supervisor cleared".to_string(),
        };
        self.audit
            .log_action(Some(actor_id), AuditAction::SupervisorChanged, user_id, details)
            .await;

        info!(user_id = %user_id, supervisor_id = ?new_supervisor_id, "Hierarchy updated");
        Ok(user)
    }

    /// 公司组织架构森林：根为无上级或上级不在本公司的用户
    #[instrument(skip(self))]
    pub async fn company_hierarchy(&self, company_id: Uuid) -> Result<Vec<HierarchyNode>> {
        let users = self.store.list_company_users(company_id).await?;
        let members: HashSet<Uuid> = users.iter().map(|u| u.id).collect();

        let mut children: HashMap<Uuid, Vec<&User>> = HashMap::new();
        for user in &users {
            if let Some(supervisor_id) = user.reports_to {
                if members.contains(&supervisor_id) {
                    children.entry(supervisor_id).or_default().push(user);
                }
            }
        }

        let mut visited = HashSet::new();
        let mut forest = Vec::new();

        let is_root = |u: &User| u.reports_to.map_or(true, |s| !members.contains(&s));
        for user in users.iter().filter(|u| is_root(u)) {
            forest.push(build_node(user, &children, &mut visited));
        }

        // 环上的用户没有根，单独挂出来
        for user in &users {
            if !visited.contains(&user.id) {
                warn!(user_id = %user.id, "User only reachable through a reporting cycle");
                forest.push(build_node(user, &children, &mut visited));
            }
        }

        Ok(forest)
    }
}

fn build_node(
    user: &User,
    children: &HashMap<Uuid, Vec<&User>>,
    visited: &mut HashSet<Uuid>,
) -> HierarchyNode {
    visited.insert(user.id);

    let mut subordinates = Vec::new();
    if let Some(reports) = children.get(&user.id) {
        for report in reports {
            if !visited.contains(&report.id) {
                subordinates.push(build_node(report, children, visited));
            }
        }
    }

    HierarchyNode {
        id: user.id,
        name: user.name.clone(),
        role: user.role,
        subordinates,
    }
}
