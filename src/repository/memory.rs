//! 内存存储实现
//!
//! 用于测试与 `storage.backend = memory` 的本地运行。
//! 所有数据放在同一把锁后面，复合写入（评估 + 状态推进）天然原子。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::Store;
use crate::db::HealthStatus;
use crate::error::{AppError, Result};
use crate::models::{
    activity::ActivityEntry,
    permit::{Permit, PermitStatus, StatusChange},
    risk::{ReviewRecord, RiskAssessment},
    user::{Role, User},
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    permits: HashMap<Uuid, Permit>,
    risk_assessments: HashMap<Uuid, RiskAssessment>,
    activity: Vec<ActivityEntry>,
    sequences: HashMap<Uuid, i64>,
}

impl Tables {
    fn conditional_status(&mut self, change: &StatusChange) -> Option<Permit> {
        let permit = self.permits.get_mut(&change.permit_id)?;
        if permit.status != change.from {
            return None;
        }
        permit.status = change.to;
        if let Some(approver_id) = change.approver_id {
            permit.approver_id = Some(approver_id);
        }
        permit.version += 1;
        permit.updated_at = Utc::now();
        Some(permit.clone())
    }

    fn assessment_for_permit(&self, permit_id: Uuid) -> Option<&RiskAssessment> {
        self.risk_assessments
            .values()
            .find(|a| a.permit_id == permit_id)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted_users(mut users: Vec<User>) -> Vec<User> {
    users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    users
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn insert_user(&self, user: &User) -> Result<User> {
        let mut tables = self.tables.write().await;
        if tables.users.contains_key(&user.id) {
            return Err(AppError::internal_error(format!("duplicate user id {}", user.id)));
        }
        tables.users.insert(user.id, user.clone());
        Ok(user.clone())
    }

    async fn list_company_users(&self, company_id: Uuid) -> Result<Vec<User>> {
        let tables = self.tables.read().await;
        Ok(sorted_users(
            tables
                .users
                .values()
                .filter(|u| u.company_id == company_id)
                .cloned()
                .collect(),
        ))
    }

    async fn list_users_with_roles(&self, company_id: Uuid, roles: &[Role]) -> Result<Vec<User>> {
        let tables = self.tables.read().await;
        Ok(sorted_users(
            tables
                .users
                .values()
                .filter(|u| u.company_id == company_id && roles.contains(&u.role))
                .cloned()
                .collect(),
        ))
    }

    async fn list_direct_reports(&self, user_id: Uuid) -> Result<Vec<User>> {
        let tables = self.tables.read().await;
        Ok(sorted_users(
            tables
                .users
                .values()
                .filter(|u| u.reports_to == Some(user_id))
                .cloned()
                .collect(),
        ))
    }

    async fn update_user_supervisor(
        &self,
        user_id: Uuid,
        supervisor_id: Option<Uuid>,
    ) -> Result<Option<User>> {
        let mut tables = self.tables.write().await;
        Ok(tables.users.get_mut(&user_id).map(|user| {
            user.reports_to = supervisor_id;
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn get_permit(&self, id: Uuid) -> Result<Option<Permit>> {
        Ok(self.tables.read().await.permits.get(&id).cloned())
    }

    async fn get_permit_by_number(&self, permit_number: &str) -> Result<Option<Permit>> {
        let tables = self.tables.read().await;
        Ok(tables
            .permits
            .values()
            .find(|p| p.permit_number == permit_number)
            .cloned())
    }

    async fn insert_permit(&self, permit: &Permit) -> Result<Permit> {
        let mut tables = self.tables.write().await;
        if tables
            .permits
            .values()
            .any(|p| p.id == permit.id || p.permit_number == permit.permit_number)
        {
            return Err(AppError::internal_error(format!(
                "duplicate permit {}",
                permit.permit_number
            )));
        }
        tables.permits.insert(permit.id, permit.clone());
        Ok(permit.clone())
    }

    async fn next_permit_sequence(&self, company_id: Uuid) -> Result<i64> {
        let mut tables = self.tables.write().await;
        let existing = tables
            .permits
            .values()
            .filter(|p| p.company_id == company_id)
            .count() as i64;
        let next = match tables.sequences.get(&company_id) {
            Some(last) => last + 1,
            None => existing + 1,
        };
        tables.sequences.insert(company_id, next);
        Ok(next)
    }

    async fn list_company_permits(&self, company_id: Uuid) -> Result<Vec<Permit>> {
        let tables = self.tables.read().await;
        let mut permits: Vec<Permit> = tables
            .permits
            .values()
            .filter(|p| p.company_id == company_id)
            .cloned()
            .collect();
        permits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(permits)
    }

    async fn update_permit_status(&self, change: &StatusChange) -> Result<Option<Permit>> {
        Ok(self.tables.write().await.conditional_status(change))
    }

    async fn update_permit_end_date(
        &self,
        permit_id: Uuid,
        end_date: DateTime<Utc>,
    ) -> Result<Option<Permit>> {
        let mut tables = self.tables.write().await;
        Ok(tables.permits.get_mut(&permit_id).map(|permit| {
            permit.end_date = end_date;
            permit.version += 1;
            permit.updated_at = Utc::now();
            permit.clone()
        }))
    }

    async fn update_permit_parties(
        &self,
        permit_id: Uuid,
        holder_id: Option<Uuid>,
        pic_id: Option<Uuid>,
    ) -> Result<Option<Permit>> {
        let mut tables = self.tables.write().await;
        Ok(tables.permits.get_mut(&permit_id).map(|permit| {
            if holder_id.is_some() {
                permit.holder_id = holder_id;
            }
            if pic_id.is_some() {
                permit.pic_id = pic_id;
            }
            permit.version += 1;
            permit.updated_at = Utc::now();
            permit.clone()
        }))
    }

    async fn find_active_permits_past_end_date(&self, now: DateTime<Utc>) -> Result<Vec<Permit>> {
        let tables = self.tables.read().await;
        let mut permits: Vec<Permit> = tables
            .permits
            .values()
            .filter(|p| p.status == PermitStatus::Active && p.end_date < now)
            .cloned()
            .collect();
        permits.sort_by(|a, b| a.end_date.cmp(&b.end_date));
        Ok(permits)
    }

    async fn create_risk_assessment(
        &self,
        assessment: &RiskAssessment,
    ) -> Result<Option<RiskAssessment>> {
        let mut tables = self.tables.write().await;

        let change = StatusChange {
            permit_id: assessment.permit_id,
            from: PermitStatus::PendingRiskAssessment,
            to: PermitStatus::RiskAssessmentCompleted,
            approver_id: None,
        };
        if tables.conditional_status(&change).is_none() {
            return Ok(None);
        }

        // 重新评估时沿用原记录 ID，保持一一对应
        let saved = match tables.assessment_for_permit(assessment.permit_id).cloned() {
            Some(previous) => RiskAssessment {
                id: previous.id,
                created_at: previous.created_at,
                reviewer_id: None,
                review_approved: None,
                reviewed_at: None,
                ..assessment.clone()
            },
            None => RiskAssessment {
                reviewer_id: None,
                review_approved: None,
                reviewed_at: None,
                ..assessment.clone()
            },
        };
        tables.risk_assessments.insert(saved.id, saved.clone());
        Ok(Some(saved))
    }

    async fn get_risk_assessment(&self, id: Uuid) -> Result<Option<RiskAssessment>> {
        Ok(self.tables.read().await.risk_assessments.get(&id).cloned())
    }

    async fn get_risk_assessment_for_permit(
        &self,
        permit_id: Uuid,
    ) -> Result<Option<RiskAssessment>> {
        Ok(self
            .tables
            .read()
            .await
            .assessment_for_permit(permit_id)
            .cloned())
    }

    async fn list_risk_assessments_for_permits(
        &self,
        permit_ids: &[Uuid],
    ) -> Result<Vec<RiskAssessment>> {
        let tables = self.tables.read().await;
        let mut assessments: Vec<RiskAssessment> = tables
            .risk_assessments
            .values()
            .filter(|a| permit_ids.contains(&a.permit_id))
            .cloned()
            .collect();
        assessments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(assessments)
    }

    async fn record_review(&self, review: &ReviewRecord) -> Result<Option<RiskAssessment>> {
        let mut tables = self.tables.write().await;

        if !tables.risk_assessments.contains_key(&review.assessment_id) {
            return Ok(None);
        }

        let change = StatusChange {
            permit_id: review.permit_id,
            from: review.permit_from,
            to: review.permit_to,
            approver_id: None,
        };
        if tables.conditional_status(&change).is_none() {
            return Ok(None);
        }

        Ok(tables
            .risk_assessments
            .get_mut(&review.assessment_id)
            .map(|assessment| {
                assessment.reviewer_id = Some(review.reviewer_id);
                assessment.review_approved = Some(review.approved);
                assessment.reviewed_at = Some(review.reviewed_at);
                assessment.updated_at = review.reviewed_at;
                assessment.clone()
            }))
    }

    async fn insert_activity(&self, entry: &ActivityEntry) -> Result<()> {
        self.tables.write().await.activity.push(entry.clone());
        Ok(())
    }

    async fn list_activity(&self, entity_id: Uuid) -> Result<Vec<ActivityEntry>> {
        let tables = self.tables.read().await;
        Ok(tables
            .activity
            .iter()
            .filter(|e| e.entity_id == entity_id)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> HealthStatus {
        HealthStatus::Healthy
    }
}
