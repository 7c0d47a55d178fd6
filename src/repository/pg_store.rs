//! PostgreSQL 存储实现，按实体委托给各仓储

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    ActivityRepository, PermitRepository, RiskAssessmentRepository, Store, UserRepository,
};
use crate::db::{self, HealthStatus};
use crate::error::Result;
use crate::models::{
    activity::ActivityEntry,
    permit::{Permit, StatusChange},
    risk::{ReviewRecord, RiskAssessment},
    user::{Role, User},
};

pub struct PgStore {
    pool: PgPool,
    users: UserRepository,
    permits: PermitRepository,
    risk_assessments: RiskAssessmentRepository,
    activity: ActivityRepository,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            users: UserRepository::new(pool.clone()),
            permits: PermitRepository::new(pool.clone()),
            risk_assessments: RiskAssessmentRepository::new(pool.clone()),
            activity: ActivityRepository::new(pool.clone()),
            pool,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        self.users.find_by_id(id).await
    }

    async fn insert_user(&self, user: &User) -> Result<User> {
        self.users.create(user).await
    }

    async fn list_company_users(&self, company_id: Uuid) -> Result<Vec<User>> {
        self.users.list_by_company(company_id).await
    }

    async fn list_users_with_roles(&self, company_id: Uuid, roles: &[Role]) -> Result<Vec<User>> {
        self.users.list_by_roles(company_id, roles).await
    }

    async fn list_direct_reports(&self, user_id: Uuid) -> Result<Vec<User>> {
        self.users.list_direct_reports(user_id).await
    }

    async fn update_user_supervisor(
        &self,
        user_id: Uuid,
        supervisor_id: Option<Uuid>,
    ) -> Result<Option<User>> {
        self.users.update_supervisor(user_id, supervisor_id).await
    }

    async fn get_permit(&self, id: Uuid) -> Result<Option<Permit>> {
        self.permits.find_by_id(id).await
    }

    async fn get_permit_by_number(&self, permit_number: &str) -> Result<Option<Permit>> {
        self.permits.find_by_number(permit_number).await
    }

    async fn insert_permit(&self, permit: &Permit) -> Result<Permit> {
        self.permits.create(permit).await
    }

    async fn next_permit_sequence(&self, company_id: Uuid) -> Result<i64> {
        self.permits.next_sequence(company_id).await
    }

    async fn list_company_permits(&self, company_id: Uuid) -> Result<Vec<Permit>> {
        self.permits.list_by_company(company_id).await
    }

    async fn update_permit_status(&self, change: &StatusChange) -> Result<Option<Permit>> {
        self.permits.update_status(change).await
    }

    async fn update_permit_end_date(
        &self,
        permit_id: Uuid,
        end_date: DateTime<Utc>,
    ) -> Result<Option<Permit>> {
        self.permits.update_end_date(permit_id, end_date).await
    }

    async fn update_permit_parties(
        &self,
        permit_id: Uuid,
        holder_id: Option<Uuid>,
        pic_id: Option<Uuid>,
    ) -> Result<Option<Permit>> {
        self.permits.update_parties(permit_id, holder_id, pic_id).await
    }

    async fn find_active_permits_past_end_date(&self, now: DateTime<Utc>) -> Result<Vec<Permit>> {
        self.permits.find_active_past_end_date(now).await
    }

    async fn create_risk_assessment(
        &self,
        assessment: &RiskAssessment,
    ) -> Result<Option<RiskAssessment>> {
        self.risk_assessments.create_with_transition(assessment).await
    }

    async fn get_risk_assessment(&self, id: Uuid) -> Result<Option<RiskAssessment>> {
        self.risk_assessments.find_by_id(id).await
    }

    async fn get_risk_assessment_for_permit(
        &self,
        permit_id: Uuid,
    ) -> Result<Option<RiskAssessment>> {
        self.risk_assessments.find_by_permit(permit_id).await
    }

    async fn list_risk_assessments_for_permits(
        &self,
        permit_ids: &[Uuid],
    ) -> Result<Vec<RiskAssessment>> {
        self.risk_assessments.list_by_permits(permit_ids).await
    }

    async fn record_review(&self, review: &ReviewRecord) -> Result<Option<RiskAssessment>> {
        self.risk_assessments.record_review(review).await
    }

    async fn insert_activity(&self, entry: &ActivityEntry) -> Result<()> {
        self.activity.insert(entry).await
    }

    async fn list_activity(&self, entity_id: Uuid) -> Result<Vec<ActivityEntry>> {
        self.activity.list_for_entity(entity_id).await
    }

    async fn ping(&self) -> HealthStatus {
        db::health_check(&self.pool).await
    }
}
