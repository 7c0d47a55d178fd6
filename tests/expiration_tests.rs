//! 到期清扫与到期时间调整集成测试

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ptw_service::{
    db::HealthStatus,
    error::{AppError, Result},
    models::{
        activity::ActivityEntry,
        permit::{Permit, PermitStatus, StatusChange},
        risk::{ReviewRecord, RiskAssessment},
        user::{Role, User},
    },
    notifications::{NotificationGateway, NotificationKind, Notifier},
    repository::{MemoryStore, Store},
    services::{AuditService, ExpirationService, SweepStage},
};
use uuid::Uuid;

mod common;
use common::{at, new_permit, TestContext};

/// 按角色查用户时失败，其余操作交给内存存储
struct RoleLookupDown(Arc<MemoryStore>);

#[async_trait]
impl Store for RoleLookupDown {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        self.0.get_user(id).await
    }

    async fn insert_user(&self, user: &User) -> Result<User> {
        self.0.insert_user(user).await
    }

    async fn list_company_users(&self, company_id: Uuid) -> Result<Vec<User>> {
        self.0.list_company_users(company_id).await
    }

    async fn list_users_with_roles(&self, _company_id: Uuid, _roles: &[Role]) -> Result<Vec<User>> {
        Err(AppError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn list_direct_reports(&self, user_id: Uuid) -> Result<Vec<User>> {
        self.0.list_direct_reports(user_id).await
    }

    async fn update_user_supervisor(
        &self,
        user_id: Uuid,
        supervisor_id: Option<Uuid>,
    ) -> Result<Option<User>> {
        self.0.update_user_supervisor(user_id, supervisor_id).await
    }

    async fn get_permit(&self, id: Uuid) -> Result<Option<Permit>> {
        self.0.get_permit(id).await
    }

    async fn get_permit_by_number(&self, permit_number: &str) -> Result<Option<Permit>> {
        self.0.get_permit_by_number(permit_number).await
    }

    async fn insert_permit(&self, permit: &Permit) -> Result<Permit> {
        self.0.insert_permit(permit).await
    }

    async fn next_permit_sequence(&self, company_id: Uuid) -> Result<i64> {
        self.0.next_permit_sequence(company_id).await
    }

    async fn list_company_permits(&self, company_id: Uuid) -> Result<Vec<Permit>> {
        self.0.list_company_permits(company_id).await
    }

    async fn update_permit_status(&self, change: &StatusChange) -> Result<Option<Permit>> {
        self.0.update_permit_status(change).await
    }

    async fn update_permit_end_date(
        &self,
        permit_id: Uuid,
        end_date: DateTime<Utc>,
    ) -> Result<Option<Permit>> {
        self.0.update_permit_end_date(permit_id, end_date).await
    }

    async fn update_permit_parties(
        &self,
        permit_id: Uuid,
        holder_id: Option<Uuid>,
        pic_id: Option<Uuid>,
    ) -> Result<Option<Permit>> {
        self.0.update_permit_parties(permit_id, holder_id, pic_id).await
    }

    async fn find_active_permits_past_end_date(&self, now: DateTime<Utc>) -> Result<Vec<Permit>> {
        self.0.find_active_permits_past_end_date(now).await
    }

    async fn create_risk_assessment(
        &self,
        assessment: &RiskAssessment,
    ) -> Result<Option<RiskAssessment>> {
        self.0.create_risk_assessment(assessment).await
    }

    async fn get_risk_assessment(&self, id: Uuid) -> Result<Option<RiskAssessment>> {
        self.0.get_risk_assessment(id).await
    }

    async fn get_risk_assessment_for_permit(
        &self,
        permit_id: Uuid,
    ) -> Result<Option<RiskAssessment>> {
        self.0.get_risk_assessment_for_permit(permit_id).await
    }

    async fn list_risk_assessments_for_permits(
        &self,
        permit_ids: &[Uuid],
    ) -> Result<Vec<RiskAssessment>> {
        self.0.list_risk_assessments_for_permits(permit_ids).await
    }

    async fn record_review(&self, review: &ReviewRecord) -> Result<Option<RiskAssessment>> {
        self.0.record_review(review).await
    }

    async fn insert_activity(&self, entry: &ActivityEntry) -> Result<()> {
        self.0.insert_activity(entry).await
    }

    async fn list_activity(&self, entity_id: Uuid) -> Result<Vec<ActivityEntry>> {
        self.0.list_activity(entity_id).await
    }

    async fn ping(&self) -> HealthStatus {
        self.0.ping().await
    }
}

/// 创建许可并直接置为 ACTIVE
async fn active_permit(ctx: &TestContext, requester: &User, end_day: u32) -> Permit {
    let mut request = new_permit(requester, "HOT_WORK");
    request.end_date = at(2024, 1, end_day);
    let permit = ctx.state.permit_service.create(request).await.unwrap();

    ctx.store
        .update_permit_status(&StatusChange {
            permit_id: permit.id,
            from: PermitStatus::Draft,
            to: PermitStatus::Active,
            approver_id: None,
        })
        .await
        .unwrap()
        .unwrap()
}

async fn status_of(ctx: &TestContext, permit: &Permit) -> PermitStatus {
    ctx.store.get_permit(permit.id).await.unwrap().unwrap().status
}

#[tokio::test]
async fn test_sweep_expires_only_overdue_active_permits() {
    let ctx = TestContext::new();
    let requester = ctx.user("Rita Requester", Role::PermitRequester).await;

    let overdue = active_permit(&ctx, &requester, 2).await;
    let running = active_permit(&ctx, &requester, 10).await;
    let draft = ctx.draft_permit(&requester).await;

    let report = ctx.state.expiration_service.sweep(at(2024, 1, 3)).await.unwrap();

    assert_eq!(report.expired, vec![overdue.id]);
    assert!(report.failures.is_empty());

    assert_eq!(status_of(&ctx, &overdue).await, PermitStatus::Expired);
    assert_eq!(status_of(&ctx, &running).await, PermitStatus::Active);
    assert_eq!(status_of(&ctx, &draft).await, PermitStatus::Draft);
}

#[tokio::test]
async fn test_sweep_is_idempotent() {
    let ctx = TestContext::new();
    let requester = ctx.user("Rita Requester", Role::PermitRequester).await;
    let permit = active_permit(&ctx, &requester, 2).await;

    let first = ctx.state.expiration_service.sweep(at(2024, 1, 3)).await.unwrap();
    assert_eq!(first.expired_count(), 1);
    let notified = ctx.notifier.sent().len();

    let second = ctx.state.expiration_service.sweep(at(2024, 1, 3)).await.unwrap();
    assert_eq!(second.expired_count(), 0);
    assert!(second.failures.is_empty());
    assert_eq!(ctx.notifier.sent().len(), notified);

    let expired = ctx.store.get_permit(permit.id).await.unwrap().unwrap();
    assert_eq!(expired.status, PermitStatus::Expired);
    assert_eq!(expired.version, 2);
}

#[tokio::test]
async fn test_sweep_notifies_stakeholders_and_hse() {
    let ctx = TestContext::new();
    let requester = ctx.user("Rita Requester", Role::PermitRequester).await;
    let pic = ctx.user("Paul Pic", Role::Pic).await;
    let lead = ctx.user("Liam Lead", Role::HseLead).await;
    let engineer = ctx.user("Erin Engineer", Role::HseEngineer).await;
    let officer = ctx.user("Omar Officer", Role::HseOfficer).await;

    let permit = active_permit(&ctx, &requester, 2).await;
    ctx.state
        .permit_service
        .assign_parties(permit.id, requester.id, None, Some(pic.id))
        .await
        .unwrap();

    ctx.state.expiration_service.sweep(at(2024, 1, 3)).await.unwrap();

    let sent = ctx.notifier.sent();
    assert!(sent.iter().all(|n| n.kind == NotificationKind::PermitExpiration));

    let mut recipients = ctx.notifier.recipients();
    recipients.sort();
    let mut expected = vec![requester.id, pic.id, lead.id, engineer.id];
    expected.sort();
    assert_eq!(recipients, expected);
    assert!(!recipients.contains(&officer.id));

    let data = sent[0].data.as_ref().unwrap();
    assert_eq!(data["permit_number"], permit.permit_number);
}

#[tokio::test]
async fn test_notification_failure_is_reported_not_fatal() {
    let ctx = TestContext::new();
    let requester = ctx.user("Rita Requester", Role::PermitRequester).await;
    let lead = ctx.user("Liam Lead", Role::HseLead).await;
    ctx.notifier.fail_for(requester.id);

    let permit = active_permit(&ctx, &requester, 2).await;

    let report = ctx.state.expiration_service.sweep(at(2024, 1, 3)).await.unwrap();

    // 状态变更已提交
    assert_eq!(report.expired, vec![permit.id]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].permit_id, permit.id);
    assert_eq!(report.failures[0].stage, SweepStage::Notification);

    // 其他收件人照常收到
    assert_eq!(ctx.notifier.recipients(), vec![lead.id]);

    let expired = ctx.store.get_permit(permit.id).await.unwrap().unwrap();
    assert_eq!(expired.status, PermitStatus::Expired);
}

#[tokio::test]
async fn test_update_expiry() {
    let ctx = TestContext::new();
    let requester = ctx.user("Rita Requester", Role::PermitRequester).await;
    let engineer = ctx.user("Erin Engineer", Role::HseEngineer).await;
    let lead = ctx.user("Liam Lead", Role::HseLead).await;
    let permit = active_permit(&ctx, &requester, 2).await;

    let updated = ctx
        .state
        .expiration_service
        .update_expiry(permit.id, at(2024, 1, 5), engineer.id)
        .await
        .unwrap();

    assert_eq!(updated.end_date, at(2024, 1, 5));
    assert_eq!(updated.status, PermitStatus::Active);

    // 操作人本人不收通知
    let mut recipients = ctx.notifier.recipients();
    recipients.sort();
    let mut expected = vec![requester.id, lead.id];
    expected.sort();
    assert_eq!(recipients, expected);
    assert!(ctx
        .notifier
        .sent()
        .iter()
        .all(|n| n.kind == NotificationKind::PermitExpiryChanged));

    // 延期后在 1 月 3 日不再过期
    let report = ctx.state.expiration_service.sweep(at(2024, 1, 3)).await.unwrap();
    assert!(report.expired.is_empty());

    let history = ctx.state.audit_service.history(permit.id).await.unwrap();
    assert!(history.iter().any(|e| e.action == "EXPIRY_DATE_MODIFIED"));
}

#[tokio::test]
async fn test_update_expiry_rejections() {
    let ctx = TestContext::new();
    let requester = ctx.user("Rita Requester", Role::PermitRequester).await;
    let pic = ctx.user("Paul Pic", Role::Pic).await;
    let permit = active_permit(&ctx, &requester, 2).await;
    let service = &ctx.state.expiration_service;

    let result = service.update_expiry(permit.id, at(2024, 1, 5), requester.id).await;
    assert!(matches!(result, Err(AppError::Unauthorized(_))));

    let result = service.update_expiry(permit.id, at(2024, 1, 1), pic.id).await;
    assert!(matches!(result, Err(AppError::InvalidRange(_))));

    let result = service.update_expiry(permit.id, at(2023, 12, 1), pic.id).await;
    assert!(matches!(result, Err(AppError::InvalidRange(_))));

    let unchanged = ctx.store.get_permit(permit.id).await.unwrap().unwrap();
    assert_eq!(unchanged.end_date, at(2024, 1, 2));
}

#[tokio::test]
async fn test_update_expiry_survives_recipient_lookup_failure() {
    let ctx = TestContext::new();
    let requester = ctx.user("Rita Requester", Role::PermitRequester).await;
    let pic = ctx.user("Paul Pic", Role::Pic).await;
    let permit = active_permit(&ctx, &requester, 2).await;

    let store: Arc<dyn Store> = Arc::new(RoleLookupDown(ctx.store.clone()));
    let service = ExpirationService::new(
        store.clone(),
        Arc::new(AuditService::new(store)),
        NotificationGateway::new(ctx.notifier.clone() as Arc<dyn Notifier>),
    );

    // 到期时间已写入，通知收件人查询失败不影响结果
    let updated = service
        .update_expiry(permit.id, at(2024, 1, 5), pic.id)
        .await
        .unwrap();
    assert_eq!(updated.end_date, at(2024, 1, 5));

    let stored = ctx.store.get_permit(permit.id).await.unwrap().unwrap();
    assert_eq!(stored.end_date, at(2024, 1, 5));
    assert!(ctx.notifier.sent().is_empty());

    let history = ctx.state.audit_service.history(permit.id).await.unwrap();
    assert!(history.iter().any(|e| e.action == "EXPIRY_DATE_MODIFIED"));
}
