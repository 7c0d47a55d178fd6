//! 许可状态机集成测试
//!
//! 基于内存存储，覆盖创建、动作执行、授权拒绝和完整的动火作业流程

use ptw_service::{
    error::AppError,
    models::{
        permit::{is_valid_permit_number, ActionKind, PermitAction, PermitStatus},
        risk::RiskLevel,
        user::Role,
    },
    notifications::NotificationKind,
    repository::Store,
};
use uuid::Uuid;

mod common;
use common::{at, hazard, new_permit, TestContext};

fn action(kind: ActionKind, actor_id: Uuid, permit_id: Uuid) -> PermitAction {
    PermitAction {
        kind,
        actor_id,
        permit_id,
        comment: None,
    }
}

// ==================== 创建 ====================

#[tokio::test]
async fn test_create_permit_starts_as_draft() {
    let ctx = TestContext::new();
    let requester = ctx.user("Rita Requester", Role::PermitRequester).await;

    let permit = ctx.draft_permit(&requester).await;

    assert_eq!(permit.status, PermitStatus::Draft);
    assert_eq!(permit.requester_id, requester.id);
    assert_eq!(permit.company_id, ctx.company_id);
    assert!(permit.approver_id.is_none());
    assert!(is_valid_permit_number(&permit.permit_number));
}

#[tokio::test]
async fn test_permit_numbers_are_unique_and_sequential() {
    let ctx = TestContext::new();
    let requester = ctx.user("Rita Requester", Role::PermitRequester).await;

    let first = ctx.draft_permit(&requester).await;
    let second = ctx.draft_permit(&requester).await;

    assert_ne!(first.permit_number, second.permit_number);
    assert!(first.permit_number.ends_with("-0001"));
    assert!(second.permit_number.ends_with("-0002"));
}

#[tokio::test]
async fn test_create_rejects_inverted_date_range() {
    let ctx = TestContext::new();
    let requester = ctx.user("Rita Requester", Role::PermitRequester).await;

    let mut request = new_permit(&requester, "HOT_WORK");
    request.end_date = request.start_date;

    let result = ctx.state.permit_service.create(request).await;
    assert!(matches!(result, Err(AppError::InvalidRange(_))));

    let mut request = new_permit(&requester, "HOT_WORK");
    request.end_date = at(2023, 12, 31);
    let result = ctx.state.permit_service.create(request).await;
    assert!(matches!(result, Err(AppError::InvalidRange(_))));
}

#[tokio::test]
async fn test_create_rejects_blank_work_type() {
    let ctx = TestContext::new();
    let requester = ctx.user("Rita Requester", Role::PermitRequester).await;

    let result = ctx
        .state
        .permit_service
        .create(new_permit(&requester, ""))
        .await;
    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn test_create_rejects_unknown_requester() {
    let ctx = TestContext::new();
    let requester = ctx.user("Rita Requester", Role::PermitRequester).await;

    let mut request = new_permit(&requester, "HOT_WORK");
    request.requester_id = Uuid::new_v4();

    let result = ctx.state.permit_service.create(request).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

// ==================== 动作 ====================

#[tokio::test]
async fn test_requester_cannot_suspend_active_permit() {
    let ctx = TestContext::new();
    let requester = ctx.user("Rita Requester", Role::PermitRequester).await;
    let permit = ctx.draft_permit(&requester).await;

    // 直接把许可置为 ACTIVE
    force_status(&ctx, permit.id, PermitStatus::Draft, PermitStatus::Active).await;

    let result = ctx
        .state
        .permit_service
        .execute(&action(ActionKind::Suspend, requester.id, permit.id))
        .await;

    match result {
        Err(AppError::Unauthorized(reason)) => {
            assert_eq!(reason, "User does not have suspension authority")
        }
        other => panic!("expected Unauthorized, got {:?}", other),
    }

    let unchanged = ctx.store.get_permit(permit.id).await.unwrap().unwrap();
    assert_eq!(unchanged.status, PermitStatus::Active);
    assert_eq!(unchanged.version, 1);
}

#[tokio::test]
async fn test_hse_officer_suspends_active_permit() {
    let ctx = TestContext::new();
    let requester = ctx.user("Rita Requester", Role::PermitRequester).await;
    let officer = ctx.user("Omar Officer", Role::HseOfficer).await;
    let permit = ctx.draft_permit(&requester).await;
    force_status(&ctx, permit.id, PermitStatus::Draft, PermitStatus::Active).await;

    let suspended = ctx
        .state
        .permit_service
        .execute(&action(ActionKind::Suspend, officer.id, permit.id))
        .await
        .unwrap();

    assert_eq!(suspended.status, PermitStatus::Suspended);
    // 申请人收到状态变更通知，操作人本人不收
    let recipients = ctx.notifier.recipients();
    assert!(recipients.contains(&requester.id));
    assert!(!recipients.contains(&officer.id));
    assert!(ctx
        .notifier
        .sent()
        .iter()
        .all(|n| n.kind == NotificationKind::PermitStatusChanged));
}

#[tokio::test]
async fn test_terminal_permit_rejects_every_action() {
    let ctx = TestContext::new();
    let requester = ctx.user("Rita Requester", Role::PermitRequester).await;
    let admin = ctx.user("Ada Admin", Role::Admin).await;
    let permit = ctx.draft_permit(&requester).await;

    let cancelled = ctx
        .state
        .permit_service
        .execute(&action(ActionKind::Cancel, requester.id, permit.id))
        .await
        .unwrap();
    assert_eq!(cancelled.status, PermitStatus::Cancelled);

    for kind in [
        ActionKind::Approve,
        ActionKind::Reject,
        ActionKind::Suspend,
        ActionKind::Complete,
        ActionKind::Cancel,
        ActionKind::Submit,
        ActionKind::Activate,
    ] {
        // 重复执行结果一致
        for _ in 0..2 {
            let result = ctx
                .state
                .permit_service
                .execute(&action(kind, admin.id, permit.id))
                .await;
            assert!(
                matches!(result, Err(AppError::InvalidState(_))),
                "{} on a cancelled permit should be InvalidState",
                kind
            );
        }
    }

    let still = ctx.store.get_permit(permit.id).await.unwrap().unwrap();
    assert_eq!(still.status, PermitStatus::Cancelled);
}

#[tokio::test]
async fn test_approve_requires_reviewable_state() {
    let ctx = TestContext::new();
    let requester = ctx.user("Rita Requester", Role::PermitRequester).await;
    let pic = ctx.user("Paul Pic", Role::Pic).await;
    let permit = ctx.draft_permit(&requester).await;

    let result = ctx
        .state
        .permit_service
        .execute(&action(ActionKind::Approve, pic.id, permit.id))
        .await;
    assert!(matches!(result, Err(AppError::InvalidState(_))));
}

#[tokio::test]
async fn test_actor_from_other_company_is_unauthorized() {
    let ctx = TestContext::new();
    let requester = ctx.user("Rita Requester", Role::PermitRequester).await;
    let outsider = ctx
        .user_in(Uuid::new_v4(), "Olga Outsider", Role::Admin, None)
        .await;
    let permit = ctx.draft_permit(&requester).await;

    let result = ctx
        .state
        .permit_service
        .execute(&action(ActionKind::Cancel, outsider.id, permit.id))
        .await;
    assert!(matches!(result, Err(AppError::Unauthorized(_))));
}

#[tokio::test]
async fn test_validate_action_does_not_mutate() {
    let ctx = TestContext::new();
    let requester = ctx.user("Rita Requester", Role::PermitRequester).await;
    let holder = ctx.user("Hank Holder", Role::PermitHolder).await;
    let permit = ctx.draft_permit(&requester).await;

    let allowed = ctx
        .state
        .permit_service
        .validate_action(&action(ActionKind::Submit, requester.id, permit.id))
        .await
        .unwrap();
    assert!(allowed.valid);
    assert_eq!(allowed.reason, "SUBMIT is allowed");

    let denied = ctx
        .state
        .permit_service
        .validate_action(&action(ActionKind::Submit, holder.id, permit.id))
        .await
        .unwrap();
    assert!(!denied.valid);
    assert_eq!(denied.reason, "Only the requester can submit the permit");

    let wrong_state = ctx
        .state
        .permit_service
        .validate_action(&action(ActionKind::Complete, holder.id, permit.id))
        .await
        .unwrap();
    assert!(!wrong_state.valid);
    assert_eq!(wrong_state.reason, "Only active permits can be completed");

    let unchanged = ctx.store.get_permit(permit.id).await.unwrap().unwrap();
    assert_eq!(unchanged.status, PermitStatus::Draft);
    assert_eq!(unchanged.version, permit.version);
}

#[tokio::test]
async fn test_holder_completes_after_assignment() {
    let ctx = TestContext::new();
    let requester = ctx.user("Rita Requester", Role::PermitRequester).await;
    let holder = ctx.user("Hank Holder", Role::PermitHolder).await;
    let permit = ctx.draft_permit(&requester).await;

    let assigned = ctx
        .state
        .permit_service
        .assign_parties(permit.id, requester.id, Some(holder.id), None)
        .await
        .unwrap();
    assert_eq!(assigned.holder_id, Some(holder.id));

    force_status(&ctx, permit.id, PermitStatus::Draft, PermitStatus::Active).await;

    let completed = ctx
        .state
        .permit_service
        .execute(&action(ActionKind::Complete, holder.id, permit.id))
        .await
        .unwrap();
    assert_eq!(completed.status, PermitStatus::Completed);
}

#[tokio::test]
async fn test_assign_parties_rejects_outsiders() {
    let ctx = TestContext::new();
    let requester = ctx.user("Rita Requester", Role::PermitRequester).await;
    let holder = ctx.user("Hank Holder", Role::PermitHolder).await;
    let outsider = ctx
        .user_in(Uuid::new_v4(), "Olga Outsider", Role::PermitHolder, None)
        .await;
    let permit = ctx.draft_permit(&requester).await;

    // 无权限的操作人
    let result = ctx
        .state
        .permit_service
        .assign_parties(permit.id, holder.id, Some(holder.id), None)
        .await;
    assert!(matches!(result, Err(AppError::Unauthorized(_))));

    // 外公司的被指派人
    let result = ctx
        .state
        .permit_service
        .assign_parties(permit.id, requester.id, Some(outsider.id), None)
        .await;
    assert!(matches!(result, Err(AppError::Validation(_))));

    let result = ctx
        .state
        .permit_service
        .assign_parties(permit.id, requester.id, None, None)
        .await;
    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn test_activity_log_records_transitions() {
    let ctx = TestContext::new();
    let requester = ctx.user("Rita Requester", Role::PermitRequester).await;
    let permit = ctx.draft_permit(&requester).await;

    ctx.state
        .permit_service
        .execute(&PermitAction {
            comment: Some("Ready for review".to_string()),
            ..action(ActionKind::Submit, requester.id, permit.id)
        })
        .await
        .unwrap();

    let history = ctx.state.audit_service.history(permit.id).await.unwrap();
    let actions: Vec<_> = history.iter().map(|e| e.action.as_str()).collect();
    assert_eq!(actions, vec!["PERMIT_CREATED", "PERMIT_SUBMITTED"]);
    assert!(history[1].details.contains("Ready for review"));
    assert_eq!(history[1].performed_by, Some(requester.id));
}

// ==================== 可见性 ====================

#[tokio::test]
async fn test_visibility_by_role_and_hierarchy() {
    let ctx = TestContext::new();
    let officer = ctx.user("Omar Officer", Role::HseOfficer).await;
    let report = ctx
        .user_in(ctx.company_id, "Rex Report", Role::PermitRequester, Some(officer.id))
        .await;
    let stranger = ctx.user("Sam Stranger", Role::PermitRequester).await;
    let admin = ctx.user("Ada Admin", Role::Admin).await;

    let team_permit = ctx.draft_permit(&report).await;
    let other_permit = ctx.draft_permit(&stranger).await;

    let officer_view = ctx.state.permit_service.list_visible_to(officer.id).await.unwrap();
    let ids: Vec<_> = officer_view.iter().map(|p| p.id).collect();
    assert!(ids.contains(&team_permit.id));
    assert!(!ids.contains(&other_permit.id));

    let admin_view = ctx.state.permit_service.list_visible_to(admin.id).await.unwrap();
    assert_eq!(admin_view.len(), 2);

    let stranger_view = ctx.state.permit_service.list_visible_to(stranger.id).await.unwrap();
    assert_eq!(stranger_view.len(), 1);
    assert_eq!(stranger_view[0].id, other_permit.id);

    // 不可见与不存在同样返回 NotFound
    let result = ctx
        .state
        .permit_service
        .get_visible(stranger.id, team_permit.id)
        .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));

    let by_number = ctx
        .state
        .permit_service
        .get_by_number(report.id, &team_permit.permit_number)
        .await
        .unwrap();
    assert_eq!(by_number.id, team_permit.id);

    let malformed = ctx
        .state
        .permit_service
        .get_by_number(report.id, "not-a-number")
        .await;
    assert!(matches!(malformed, Err(AppError::Validation(_))));
}

// ==================== 完整流程 ====================

#[tokio::test]
async fn test_hot_work_permit_lifecycle() {
    let ctx = TestContext::new();
    let requester = ctx.user("Rita Requester", Role::PermitRequester).await;
    let engineer = ctx.user("Erin Engineer", Role::HseEngineer).await;
    let lead = ctx.user("Liam Lead", Role::HseLead).await;
    let pic = ctx.user("Paul Pic", Role::Pic).await;

    // 1. 创建
    let permit = ctx.draft_permit(&requester).await;
    assert_eq!(permit.status, PermitStatus::Draft);
    assert_eq!(permit.work_type, "HOT_WORK");

    // 2. 提交风险评估
    let submitted = ctx
        .state
        .permit_service
        .execute(&action(ActionKind::Submit, requester.id, permit.id))
        .await
        .unwrap();
    assert_eq!(submitted.status, PermitStatus::PendingRiskAssessment);

    // 3. 风险评估：4 x 4 = 16，按阈值为 CRITICAL
    assert!(ctx
        .state
        .risk_assessment_service
        .can_assess(engineer.id, permit.id)
        .await
        .unwrap());
    let assessment = ctx
        .state
        .risk_assessment_service
        .create(permit.id, engineer.id, vec![hazard(4, 4)])
        .await
        .unwrap();
    assert_eq!(assessment.risk_level, RiskLevel::Critical);
    let assessed = ctx.store.get_permit(permit.id).await.unwrap().unwrap();
    assert_eq!(assessed.status, PermitStatus::RiskAssessmentCompleted);

    // 4. HSE_LEAD 复核通过
    let reviewed = ctx
        .state
        .risk_assessment_service
        .review(assessment.id, lead.id, true)
        .await
        .unwrap();
    assert_eq!(reviewed.reviewer_id, Some(lead.id));
    let pending = ctx.store.get_permit(permit.id).await.unwrap().unwrap();
    assert_eq!(pending.status, PermitStatus::PendingApproval);

    // 5. PIC 审批
    let approved = ctx
        .state
        .permit_service
        .execute(&action(ActionKind::Approve, pic.id, permit.id))
        .await
        .unwrap();
    assert_eq!(approved.status, PermitStatus::Approved);
    assert_eq!(approved.approver_id, Some(pic.id));

    // 6. 启用
    let active = ctx
        .state
        .permit_service
        .execute(&action(ActionKind::Activate, pic.id, permit.id))
        .await
        .unwrap();
    assert_eq!(active.status, PermitStatus::Active);

    // 7. 2024-01-03 清扫后过期
    let report = ctx.state.expiration_service.sweep(at(2024, 1, 3)).await.unwrap();
    assert_eq!(report.expired, vec![permit.id]);

    let expired = ctx.store.get_permit(permit.id).await.unwrap().unwrap();
    assert_eq!(expired.status, PermitStatus::Expired);
    assert_eq!(expired.approver_id, Some(pic.id));

    let history = ctx.state.audit_service.history(permit.id).await.unwrap();
    let last = history.last().unwrap();
    assert_eq!(last.action, "PERMIT_EXPIRED");
    assert!(last.performed_by.is_none());
}

// ==================== 并发 ====================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_get_distinct_numbers() {
    let ctx = TestContext::new();
    let requester = ctx.user("Rita Requester", Role::PermitRequester).await;
    let service = &ctx.state.permit_service;

    let (a, b) = tokio::join!(
        service.create(new_permit(&requester, "HOT_WORK")),
        service.create(new_permit(&requester, "CONFINED_SPACE")),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a.permit_number, b.permit_number);

    let batch = futures::future::join_all(
        (0..8).map(|_| service.create(new_permit(&requester, "WORKING_AT_HEIGHT"))),
    )
    .await;
    let mut numbers: Vec<String> = batch
        .into_iter()
        .map(|r| r.unwrap().permit_number)
        .chain([a.permit_number, b.permit_number])
        .collect();
    numbers.sort();
    numbers.dedup();
    assert_eq!(numbers.len(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_approvals_have_single_winner() {
    let ctx = TestContext::new();
    let requester = ctx.user("Rita Requester", Role::PermitRequester).await;
    let lead = ctx.user("Liam Lead", Role::HseLead).await;
    let pic = ctx.user("Paul Pic", Role::Pic).await;
    let permit = ctx.draft_permit(&requester).await;
    force_status(&ctx, permit.id, PermitStatus::Draft, PermitStatus::PendingApproval).await;

    let service = &ctx.state.permit_service;
    let by_lead = action(ActionKind::Approve, lead.id, permit.id);
    let by_pic = action(ActionKind::Approve, pic.id, permit.id);
    let (first, second) = tokio::join!(service.execute(&by_lead), service.execute(&by_pic));

    let (winner, loser) = match (first, second) {
        (Ok(approved), Err(e)) => ((approved, lead.id), e),
        (Err(e), Ok(approved)) => ((approved, pic.id), e),
        other => panic!("expected exactly one approval, got {:?}", other),
    };
    assert!(matches!(loser, AppError::InvalidState(_)));

    let stored = ctx.store.get_permit(permit.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PermitStatus::Approved);
    assert_eq!(stored.approver_id, Some(winner.1));
    assert_eq!(stored.version, winner.0.version);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sweep_and_complete_race_has_single_winner() {
    let ctx = TestContext::new();
    let requester = ctx.user("Rita Requester", Role::PermitRequester).await;
    let holder = ctx.user("Hank Holder", Role::PermitHolder).await;
    let permit = ctx.draft_permit(&requester).await;
    ctx.state
        .permit_service
        .assign_parties(permit.id, requester.id, Some(holder.id), None)
        .await
        .unwrap();
    force_status(&ctx, permit.id, PermitStatus::Draft, PermitStatus::Active).await;
    let before = ctx.store.get_permit(permit.id).await.unwrap().unwrap().version;

    let complete = action(ActionKind::Complete, holder.id, permit.id);
    let (completed, report) = tokio::join!(
        ctx.state.permit_service.execute(&complete),
        ctx.state.expiration_service.sweep(at(2024, 1, 3)),
    );
    let report = report.unwrap();
    let expired = report.expired.contains(&permit.id);

    let stored = ctx.store.get_permit(permit.id).await.unwrap().unwrap();
    match completed {
        Ok(done) => {
            assert!(!expired);
            assert_eq!(done.status, PermitStatus::Completed);
            assert_eq!(stored.status, PermitStatus::Completed);
        }
        Err(e) => {
            assert!(matches!(e, AppError::InvalidState(_)));
            assert!(expired);
            assert_eq!(stored.status, PermitStatus::Expired);
        }
    }
    // 只发生了一次状态写入
    assert_eq!(stored.version, before + 1);
}

/// 测试辅助：绕过规则直接做条件状态写入
async fn force_status(ctx: &TestContext, permit_id: Uuid, from: PermitStatus, to: PermitStatus) {
    let change = ptw_service::models::permit::StatusChange {
        permit_id,
        from,
        to,
        approver_id: None,
    };
    ctx.store
        .update_permit_status(&change)
        .await
        .unwrap()
        .expect("status precondition should hold");
}
