//! Permit domain models
//! 工作许可聚合根、状态与动作

use chrono::{DateTime, Datelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// 许可状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "permit_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermitStatus {
    Draft,
    PendingRiskAssessment,
    RiskAssessmentCompleted,
    PendingApproval,
    Approved,
    Active,
    Suspended,
    Completed,
    Expired,
    Cancelled,
    Rejected,
}

impl PermitStatus {
    pub const ALL: [PermitStatus; 11] = [
        PermitStatus::Draft,
        PermitStatus::PendingRiskAssessment,
        PermitStatus::RiskAssessmentCompleted,
        PermitStatus::PendingApproval,
        PermitStatus::Approved,
        PermitStatus::Active,
        PermitStatus::Suspended,
        PermitStatus::Completed,
        PermitStatus::Expired,
        PermitStatus::Cancelled,
        PermitStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PermitStatus::Draft => "DRAFT",
            PermitStatus::PendingRiskAssessment => "PENDING_RISK_ASSESSMENT",
            PermitStatus::RiskAssessmentCompleted => "RISK_ASSESSMENT_COMPLETED",
            PermitStatus::PendingApproval => "PENDING_APPROVAL",
            PermitStatus::Approved => "APPROVED",
            PermitStatus::Active => "ACTIVE",
            PermitStatus::Suspended => "SUSPENDED",
            PermitStatus::Completed => "COMPLETED",
            PermitStatus::Expired => "EXPIRED",
            PermitStatus::Cancelled => "CANCELLED",
            PermitStatus::Rejected => "REJECTED",
        }
    }

    /// 终态许可不再接受任何状态变更
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PermitStatus::Completed
                | PermitStatus::Expired
                | PermitStatus::Cancelled
                | PermitStatus::Rejected
        )
    }
}

impl std::fmt::Display for PermitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 工作许可
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Permit {
    pub id: Uuid,
    pub permit_number: String,
    pub work_type: String,
    pub location: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: PermitStatus,

    // 相关人员
    pub requester_id: Uuid,
    pub approver_id: Option<Uuid>,
    pub holder_id: Option<Uuid>,
    pub pic_id: Option<Uuid>,
    pub company_id: Uuid,

    pub description: Option<String>,
    pub equipment: Option<String>,

    /// 乐观并发版本号，每次写入递增
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Permit {
    /// 用户是否以 requester / holder / pic 身份参与该许可
    pub fn involves(&self, user_id: Uuid) -> bool {
        self.requester_id == user_id
            || self.holder_id == Some(user_id)
            || self.pic_id == Some(user_id)
    }

    /// 需要被告知状态变化的相关人（去重）
    pub fn stakeholders(&self) -> Vec<Uuid> {
        let mut ids = vec![self.requester_id];
        for id in [self.holder_id, self.pic_id, self.approver_id].into_iter().flatten() {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }
}

/// 创建许可请求
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewPermit {
    #[validate(length(min = 1, max = 100, message = "work_type must not be empty"))]
    pub work_type: String,
    #[validate(length(min = 1, max = 255, message = "location must not be empty"))]
    pub location: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub requester_id: Uuid,
    pub company_id: Uuid,
    pub description: Option<String>,
    pub equipment: Option<String>,
}

/// 创建许可请求体（申请人与公司取自认证上下文）
#[derive(Debug, Deserialize)]
pub struct CreatePermitRequest {
    pub work_type: String,
    pub location: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub description: Option<String>,
    pub equipment: Option<String>,
}

impl CreatePermitRequest {
    pub fn into_new_permit(self, requester_id: Uuid, company_id: Uuid) -> NewPermit {
        NewPermit {
            work_type: self.work_type,
            location: self.location,
            start_date: self.start_date,
            end_date: self.end_date,
            requester_id,
            company_id,
            description: self.description,
            equipment: self.equipment,
        }
    }
}

/// 许可动作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    Approve,
    Reject,
    Suspend,
    Complete,
    Cancel,
    /// 提交风险评估（DRAFT → PENDING_RISK_ASSESSMENT）
    Submit,
    /// 启用已批准许可（APPROVED → ACTIVE）
    Activate,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Approve => "APPROVE",
            ActionKind::Reject => "REJECT",
            ActionKind::Suspend => "SUSPEND",
            ActionKind::Complete => "COMPLETE",
            ActionKind::Cancel => "CANCEL",
            ActionKind::Submit => "SUBMIT",
            ActionKind::Activate => "ACTIVATE",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 许可动作
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermitAction {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub actor_id: Uuid,
    pub permit_id: Uuid,
    pub comment: Option<String>,
}

/// 动作请求体（actor 与 permit 来自认证上下文和路径）
#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub comment: Option<String>,
}

/// 动作校验结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionValidation {
    pub valid: bool,
    pub reason: String,
}

/// 条件状态写入：仅当当前状态仍为 `from` 时生效
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub permit_id: Uuid,
    pub from: PermitStatus,
    pub to: PermitStatus,
    /// 仅 APPROVE 会写入审批人
    pub approver_id: Option<Uuid>,
}

/// 指派持证人 / 负责人请求
#[derive(Debug, Deserialize)]
pub struct AssignPartiesRequest {
    pub holder_id: Option<Uuid>,
    pub pic_id: Option<Uuid>,
}

/// 修改到期时间请求
#[derive(Debug, Deserialize)]
pub struct UpdateExpiryRequest {
    pub end_date: DateTime<Utc>,
}

static PERMIT_NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^PTW-[0-9A-F]{4}-\d{4}(0[1-9]|1[0-2])-\d{4,}$").expect("valid permit number pattern")
});

/// 公司前缀：公司 ID 的前 4 个十六进制字符（大写）
pub fn company_prefix(company_id: Uuid) -> String {
    company_id.simple().to_string()[..4].to_uppercase()
}

/// 生成许可编号 `PTW-{prefix}-{YYYYMM}-{seq:04}`
pub fn format_permit_number(company_id: Uuid, at: DateTime<Utc>, sequence: i64) -> String {
    format!(
        "PTW-{}-{:04}{:02}-{:04}",
        company_prefix(company_id),
        at.year(),
        at.month(),
        sequence
    )
}

pub fn is_valid_permit_number(number: &str) -> bool {
    PERMIT_NUMBER_RE.is_match(number)
}
