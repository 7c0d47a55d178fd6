//! 存储抽象
//!
//! 核心服务只依赖 [`Store`]，具体实现由启动代码注入：
//! 生产环境使用 [`super::PgStore`]，测试与本地开发使用 [`super::MemoryStore`]。
//!
//! 所有状态写入都是条件写入（`WHERE status = from`），返回 `None` 表示
//! 记录不存在或已被并发修改，由调用方重新读取后给出具体原因。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::HealthStatus;
use crate::error::Result;
use crate::models::{
    activity::ActivityEntry,
    permit::{Permit, StatusChange},
    risk::{ReviewRecord, RiskAssessment},
    user::{Role, User},
};

#[async_trait]
pub trait Store: Send + Sync {
    // ===== 用户 =====

    async fn get_user(&self, id: Uuid) -> Result<Option<User>>;

    async fn insert_user(&self, user: &User) -> Result<User>;

    async fn list_company_users(&self, company_id: Uuid) -> Result<Vec<User>>;

    async fn list_users_with_roles(&self, company_id: Uuid, roles: &[Role]) -> Result<Vec<User>>;

    async fn list_direct_reports(&self, user_id: Uuid) -> Result<Vec<User>>;

    async fn update_user_supervisor(
        &self,
        user_id: Uuid,
        supervisor_id: Option<Uuid>,
    ) -> Result<Option<User>>;

    // ===== 许可 =====

    async fn get_permit(&self, id: Uuid) -> Result<Option<Permit>>;

    async fn get_permit_by_number(&self, permit_number: &str) -> Result<Option<Permit>>;

    async fn insert_permit(&self, permit: &Permit) -> Result<Permit>;

    /// 公司级原子计数器；首次使用时以公司现有许可数为起点
    async fn next_permit_sequence(&self, company_id: Uuid) -> Result<i64>;

    async fn list_company_permits(&self, company_id: Uuid) -> Result<Vec<Permit>>;

    async fn update_permit_status(&self, change: &StatusChange) -> Result<Option<Permit>>;

    async fn update_permit_end_date(
        &self,
        permit_id: Uuid,
        end_date: DateTime<Utc>,
    ) -> Result<Option<Permit>>;

    /// 仅覆盖传入为 Some 的字段
    async fn update_permit_parties(
        &self,
        permit_id: Uuid,
        holder_id: Option<Uuid>,
        pic_id: Option<Uuid>,
    ) -> Result<Option<Permit>>;

    async fn find_active_permits_past_end_date(&self, now: DateTime<Utc>) -> Result<Vec<Permit>>;

    // ===== 风险评估 =====

    /// 写入评估并把许可从 PENDING_RISK_ASSESSMENT 推进到 RISK_ASSESSMENT_COMPLETED。
    /// 许可状态不符时不写入任何数据并返回 None。
    /// 许可已有评估（被退回后重新评估）时原地替换，保持一一对应。
    async fn create_risk_assessment(
        &self,
        assessment: &RiskAssessment,
    ) -> Result<Option<RiskAssessment>>;

    async fn get_risk_assessment(&self, id: Uuid) -> Result<Option<RiskAssessment>>;

    async fn get_risk_assessment_for_permit(&self, permit_id: Uuid)
        -> Result<Option<RiskAssessment>>;

    async fn list_risk_assessments_for_permits(
        &self,
        permit_ids: &[Uuid],
    ) -> Result<Vec<RiskAssessment>>;

    /// 记录复核人并条件推进许可状态，二者在同一事务内完成
    async fn record_review(&self, review: &ReviewRecord) -> Result<Option<RiskAssessment>>;

    // ===== 活动日志 =====

    async fn insert_activity(&self, entry: &ActivityEntry) -> Result<()>;

    async fn list_activity(&self, entity_id: Uuid) -> Result<Vec<ActivityEntry>>;

    async fn ping(&self) -> HealthStatus;
}
