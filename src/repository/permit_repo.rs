//! Permit repository (数据库访问层)

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::permit::{Permit, PermitStatus, StatusChange},
};

pub struct PermitRepository {
    db: PgPool,
}

impl PermitRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Permit>, AppError> {
        let permit = sqlx::query_as::<_, Permit>("SELECT * FROM permits WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        Ok(permit)
    }

    pub async fn find_by_number(&self, permit_number: &str) -> Result<Option<Permit>, AppError> {
        let permit = sqlx::query_as::<_, Permit>("SELECT * FROM permits WHERE permit_number = $1")
            .bind(permit_number)
            .fetch_optional(&self.db)
            .await?;

        Ok(permit)
    }

    pub async fn create(&self, permit: &Permit) -> Result<Permit, AppError> {
        let permit = sqlx::query_as::<_, Permit>(
            r#"
            INSERT INTO permits (
                id, permit_number, work_type, location, start_date, end_date,
                status, requester_id, approver_id, holder_id, pic_id, company_id,
                description, equipment, version, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6,
                $7, $8, $9, $10, $11, $12,
                $13, $14, $15, $16, $17
            ) RETURNING *
            "#,
        )
        .bind(permit.id)
        .bind(&permit.permit_number)
        .bind(&permit.work_type)
        .bind(&permit.location)
        .bind(permit.start_date)
        .bind(permit.end_date)
        .bind(permit.status)
        .bind(permit.requester_id)
        .bind(permit.approver_id)
        .bind(permit.holder_id)
        .bind(permit.pic_id)
        .bind(permit.company_id)
        .bind(&permit.description)
        .bind(&permit.equipment)
        .bind(permit.version)
        .bind(permit.created_at)
        .bind(permit.updated_at)
        .fetch_one(&self.db)
        .await?;

        Ok(permit)
    }

    /// 公司级编号计数器
    ///
    /// 首行以公司现有许可数 + 1 初始化，之后由行锁串行递增，
    /// 并发创建不会拿到重复序号。
    pub async fn next_sequence(&self, company_id: Uuid) -> Result<i64, AppError> {
        let value = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO permit_sequences (company_id, last_value)
            VALUES ($1, (SELECT COUNT(*) FROM permits WHERE company_id = $1) + 1)
            ON CONFLICT (company_id)
            DO UPDATE SET last_value = permit_sequences.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(company_id)
        .fetch_one(&self.db)
        .await?;

        Ok(value)
    }

    pub async fn list_by_company(&self, company_id: Uuid) -> Result<Vec<Permit>, AppError> {
        let permits = sqlx::query_as::<_, Permit>(
            "SELECT * FROM permits WHERE company_id = $1 ORDER BY created_at DESC",
        )
        .bind(company_id)
        .fetch_all(&self.db)
        .await?;

        Ok(permits)
    }

    /// 条件状态写入
    pub async fn update_status(&self, change: &StatusChange) -> Result<Option<Permit>, AppError> {
        let permit = sqlx::query_as::<_, Permit>(
            r#"
            UPDATE permits
            SET status = $3,
                approver_id = COALESCE($4, approver_id),
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(change.permit_id)
        .bind(change.from)
        .bind(change.to)
        .bind(change.approver_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(permit)
    }

    pub async fn update_end_date(
        &self,
        permit_id: Uuid,
        end_date: DateTime<Utc>,
    ) -> Result<Option<Permit>, AppError> {
        let permit = sqlx::query_as::<_, Permit>(
            r#"
            UPDATE permits
            SET end_date = $2, version = version + 1, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(permit_id)
        .bind(end_date)
        .fetch_optional(&self.db)
        .await?;

        Ok(permit)
    }

    pub async fn update_parties(
        &self,
        permit_id: Uuid,
        holder_id: Option<Uuid>,
        pic_id: Option<Uuid>,
    ) -> Result<Option<Permit>, AppError> {
        let permit = sqlx::query_as::<_, Permit>(
            r#"
            UPDATE permits
            SET holder_id = COALESCE($2, holder_id),
                pic_id = COALESCE($3, pic_id),
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(permit_id)
        .bind(holder_id)
        .bind(pic_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(permit)
    }

    pub async fn find_active_past_end_date(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Permit>, AppError> {
        let permits = sqlx::query_as::<_, Permit>(
            r#"
            SELECT * FROM permits
            WHERE status = $1 AND end_date < $2
            ORDER BY end_date
            "#,
        )
        .bind(PermitStatus::Active)
        .bind(now)
        .fetch_all(&self.db)
        .await?;

        Ok(permits)
    }
}
