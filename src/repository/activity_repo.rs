//! Activity repository (活动日志数据访问)

use crate::{error::AppError, models::activity::ActivityEntry};
use sqlx::PgPool;
use uuid::Uuid;

pub struct ActivityRepository {
    db: PgPool,
}

impl ActivityRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// 追加活动日志（只插入，不修改）
    pub async fn insert(&self, entry: &ActivityEntry) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO activity_logs (
                id, entity_type, entity_id, action, performed_by, details, occurred_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.entity_type)
        .bind(entry.entity_id)
        .bind(&entry.action)
        .bind(entry.performed_by)
        .bind(&entry.details)
        .bind(entry.occurred_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// 按实体查询，按发生时间正序
    pub async fn list_for_entity(&self, entity_id: Uuid) -> Result<Vec<ActivityEntry>, AppError> {
        let entries = sqlx::query_as::<_, ActivityEntry>(
            r#"
            SELECT * FROM activity_logs
            WHERE entity_id = $1
            ORDER BY occurred_at, id
            "#,
        )
        .bind(entity_id)
        .fetch_all(&self.db)
        .await?;

        Ok(entries)
    }
}
