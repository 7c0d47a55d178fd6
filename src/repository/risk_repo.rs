//! Risk assessment repository (风险评估数据访问)
//!
//! 评估写入与许可状态推进放在同一事务内，任一步失败整体回滚。

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        permit::PermitStatus,
        risk::{ReviewRecord, RiskAssessment},
    },
};

pub struct RiskAssessmentRepository {
    db: PgPool,
}

impl RiskAssessmentRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// 写入评估并推进许可状态
    pub async fn create_with_transition(
        &self,
        assessment: &RiskAssessment,
    ) -> Result<Option<RiskAssessment>, AppError> {
        let mut tx = self.db.begin().await?;

        let moved = sqlx::query(
            r#"
            UPDATE permits
            SET status = $3, version = version + 1, updated_at = NOW()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(assessment.permit_id)
        .bind(PermitStatus::PendingRiskAssessment)
        .bind(PermitStatus::RiskAssessmentCompleted)
        .execute(&mut *tx)
        .await?;

        if moved.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        // 被退回后重新评估：原地替换并清空复核结论
        let saved = sqlx::query_as::<_, RiskAssessment>(
            r#"
            INSERT INTO risk_assessments (
                id, permit_id, assessor_id, reviewer_id, review_approved,
                risk_level, hazards, reviewed_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, NULL, NULL, $4, $5, NULL, $6, $7)
            ON CONFLICT (permit_id) DO UPDATE SET
                assessor_id = EXCLUDED.assessor_id,
                reviewer_id = NULL,
                review_approved = NULL,
                risk_level = EXCLUDED.risk_level,
                hazards = EXCLUDED.hazards,
                reviewed_at = NULL,
                updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
        )
        .bind(assessment.id)
        .bind(assessment.permit_id)
        .bind(assessment.assessor_id)
        .bind(assessment.risk_level)
        .bind(&assessment.hazards)
        .bind(assessment.created_at)
        .bind(assessment.updated_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(saved))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<RiskAssessment>, AppError> {
        let assessment =
            sqlx::query_as::<_, RiskAssessment>("SELECT * FROM risk_assessments WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.db)
                .await?;

        Ok(assessment)
    }

    pub async fn find_by_permit(&self, permit_id: Uuid) -> Result<Option<RiskAssessment>, AppError> {
        let assessment = sqlx::query_as::<_, RiskAssessment>(
            "SELECT * FROM risk_assessments WHERE permit_id = $1",
        )
        .bind(permit_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(assessment)
    }

    pub async fn list_by_permits(
        &self,
        permit_ids: &[Uuid],
    ) -> Result<Vec<RiskAssessment>, AppError> {
        if permit_ids.is_empty() {
            return Ok(Vec::new());
        }

        let assessments = sqlx::query_as::<_, RiskAssessment>(
            r#"
            SELECT * FROM risk_assessments
            WHERE permit_id = ANY($1)
            ORDER BY created_at DESC
            "#,
        )
        .bind(permit_ids)
        .fetch_all(&self.db)
        .await?;

        Ok(assessments)
    }

    /// 记录复核结论并推进许可状态
    pub async fn record_review(
        &self,
        review: &ReviewRecord,
    ) -> Result<Option<RiskAssessment>, AppError> {
        let mut tx = self.db.begin().await?;

        let moved = sqlx::query(
            r#"
            UPDATE permits
            SET status = $3, version = version + 1, updated_at = NOW()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(review.permit_id)
        .bind(review.permit_from)
        .bind(review.permit_to)
        .execute(&mut *tx)
        .await?;

        if moved.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let saved = sqlx::query_as::<_, RiskAssessment>(
            r#"
            UPDATE risk_assessments
            SET reviewer_id = $2,
                review_approved = $3,
                reviewed_at = $4,
                updated_at = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(review.assessment_id)
        .bind(review.reviewer_id)
        .bind(review.approved)
        .bind(review.reviewed_at)
        .fetch_optional(&mut *tx)
        .await?;

        match saved {
            Some(saved) => {
                tx.commit().await?;
                Ok(Some(saved))
            }
            None => {
                tx.rollback().await?;
                Ok(None)
            }
        }
    }
}
