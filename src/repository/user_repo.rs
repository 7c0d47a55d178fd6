//! User repository (数据库访问层)

use crate::{
    error::AppError,
    models::user::{Role, User},
};
use sqlx::PgPool;
use uuid::Uuid;

pub struct UserRepository {
    db: PgPool,
}

impl UserRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// 根据 ID 查找用户
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        Ok(user)
    }

    /// 创建用户
    pub async fn create(&self, user: &User) -> Result<User, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, name, email, role, company_id, reports_to, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role)
        .bind(user.company_id)
        .bind(user.reports_to)
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(&self.db)
        .await?;

        Ok(user)
    }

    /// 列出公司内所有用户
    pub async fn list_by_company(&self, company_id: Uuid) -> Result<Vec<User>, AppError> {
        let users = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE company_id = $1 ORDER BY created_at, id",
        )
        .bind(company_id)
        .fetch_all(&self.db)
        .await?;

        Ok(users)
    }

    /// 列出公司内指定角色的用户
    pub async fn list_by_roles(
        &self,
        company_id: Uuid,
        roles: &[Role],
    ) -> Result<Vec<User>, AppError> {
        let role_names: Vec<String> = roles.iter().map(|r| r.as_str().to_string()).collect();

        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE company_id = $1 AND role::text = ANY($2)
            ORDER BY created_at, id
            "#,
        )
        .bind(company_id)
        .bind(role_names)
        .fetch_all(&self.db)
        .await?;

        Ok(users)
    }

    /// 直接下属
    pub async fn list_direct_reports(&self, user_id: Uuid) -> Result<Vec<User>, AppError> {
        let users = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE reports_to = $1 ORDER BY created_at, id",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        Ok(users)
    }

    /// 更新直属上级
    pub async fn update_supervisor(
        &self,
        user_id: Uuid,
        supervisor_id: Option<Uuid>,
    ) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET reports_to = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(supervisor_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(user)
    }
}
