use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::str::FromStr;

use crate::db::{StoreError, UserDirectory};
use crate::models::subscription::{Plan, SubscriptionContext};

/// Reads subscription context from the `users` table.
#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn subscription(&self, user_id: &str) -> Result<Option<SubscriptionContext>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, plan, period_download_count, period_download_limit
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(r) = row else {
            return Ok(None);
        };

        let plan_str: String = r.try_get("plan")?;
        let plan = Plan::from_str(&plan_str)
            .map_err(|_| StoreError::Corrupt(format!("unknown plan '{plan_str}'")))?;
        let count: i32 = r.try_get("period_download_count")?;
        let limit: Option<i32> = r.try_get("period_download_limit")?;

        Ok(Some(SubscriptionContext {
            user_id: r.try_get("id")?,
            plan,
            period_download_count: count.max(0) as u32,
            period_download_limit: limit.map(|l| l.max(0) as u32),
        }))
    }

    async fn record_downloads(&self, user_id: &str, count: u32) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE users
            SET period_download_count = period_download_count + $2,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(count as i32)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
