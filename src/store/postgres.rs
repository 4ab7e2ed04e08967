//! Durable counter store backed by Postgres.
//!
//! Increments are a single upsert-with-add statement, so atomicity is the
//! database's, not the application's: two concurrent increments on one key
//! both land, and `RETURNING count` hands back the post-add value without a
//! second round trip.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::StoreResult;
use crate::store::UsageStore;

#[derive(Clone)]
pub struct PostgresUsageStore {
    pool: PgPool,
}

impl PostgresUsageStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl UsageStore for PostgresUsageStore {
    async fn get_hourly_usage(&self, subject: &str, hour_key: &str) -> StoreResult<i64> {
        let count: Option<i64> = sqlx::query_scalar(
            "SELECT count FROM hourly_usage WHERE subject = $1 AND hour_key = $2",
        )
        .bind(subject)
        .bind(hour_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(count.unwrap_or(0))
    }

    async fn get_daily_feature_usage(
        &self,
        subject: &str,
        date_key: &str,
        feature: &str,
    ) -> StoreResult<i64> {
        let count: Option<i64> = sqlx::query_scalar(
            "SELECT count FROM feature_usage
             WHERE subject = $1 AND date_key = $2 AND feature = $3",
        )
        .bind(subject)
        .bind(date_key)
        .bind(feature)
        .fetch_optional(&self.pool)
        .await?;
        Ok(count.unwrap_or(0))
    }

    async fn get_daily_total_usage(&self, subject: &str, date_key: &str) -> StoreResult<i64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(count), 0)::BIGINT FROM feature_usage
             WHERE subject = $1 AND date_key = $2",
        )
        .bind(subject)
        .bind(date_key)
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }

    async fn increment_hourly(
        &self,
        subject: &str,
        hour_key: &str,
        cost: i64,
    ) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO hourly_usage (subject, hour_key, count, last_updated)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (subject, hour_key) DO UPDATE
            SET count = hourly_usage.count + EXCLUDED.count,
                last_updated = NOW()
            RETURNING count
            "#,
        )
        .bind(subject)
        .bind(hour_key)
        .bind(cost)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn increment_feature(
        &self,
        subject: &str,
        date_key: &str,
        feature: &str,
        cost: i64,
    ) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO feature_usage (subject, date_key, feature, count, last_updated)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (subject, date_key, feature) DO UPDATE
            SET count = feature_usage.count + EXCLUDED.count,
                last_updated = NOW()
            RETURNING count
            "#,
        )
        .bind(subject)
        .bind(date_key)
        .bind(feature)
        .bind(cost)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
