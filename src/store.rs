use crate::call_types::CallRecord;
use crate::error::AppError;

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::time::Duration;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

/// Durable access to call records.  `upsert` must be atomic per record id.
#[async_trait]
pub trait CallStore: Send + Sync {
    async fn get(&self, call_id: Uuid) -> Result<Option<CallRecord>, AppError>;
    /// Newest record for the phone number created within `window`, if any
    async fn get_most_recent_by_phone(
        &self,
        phone_number: &str,
        window: Duration,
    ) -> Result<Option<CallRecord>, AppError>;
    async fn upsert(&self, call: &CallRecord) -> Result<(), AppError>;
    /// All records for the phone number, newest first
    async fn list_by_phone(&self, phone_number: &str) -> Result<Vec<CallRecord>, AppError>;
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self, AppError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, AppError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }
}

fn decode(rows: Vec<String>) -> Result<Vec<CallRecord>, AppError> {
    rows.iter()
        .map(|data| serde_json::from_str::<CallRecord>(data).map_err(AppError::from))
        .collect()
}

#[async_trait]
impl CallStore for SqliteStore {
    async fn get(&self, call_id: Uuid) -> Result<Option<CallRecord>, AppError> {
        let data: Option<String> = sqlx::query_scalar("select data from calls where id = ?")
            .bind(call_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(decode(data.into_iter().collect())?.pop())
    }

    async fn get_most_recent_by_phone(
        &self,
        phone_number: &str,
        window: Duration,
    ) -> Result<Option<CallRecord>, AppError> {
        let since = OffsetDateTime::now_utc().unix_timestamp() - window.as_secs() as i64;
        let data: Option<String> = sqlx::query_scalar(
            "
            select data
            from calls
            where phone_number = ? and created_at > ?
            order by created_at desc
            limit 1
            ",
        )
        .bind(phone_number)
        .bind(since)
        .fetch_optional(&self.pool)
        .await?;
        Ok(decode(data.into_iter().collect())?.pop())
    }

    async fn upsert(&self, call: &CallRecord) -> Result<(), AppError> {
        let data = serde_json::to_string(call)?;
        sqlx::query(
            "
            insert into calls (id, phone_number, data, created_at)
            values (?, ?, ?, ?)
            on conflict (id) do update set
              phone_number = excluded.phone_number,
              data = excluded.data,
              created_at = excluded.created_at
            ",
        )
        .bind(call.id.to_string())
        .bind(&call.phone_number)
        .bind(data)
        .bind(call.created_at.unix_timestamp())
        .execute(&self.pool)
        .await?;
        debug!(call_id=%call.id, messages=call.messages.len(), "saved call");
        Ok(())
    }

    async fn list_by_phone(&self, phone_number: &str) -> Result<Vec<CallRecord>, AppError> {
        let rows: Vec<String> = sqlx::query_scalar(
            "
            select data
            from calls
            where phone_number = ?
            order by created_at desc
            ",
        )
        .bind(phone_number)
        .fetch_all(&self.pool)
        .await?;
        decode(rows)
    }
}
