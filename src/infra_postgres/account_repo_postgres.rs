use super::util::classify_db_error;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

pub struct PostgresAccountRepo {
    pool: PgPool,
}

impl PostgresAccountRepo {
    pub fn new(pool: PgPool) -> Self {
        PostgresAccountRepo { pool }
    }

    /// Builds the pool without connecting. The first query opens the first
    /// connection, so the process can start while the database is down.
    pub fn connect_lazy(config: &PostgresConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_lazy(&config.database_url)?;
        Ok(Self::new(pool))
    }

    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_account(row: PgRow) -> Result<Account, StoreError> {
        let id: i64 = row.try_get("id").map_err(classify_db_error)?;
        let username: String = row.try_get("username").map_err(classify_db_error)?;
        let password_hash: String = row.try_get("password_hash").map_err(classify_db_error)?;
        let email: String = row.try_get("email").map_err(classify_db_error)?;
        let created_at: DateTime<Utc> = row.try_get("created_at").map_err(classify_db_error)?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(classify_db_error)?;
        let is_active: bool = row.try_get("is_active").map_err(classify_db_error)?;

        Ok(Account {
            id: AccountId(id),
            username,
            password_hash,
            email,
            created_at,
            updated_at,
            is_active,
        })
    }

    fn row_to_view(row: PgRow) -> Result<AccountView, StoreError> {
        let id: i64 = row.try_get("id").map_err(classify_db_error)?;
        let username: String = row.try_get("username").map_err(classify_db_error)?;
        let email: String = row.try_get("email").map_err(classify_db_error)?;
        let created_at: DateTime<Utc> = row.try_get("created_at").map_err(classify_db_error)?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(classify_db_error)?;
        let is_active: bool = row.try_get("is_active").map_err(classify_db_error)?;

        Ok(AccountView {
            id: AccountId(id),
            username,
            email,
            created_at,
            updated_at,
            is_active,
        })
    }
}

#[async_trait::async_trait]
impl AccountRepo for PostgresAccountRepo {
    async fn insert(&self, record: NewAccountRecord) -> Result<Account, StoreError> {
        let row: PgRow = sqlx::query(
            r#"
INSERT INTO accounts (username, password_hash, email)
VALUES ($1, $2, $3)
RETURNING id, username, password_hash, email, created_at, updated_at, is_active
"#,
        )
        .bind(&record.username)
        .bind(&record.password_hash)
        .bind(&record.email)
        .fetch_one(&self.pool)
        .await
        .map_err(classify_db_error)?;

        Self::row_to_account(row)
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<Account>, StoreError> {
        let row_opt: Option<PgRow> = sqlx::query(
            r#"
SELECT id, username, password_hash, email, created_at, updated_at, is_active
FROM accounts
WHERE username = $1
"#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify_db_error)?;

        row_opt.map(Self::row_to_account).transpose()
    }

    async fn get_view_by_id(&self, id: AccountId) -> Result<Option<AccountView>, StoreError> {
        let row_opt: Option<PgRow> = sqlx::query(
            r#"
SELECT id, username, email, created_at, updated_at, is_active
FROM accounts
WHERE id = $1
"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify_db_error)?;

        row_opt.map(Self::row_to_view).transpose()
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
