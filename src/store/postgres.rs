//! PostgreSQL storage adapter
//!
//! The lease acquisition is a single transaction: `SELECT … FOR UPDATE`
//! gives a fresh row under a lock, the shared admission rules decide, and
//! the grant is written before commit. Serialization/lock errors bubble up
//! retryable so the coordinator can apply its bounded retry policy.

use crate::domain::{
    ExecutionMode, RiskProfile, RunRecord, RunSession, RunStatus, SessionState, Strategy,
    StrategyStatus,
};
use crate::error::{AutopilotError, Result};
use crate::scan::lease::{self, LeaseDecision};
use crate::store::{RunLogStore, SessionStore, StrategyStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info};

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create a store from an existing connection pool (zero-cost reuse)
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

const STRATEGY_COLUMNS: &str = "id, user_id, name, assets, interval, status, risk_profile, \
                                max_position_size, mode, last_run, last_attempt, scan_lock_until";

fn row_to_strategy(row: &PgRow) -> Result<Strategy> {
    let status: String = row.get("status");
    let risk_profile: String = row.get("risk_profile");
    let mode: String = row.get("mode");

    Ok(Strategy {
        id: row.get("id"),
        user_id: row.get("user_id"),
        name: row.get("name"),
        assets: row.get("assets"),
        interval: row.get("interval"),
        status: StrategyStatus::try_from(status.as_str()).map_err(AutopilotError::Internal)?,
        risk_profile: RiskProfile::try_from(risk_profile.as_str())
            .map_err(AutopilotError::Internal)?,
        max_position_size: row.get("max_position_size"),
        mode: ExecutionMode::try_from(mode.as_str()).map_err(AutopilotError::Internal)?,
        last_run: row.get("last_run"),
        last_attempt: row.get("last_attempt"),
        scan_lock_until: row.get("scan_lock_until"),
    })
}

#[async_trait]
impl StrategyStore for PostgresStore {
    async fn fetch_active(&self) -> Result<Vec<Strategy>> {
        let rows = sqlx::query(&format!(
            "SELECT {STRATEGY_COLUMNS} FROM strategies WHERE status = 'ACTIVE' ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_strategy).collect()
    }

    async fn fetch(&self, strategy_id: &str) -> Result<Option<Strategy>> {
        let row = sqlx::query(&format!(
            "SELECT {STRATEGY_COLUMNS} FROM strategies WHERE id = $1"
        ))
        .bind(strategy_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_strategy).transpose()
    }

    async fn try_acquire(&self, strategy_id: &str, now: DateTime<Utc>) -> Result<LeaseDecision> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {STRATEGY_COLUMNS} FROM strategies WHERE id = $1 FOR UPDATE"
        ))
        .bind(strategy_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AutopilotError::StrategyNotFound(strategy_id.to_string()))?;

        let strategy = row_to_strategy(&row)?;
        let decision = lease::decide(&strategy, now);

        if let LeaseDecision::Granted { lock_until } = decision {
            sqlx::query(
                r#"
                UPDATE strategies
                SET scan_lock_until = $2, last_attempt = $3
                WHERE id = $1
                "#,
            )
            .bind(strategy_id)
            .bind(lock_until)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!("Lease decision for {}: {:?}", strategy_id, decision);
        Ok(decision)
    }

    async fn release(&self, strategy_id: &str, success: bool, now: DateTime<Utc>) -> Result<()> {
        // Single statement: only the contended scheduling fields are touched.
        sqlx::query(
            r#"
            UPDATE strategies
            SET scan_lock_until = NULL,
                last_run = CASE WHEN $2 THEN $3 ELSE last_run END
            WHERE id = $1
            "#,
        )
        .bind(strategy_id)
        .bind(success)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl RunLogStore for PostgresStore {
    async fn append(&self, record: &RunRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO strategy_runs (strategy_id, user_id, timestamp, status, output)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&record.strategy_id)
        .bind(&record.user_id)
        .bind(record.timestamp)
        .bind(record.status.as_str())
        .bind(&record.output)
        .execute(&self.pool)
        .await?;

        debug!(
            "Appended {} run record for strategy {}",
            record.status, record.strategy_id
        );
        Ok(())
    }

    async fn recent(
        &self,
        user_id: &str,
        limit: i64,
        strategy_id: Option<&str>,
    ) -> Result<Vec<RunRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT strategy_id, user_id, timestamp, status, output
            FROM strategy_runs
            WHERE user_id = $1 AND ($3::text IS NULL OR strategy_id = $3)
            ORDER BY timestamp DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(strategy_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let status: String = row.get("status");
                Ok(RunRecord {
                    strategy_id: row.get("strategy_id"),
                    user_id: row.get("user_id"),
                    timestamp: row.get("timestamp"),
                    status: RunStatus::try_from(status.as_str())
                        .map_err(AutopilotError::Internal)?,
                    output: row.get("output"),
                })
            })
            .collect()
    }
}

#[async_trait]
impl SessionStore for PostgresStore {
    async fn create(&self, session: &RunSession) -> Result<()> {
        let state = serde_json::to_value(&session.state)?;

        sqlx::query(
            r#"
            INSERT INTO run_sessions (id, user_id, state, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(&state)
        .bind(session.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, session: &RunSession) -> Result<()> {
        let state = serde_json::to_value(&session.state)?;

        let result = sqlx::query(
            r#"
            UPDATE run_sessions SET state = $2 WHERE id = $1
            "#,
        )
        .bind(&session.id)
        .bind(&state)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AutopilotError::SessionNotFound(session.id.clone()));
        }
        Ok(())
    }

    async fn fetch(&self, session_id: &str) -> Result<Option<RunSession>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, state, created_at FROM run_sessions WHERE id = $1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            let state: serde_json::Value = r.get("state");
            let state: SessionState = serde_json::from_value(state)?;
            Ok(RunSession {
                id: r.get("id"),
                user_id: r.get("user_id"),
                state,
                created_at: r.get("created_at"),
            })
        })
        .transpose()
    }
}
