//! Postgres adapter for the tnc-core store port (sqlx).
//!
//! All mutations are single statements, so concurrent batches invalidating or
//! reactivating the same session stay atomic at the storage layer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};

use tnc_core::{
    domain::{
        ApiCredentials, NewSession, PendingAuth, PendingState, Scope, SessionRecord, SessionRowId,
        UserId,
    },
    store::Store,
    Error, Result,
};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(db_err)?;
        Ok(Self { pool })
    }

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Idempotent bootstrap of the two tables this service owns.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id BIGSERIAL PRIMARY KEY,
                owner_id BIGINT NOT NULL,
                phone VARCHAR(20) NOT NULL,
                api_id INTEGER NOT NULL,
                api_hash VARCHAR(100) NOT NULL,
                session_name VARCHAR(100) NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (owner_id, phone)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pending_auth (
                id BIGSERIAL PRIMARY KEY,
                user_id BIGINT NOT NULL UNIQUE,
                phone VARCHAR(20) NOT NULL,
                api_id INTEGER NOT NULL,
                api_hash VARCHAR(100) NOT NULL,
                session_name VARCHAR(100) NOT NULL,
                state VARCHAR(20) NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_owner ON sessions (owner_id)")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        tracing::info!("database schema ready");
        Ok(())
    }
}

fn db_err(e: sqlx::Error) -> Error {
    Error::Store(e.to_string())
}

fn session_from_row(row: &sqlx::postgres::PgRow) -> SessionRecord {
    SessionRecord {
        id: SessionRowId(row.get("id")),
        owner: UserId(row.get("owner_id")),
        phone: row.get("phone"),
        credentials: ApiCredentials {
            api_id: row.get("api_id"),
            api_hash: row.get("api_hash"),
        },
        session_name: row.get("session_name"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl Store for PgStore {
    async fn upsert_session(&self, new: &NewSession) -> Result<SessionRecord> {
        let row = sqlx::query(
            r#"
            INSERT INTO sessions (owner_id, phone, api_id, api_hash, session_name)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (owner_id, phone) DO UPDATE SET
                api_id = EXCLUDED.api_id,
                api_hash = EXCLUDED.api_hash,
                session_name = EXCLUDED.session_name,
                is_active = TRUE
            RETURNING id, owner_id, phone, api_id, api_hash, session_name, is_active, created_at
            "#,
        )
        .bind(new.owner.0)
        .bind(&new.phone)
        .bind(new.credentials.api_id)
        .bind(&new.credentials.api_hash)
        .bind(&new.session_name)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(session_from_row(&row))
    }

    async fn list_active(&self, scope: Scope) -> Result<Vec<SessionRecord>> {
        let rows = match scope {
            Scope::Owner(owner) => {
                sqlx::query(
                    r#"
                    SELECT id, owner_id, phone, api_id, api_hash, session_name, is_active, created_at
                    FROM sessions
                    WHERE is_active = TRUE AND owner_id = $1
                    ORDER BY created_at, id
                    "#,
                )
                .bind(owner.0)
                .fetch_all(&self.pool)
                .await
            }
            Scope::Global => {
                sqlx::query(
                    r#"
                    SELECT id, owner_id, phone, api_id, api_hash, session_name, is_active, created_at
                    FROM sessions
                    WHERE is_active = TRUE
                    ORDER BY created_at, id
                    "#,
                )
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(db_err)?;

        Ok(rows.iter().map(session_from_row).collect())
    }

    async fn mark_inactive(&self, id: SessionRowId) -> Result<()> {
        sqlx::query("UPDATE sessions SET is_active = FALSE WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn delete_session(&self, id: SessionRowId) -> Result<Option<SessionRecord>> {
        let row = sqlx::query(
            r#"
            DELETE FROM sessions
            WHERE id = $1
            RETURNING id, owner_id, phone, api_id, api_hash, session_name, is_active, created_at
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.as_ref().map(session_from_row))
    }

    async fn find_session(&self, owner: UserId, phone: &str) -> Result<Option<SessionRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, owner_id, phone, api_id, api_hash, session_name, is_active, created_at
            FROM sessions
            WHERE owner_id = $1 AND phone = $2
            "#,
        )
        .bind(owner.0)
        .bind(phone)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.as_ref().map(session_from_row))
    }

    async fn upsert_pending(&self, pending: &PendingAuth) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pending_auth (user_id, phone, api_id, api_hash, session_name, state, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id) DO UPDATE SET
                phone = EXCLUDED.phone,
                api_id = EXCLUDED.api_id,
                api_hash = EXCLUDED.api_hash,
                session_name = EXCLUDED.session_name,
                state = EXCLUDED.state,
                created_at = EXCLUDED.created_at
            "#,
        )
        .bind(pending.user.0)
        .bind(&pending.phone)
        .bind(pending.credentials.api_id)
        .bind(&pending.credentials.api_hash)
        .bind(&pending.session_name)
        .bind(pending.state.as_str())
        .bind(pending.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn pending_for(&self, user: UserId) -> Result<Option<PendingAuth>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, phone, api_id, api_hash, session_name, state, created_at
            FROM pending_auth
            WHERE user_id = $1
            "#,
        )
        .bind(user.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let state_str: String = row.get("state");
        let state = PendingState::parse(&state_str)
            .ok_or_else(|| Error::Store(format!("unknown pending state: {state_str}")))?;

        Ok(Some(PendingAuth {
            user: UserId(row.get("user_id")),
            phone: row.get("phone"),
            credentials: ApiCredentials {
                api_id: row.get("api_id"),
                api_hash: row.get("api_hash"),
            },
            session_name: row.get("session_name"),
            state,
            created_at: row.get("created_at"),
        }))
    }

    async fn delete_pending(&self, user: UserId) -> Result<()> {
        sqlx::query("DELETE FROM pending_auth WHERE user_id = $1")
            .bind(user.0)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn delete_pending_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM pending_auth WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }
}
