//! Persistence port for account sessions and pending authorizations.
//!
//! Postgres lives in the `tnc-store` crate; [`memory::MemoryStore`] keeps the
//! same semantics in-process for tests and embedding.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{NewSession, PendingAuth, Scope, SessionRecord, SessionRowId, UserId};
use crate::Result;

pub mod memory;

/// Each mutation must be atomic at the storage layer; concurrent batches may
/// invalidate or reactivate the same session.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a session or, on (owner, phone) conflict, update credentials
    /// and session name and reactivate the row.
    async fn upsert_session(&self, new: &NewSession) -> Result<SessionRecord>;

    /// Active sessions for a scope, in creation order.
    async fn list_active(&self, scope: Scope) -> Result<Vec<SessionRecord>>;

    /// Idempotent: marking an inactive session inactive is a no-op.
    async fn mark_inactive(&self, id: SessionRowId) -> Result<()>;

    /// Delete the row, returning it so the caller can purge transport state.
    async fn delete_session(&self, id: SessionRowId) -> Result<Option<SessionRecord>>;

    async fn find_session(&self, owner: UserId, phone: &str) -> Result<Option<SessionRecord>>;

    /// At most one pending row per user; superseded on conflict.
    async fn upsert_pending(&self, pending: &PendingAuth) -> Result<()>;

    async fn pending_for(&self, user: UserId) -> Result<Option<PendingAuth>>;

    async fn delete_pending(&self, user: UserId) -> Result<()>;

    /// Drop pending rows created before `cutoff`; returns how many were removed.
    async fn delete_pending_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}
