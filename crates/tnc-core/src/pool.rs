//! Session pool: the set of currently usable account sessions for a scope.
//!
//! Listings are advisory snapshots; the orchestrator keeps its own per-batch
//! failure memory and never relies on the pool staying unchanged underneath.

use std::sync::Arc;

use crate::domain::{NewSession, Scope, SessionRecord, SessionRowId, UserId};
use crate::store::Store;
use crate::transport::Transport;
use crate::Result;

pub struct SessionPool {
    store: Arc<dyn Store>,
    transport: Arc<dyn Transport>,
}

impl SessionPool {
    pub fn new(store: Arc<dyn Store>, transport: Arc<dyn Transport>) -> Self {
        Self { store, transport }
    }

    /// Active sessions for a scope, in creation order.
    pub async fn list(&self, scope: Scope) -> Result<Vec<SessionRecord>> {
        self.store.list_active(scope).await
    }

    /// Mark a session unusable. Idempotent; the row stays for bookkeeping.
    pub async fn invalidate(&self, id: SessionRowId) -> Result<()> {
        tracing::warn!(session_id = id.0, "marking session inactive");
        self.store.mark_inactive(id).await
    }

    /// Hard-delete a session row together with its persisted transport state.
    pub async fn remove(&self, owner: UserId, phone: &str) -> Result<bool> {
        let Some(record) = self.store.find_session(owner, phone).await? else {
            return Ok(false);
        };
        self.store.delete_session(record.id).await?;

        if let Err(e) = self
            .transport
            .purge_session_state(&record.session_name)
            .await
        {
            tracing::warn!(
                session = %record.session_name,
                "failed to purge session state: {e}"
            );
        }
        Ok(true)
    }

    /// Insert or reactivate a session for (owner, phone).
    pub async fn upsert(&self, new: &NewSession) -> Result<SessionRecord> {
        self.store.upsert_session(new).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ApiCredentials;
    use crate::store::memory::MemoryStore;
    use crate::transport::fake::FakeTransport;

    fn pool_with_fakes() -> (SessionPool, Arc<MemoryStore>, FakeTransport) {
        let store = Arc::new(MemoryStore::new());
        let fake = FakeTransport::default();
        let pool = SessionPool::new(store.clone(), Arc::new(fake.clone()));
        (pool, store, fake)
    }

    fn new_session(owner: i64, phone: &str) -> NewSession {
        NewSession {
            owner: UserId(owner),
            phone: phone.to_string(),
            credentials: ApiCredentials {
                api_id: 1,
                api_hash: "h".to_string(),
            },
            session_name: format!("session_{owner}_{phone}"),
        }
    }

    #[tokio::test]
    async fn remove_purges_transport_state() {
        let (pool, _store, fake) = pool_with_fakes();
        pool.upsert(&new_session(1, "+11")).await.unwrap();

        assert!(pool.remove(UserId(1), "+11").await.unwrap());
        assert_eq!(fake.purged_sessions(), vec!["session_1_+11".to_string()]);
        assert!(pool.list(Scope::Owner(UserId(1))).await.unwrap().is_empty());

        // Removing a phone with no row reports false.
        assert!(!pool.remove(UserId(1), "+11").await.unwrap());
    }

    #[tokio::test]
    async fn invalidate_hides_a_session_from_listings() {
        let (pool, _store, _fake) = pool_with_fakes();
        let rec = pool.upsert(&new_session(1, "+11")).await.unwrap();
        pool.invalidate(rec.id).await.unwrap();
        pool.invalidate(rec.id).await.unwrap();
        assert!(pool.list(Scope::Global).await.unwrap().is_empty());
    }
}
