use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::Store;
use crate::domain::{NewSession, PendingAuth, Scope, SessionRecord, SessionRowId, UserId};
use crate::Result;

/// In-memory store with the same conflict semantics as the Postgres adapter.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    sessions: Vec<SessionRecord>,
    pending: HashMap<i64, PendingAuth>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_session(&self, new: &NewSession) -> Result<SessionRecord> {
        let mut inner = self.lock();

        if let Some(existing) = inner
            .sessions
            .iter_mut()
            .find(|s| s.owner == new.owner && s.phone == new.phone)
        {
            existing.credentials = new.credentials.clone();
            existing.session_name = new.session_name.clone();
            existing.is_active = true;
            return Ok(existing.clone());
        }

        inner.next_id += 1;
        let record = SessionRecord {
            id: SessionRowId(inner.next_id),
            owner: new.owner,
            phone: new.phone.clone(),
            credentials: new.credentials.clone(),
            session_name: new.session_name.clone(),
            is_active: true,
            created_at: Utc::now(),
        };
        inner.sessions.push(record.clone());
        Ok(record)
    }

    async fn list_active(&self, scope: Scope) -> Result<Vec<SessionRecord>> {
        let inner = self.lock();
        let mut out: Vec<SessionRecord> = inner
            .sessions
            .iter()
            .filter(|s| s.is_active)
            .filter(|s| match scope {
                Scope::Owner(owner) => s.owner == owner,
                Scope::Global => true,
            })
            .cloned()
            .collect();
        out.sort_by_key(|s| (s.created_at, s.id.0));
        Ok(out)
    }

    async fn mark_inactive(&self, id: SessionRowId) -> Result<()> {
        let mut inner = self.lock();
        if let Some(s) = inner.sessions.iter_mut().find(|s| s.id == id) {
            s.is_active = false;
        }
        Ok(())
    }

    async fn delete_session(&self, id: SessionRowId) -> Result<Option<SessionRecord>> {
        let mut inner = self.lock();
        let Some(pos) = inner.sessions.iter().position(|s| s.id == id) else {
            return Ok(None);
        };
        Ok(Some(inner.sessions.remove(pos)))
    }

    async fn find_session(&self, owner: UserId, phone: &str) -> Result<Option<SessionRecord>> {
        let inner = self.lock();
        Ok(inner
            .sessions
            .iter()
            .find(|s| s.owner == owner && s.phone == phone)
            .cloned())
    }

    async fn upsert_pending(&self, pending: &PendingAuth) -> Result<()> {
        self.lock().pending.insert(pending.user.0, pending.clone());
        Ok(())
    }

    async fn pending_for(&self, user: UserId) -> Result<Option<PendingAuth>> {
        Ok(self.lock().pending.get(&user.0).cloned())
    }

    async fn delete_pending(&self, user: UserId) -> Result<()> {
        self.lock().pending.remove(&user.0);
        Ok(())
    }

    async fn delete_pending_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut inner = self.lock();
        let before = inner.pending.len();
        inner.pending.retain(|_, p| p.created_at >= cutoff);
        Ok((before - inner.pending.len()) as u64)
    }
}
