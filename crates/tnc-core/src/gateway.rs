//! Conversational front-end seam.
//!
//! Inbound text arrives keyed by user id; outbound messages leave on an mpsc
//! channel that the embedding front-end drains, chunked to its size limit.
//! Chat framing (menus, keyboards, HTML) is the embedder's concern. Each
//! verification batch runs as its own task so one user's long batch never
//! stalls another user's messages.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::auth::AuthFlow;
use crate::config::Config;
use crate::domain::{Outbound, Scope, UserId};
use crate::normalize::parse_batch;
use crate::pool::SessionPool;
use crate::report::chunk_text;
use crate::store::Store;
use crate::transport::Transport;
use crate::verify::Verifier;
use crate::Result;

const HELP: &str = "I check whether phone numbers are registered on Telegram.\n\n\
Send a list of numbers, one per line:\n\
+380991234567 Ivan Petrov\n\
+380997654321 Maria Sydorenko\n\n\
Commands:\n\
/add - authorize a new account session\n\
/qr - switch an authorization to a QR token\n\
/sessions - list your active sessions\n\
/remove <phone> - delete a session\n\
/cancel - abandon the current authorization";

/// Front-end message router, cheap to clone and share across tasks.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    cfg: Arc<Config>,
    store: Arc<dyn Store>,
    auth: AuthFlow,
    pool: SessionPool,
    verifier: Arc<Verifier>,
    outbound: mpsc::UnboundedSender<Outbound>,
    cancel: CancellationToken,
}

impl Gateway {
    pub fn new(
        cfg: Arc<Config>,
        store: Arc<dyn Store>,
        transport: Arc<dyn Transport>,
    ) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();

        let auth = AuthFlow::new(cfg.clone(), store.clone(), transport.clone(), tx.clone());
        let pool = SessionPool::new(store.clone(), transport.clone());
        let verifier = Arc::new(Verifier::new(
            cfg.clone(),
            SessionPool::new(store.clone(), transport.clone()),
            transport,
        ));

        let gateway = Self {
            inner: Arc::new(GatewayInner {
                cfg,
                store,
                auth,
                pool,
                verifier,
                outbound: tx,
                cancel: CancellationToken::new(),
            }),
        };
        (gateway, rx)
    }

    fn send_chunked(&self, user: UserId, text: &str) {
        for chunk in chunk_text(text, self.inner.cfg.report_chunk_limit) {
            let _ = self.inner.outbound.send(Outbound { user, text: chunk });
        }
    }

    /// Route one inbound message from the front-end.
    pub async fn handle_input(&self, user: UserId, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }

        if let Some(rest) = text.strip_prefix("/remove") {
            return self.remove_session(user, rest.trim()).await;
        }
        match text {
            "/add" => return self.inner.auth.begin(user).await,
            "/qr" => return self.inner.auth.start_qr(user).await,
            "/cancel" => return self.inner.auth.cancel(user).await,
            "/sessions" => return self.list_sessions(user).await,
            _ => {}
        }

        if self.inner.auth.in_flow(user).await {
            return self.inner.auth.handle_text(user, text).await;
        }

        if looks_like_batch(text) {
            self.spawn_batch(user, text.to_string());
            return Ok(());
        }

        // Outside a flow and not a batch: pick up an interrupted
        // authorization before falling back to the hint.
        if self.inner.auth.resume(user).await? {
            return Ok(());
        }

        self.send_chunked(user, HELP);
        Ok(())
    }

    async fn list_sessions(&self, user: UserId) -> Result<()> {
        let sessions = self.inner.pool.list(Scope::Owner(user)).await?;
        if sessions.is_empty() {
            self.send_chunked(user, "📊 You have no active sessions.");
            return Ok(());
        }

        let list = sessions
            .iter()
            .map(|s| format!("• {}", s.phone))
            .collect::<Vec<_>>()
            .join("\n");
        self.send_chunked(
            user,
            &format!("📊 Active sessions ({}):\n\n{list}", sessions.len()),
        );
        Ok(())
    }

    async fn remove_session(&self, user: UserId, phone: &str) -> Result<()> {
        if phone.is_empty() {
            self.send_chunked(user, "Usage: /remove <phone>");
            return Ok(());
        }
        if self.inner.pool.remove(user, phone).await? {
            self.send_chunked(user, "✅ Session removed.");
        } else {
            self.send_chunked(user, "❌ No session with that number.");
        }
        Ok(())
    }

    fn spawn_batch(&self, user: UserId, text: String) {
        let gateway = self.clone();
        tokio::spawn(async move {
            if let Err(e) = gateway.run_batch(user, &text).await {
                tracing::warn!(user = user.0, "verification batch failed: {e}");
                gateway.send_chunked(user, &format!("⚠️ Verification failed: {e}"));
            }
        });
    }

    async fn run_batch(&self, user: UserId, text: &str) -> Result<()> {
        let entries = parse_batch(text);

        // One snapshot per batch; every active session in the system is fair
        // game for spreading probe traffic.
        let snapshot = self.inner.pool.list(Scope::Global).await?;
        if snapshot.is_empty() {
            self.send_chunked(
                user,
                "❌ No active sessions in the pool. Send /add to authorize one first.",
            );
            return Ok(());
        }

        self.send_chunked(
            user,
            &format!("⏳ Checking numbers using {} session(s)...", snapshot.len()),
        );

        let report = self.inner.verifier.run_batch(&snapshot, &entries).await?;

        if report.lines.is_empty() && report.exhausted.is_none() {
            self.send_chunked(user, "No valid numbers found in the list.");
        } else if !report.lines.is_empty() {
            let text = format!("📊 Results:\n\n{}", report.lines.join("\n"));
            self.send_chunked(user, &text);
        }

        if let Some(wait) = report.exhausted {
            self.send_chunked(
                user,
                &format!(
                    "⚠️ All sessions are exhausted or rate limited!\n\
                     🕐 Longest reported wait: ~{wait}s ({} min)\n\
                     💡 Add more sessions to spread the load.",
                    wait / 60
                ),
            );
        }
        Ok(())
    }

    /// Background hygiene: evict idle auth contexts and stale pending rows.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let gateway = self.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(gateway.inner.cfg.sweep_interval);
            tick.tick().await; // the first tick fires immediately
            loop {
                tokio::select! {
                    _ = gateway.inner.cancel.cancelled() => break,
                    _ = tick.tick() => gateway.sweep_once().await,
                }
            }
        })
    }

    async fn sweep_once(&self) {
        let evicted = self
            .inner
            .auth
            .sweep_idle(self.inner.cfg.auth_idle_ttl)
            .await;
        if evicted > 0 {
            tracing::info!(evicted, "idle authorization contexts evicted");
        }

        let ttl = chrono::Duration::from_std(self.inner.cfg.pending_ttl)
            .unwrap_or_else(|_| chrono::Duration::hours(24));
        match self
            .inner
            .store
            .delete_pending_older_than(Utc::now() - ttl)
            .await
        {
            Ok(0) => {}
            Ok(n) => tracing::info!(swept = n, "stale pending authorizations removed"),
            Err(e) => tracing::warn!("pending sweep failed: {e}"),
        }
    }

    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }
}

fn looks_like_batch(text: &str) -> bool {
    text.starts_with('+') || text.contains('\n')
}
