//! Login/authentication state machine.
//!
//! One in-memory context per onboarding user; partial progress is persisted
//! as a pending row so the flow survives process restarts. Long waits (code
//! delivery, QR scan confirmation) never block other users: the QR wait runs
//! as its own task and reports back over the outbound channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{mpsc, Mutex};

use crate::config::Config;
use crate::domain::{
    ApiCredentials, NewSession, Outbound, PendingAuth, PendingState, UserId, UserProfile,
};
use crate::errors::TransportError;
use crate::session::derive_session_name;
use crate::store::Store;
use crate::transport::{Connection, Transport};
use crate::Result;

/// Where a user currently is in the onboarding flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthPhase {
    CollectingPhone,
    CollectingApiId,
    CollectingApiHash,
    AwaitingCode,
    AwaitingScan,
    Awaiting2fa,
    /// Terminal: the context is removed after the current step.
    Done,
}

struct AuthContext {
    phase: AuthPhase,
    phone: Option<String>,
    api_id: Option<i32>,
    api_hash: Option<String>,
    session_name: Option<String>,
    conn: Option<Arc<dyn Connection>>,
    touched: Instant,
}

impl AuthContext {
    fn new(phase: AuthPhase) -> Self {
        Self {
            phase,
            phone: None,
            api_id: None,
            api_hash: None,
            session_name: None,
            conn: None,
            touched: Instant::now(),
        }
    }

    fn credentials(&self) -> Option<ApiCredentials> {
        Some(ApiCredentials {
            api_id: self.api_id?,
            api_hash: self.api_hash.clone()?,
        })
    }
}

type Ctx = Arc<Mutex<AuthContext>>;

/// The authentication state machine, cheap to clone and share across tasks.
#[derive(Clone)]
pub struct AuthFlow {
    inner: Arc<AuthInner>,
}

struct AuthInner {
    cfg: Arc<Config>,
    store: Arc<dyn Store>,
    transport: Arc<dyn Transport>,
    contexts: Mutex<HashMap<i64, Ctx>>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl AuthFlow {
    pub fn new(
        cfg: Arc<Config>,
        store: Arc<dyn Store>,
        transport: Arc<dyn Transport>,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) -> Self {
        Self {
            inner: Arc::new(AuthInner {
                cfg,
                store,
                transport,
                contexts: Mutex::new(HashMap::new()),
                outbound,
            }),
        }
    }

    fn send(&self, user: UserId, text: impl Into<String>) {
        let _ = self.inner.outbound.send(Outbound {
            user,
            text: text.into(),
        });
    }

    pub async fn in_flow(&self, user: UserId) -> bool {
        self.inner.contexts.lock().await.contains_key(&user.0)
    }

    pub async fn phase_of(&self, user: UserId) -> Option<AuthPhase> {
        let cell = self.ctx_of(user).await?;
        let phase = cell.lock().await.phase;
        Some(phase)
    }

    async fn ctx_of(&self, user: UserId) -> Option<Ctx> {
        self.inner.contexts.lock().await.get(&user.0).cloned()
    }

    async fn install(&self, user: UserId, ctx: AuthContext) {
        let cell = Arc::new(Mutex::new(ctx));
        let old = self.inner.contexts.lock().await.insert(user.0, cell);
        if let Some(old) = old {
            let conn = old.lock().await.conn.take();
            disconnect_quietly(conn).await;
        }
    }

    async fn remove_context(&self, user: UserId) -> Option<Ctx> {
        self.inner.contexts.lock().await.remove(&user.0)
    }

    /// Start onboarding from scratch, discarding any pending flow.
    pub async fn begin(&self, user: UserId) -> Result<()> {
        self.inner.store.delete_pending(user).await?;
        self.install(user, AuthContext::new(AuthPhase::CollectingPhone))
            .await;
        self.send(
            user,
            "📱 Send the phone number to authorize (format: +380...)",
        );
        Ok(())
    }

    /// Reconstruct an interrupted flow from its pending row and re-issue the
    /// login code, avoiding a duplicate platform-side verification. Returns
    /// false when there is nothing to resume.
    pub async fn resume(&self, user: UserId) -> Result<bool> {
        let Some(pending) = self.inner.store.pending_for(user).await? else {
            return Ok(false);
        };
        // A waiting_2fa row cannot resume without its in-flight connection;
        // the user restarts with /add instead.
        if pending.state != PendingState::WaitingCode {
            return Ok(false);
        }

        let conn = match self
            .inner
            .transport
            .connect(
                &pending.credentials,
                &pending.session_name,
                &self.inner.cfg.device_profile(),
            )
            .await
        {
            Ok(conn) => conn,
            Err(e) => {
                self.inner.store.delete_pending(user).await?;
                self.send(
                    user,
                    format!("❌ Could not resume the authorization: {e}. Send /add to start over."),
                );
                return Ok(true);
            }
        };

        if let Err(e) = conn.request_code(&pending.phone).await {
            disconnect_quietly(Some(conn)).await;
            self.inner.store.delete_pending(user).await?;
            self.send(
                user,
                format!("❌ Could not resume the authorization: {e}. Send /add to start over."),
            );
            return Ok(true);
        }

        let mut ctx = AuthContext::new(AuthPhase::AwaitingCode);
        ctx.phone = Some(pending.phone.clone());
        ctx.api_id = Some(pending.credentials.api_id);
        ctx.api_hash = Some(pending.credentials.api_hash.clone());
        ctx.session_name = Some(pending.session_name.clone());
        ctx.conn = Some(conn);
        self.install(user, ctx).await;

        self.send(
            user,
            format!(
                "📱 You have an unfinished authorization for {}.\n\
                 A new code was sent; enter it here (or /qr to use a QR token).",
                pending.phone
            ),
        );
        Ok(true)
    }

    /// Drive the flow with one line of user input.
    pub async fn handle_text(&self, user: UserId, text: &str) -> Result<()> {
        let Some(cell) = self.ctx_of(user).await else {
            self.send(user, "No authorization in progress. Send /add to begin.");
            return Ok(());
        };

        let mut ctx = cell.lock().await;
        ctx.touched = Instant::now();

        match ctx.phase {
            AuthPhase::CollectingPhone => self.on_phone(user, &mut ctx, text),
            AuthPhase::CollectingApiId => self.on_api_id(user, &mut ctx, text),
            AuthPhase::CollectingApiHash => self.on_api_hash(user, &mut ctx, text).await?,
            AuthPhase::AwaitingCode => self.on_code(user, &mut ctx, text).await?,
            AuthPhase::Awaiting2fa => self.on_password(user, &mut ctx, text).await?,
            AuthPhase::AwaitingScan => {
                self.send(user, "Waiting for the QR scan. Send /cancel to abort.");
            }
            AuthPhase::Done => {}
        }

        let done = ctx.phase == AuthPhase::Done;
        drop(ctx);
        if done {
            self.remove_context(user).await;
        }
        Ok(())
    }

    fn on_phone(&self, user: UserId, ctx: &mut AuthContext, text: &str) {
        let phone = text.trim();
        if !phone.starts_with('+') {
            self.send(user, "❌ The number must start with +");
            return;
        }
        ctx.phone = Some(phone.to_string());
        ctx.phase = AuthPhase::CollectingApiId;
        self.send(user, "📝 Now send the API ID (from my.telegram.org)");
    }

    fn on_api_id(&self, user: UserId, ctx: &mut AuthContext, text: &str) {
        match text.trim().parse::<i32>() {
            Ok(api_id) => {
                ctx.api_id = Some(api_id);
                ctx.phase = AuthPhase::CollectingApiHash;
                self.send(user, "📝 Now send the API HASH");
            }
            Err(_) => self.send(user, "❌ API ID must be a number"),
        }
    }

    async fn on_api_hash(&self, user: UserId, ctx: &mut AuthContext, text: &str) -> Result<()> {
        let (Some(phone), Some(api_id)) = (ctx.phone.clone(), ctx.api_id) else {
            return self.restart(user, ctx);
        };

        let api_hash = text.trim().to_string();
        if api_hash.is_empty() {
            self.send(user, "❌ API HASH cannot be empty");
            return Ok(());
        }

        let credentials = ApiCredentials {
            api_id,
            api_hash: api_hash.clone(),
        };
        let session_name = derive_session_name(user, &phone);

        // Persisted before the code request so the flow survives a restart.
        self.inner
            .store
            .upsert_pending(&PendingAuth {
                user,
                phone: phone.clone(),
                credentials: credentials.clone(),
                session_name: session_name.clone(),
                state: PendingState::WaitingCode,
                created_at: Utc::now(),
            })
            .await?;

        let conn = match self
            .inner
            .transport
            .connect(&credentials, &session_name, &self.inner.cfg.device_profile())
            .await
        {
            Ok(conn) => conn,
            Err(e) => {
                self.inner.store.delete_pending(user).await?;
                ctx.phase = AuthPhase::Done;
                self.send(user, format!("❌ Connection failed: {e}"));
                return Ok(());
            }
        };

        match conn.request_code(&phone).await {
            Ok(()) => {
                ctx.api_hash = Some(api_hash);
                ctx.session_name = Some(session_name);
                ctx.conn = Some(conn);
                ctx.phase = AuthPhase::AwaitingCode;
                self.send(
                    user,
                    "📱 Code sent! Enter the code you received (or /qr to log in with a QR token).",
                );
            }
            Err(e) => {
                disconnect_quietly(Some(conn)).await;
                self.inner.store.delete_pending(user).await?;
                ctx.phase = AuthPhase::Done;
                let msg = match e {
                    TransportError::InvalidPhoneNumber => {
                        "❌ The platform rejected this phone number. Send /add to try another."
                            .to_string()
                    }
                    other => format!("❌ Could not request a code: {other}"),
                };
                self.send(user, msg);
            }
        }
        Ok(())
    }

    async fn on_code(&self, user: UserId, ctx: &mut AuthContext, text: &str) -> Result<()> {
        let (Some(conn), Some(phone)) = (ctx.conn.clone(), ctx.phone.clone()) else {
            ctx.phase = AuthPhase::Done;
            self.send(user, "❌ The connection was lost. Send /add to start again.");
            return Ok(());
        };

        match conn.sign_in_code(&phone, text.trim()).await {
            Ok(profile) => self.complete(user, ctx, profile).await,
            Err(TransportError::PasswordRequired) => {
                ctx.phase = AuthPhase::Awaiting2fa;
                self.persist_pending(user, ctx, PendingState::Waiting2fa)
                    .await?;
                self.send(
                    user,
                    "🔐 Two-factor authentication is enabled. Enter your password:",
                );
                Ok(())
            }
            Err(e) => {
                self.send(user, format!("❌ Sign-in failed: {e}. Try the code again."));
                Ok(())
            }
        }
    }

    async fn on_password(&self, user: UserId, ctx: &mut AuthContext, text: &str) -> Result<()> {
        let Some(conn) = ctx.conn.clone() else {
            ctx.phase = AuthPhase::Done;
            self.send(user, "❌ The connection was lost. Send /add to start again.");
            return Ok(());
        };

        match conn.sign_in_password(text.trim()).await {
            Ok(profile) => self.complete(user, ctx, profile).await,
            Err(e) => {
                self.send(user, format!("❌ Password rejected: {e}. Try again."));
                Ok(())
            }
        }
    }

    /// Switch an onboarding flow to the QR branch. The confirmation wait runs
    /// as its own task; the platform enforces the token's expiry.
    pub async fn start_qr(&self, user: UserId) -> Result<()> {
        let Some(cell) = self.ctx_of(user).await else {
            self.send(user, "Start with /add and enter the API credentials first.");
            return Ok(());
        };

        let mut ctx = cell.lock().await;
        ctx.touched = Instant::now();

        let Some(credentials) = ctx.credentials() else {
            self.send(user, "❌ Enter the phone and API credentials first.");
            return Ok(());
        };
        let session_name = ctx
            .session_name
            .clone()
            .unwrap_or_else(|| format!("session_qr_{}", user.0));

        let conn = match ctx.conn.clone() {
            Some(conn) => conn,
            None => {
                match self
                    .inner
                    .transport
                    .connect(&credentials, &session_name, &self.inner.cfg.device_profile())
                    .await
                {
                    Ok(conn) => conn,
                    Err(e) => {
                        self.send(user, format!("❌ Connection failed: {e}"));
                        return Ok(());
                    }
                }
            }
        };

        let qr = match conn.qr_login().await {
            Ok(qr) => qr,
            Err(e) => {
                self.send(user, format!("❌ Could not create a QR login: {e}"));
                return Ok(());
            }
        };

        ctx.conn = Some(conn.clone());
        ctx.session_name = Some(session_name);
        ctx.phase = AuthPhase::AwaitingScan;
        drop(ctx);

        self.send(
            user,
            format!(
                "🔑 Open Telegram on your phone: Settings → Devices → Link Desktop Device, \
                 then scan this login token:\n{}\n\
                 After the scan the session is added automatically.",
                qr.url
            ),
        );

        let flow = self.clone();
        tokio::spawn(async move {
            flow.finish_qr(user, conn).await;
        });
        Ok(())
    }

    async fn finish_qr(&self, user: UserId, conn: Arc<dyn Connection>) {
        match conn.qr_wait().await {
            Ok(profile) => {
                let Some(cell) = self.ctx_of(user).await else {
                    // The flow was cancelled or swept while waiting.
                    disconnect_quietly(Some(conn)).await;
                    return;
                };
                let mut ctx = cell.lock().await;
                if let Err(e) = self.complete(user, &mut ctx, profile).await {
                    tracing::warn!(user = user.0, "completing QR authorization failed: {e}");
                    self.send(user, format!("❌ QR authorization failed: {e}"));
                }
                let done = ctx.phase == AuthPhase::Done;
                drop(ctx);
                if done {
                    self.remove_context(user).await;
                }
            }
            Err(TransportError::PasswordRequired) => {
                let Some(cell) = self.ctx_of(user).await else {
                    disconnect_quietly(Some(conn)).await;
                    return;
                };
                let mut ctx = cell.lock().await;
                ctx.phase = AuthPhase::Awaiting2fa;
                if let Err(e) = self
                    .persist_pending(user, &ctx, PendingState::Waiting2fa)
                    .await
                {
                    tracing::warn!(user = user.0, "persisting 2fa state failed: {e}");
                }
                self.send(
                    user,
                    "🔐 Two-factor authentication is enabled. Enter your password:",
                );
            }
            Err(e) => {
                self.send(user, format!("❌ QR authorization failed: {e}"));
            }
        }
    }

    /// Abandon the flow: clear pending state and release the connection.
    pub async fn cancel(&self, user: UserId) -> Result<()> {
        if let Some(cell) = self.remove_context(user).await {
            let conn = cell.lock().await.conn.take();
            disconnect_quietly(conn).await;
        }
        self.inner.store.delete_pending(user).await?;
        self.send(user, "Authorization cancelled.");
        Ok(())
    }

    /// Evict contexts idle for at least `ttl`, releasing their connections.
    /// Returns the number of evicted contexts.
    pub async fn sweep_idle(&self, ttl: Duration) -> usize {
        let mut stale = Vec::new();
        {
            let mut map = self.inner.contexts.lock().await;
            let now = Instant::now();
            let users: Vec<i64> = map.keys().copied().collect();
            for u in users {
                let idle = match map.get(&u).map(|cell| cell.try_lock()) {
                    Some(Ok(ctx)) => now.duration_since(ctx.touched) >= ttl,
                    _ => false, // currently in use
                };
                if idle {
                    if let Some(cell) = map.remove(&u) {
                        stale.push((u, cell));
                    }
                }
            }
        }

        let count = stale.len();
        for (u, cell) in stale {
            let conn = cell.lock().await.conn.take();
            disconnect_quietly(conn).await;
            tracing::info!(user = u, "evicted idle authorization context");
        }
        count
    }

    /// Upsert the account session, clear the pending row, release the
    /// connection and finish the flow.
    async fn complete(
        &self,
        user: UserId,
        ctx: &mut AuthContext,
        profile: UserProfile,
    ) -> Result<()> {
        let (Some(credentials), Some(session_name)) = (ctx.credentials(), ctx.session_name.clone())
        else {
            return self.restart(user, ctx);
        };

        // A QR confirmation may authorize a different account than the phone
        // the flow started with; trust the platform's own profile.
        let phone = if profile.phone.is_empty() {
            match ctx.phone.clone() {
                Some(p) => p,
                None => return self.restart(user, ctx),
            }
        } else if profile.phone.starts_with('+') {
            profile.phone.clone()
        } else {
            format!("+{}", profile.phone)
        };

        self.inner
            .store
            .upsert_session(&NewSession {
                owner: user,
                phone: phone.clone(),
                credentials,
                session_name,
            })
            .await?;
        self.inner.store.delete_pending(user).await?;

        disconnect_quietly(ctx.conn.take()).await;
        ctx.phase = AuthPhase::Done;

        let who = profile.first_name.unwrap_or_else(|| "Unknown".to_string());
        self.send(
            user,
            format!("✅ Session added!\n📱 Number: {phone}\n👤 Name: {who}"),
        );
        tracing::info!(user = user.0, %phone, "account session authorized");
        Ok(())
    }

    fn restart(&self, user: UserId, ctx: &mut AuthContext) -> Result<()> {
        *ctx = AuthContext::new(AuthPhase::CollectingPhone);
        self.send(
            user,
            "Something went wrong; let's start over. Send the phone number.",
        );
        Ok(())
    }

    async fn persist_pending(
        &self,
        user: UserId,
        ctx: &AuthContext,
        state: PendingState,
    ) -> Result<()> {
        let (Some(phone), Some(credentials), Some(session_name)) = (
            ctx.phone.clone(),
            ctx.credentials(),
            ctx.session_name.clone(),
        ) else {
            return Ok(());
        };
        self.inner
            .store
            .upsert_pending(&PendingAuth {
                user,
                phone,
                credentials,
                session_name,
                state,
                created_at: Utc::now(),
            })
            .await
    }
}

async fn disconnect_quietly(conn: Option<Arc<dyn Connection>>) {
    if let Some(conn) = conn {
        if let Err(e) = conn.disconnect().await {
            tracing::debug!("disconnect during cleanup failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::domain::Scope;
    use crate::store::memory::MemoryStore;
    use crate::transport::fake::FakeTransport;

    const USER: UserId = UserId(7);
    const SESSION: &str = "session_7_380991234567";

    struct Fixture {
        flow: AuthFlow,
        store: Arc<MemoryStore>,
        fake: FakeTransport,
        rx: mpsc::UnboundedReceiver<Outbound>,
    }

    impl Fixture {
        fn new() -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            let store = Arc::new(MemoryStore::new());
            let fake = FakeTransport::default();
            let flow = AuthFlow::new(
                Arc::new(test_config()),
                store.clone(),
                Arc::new(fake.clone()),
                tx,
            );
            Self {
                flow,
                store,
                fake,
                rx,
            }
        }

        fn drain(&mut self) -> Vec<String> {
            let mut out = Vec::new();
            while let Ok(msg) = self.rx.try_recv() {
                out.push(msg.text);
            }
            out
        }

        async fn active_sessions(&self) -> Vec<crate::domain::SessionRecord> {
            self.store.list_active(Scope::Owner(USER)).await.unwrap()
        }
    }

    async fn advance_to_code(fx: &Fixture) {
        fx.flow.begin(USER).await.unwrap();
        fx.flow.handle_text(USER, "+380991234567").await.unwrap();
        fx.flow.handle_text(USER, "12345").await.unwrap();
        fx.flow.handle_text(USER, "abcdef0123").await.unwrap();
    }

    #[tokio::test]
    async fn code_flow_creates_an_active_session() {
        let mut fx = Fixture::new();
        advance_to_code(&fx).await;
        assert_eq!(fx.fake.code_requests(), vec!["+380991234567".to_string()]);
        assert!(fx.store.pending_for(USER).await.unwrap().is_some());

        fx.flow.handle_text(USER, "00000").await.unwrap();

        let sessions = fx.active_sessions().await;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].phone, "+380991234567");
        assert_eq!(sessions[0].session_name, SESSION);
        assert!(fx.store.pending_for(USER).await.unwrap().is_none());
        assert!(!fx.flow.in_flow(USER).await);

        // The onboarding connection was released.
        assert_eq!(fx.fake.connect_count(SESSION), 1);
        assert_eq!(fx.fake.disconnect_count(SESSION), 1);

        let msgs = fx.drain();
        assert!(msgs.iter().any(|m| m.contains("Session added")));
    }

    #[tokio::test]
    async fn phone_without_plus_is_rejected_in_place() {
        let mut fx = Fixture::new();
        fx.flow.begin(USER).await.unwrap();
        fx.flow.handle_text(USER, "0991234567").await.unwrap();

        assert_eq!(
            fx.flow.phase_of(USER).await,
            Some(AuthPhase::CollectingPhone)
        );
        assert!(fx.drain().iter().any(|m| m.contains("must start with +")));

        fx.flow.handle_text(USER, "+380991234567").await.unwrap();
        assert_eq!(
            fx.flow.phase_of(USER).await,
            Some(AuthPhase::CollectingApiId)
        );
    }

    #[tokio::test]
    async fn api_id_must_be_numeric() {
        let mut fx = Fixture::new();
        fx.flow.begin(USER).await.unwrap();
        fx.flow.handle_text(USER, "+380991234567").await.unwrap();
        fx.flow.handle_text(USER, "not-a-number").await.unwrap();

        assert_eq!(
            fx.flow.phase_of(USER).await,
            Some(AuthPhase::CollectingApiId)
        );
        assert!(fx.drain().iter().any(|m| m.contains("must be a number")));
    }

    #[tokio::test]
    async fn wrong_code_allows_retry() {
        let fx = Fixture::new();
        advance_to_code(&fx).await;

        fx.flow.handle_text(USER, "99999").await.unwrap();
        assert_eq!(fx.flow.phase_of(USER).await, Some(AuthPhase::AwaitingCode));
        assert!(fx.store.pending_for(USER).await.unwrap().is_some());

        fx.flow.handle_text(USER, "00000").await.unwrap();
        assert_eq!(fx.active_sessions().await.len(), 1);
    }

    #[tokio::test]
    async fn rejected_phone_abandons_the_flow() {
        let mut fx = Fixture::new();
        fx.fake.set_invalid_phone("+999000");

        fx.flow.begin(USER).await.unwrap();
        fx.flow.handle_text(USER, "+999000").await.unwrap();
        fx.flow.handle_text(USER, "12345").await.unwrap();
        fx.flow.handle_text(USER, "abcdef0123").await.unwrap();

        assert!(!fx.flow.in_flow(USER).await);
        assert!(fx.store.pending_for(USER).await.unwrap().is_none());
        assert_eq!(fx.fake.connect_count("session_7_999000"), 1);
        assert_eq!(fx.fake.disconnect_count("session_7_999000"), 1);
        assert!(fx
            .drain()
            .iter()
            .any(|m| m.contains("rejected this phone number")));
    }

    #[tokio::test]
    async fn two_factor_branch_persists_and_completes() {
        let mut fx = Fixture::new();
        fx.fake.set_password("+380991234567", "hunter2");
        advance_to_code(&fx).await;

        fx.flow.handle_text(USER, "00000").await.unwrap();
        assert_eq!(fx.flow.phase_of(USER).await, Some(AuthPhase::Awaiting2fa));
        let pending = fx.store.pending_for(USER).await.unwrap().unwrap();
        assert_eq!(pending.state, PendingState::Waiting2fa);

        fx.flow.handle_text(USER, "wrong").await.unwrap();
        assert_eq!(fx.flow.phase_of(USER).await, Some(AuthPhase::Awaiting2fa));
        assert!(fx.drain().iter().any(|m| m.contains("Password rejected")));

        fx.flow.handle_text(USER, "hunter2").await.unwrap();
        assert_eq!(fx.active_sessions().await.len(), 1);
        assert!(fx.store.pending_for(USER).await.unwrap().is_none());
        assert_eq!(fx.fake.disconnect_count(SESSION), 1);
    }

    #[tokio::test]
    async fn restart_resumes_waiting_code_without_duplicating_pending() {
        let fx = Fixture::new();
        advance_to_code(&fx).await;
        assert_eq!(fx.fake.code_requests().len(), 1);

        // Simulate a process restart: a fresh state machine over the same store.
        let (tx, _rx2) = mpsc::unbounded_channel();
        let flow2 = AuthFlow::new(
            Arc::new(test_config()),
            fx.store.clone(),
            Arc::new(fx.fake.clone()),
            tx,
        );

        assert!(flow2.resume(USER).await.unwrap());
        assert_eq!(fx.fake.code_requests().len(), 2);
        assert!(fx.store.pending_for(USER).await.unwrap().is_some());

        flow2.handle_text(USER, "00000").await.unwrap();
        assert_eq!(fx.active_sessions().await.len(), 1);
        assert!(fx.store.pending_for(USER).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn resume_without_pending_reports_nothing_to_do() {
        let fx = Fixture::new();
        assert!(!fx.flow.resume(USER).await.unwrap());
    }

    #[tokio::test]
    async fn qr_flow_uses_the_platform_profile_phone() {
        let mut fx = Fixture::new();
        advance_to_code(&fx).await;

        fx.flow.start_qr(USER).await.unwrap();
        assert_eq!(fx.flow.phase_of(USER).await, Some(AuthPhase::AwaitingScan));
        assert!(fx
            .drain()
            .iter()
            .any(|m| m.contains(&format!("tg://login?token=fake-{SESSION}"))));

        fx.fake.confirm_qr(
            SESSION,
            UserProfile {
                phone: "380997777777".to_string(),
                first_name: Some("Olha".to_string()),
            },
        );

        // The confirmation task completes asynchronously.
        for _ in 0..100 {
            if !fx.flow.in_flow(USER).await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let sessions = fx.active_sessions().await;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].phone, "+380997777777");
        assert!(fx.store.pending_for(USER).await.unwrap().is_none());
        assert_eq!(fx.fake.disconnect_count(SESSION), 1);
    }

    #[tokio::test]
    async fn cancel_clears_pending_and_releases_the_connection() {
        let mut fx = Fixture::new();
        advance_to_code(&fx).await;

        fx.flow.cancel(USER).await.unwrap();
        assert!(!fx.flow.in_flow(USER).await);
        assert!(fx.store.pending_for(USER).await.unwrap().is_none());
        assert_eq!(fx.fake.disconnect_count(SESSION), 1);
        assert!(fx.drain().iter().any(|m| m.contains("cancelled")));
    }

    #[tokio::test]
    async fn idle_contexts_are_swept() {
        let fx = Fixture::new();
        advance_to_code(&fx).await;

        assert_eq!(fx.flow.sweep_idle(Duration::from_secs(3600)).await, 0);
        assert!(fx.flow.in_flow(USER).await);

        assert_eq!(fx.flow.sweep_idle(Duration::ZERO).await, 1);
        assert!(!fx.flow.in_flow(USER).await);
        assert_eq!(fx.fake.disconnect_count(SESSION), 1);
    }
}
