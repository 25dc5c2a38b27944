use crate::anomaly::AnomalyDetector;
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::events::EventBus;
use crate::fingerprint;
use crate::geo::{GeoResolver, NullGeoResolver};
use crate::token::{OsRngTokenGenerator, TokenGenerator};
use chrono::Duration;
use sessionguard_models::{
    AnomalyResult, Location, RequestContext, Session, SessionEvent, SessionEventKind,
    SessionStatus, Severity,
};
use sessionguard_store::{MemoryStore, SessionStore};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const LOCK_POOL_SIZE: usize = 64;

/// Reason a validation was rejected. These are expected, frequent
/// outcomes on the hot path, so they are data rather than errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    SessionNotFound,
    SessionInactive,
    SuspiciousActivity,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::SessionNotFound => "session_not_found",
            RejectionReason::SessionInactive => "session_inactive",
            RejectionReason::SuspiciousActivity => "suspicious_activity",
        }
    }
}

/// Result of `validate_session`. Middleware rejects the request
/// (401/403-equivalent) on `Rejected`; the end user only ever sees
/// "please sign in again".
#[derive(Debug, Clone)]
pub enum ValidationOutcome {
    Valid(Session),
    Rejected {
        reason: RejectionReason,
        anomaly: Option<AnomalyResult>,
    },
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid(_))
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            ValidationOutcome::Valid(session) => Some(session),
            ValidationOutcome::Rejected { .. } => None,
        }
    }
}

/// Fixed pool of mutexes keyed by hash, giving per-session / per-user
/// mutual exclusion for read-modify-write sequences without a global
/// lock. Hash collisions only cost spurious serialization.
struct LockPool {
    locks: Vec<Mutex<()>>,
}

impl LockPool {
    fn new(size: usize) -> Self {
        Self {
            locks: (0..size).map(|_| Mutex::new(())).collect(),
        }
    }

    async fn acquire(&self, key: &str) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.locks.len();
        self.locks[index].lock().await
    }
}

/// Orchestrates the session lifecycle: creation, lookup with lazy
/// expiry, validation with anomaly detection, renewal, revocation,
/// per-user cap enforcement, and the background cleanup sweep.
///
/// Lock order is user-pool then session-pool; session locks are
/// leaf-level and never held while acquiring another, so the two pools
/// cannot deadlock. The sweep takes the same session locks as
/// foreground traffic.
pub struct SessionManager {
    config: EngineConfig,
    store: Arc<dyn SessionStore>,
    geo: Arc<dyn GeoResolver>,
    tokens: Arc<dyn TokenGenerator>,
    clock: Arc<dyn Clock>,
    bus: EventBus,
    detector: AnomalyDetector,
    session_locks: Arc<LockPool>,
    user_locks: LockPool,
    sweep_task: std::sync::Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl SessionManager {
    pub fn new(config: EngineConfig) -> Self {
        let detector = AnomalyDetector::new(
            config.enable_device_tracking,
            config.impossible_travel_speed_kmh,
        );
        Self {
            detector,
            store: Arc::new(MemoryStore::new()),
            geo: Arc::new(NullGeoResolver),
            tokens: Arc::new(OsRngTokenGenerator),
            clock: Arc::new(SystemClock),
            bus: EventBus::default(),
            session_locks: Arc::new(LockPool::new(LOCK_POOL_SIZE)),
            user_locks: LockPool::new(LOCK_POOL_SIZE),
            sweep_task: std::sync::Mutex::new(None),
            config,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_geo_resolver(mut self, geo: Arc<dyn GeoResolver>) -> Self {
        self.geo = geo;
        self
    }

    pub fn with_token_generator(mut self, tokens: Arc<dyn TokenGenerator>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Subscribe to lifecycle events (audit logging, notifications).
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SessionEvent> {
        self.bus.subscribe()
    }

    // ── Lifecycle API ────────────────────────────────────────────────

    /// Create and register a session for an already-verified principal.
    ///
    /// Never rejected to enforce the per-user cap; older sessions are
    /// evicted instead. Fails only if the entropy source cannot produce
    /// a session id or the store backend errors.
    pub async fn create_session(&self, user_id: &str, ctx: &RequestContext) -> Result<Session> {
        let id = self.tokens.generate()?;
        let now = self.clock.now();

        let mut session = Session::new(id, user_id.to_string(), now, self.config.session_ttl);
        session.ip_address = ctx.remote_address.clone();
        if self.config.enable_device_tracking {
            session.set_device(&fingerprint::derive(ctx));
        }
        session.location = self.resolve_location(&ctx.remote_address).await;

        let _user_guard = self.user_locks.acquire(user_id).await;
        self.store.put(session.clone()).await?;
        self.enforce_session_cap(user_id).await?;

        tracing::debug!(session_id = %session.id, user_id, "created session");
        self.bus
            .publish(SessionEvent::new(SessionEventKind::Created, session.clone(), now));
        Ok(session)
    }

    /// Read-path lookup: no activity mutation, but expired and idle
    /// sessions are reclaimed lazily and reported as absent.
    pub async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        let _guard = self.session_locks.acquire(session_id).await;
        let session = self.get_live_locked(session_id).await?;
        Ok(session.filter(|s| s.status == SessionStatus::Active))
    }

    /// Per-request validation: lazy expiry, anomaly evaluation, activity
    /// bump. A high-severity anomaly revokes the session fail-closed.
    pub async fn validate_session(
        &self,
        session_id: &str,
        ctx: &RequestContext,
    ) -> Result<ValidationOutcome> {
        // Resolve outside the critical section; it is the only external
        // I/O on this path and must never hold a session lock hostage.
        let current_location = if self.config.enable_anomaly_detection {
            self.resolve_location(&ctx.remote_address).await
        } else {
            None
        };

        let _guard = self.session_locks.acquire(session_id).await;
        let Some(mut session) = self.get_live_locked(session_id).await? else {
            return Ok(ValidationOutcome::Rejected {
                reason: RejectionReason::SessionNotFound,
                anomaly: None,
            });
        };
        if session.status != SessionStatus::Active {
            // Suspended, or a state raced in through another path.
            return Ok(ValidationOutcome::Rejected {
                reason: RejectionReason::SessionInactive,
                anomaly: None,
            });
        }

        let now = self.clock.now();
        // Evaluate against the pre-bump baseline so the travel window is
        // anchored at the previous activity, then record this request.
        let anomaly = if self.config.enable_anomaly_detection {
            self.detector
                .evaluate(&session, ctx, current_location.as_ref(), now)
        } else {
            None
        };
        session.record_activity(now);

        if let Some(anomaly) = anomaly {
            session.suspicious_activity_count += 1;
            self.store.put(session.clone()).await?;
            tracing::warn!(
                session_id = %session.id,
                user_id = %session.user_id,
                severity = ?anomaly.severity,
                "suspicious session activity"
            );
            self.bus.publish(
                SessionEvent::new(SessionEventKind::Suspicious, session.clone(), now)
                    .with_anomaly(anomaly.clone()),
            );

            if anomaly.severity == Severity::High {
                self.revoke_locked(session, "suspicious_activity", Some(anomaly.clone()))
                    .await?;
                return Ok(ValidationOutcome::Rejected {
                    reason: RejectionReason::SuspiciousActivity,
                    anomaly: Some(anomaly),
                });
            }
            return Ok(ValidationOutcome::Valid(session));
        }

        self.store.put(session.clone()).await?;
        self.bus
            .publish(SessionEvent::new(SessionEventKind::Activity, session.clone(), now));
        Ok(ValidationOutcome::Valid(session))
    }

    /// Extend a session's absolute expiry by a full TTL from now.
    pub async fn renew_session(&self, session_id: &str) -> Result<Session> {
        let _guard = self.session_locks.acquire(session_id).await;
        let Some(mut session) = self.get_live_locked(session_id).await? else {
            return Err(EngineError::SessionNotFound(session_id.to_string()));
        };
        if session.status != SessionStatus::Active {
            return Err(EngineError::SessionNotFound(session_id.to_string()));
        }

        let now = self.clock.now();
        session.expires_at = now + self.config.session_ttl;
        session.record_activity(now);
        self.store.put(session.clone()).await?;
        self.bus
            .publish(SessionEvent::new(SessionEventKind::Renewed, session.clone(), now));
        Ok(session)
    }

    /// Revoke one session. Idempotent: revoking an absent or
    /// already-terminal session is a no-op and returns `false`.
    pub async fn revoke_session(&self, session_id: &str, reason: &str) -> Result<bool> {
        let _guard = self.session_locks.acquire(session_id).await;
        let Some(session) = self.store.get(session_id).await? else {
            return Ok(false);
        };
        if session.status.is_terminal() {
            // Awaiting sweep; reclaim without a second terminal event.
            self.store.delete(session_id).await?;
            return Ok(false);
        }
        if session.is_expired(self.clock.now()) {
            self.expire_locked(session).await?;
            return Ok(false);
        }
        self.revoke_locked(session, reason, None).await?;
        Ok(true)
    }

    /// Revoke every session of a user, optionally sparing one
    /// ("log out everywhere else"). Returns the number revoked.
    pub async fn revoke_all_user_sessions(
        &self,
        user_id: &str,
        except_session_id: Option<&str>,
    ) -> Result<usize> {
        let _user_guard = self.user_locks.acquire(user_id).await;
        let sessions = self.store.list_by_user(user_id).await?;
        let mut revoked = 0;
        for session in sessions {
            if except_session_id == Some(session.id.as_str()) {
                continue;
            }
            let _guard = self.session_locks.acquire(&session.id).await;
            // Re-read under the lock; it may have been reclaimed since.
            if let Some(current) = self.store.get(&session.id).await? {
                if !current.status.is_terminal() {
                    self.revoke_locked(current, "user_logout", None).await?;
                    revoked += 1;
                }
            }
        }
        Ok(revoked)
    }

    /// Sessions a device-management UI should show: currently active,
    /// after lazy-expiry filtering.
    pub async fn list_user_sessions(&self, user_id: &str) -> Result<Vec<Session>> {
        let ids: Vec<String> = self
            .store
            .list_by_user(user_id)
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();
        let mut live = Vec::with_capacity(ids.len());
        for id in ids {
            let _guard = self.session_locks.acquire(&id).await;
            if let Some(session) = self.get_live_locked(&id).await? {
                if session.status == SessionStatus::Active {
                    live.push(session);
                }
            }
        }
        Ok(live)
    }

    /// Place an active session on hold pending review. Unlike expiry and
    /// revocation this is recoverable via `resume_session`.
    pub async fn suspend_session(&self, session_id: &str, reason: &str) -> Result<bool> {
        let _guard = self.session_locks.acquire(session_id).await;
        let Some(mut session) = self.get_live_locked(session_id).await? else {
            return Ok(false);
        };
        if session.status != SessionStatus::Active {
            return Ok(false);
        }

        let now = self.clock.now();
        session.status = SessionStatus::Suspended;
        session
            .metadata
            .insert("suspend_reason".to_string(), reason.to_string());
        self.store.put(session.clone()).await?;
        self.bus.publish(
            SessionEvent::new(SessionEventKind::Suspended, session, now).with_reason(reason),
        );
        Ok(true)
    }

    /// Lift a suspension. Fails for absent, expired, or non-suspended
    /// sessions; terminal states never come back.
    pub async fn resume_session(&self, session_id: &str) -> Result<Session> {
        let _guard = self.session_locks.acquire(session_id).await;
        let Some(mut session) = self.get_live_locked(session_id).await? else {
            return Err(EngineError::SessionNotFound(session_id.to_string()));
        };
        if session.status != SessionStatus::Suspended {
            return Err(EngineError::SessionNotFound(session_id.to_string()));
        }

        let now = self.clock.now();
        session.status = SessionStatus::Active;
        session.metadata.remove("suspend_reason");
        session.record_activity(now);
        self.store.put(session.clone()).await?;
        self.bus
            .publish(SessionEvent::new(SessionEventKind::Resumed, session.clone(), now));
        Ok(session)
    }

    pub async fn session_count(&self) -> Result<usize> {
        Ok(self.store.count().await?)
    }

    // ── Background sweep ─────────────────────────────────────────────

    /// Start the periodic cleanup sweep. Idempotent.
    pub fn start(&self) {
        let mut guard = self.sweep_task.lock().expect("sweep task lock poisoned");
        if guard.is_some() {
            return;
        }
        let token = CancellationToken::new();
        let child = token.clone();
        let store = Arc::clone(&self.store);
        let locks = Arc::clone(&self.session_locks);
        let bus = self.bus.clone();
        let clock = Arc::clone(&self.clock);
        let idle_timeout = self.config.idle_timeout;
        let interval = self.config.cleanup_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // the first tick fires immediately
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {
                        match Self::run_sweep(&*store, &locks, &bus, &*clock, idle_timeout).await {
                            Ok(removed) if removed > 0 => {
                                tracing::debug!(removed, "session cleanup sweep");
                            }
                            Ok(_) => {}
                            Err(e) => tracing::error!(error = %e, "session cleanup sweep failed"),
                        }
                    }
                }
            }
        });
        *guard = Some((token, handle));
    }

    /// Stop the sweep and wait for it to exit.
    pub async fn stop(&self) {
        let task = self
            .sweep_task
            .lock()
            .expect("sweep task lock poisoned")
            .take();
        if let Some((token, handle)) = task {
            token.cancel();
            let _ = handle.await;
        }
    }

    /// Run one sweep iteration; exposed so tests drive cleanup
    /// deterministically instead of waiting on timers. Returns the
    /// number of sessions reclaimed.
    pub async fn sweep_once(&self) -> Result<usize> {
        Self::run_sweep(
            &*self.store,
            &self.session_locks,
            &self.bus,
            &*self.clock,
            self.config.idle_timeout,
        )
        .await
    }

    async fn run_sweep(
        store: &dyn SessionStore,
        locks: &LockPool,
        bus: &EventBus,
        clock: &dyn Clock,
        idle_timeout: Duration,
    ) -> Result<usize> {
        let mut removed = 0;
        for id in store.ids().await? {
            let _guard = locks.acquire(&id).await;
            let Some(session) = store.get(&id).await? else {
                continue;
            };
            let now = clock.now();
            if session.status.is_terminal() {
                // Already transitioned through another path; no second
                // terminal event.
                store.delete(&id).await?;
                removed += 1;
            } else if session.is_expired(now)
                || (session.status == SessionStatus::Active
                    && session.is_idle(now, idle_timeout))
            {
                let mut session = session;
                session.status = SessionStatus::Expired;
                store.delete(&id).await?;
                bus.publish(SessionEvent::new(SessionEventKind::Expired, session, now));
                removed += 1;
            }
        }
        Ok(removed)
    }

    // ── Internal helpers (session lock must be held) ─────────────────

    /// Fetch a session, lazily expiring it if its TTL or idle window has
    /// passed. Returns non-terminal sessions only; `Suspended` sessions
    /// are returned so suspension-aware callers can distinguish them.
    async fn get_live_locked(&self, session_id: &str) -> Result<Option<Session>> {
        let Some(session) = self.store.get(session_id).await? else {
            return Ok(None);
        };
        if session.status.is_terminal() {
            return Ok(None);
        }
        let now = self.clock.now();
        if session.is_expired(now)
            || (session.status == SessionStatus::Active
                && session.is_idle(now, self.config.idle_timeout))
        {
            self.expire_locked(session).await?;
            return Ok(None);
        }
        Ok(Some(session))
    }

    async fn expire_locked(&self, mut session: Session) -> Result<()> {
        let now = self.clock.now();
        session.status = SessionStatus::Expired;
        self.store.delete(&session.id).await?;
        tracing::debug!(session_id = %session.id, "session expired");
        self.bus
            .publish(SessionEvent::new(SessionEventKind::Expired, session, now));
        Ok(())
    }

    async fn revoke_locked(
        &self,
        mut session: Session,
        reason: &str,
        anomaly: Option<AnomalyResult>,
    ) -> Result<()> {
        let now = self.clock.now();
        session.status = SessionStatus::Revoked;
        session
            .metadata
            .insert("revoke_reason".to_string(), reason.to_string());
        session
            .metadata
            .insert("revoked_at".to_string(), now.to_rfc3339());
        self.store.delete(&session.id).await?;

        tracing::debug!(session_id = %session.id, reason, "revoked session");
        let mut event =
            SessionEvent::new(SessionEventKind::Revoked, session, now).with_reason(reason);
        if let Some(anomaly) = anomaly {
            event = event.with_anomaly(anomaly);
        }
        self.bus.publish(event);
        Ok(())
    }

    /// Evict least-recently-active sessions until the user is back
    /// within the cap. Caller must hold the user lock.
    async fn enforce_session_cap(&self, user_id: &str) -> Result<()> {
        let now = self.clock.now();
        let mut active: Vec<Session> = self
            .store
            .list_by_user(user_id)
            .await?
            .into_iter()
            .filter(|s| s.is_active(now))
            .collect();
        if active.len() <= self.config.max_sessions_per_user {
            return Ok(());
        }

        active.sort_by_key(|s| s.last_activity_at);
        let excess = active.len() - self.config.max_sessions_per_user;
        for session in active.into_iter().take(excess) {
            let _guard = self.session_locks.acquire(&session.id).await;
            if let Some(current) = self.store.get(&session.id).await? {
                if !current.status.is_terminal() {
                    tracing::debug!(
                        session_id = %current.id,
                        user_id,
                        "evicting session over per-user cap"
                    );
                    self.revoke_locked(current, "max_sessions_exceeded", None)
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Best-effort geo lookup, bounded by the configured timeout. A slow
    /// or failing resolver degrades to "location unknown", never to a
    /// failed operation.
    async fn resolve_location(&self, address: &str) -> Option<Location> {
        if address.is_empty() {
            return None;
        }
        match tokio::time::timeout(self.config.geo_timeout, self.geo.resolve(address)).await {
            Ok(location) => location,
            Err(_) => {
                tracing::debug!(address, "geo resolution timed out");
                None
            }
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.sweep_task.lock() {
            if let Some((token, handle)) = guard.take() {
                token.cancel();
                handle.abort();
            }
        }
    }
}
