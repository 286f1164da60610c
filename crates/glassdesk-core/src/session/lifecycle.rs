//! The session state machine.
//!
//! `SessionLifecycle` is deterministic: every operation takes the current
//! monotonic instant (and, where token expiry matters, the wall-clock
//! epoch) as arguments, and timers are plain data in a `TimerSet`. The
//! manager actor supplies real time and sleeps until `next_timer()`;
//! tests supply whatever time they like.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::api::LoginGrant;
use crate::auth::{Credential, SessionStore, StorageKey, UserIdentity};

use super::{
    ActivityGate, ActivityKind, LogoutReason, SessionError, SessionEvent, SessionSnapshot,
    SessionState, SessionTimeouts, Timer, TimerKind, TimerSet,
};

/// Interval between countdown decrements.
const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

/// What the durable store currently holds under the token key.
enum StoredToken {
    Missing,
    Valid(Credential),
    Unusable(String),
}

pub struct SessionLifecycle<S: SessionStore> {
    timeouts: SessionTimeouts,
    store: S,
    state: SessionState,
    credential: Option<Credential>,
    user: Option<UserIdentity>,
    countdown: Option<u64>,
    gate: ActivityGate,
    timers: TimerSet,
    events: Vec<SessionEvent>,
}

impl<S: SessionStore> SessionLifecycle<S> {
    pub fn new(timeouts: SessionTimeouts, store: S) -> Self {
        let timeouts = timeouts.validated();
        Self {
            gate: ActivityGate::new(timeouts.coalesce_window()),
            timeouts,
            store,
            state: SessionState::Anonymous,
            credential: None,
            user: None,
            countdown: None,
            timers: TimerSet::new(),
            events: Vec::new(),
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.is_authenticated()
    }

    pub fn current_user(&self) -> Option<&UserIdentity> {
        if self.is_authenticated() {
            self.user.as_ref()
        } else {
            None
        }
    }

    pub fn has_financial_access(&self) -> bool {
        self.current_user()
            .map(|u| u.can_view_financials)
            .unwrap_or(false)
    }

    pub fn countdown(&self) -> Option<u64> {
        self.countdown
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn timeouts(&self) -> &SessionTimeouts {
        &self.timeouts
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn warning_deadline(&self) -> Option<Instant> {
        self.timers.due(TimerKind::Warning)
    }

    pub fn logout_deadline(&self) -> Option<Instant> {
        self.timers.due(TimerKind::Logout)
    }

    pub fn has_pending_timers(&self) -> bool {
        !self.timers.is_empty()
    }

    pub fn is_timer_armed(&self, kind: TimerKind) -> bool {
        self.timers.is_armed(kind)
    }

    /// The deadline the driver should sleep until.
    pub fn next_timer(&self) -> Option<Timer> {
        self.timers.next()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            user: self.current_user().cloned(),
            countdown: if self.state == SessionState::Warning {
                self.countdown
            } else {
                None
            },
        }
    }

    /// Events emitted since the last call, oldest first.
    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    // =========================================================================
    // Startup
    // =========================================================================

    /// Rebuild the session from durable storage. Returns true if a stored
    /// session was resumed. Anything unusable is removed from storage.
    pub fn rehydrate(&mut self, now: Instant, now_epoch: i64) -> bool {
        match self.read_stored_token() {
            StoredToken::Missing => {
                debug!("No stored session");
                false
            }
            StoredToken::Unusable(why) => {
                warn!(reason = %why, "Discarding unreadable stored session");
                self.clear_storage();
                false
            }
            StoredToken::Valid(credential) if credential.is_expired_at(now_epoch) => {
                info!(subject = %credential.subject(), "Stored session token has expired");
                self.clear_storage();
                false
            }
            StoredToken::Valid(credential) => {
                if let Some(last) = self.read_last_activity() {
                    let idle_secs = now_epoch.saturating_sub(last);
                    let timeout =
                        i64::try_from(self.timeouts.inactivity_timeout_secs).unwrap_or(i64::MAX);
                    if idle_secs >= timeout {
                        info!(
                            subject = %credential.subject(),
                            idle_secs,
                            "Stored session idle past the inactivity timeout"
                        );
                        self.clear_storage();
                        return false;
                    }
                }
                info!(subject = %credential.subject(), "Resumed stored session");
                let user = credential.identity();
                self.activate(credential, user, now, now_epoch);
                true
            }
        }
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Adopt the result of a successful credential exchange.
    ///
    /// The token must decode and must not already be expired; otherwise the
    /// current state is left untouched and nothing is persisted.
    pub fn establish(
        &mut self,
        grant: LoginGrant,
        now: Instant,
        now_epoch: i64,
    ) -> Result<UserIdentity, SessionError> {
        let credential = Credential::decode(grant.access_token)?;
        if credential.is_expired_at(now_epoch) {
            warn!(subject = %credential.subject(), "Login returned an expired token");
            return Err(SessionError::TokenExpired);
        }

        if let Err(e) = self.store.set(StorageKey::Token, credential.token()) {
            warn!(error = %e, "Failed to persist session token");
        }

        let user = grant.user;
        info!(username = %user.username, "Login successful");
        self.activate(credential, user.clone(), now, now_epoch);
        Ok(user)
    }

    /// End the session. Idempotent: from `Anonymous` it only makes sure
    /// storage and timers are clear. Returns true if a session was ended.
    pub fn logout(&mut self, reason: LogoutReason) -> bool {
        self.timers.cancel_all();
        self.clear_storage();
        self.credential = None;
        self.user = None;
        self.countdown = None;
        self.gate.reset();

        if !self.state.is_authenticated() {
            return false;
        }

        self.transition(SessionState::Expired);
        match reason {
            LogoutReason::Manual => info!(%reason, "User logged out"),
            LogoutReason::Inactivity => info!(%reason, "User logged out due to inactivity"),
            LogoutReason::TokenExpired => {
                info!(%reason, "User logged out due to token expiration")
            }
        }
        self.events.push(SessionEvent::LoggedOut { reason });
        self.transition(SessionState::Anonymous);
        true
    }

    /// Re-arm both inactivity deadlines from `now`; leaves `Warning`.
    /// No-op (returns false) when not authenticated.
    pub fn reset_activity(&mut self, now: Instant, now_epoch: i64) -> bool {
        if !self.is_authenticated() {
            return false;
        }
        self.arm_inactivity(now, now_epoch);
        if self.state == SessionState::Warning {
            debug!("Inactivity warning dismissed");
            self.transition(SessionState::Active);
        }
        true
    }

    /// The "stay logged in" affordance.
    pub fn keep_alive(&mut self, now: Instant, now_epoch: i64) -> bool {
        self.reset_activity(now, now_epoch)
    }

    /// A raw input event. Coalesced through the activity gate before it
    /// can reset anything.
    pub fn record_activity(&mut self, kind: ActivityKind, now: Instant, now_epoch: i64) -> bool {
        if !self.is_authenticated() {
            return false;
        }
        if !self.gate.admit(now) {
            trace!(?kind, "Activity coalesced");
            return false;
        }
        self.reset_activity(now, now_epoch)
    }

    /// Validate the *stored* token. Absent, undecodable or expired ends the
    /// session with `TokenExpired`. Returns true if a session was ended.
    pub fn check_expiry(&mut self, now_epoch: i64) -> bool {
        match self.read_stored_token() {
            StoredToken::Valid(credential) if !credential.is_expired_at(now_epoch) => false,
            StoredToken::Missing if !self.is_authenticated() => false,
            StoredToken::Missing => {
                warn!("Stored session token disappeared");
                self.logout(LogoutReason::TokenExpired)
            }
            StoredToken::Valid(_) => self.logout(LogoutReason::TokenExpired),
            StoredToken::Unusable(why) => {
                warn!(reason = %why, "Token validation error");
                self.logout(LogoutReason::TokenExpired)
            }
        }
    }

    /// The API answered 401 for the current token.
    pub fn report_unauthorized(&mut self) -> bool {
        if !self.is_authenticated() {
            return false;
        }
        warn!("API rejected the session token");
        self.logout(LogoutReason::TokenExpired)
    }

    /// Run an expired deadline. Stale timers (re-armed or cancelled since
    /// they were read) are ignored and return false.
    pub fn fire(&mut self, timer: Timer, now: Instant, now_epoch: i64) -> bool {
        if !self.timers.take(&timer) {
            trace!(kind = ?timer.kind, "Ignoring stale timer");
            return false;
        }

        match timer.kind {
            TimerKind::Warning => self.begin_warning(timer.due),
            TimerKind::Countdown => self.tick_countdown(timer.due),
            TimerKind::Logout => {
                self.logout(LogoutReason::Inactivity);
            }
            TimerKind::ExpiryPoll => {
                let next = (timer.due + self.timeouts.expiry_poll_interval()).max(now);
                self.timers.arm(TimerKind::ExpiryPoll, next);
                self.check_expiry(now_epoch);
            }
        }
        true
    }

    /// Stop all timers without touching the session or storage.
    pub fn teardown(&mut self) {
        self.timers.cancel_all();
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn activate(
        &mut self,
        credential: Credential,
        user: UserIdentity,
        now: Instant,
        now_epoch: i64,
    ) {
        self.timers.cancel_all();
        self.credential = Some(credential);
        self.user = Some(user);
        self.countdown = None;
        self.gate.reset();
        self.transition(SessionState::Active);
        self.arm_inactivity(now, now_epoch);
        self.timers
            .arm(TimerKind::ExpiryPoll, now + self.timeouts.expiry_poll_interval());
    }

    /// Cancel, then re-arm, the warning and logout deadlines.
    fn arm_inactivity(&mut self, now: Instant, now_epoch: i64) {
        self.timers.cancel(TimerKind::Warning);
        self.timers.cancel(TimerKind::Countdown);
        self.timers.cancel(TimerKind::Logout);
        self.countdown = None;

        if self.timeouts.has_warning() {
            self.timers
                .arm(TimerKind::Warning, now + self.timeouts.warning_delay());
        }
        self.timers
            .arm(TimerKind::Logout, now + self.timeouts.inactivity_timeout());

        if let Err(e) = self
            .store
            .set(StorageKey::LastActivity, &now_epoch.to_string())
        {
            warn!(error = %e, "Failed to persist last activity");
        }
    }

    fn begin_warning(&mut self, due: Instant) {
        if self.state != SessionState::Active {
            return;
        }
        let secs = self.timeouts.countdown_secs;
        self.countdown = Some(secs);
        self.transition(SessionState::Warning);
        info!(countdown_secs = secs, "Inactivity warning started");
        self.events.push(SessionEvent::Countdown {
            remaining_secs: secs,
        });
        self.timers.arm(TimerKind::Countdown, due + COUNTDOWN_TICK);
    }

    fn tick_countdown(&mut self, due: Instant) {
        let remaining = self.countdown.unwrap_or(0).saturating_sub(1);
        self.countdown = Some(remaining);
        self.events.push(SessionEvent::Countdown {
            remaining_secs: remaining,
        });
        if remaining == 0 {
            self.logout(LogoutReason::Inactivity);
        } else {
            self.timers.arm(TimerKind::Countdown, due + COUNTDOWN_TICK);
        }
    }

    fn transition(&mut self, to: SessionState) {
        if self.state != to {
            let from = self.state;
            self.state = to;
            debug!(%from, %to, "Session state changed");
            self.events.push(SessionEvent::StateChanged { from, to });
        }
    }

    fn read_stored_token(&self) -> StoredToken {
        match self.store.get(StorageKey::Token) {
            Ok(None) => StoredToken::Missing,
            Ok(Some(raw)) => match Credential::decode(raw) {
                Ok(credential) => StoredToken::Valid(credential),
                Err(e) => StoredToken::Unusable(e.to_string()),
            },
            Err(e) => StoredToken::Unusable(format!("{:#}", e)),
        }
    }

    fn read_last_activity(&self) -> Option<i64> {
        self.store
            .get(StorageKey::LastActivity)
            .ok()
            .flatten()
            .and_then(|raw| raw.trim().parse().ok())
    }

    fn clear_storage(&mut self) {
        for key in StorageKey::ALL {
            if let Err(e) = self.store.remove(key) {
                warn!(key = key.as_str(), error = %e, "Failed to clear stored session value");
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
