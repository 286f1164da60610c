//! Session manager actor.
//!
//! The manager is a Tokio task that owns the `SessionLifecycle`. Callers
//! talk to it through a `SessionHandle` (a cheap clone wrapping an mpsc
//! sender); the actor answers over oneshot reply channels and publishes
//! snapshots on a `watch` channel and events on a `broadcast` channel.
//!
//! The only suspension point that leaves the actor is the login exchange,
//! which runs in a spawned task and loops its result back in as a command.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::api::{ApiError, AuthService, LoginGrant};
use crate::auth::{SessionStore, UserIdentity};

use super::{
    ActivityKind, Clock, LogoutReason, SessionError, SessionEvent, SessionLifecycle,
    SessionSnapshot, SessionTimeouts, SystemClock, Timer,
};

const COMMAND_CAPACITY: usize = 64;
// Room for a full countdown plus the transitions around it
const EVENT_CAPACITY: usize = 256;

/// Commands sent to the session actor.
enum SessionCommand {
    Login {
        username: String,
        password: String,
        reply: oneshot::Sender<Result<UserIdentity, SessionError>>,
    },

    /// The auth service answered a `Login`.
    LoginCompleted {
        result: Result<LoginGrant, ApiError>,
        reply: oneshot::Sender<Result<UserIdentity, SessionError>>,
    },

    Logout {
        reason: LogoutReason,
        reply: oneshot::Sender<bool>,
    },

    /// Raw input event (fire-and-forget, coalesced by the actor).
    Activity { kind: ActivityKind },

    ResetActivity { reply: oneshot::Sender<bool> },

    KeepAlive { reply: oneshot::Sender<bool> },

    CheckExpiry { reply: oneshot::Sender<bool> },

    ReportUnauthorized { reply: oneshot::Sender<bool> },

    Shutdown,
}

/// Starts session actors.
pub struct SessionManager;

impl SessionManager {
    /// Rehydrate from `store` and start the actor on the current Tokio
    /// runtime. The returned handle already reflects the rehydrated state.
    pub fn spawn<A, S>(auth: A, store: S, timeouts: SessionTimeouts) -> SessionHandle
    where
        A: AuthService,
        S: SessionStore,
    {
        Self::spawn_with_clock(auth, store, timeouts, SystemClock)
    }

    /// As `spawn`, with an explicit wall clock for token expiry.
    pub fn spawn_with_clock<A, S, C>(
        auth: A,
        store: S,
        timeouts: SessionTimeouts,
        clock: C,
    ) -> SessionHandle
    where
        A: AuthService,
        S: SessionStore,
        C: Clock,
    {
        let mut lifecycle = SessionLifecycle::new(timeouts, store);
        lifecycle.rehydrate(Instant::now(), clock.now_epoch());
        // Startup transitions are reflected in the initial snapshot
        lifecycle.take_events();

        let (sender, receiver) = mpsc::channel(COMMAND_CAPACITY);
        let (snapshot_tx, snapshot_rx) = watch::channel(lifecycle.snapshot());
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let actor = SessionActor {
            auth: Arc::new(auth),
            lifecycle,
            clock,
            receiver,
            loopback: sender.downgrade(),
            snapshot_tx,
            events_tx: events_tx.clone(),
        };
        tokio::spawn(actor.run());

        SessionHandle {
            sender,
            snapshot: snapshot_rx,
            events: events_tx,
        }
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Handle to a running session actor.
///
/// Cheap to clone. The route guard and the UI shell each hold one.
#[derive(Clone)]
pub struct SessionHandle {
    sender: mpsc::Sender<SessionCommand>,
    snapshot: watch::Receiver<SessionSnapshot>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    /// Exchange credentials with the auth service. On failure the session
    /// is left as it was and nothing is persisted.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<UserIdentity, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Login {
            username: username.to_string(),
            password: password.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| SessionError::Unavailable)?
    }

    /// `authenticate`, reduced to success or failure.
    pub async fn login(&self, username: &str, password: &str) -> bool {
        self.authenticate(username, password).await.is_ok()
    }

    /// End the session. Safe from any state. Returns true if a session
    /// was actually ended; `Unavailable` once the actor has stopped, in
    /// which case storage was not touched.
    pub async fn logout(&self, reason: LogoutReason) -> Result<bool, SessionError> {
        self.request(|reply| SessionCommand::Logout { reason, reply })
            .await
    }

    /// Re-arm the inactivity deadlines from now. No-op when anonymous.
    pub async fn reset_activity(&self) -> bool {
        self.request(|reply| SessionCommand::ResetActivity { reply })
            .await
            .unwrap_or(false)
    }

    /// Dismiss the inactivity warning.
    pub async fn keep_alive(&self) -> bool {
        self.request(|reply| SessionCommand::KeepAlive { reply })
            .await
            .unwrap_or(false)
    }

    /// Validate the stored token now rather than waiting for the poll.
    /// Returns true if the session was ended.
    pub async fn check_expiry(&self) -> bool {
        self.request(|reply| SessionCommand::CheckExpiry { reply })
            .await
            .unwrap_or(false)
    }

    /// Report a user interaction. Never blocks; dropped if the actor is
    /// busy, which is harmless since activity is coalesced anyway.
    pub fn record_activity(&self, kind: ActivityKind) {
        let _ = self.sender.try_send(SessionCommand::Activity { kind });
    }

    /// An API call came back 401: end the session with `token_expired`.
    /// Waits for queue space, so a backlog of activity cannot drop it.
    pub async fn report_unauthorized(&self) -> Result<bool, SessionError> {
        self.request(|reply| SessionCommand::ReportUnauthorized { reply })
            .await
    }

    /// Stop the actor and cancel its timers. Storage is left alone so the
    /// session can be resumed by the next process. Idempotent.
    pub async fn shutdown(&self) {
        if self.sender.send(SessionCommand::Shutdown).await.is_ok() {
            self.sender.closed().await;
        }
    }

    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }

    // Queries read the latest published snapshot

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.snapshot.borrow().is_authenticated()
    }

    pub fn current_user(&self) -> Option<UserIdentity> {
        let snapshot = self.snapshot.borrow();
        if snapshot.is_authenticated() {
            snapshot.user.clone()
        } else {
            None
        }
    }

    pub fn has_financial_access(&self) -> bool {
        self.snapshot.borrow().has_financial_access()
    }

    /// Receiver that wakes whenever the snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Stream of events from now on.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn send(&self, cmd: SessionCommand) -> Result<(), SessionError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| SessionError::Unavailable)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(make(reply)).await?;
        rx.await.map_err(|_| SessionError::Unavailable)
    }
}

// ============================================================================
// Actor
// ============================================================================

struct SessionActor<A, S: SessionStore, C> {
    auth: Arc<A>,
    lifecycle: SessionLifecycle<S>,
    clock: C,
    receiver: mpsc::Receiver<SessionCommand>,
    /// Lets the login task report back without keeping the actor alive.
    loopback: mpsc::WeakSender<SessionCommand>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    events_tx: broadcast::Sender<SessionEvent>,
}

impl<A, S, C> SessionActor<A, S, C>
where
    A: AuthService,
    S: SessionStore,
    C: Clock,
{
    async fn run(mut self) {
        info!(state = %self.lifecycle.state(), "Session manager started");

        loop {
            let next = self.lifecycle.next_timer();
            tokio::select! {
                biased;

                cmd = self.receiver.recv() => match cmd {
                    Some(SessionCommand::Shutdown) | None => break,
                    Some(cmd) => self.handle(cmd),
                },

                _ = wait_for(next) => {
                    if let Some(timer) = next {
                        let epoch = self.clock.now_epoch();
                        self.lifecycle.fire(timer, Instant::now(), epoch);
                    }
                }
            }
            self.publish();
        }

        self.lifecycle.teardown();
        self.receiver.close();
        info!("Session manager stopped");
    }

    /// Replies are sent after publishing, so a caller that awaited one
    /// always observes the matching snapshot.
    fn handle(&mut self, cmd: SessionCommand) {
        let now = Instant::now();
        let epoch = self.clock.now_epoch();

        match cmd {
            SessionCommand::Login {
                username,
                password,
                reply,
            } => self.start_login(username, password, reply),
            SessionCommand::LoginCompleted { result, reply } => {
                let outcome = result
                    .map_err(SessionError::from)
                    .and_then(|grant| self.lifecycle.establish(grant, now, epoch));
                if let Err(e) = &outcome {
                    warn!(error = %e, "Login failed");
                }
                self.publish();
                let _ = reply.send(outcome);
            }
            SessionCommand::Logout { reason, reply } => {
                let ended = self.lifecycle.logout(reason);
                self.publish();
                let _ = reply.send(ended);
            }
            SessionCommand::Activity { kind } => {
                self.lifecycle.record_activity(kind, now, epoch);
            }
            SessionCommand::ResetActivity { reply } => {
                let reset = self.lifecycle.reset_activity(now, epoch);
                self.publish();
                let _ = reply.send(reset);
            }
            SessionCommand::KeepAlive { reply } => {
                let reset = self.lifecycle.keep_alive(now, epoch);
                self.publish();
                let _ = reply.send(reset);
            }
            SessionCommand::CheckExpiry { reply } => {
                let ended = self.lifecycle.check_expiry(epoch);
                self.publish();
                let _ = reply.send(ended);
            }
            SessionCommand::ReportUnauthorized { reply } => {
                let ended = self.lifecycle.report_unauthorized();
                self.publish();
                let _ = reply.send(ended);
            }
            SessionCommand::Shutdown => {}
        }
    }

    fn start_login(
        &self,
        username: String,
        password: String,
        reply: oneshot::Sender<Result<UserIdentity, SessionError>>,
    ) {
        debug!(username = %username, "Starting login exchange");
        let auth = Arc::clone(&self.auth);
        let loopback = self.loopback.clone();

        tokio::spawn(async move {
            let result = auth.authenticate(&username, &password).await;
            match loopback.upgrade() {
                Some(tx) => {
                    // If the actor is gone the reply is dropped and the
                    // caller sees `Unavailable`
                    let _ = tx.send(SessionCommand::LoginCompleted { result, reply }).await;
                }
                None => {
                    let _ = reply.send(Err(SessionError::Unavailable));
                }
            }
        });
    }

    fn publish(&mut self) {
        let snapshot = self.lifecycle.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current != snapshot {
                *current = snapshot;
                true
            } else {
                false
            }
        });

        for event in self.lifecycle.take_events() {
            // No subscribers is fine
            let _ = self.events_tx.send(event);
        }
    }
}

/// Sleep until the timer is due, or forever when nothing is armed.
async fn wait_for(timer: Option<Timer>) {
    match timer {
        Some(timer) => sleep_until(timer.due).await,
        None => std::future::pending().await,
    }
}
