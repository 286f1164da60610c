//! Integration tests for the session manager actor, driven with paused
//! Tokio time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use glassdesk_core::auth::{FileStore, MemoryStore};
use glassdesk_core::session::{ActivityKind, Clock, SystemClock};
use glassdesk_core::{
    ApiClient, ApiError, AuthService, LoginGrant, LogoutReason, Route, RouteDecision, RouteGuard,
    SessionError, SessionEvent, SessionHandle, SessionManager, SessionState, SessionStore,
    SessionTimeouts, StorageKey, UserIdentity,
};
use serde_json::json;
use tokio::sync::broadcast;
use tokio::time::{sleep, Instant};

// =========================================================================
// Helpers
// =========================================================================

const BASE_EPOCH: i64 = 1_760_000_000;

/// Wall clock that advances with Tokio's (paused) clock.
#[derive(Clone)]
struct PausedClock {
    start: Instant,
}

impl PausedClock {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Clock for PausedClock {
    fn now_epoch(&self) -> i64 {
        BASE_EPOCH + self.start.elapsed().as_secs() as i64
    }
}

fn jwt(claims: serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.c2lnbmF0dXJl", header, payload)
}

fn token_expiring_at(exp: i64, financial: bool) -> String {
    jwt(json!({
        "sub": "nadia",
        "full_name": "Nadia Haddad",
        "can_view_financials": financial,
        "exp": exp,
        "type": "access"
    }))
}

/// Auth service that answers every request with the same grant after an
/// optional delay.
struct FakeAuth {
    grant: Option<LoginGrant>,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl FakeAuth {
    fn accepting(exp: i64, financial: bool) -> Self {
        Self {
            grant: Some(LoginGrant {
                access_token: token_expiring_at(exp, financial),
                user: UserIdentity {
                    username: "nadia".to_string(),
                    full_name: "Nadia Haddad".to_string(),
                    can_view_financials: financial,
                },
            }),
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn rejecting() -> Self {
        Self {
            grant: None,
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl AuthService for FakeAuth {
    async fn authenticate(&self, _username: &str, _password: &str) -> Result<LoginGrant, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        self.grant
            .clone()
            .ok_or(ApiError::Unauthorized)
    }
}

fn spawn(auth: FakeAuth, store: MemoryStore) -> SessionHandle {
    SessionManager::spawn_with_clock(auth, store, SessionTimeouts::default(), PausedClock::new())
}

fn drain(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

fn entered(events: &[SessionEvent], state: SessionState) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, SessionEvent::StateChanged { to, .. } if *to == state))
        .count()
}

// =========================================================================
// Lifecycle through the handle
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_reset_at_500_moves_warning_and_expiry() {
    let store = MemoryStore::new();
    let handle = spawn(FakeAuth::accepting(BASE_EPOCH + 86_400, true), store.clone());
    let mut events = handle.events();

    assert!(handle.login("nadia", "secret").await);
    sleep(Duration::from_secs(500)).await;
    assert!(handle.reset_activity().await);

    // Just before the warning deadline at t=1040
    sleep(Duration::from_millis(539_500)).await;
    assert_eq!(handle.snapshot().state, SessionState::Active);

    sleep(Duration::from_secs(1)).await;
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.state, SessionState::Warning);
    assert_eq!(snapshot.countdown, Some(60));

    // Just before the logout deadline at t=1100
    sleep(Duration::from_secs(59)).await;
    assert_eq!(handle.snapshot().state, SessionState::Warning);
    assert_eq!(handle.snapshot().countdown, Some(1));

    sleep(Duration::from_secs(1)).await;
    assert_eq!(handle.snapshot().state, SessionState::Anonymous);
    assert!(store.is_empty());

    let events = drain(&mut events);
    assert_eq!(entered(&events, SessionState::Warning), 1);
    assert_eq!(entered(&events, SessionState::Expired), 1);
    assert!(events.contains(&SessionEvent::LoggedOut {
        reason: LogoutReason::Inactivity
    }));
}

#[tokio::test(start_paused = true)]
async fn test_countdown_decreases_one_per_second() {
    let handle = spawn(FakeAuth::accepting(BASE_EPOCH + 86_400, false), MemoryStore::new());
    let mut events = handle.events();
    assert!(handle.login("nadia", "secret").await);

    sleep(Duration::from_secs(700)).await;

    let countdown: Vec<u64> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            SessionEvent::Countdown { remaining_secs } => Some(remaining_secs),
            _ => None,
        })
        .collect();
    assert_eq!(countdown.len(), 61);
    assert!(countdown.windows(2).all(|w| w[1] + 1 == w[0]));
    assert_eq!(countdown.first(), Some(&60));
    assert_eq!(countdown.last(), Some(&0));
}

#[tokio::test(start_paused = true)]
async fn test_keep_alive_dismisses_warning() {
    let handle = spawn(FakeAuth::accepting(BASE_EPOCH + 86_400, false), MemoryStore::new());
    assert!(handle.login("nadia", "secret").await);

    sleep(Duration::from_millis(570_500)).await;
    assert_eq!(handle.snapshot().state, SessionState::Warning);

    assert!(handle.keep_alive().await);
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.state, SessionState::Active);
    assert_eq!(snapshot.countdown, None);

    // The old logout deadline at t=600 passes harmlessly
    sleep(Duration::from_secs(60)).await;
    assert_eq!(handle.snapshot().state, SessionState::Active);

    // New warning deadline: 570.5 + 540
    sleep(Duration::from_secs(481)).await;
    assert_eq!(handle.snapshot().state, SessionState::Warning);
}

#[tokio::test(start_paused = true)]
async fn test_activity_keeps_session_alive() {
    let handle = spawn(FakeAuth::accepting(BASE_EPOCH + 86_400, false), MemoryStore::new());
    assert!(handle.login("nadia", "secret").await);

    for _ in 0..5 {
        sleep(Duration::from_secs(300)).await;
        handle.record_activity(ActivityKind::KeyPress);
    }
    sleep(Duration::from_millis(10)).await;

    assert_eq!(handle.snapshot().state, SessionState::Active);
}

#[tokio::test(start_paused = true)]
async fn test_activity_while_anonymous_is_ignored() {
    let store = MemoryStore::new();
    let handle = spawn(FakeAuth::rejecting(), store.clone());

    handle.record_activity(ActivityKind::PointerMove);
    assert!(!handle.reset_activity().await);
    assert!(!handle.keep_alive().await);

    assert!(!handle.is_authenticated());
    assert!(store.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_manual_logout_event_order() {
    let store = MemoryStore::new();
    let handle = spawn(FakeAuth::accepting(BASE_EPOCH + 86_400, false), store.clone());
    assert!(handle.login("nadia", "secret").await);
    let mut events = handle.events();

    assert!(handle.logout(LogoutReason::Manual).await.unwrap());
    assert!(!handle.logout(LogoutReason::Manual).await.unwrap());

    assert_eq!(
        drain(&mut events),
        vec![
            SessionEvent::StateChanged {
                from: SessionState::Active,
                to: SessionState::Expired
            },
            SessionEvent::LoggedOut {
                reason: LogoutReason::Manual
            },
            SessionEvent::StateChanged {
                from: SessionState::Expired,
                to: SessionState::Anonymous
            },
        ]
    );
    assert!(store.is_empty());
    assert_eq!(handle.current_user(), None);
}

// =========================================================================
// Login
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_login_reflects_financial_flag() {
    for financial in [true, false] {
        let handle = spawn(
            FakeAuth::accepting(BASE_EPOCH + 86_400, financial),
            MemoryStore::new(),
        );
        let user = handle.authenticate("nadia", "secret").await.unwrap();

        assert_eq!(user.display_name(), "Nadia Haddad");
        assert!(handle.is_authenticated());
        assert_eq!(handle.has_financial_access(), financial);
    }
}

#[tokio::test(start_paused = true)]
async fn test_failed_login_persists_nothing() {
    let store = MemoryStore::new();
    let handle = spawn(FakeAuth::rejecting(), store.clone());

    let err = handle.authenticate("nadia", "wrong").await.unwrap_err();

    assert_eq!(err.user_message(), "Invalid username or password");
    assert_eq!(handle.snapshot().state, SessionState::Anonymous);
    assert!(store.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_login_returning_expired_token_fails() {
    let store = MemoryStore::new();
    let handle = spawn(FakeAuth::accepting(BASE_EPOCH - 5, true), store.clone());

    assert!(matches!(
        handle.authenticate("nadia", "secret").await,
        Err(SessionError::TokenExpired)
    ));
    assert!(!handle.is_authenticated());
    assert!(store.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_state_stays_anonymous_while_login_is_pending() {
    let auth = FakeAuth::accepting(BASE_EPOCH + 86_400, false).with_delay(Duration::from_secs(5));
    let calls = Arc::clone(&auth.calls);
    let handle = spawn(auth, MemoryStore::new());

    let pending = {
        let handle = handle.clone();
        tokio::spawn(async move { handle.login("nadia", "secret").await })
    };

    sleep(Duration::from_secs(2)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!handle.is_authenticated());
    handle.record_activity(ActivityKind::Click);
    assert!(!handle.reset_activity().await);

    assert!(pending.await.unwrap());
    assert!(handle.is_authenticated());
}

// =========================================================================
// Token expiry
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_poll_logs_out_expired_token() {
    let store = MemoryStore::new();
    let handle = spawn(FakeAuth::accepting(BASE_EPOCH + 45, false), store.clone());
    let mut events = handle.events();
    assert!(handle.login("nadia", "secret").await);

    sleep(Duration::from_secs(31)).await;
    assert!(handle.is_authenticated());

    sleep(Duration::from_secs(30)).await;
    assert!(!handle.is_authenticated());
    assert!(store.is_empty());
    assert!(drain(&mut events).contains(&SessionEvent::LoggedOut {
        reason: LogoutReason::TokenExpired
    }));
}

#[tokio::test(start_paused = true)]
async fn test_corrupted_storage_is_treated_as_expired() {
    let store = MemoryStore::new();
    let handle = spawn(FakeAuth::accepting(BASE_EPOCH + 86_400, false), store.clone());
    assert!(handle.login("nadia", "secret").await);

    store
        .clone()
        .set(StorageKey::Token, "this-is-not-a-token")
        .unwrap();

    assert!(handle.check_expiry().await);
    assert!(!handle.is_authenticated());
    assert!(store.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unauthorized_response_ends_session() {
    let handle = spawn(FakeAuth::accepting(BASE_EPOCH + 86_400, false), MemoryStore::new());
    let mut events = handle.events();
    assert!(handle.login("nadia", "secret").await);

    assert!(handle.report_unauthorized().await.unwrap());

    assert!(!handle.is_authenticated());
    assert!(drain(&mut events).contains(&SessionEvent::LoggedOut {
        reason: LogoutReason::TokenExpired
    }));
}

// =========================================================================
// Rehydration
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_startup_with_expired_token_is_anonymous() {
    let store = MemoryStore::with_token(&token_expiring_at(BASE_EPOCH - 10, true));
    let handle = spawn(FakeAuth::rejecting(), store.clone());

    assert_eq!(handle.snapshot().state, SessionState::Anonymous);
    assert!(store.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_startup_with_valid_token_resumes() {
    let store = MemoryStore::with_token(&token_expiring_at(BASE_EPOCH + 3_600, true));
    let handle = spawn(FakeAuth::rejecting(), store);

    assert!(handle.is_authenticated());
    assert!(handle.has_financial_access());
    assert_eq!(handle.current_user().unwrap().username, "nadia");

    // Deadlines are armed from startup
    sleep(Duration::from_secs(601)).await;
    assert!(!handle.is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn test_startup_after_long_idle_is_anonymous() {
    let mut store = MemoryStore::with_token(&token_expiring_at(BASE_EPOCH + 3_600, true));
    store
        .set(StorageKey::LastActivity, &(BASE_EPOCH - 3_000).to_string())
        .unwrap();
    let handle = spawn(FakeAuth::rejecting(), store.clone());

    assert!(!handle.is_authenticated());
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_file_store_session_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let exp = SystemClock.now_epoch() + 3_600;

    let first = SessionManager::spawn(
        FakeAuth::accepting(exp, false),
        FileStore::new(dir.path().to_path_buf()),
        SessionTimeouts::default(),
    );
    assert!(first.login("nadia", "secret").await);
    first.shutdown().await;

    let second = SessionManager::spawn(
        FakeAuth::rejecting(),
        FileStore::new(dir.path().to_path_buf()),
        SessionTimeouts::default(),
    );
    assert!(second.is_authenticated());
    assert_eq!(second.current_user().unwrap().full_name, "Nadia Haddad");

    assert!(second.logout(LogoutReason::Manual).await.unwrap());
    assert!(!dir.path().join("session.json").exists());
}

// =========================================================================
// Shutdown and route guard
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_timers_but_keeps_storage() {
    let store = MemoryStore::new();
    let handle = spawn(FakeAuth::accepting(BASE_EPOCH + 86_400, false), store.clone());
    let mut events = handle.events();
    assert!(handle.login("nadia", "secret").await);
    drain(&mut events);

    handle.shutdown().await;
    handle.shutdown().await;
    sleep(Duration::from_secs(1_000)).await;

    assert!(!handle.is_running());
    assert!(drain(&mut events).is_empty());
    assert!(store.get(StorageKey::Token).unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_guard_follows_session() {
    let handle = spawn(FakeAuth::accepting(BASE_EPOCH + 86_400, false), MemoryStore::new());
    let guard = RouteGuard::new(handle.clone());

    assert_eq!(
        guard.decide(Route::Inventory),
        RouteDecision::RedirectToLogin {
            from: Route::Inventory
        }
    );

    assert!(handle.login("nadia", "secret").await);
    assert_eq!(guard.decide(Route::Inventory), RouteDecision::Render(Route::Inventory));
    assert_eq!(
        guard.decide(Route::Expenses),
        RouteDecision::Redirect(Route::Dashboard)
    );

    handle.logout(LogoutReason::Manual).await.unwrap();
    assert_eq!(guard.decide(Route::Login), RouteDecision::Render(Route::Login));
}

// =========================================================================
// End to end against an HTTP auth service
// =========================================================================

#[tokio::test]
async fn test_login_through_api_client() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    let token = token_expiring_at(SystemClock.now_epoch() + 3_600, true);
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": token,
            "token_type": "bearer",
            "user": {
                "username": "nadia",
                "full_name": "Nadia Haddad",
                "can_view_financials": true
            }
        })))
        .mount(&server)
        .await;

    let client = ApiClient::new(&format!("{}/api", server.uri())).unwrap();
    let store = MemoryStore::new();
    let handle = SessionManager::spawn(client, store.clone(), SessionTimeouts::default());

    assert!(handle.login("nadia", "secret").await);
    assert!(handle.has_financial_access());
    assert_eq!(store.get(StorageKey::Token).unwrap(), Some(token));
}
