//! Application state for the glassdesk shell.
//!
//! `App` is the UI side of the session: it holds a `SessionHandle` and a
//! `RouteGuard`, mirrors the latest session snapshot, and turns session
//! events into navigation (a logout sends the user back to the login form,
//! a login returns them to the view they originally asked for).

use anyhow::Result;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use glassdesk_core::session::ActivityKind;
use glassdesk_core::{
    Config, LogoutReason, Route, RouteDecision, RouteGuard, SessionEvent, SessionHandle,
    SessionSnapshot, SessionState,
};

// ============================================================================
// Constants
// ============================================================================

/// Maximum length for username input.
const MAX_USERNAME_LENGTH: usize = 50;

/// Maximum length for password input.
/// 128 chars accommodates password managers and passphrases.
const MAX_PASSWORD_LENGTH: usize = 128;

/// Pre-fills the login form's username
pub const USERNAME_ENV: &str = "GLASSDESK_USERNAME";

/// Pre-fills the login form's password
pub const PASSWORD_ENV: &str = "GLASSDESK_PASSWORD";

// ============================================================================
// UI State Types
// ============================================================================

/// Overall application state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Normal,
    ShowingHelp,
    LoggingIn,
    ConfirmingQuit,
    Quitting,
}

/// Login form focus state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoginFocus {
    Username,
    Password,
    Button,
}

// ============================================================================
// Main Application Struct
// ============================================================================

pub struct App {
    pub config: Config,
    pub session: SessionHandle,
    guard: RouteGuard,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
    events_rx: broadcast::Receiver<SessionEvent>,

    /// Latest session snapshot, refreshed by `sync_session`
    pub snapshot: SessionSnapshot,

    pub state: AppState,
    pub route: Route,
    /// Where to go after the next successful login
    pub return_to: Option<Route>,

    // Login form
    pub login_username: String,
    pub login_password: String,
    pub login_focus: LoginFocus,
    pub login_error: Option<String>,

    pub status_message: Option<String>,
    /// Full length of the inactivity countdown, for the warning gauge
    pub countdown_total: u64,
}

impl App {
    pub fn new(config: Config, session: SessionHandle) -> Self {
        let login_username = std::env::var(USERNAME_ENV)
            .ok()
            .or_else(|| config.last_username.clone())
            .unwrap_or_default();
        let login_password = std::env::var(PASSWORD_ENV).unwrap_or_default();
        let countdown_total = config.session.clone().validated().countdown_secs;

        let mut app = Self {
            guard: RouteGuard::new(session.clone()),
            snapshot_rx: session.subscribe(),
            events_rx: session.events(),
            snapshot: session.snapshot(),
            session,
            config,
            state: AppState::Normal,
            route: Route::Dashboard,
            return_to: None,
            login_username,
            login_password,
            login_focus: LoginFocus::Username,
            login_error: None,
            status_message: None,
            countdown_total,
        };
        app.navigate(Route::Dashboard);
        app
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    /// Ask the route guard for `route` and apply its decision.
    pub fn navigate(&mut self, route: Route) {
        let decision = self.guard.decide(route);
        debug!(requested = %route, ?decision, "Navigation");
        if matches!(decision, RouteDecision::Redirect(_)) && route.requires_financial_access() {
            self.status_message = Some(format!("You do not have access to {}", route.title()));
        }
        self.apply_decision(decision);
    }

    fn apply_decision(&mut self, decision: RouteDecision) {
        match decision {
            RouteDecision::Render(route) => {
                self.route = route;
                if route == Route::Login {
                    self.start_login();
                } else if self.state == AppState::LoggingIn {
                    self.state = AppState::Normal;
                }
            }
            RouteDecision::RedirectToLogin { from } => {
                self.return_to = Some(from);
                self.route = Route::Login;
                self.start_login();
            }
            RouteDecision::Redirect(route) => {
                self.route = route;
                if self.state == AppState::LoggingIn {
                    self.state = AppState::Normal;
                }
            }
        }
    }

    /// Menu entries visible to the current user.
    pub fn navigation(&self) -> Vec<Route> {
        Route::navigation(self.snapshot.has_financial_access())
    }

    pub fn next_route(&mut self) {
        self.step_route(1);
    }

    pub fn prev_route(&mut self) {
        self.step_route(-1);
    }

    fn step_route(&mut self, delta: isize) {
        let routes = self.navigation();
        if routes.is_empty() {
            return;
        }
        let len = routes.len() as isize;
        let current = routes
            .iter()
            .position(|r| *r == self.route)
            .map(|i| i as isize)
            .unwrap_or(0);
        let next = (current + delta).rem_euclid(len) as usize;
        self.navigate(routes[next]);
    }

    /// Digit keys that jump to a navigation entry, e.g. "1-5".
    pub fn jump_keys(&self) -> String {
        match self.navigation().len() {
            0 | 1 => "1".to_string(),
            n => format!("1-{}", n),
        }
    }

    /// Jump to the n-th (1-based) navigation entry.
    pub fn select_route(&mut self, index: usize) {
        if let Some(route) = index.checked_sub(1).and_then(|i| self.navigation().get(i).copied()) {
            self.navigate(route);
        }
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Pull the latest snapshot and events from the session manager.
    pub fn sync_session(&mut self) {
        loop {
            match self.events_rx.try_recv() {
                Ok(SessionEvent::LoggedOut { reason }) => self.on_logged_out(reason),
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    debug!(skipped, "Session events lagged");
                }
                Err(_) => break,
            }
        }

        if self.snapshot_rx.has_changed().unwrap_or(false) {
            self.snapshot = self.snapshot_rx.borrow_and_update().clone();
            // Re-check the current view against the new session
            if self.route != Route::Login {
                self.navigate(self.route);
            }
        }
    }

    fn on_logged_out(&mut self, reason: LogoutReason) {
        info!(%reason, "Session ended");
        self.status_message = Some(
            match reason {
                LogoutReason::Manual => "You have been logged out",
                LogoutReason::Inactivity => "Logged out after a period of inactivity",
                LogoutReason::TokenExpired => "Your session expired. Please log in again.",
            }
            .to_string(),
        );
        self.login_password.clear();
    }

    pub fn is_authenticated(&self) -> bool {
        self.snapshot.is_authenticated()
    }

    pub fn is_warning(&self) -> bool {
        self.snapshot.state == SessionState::Warning
    }

    /// Name for the title bar
    pub fn user_display_name(&self) -> Option<&str> {
        self.snapshot.user.as_ref().map(|u| u.display_name())
    }

    pub fn record_activity(&self, kind: ActivityKind) {
        if self.is_authenticated() {
            self.session.record_activity(kind);
        }
    }

    /// Attempt login with the credentials from the login form.
    /// Returns true on success.
    pub async fn attempt_login(&mut self) -> bool {
        let username = self.login_username.trim().to_string();
        let password = self.login_password.clone();

        if username.is_empty() || password.is_empty() {
            self.login_error = Some("Username and password required".to_string());
            return false;
        }

        self.login_error = None;

        match self.session.authenticate(&username, &password).await {
            Ok(user) => {
                info!(username = %user.username, "Login successful");
                self.config.last_username = Some(username);
                self.login_password.clear();
                self.status_message = Some(format!("Welcome, {}", user.display_name()));

                self.sync_session();
                let target = self.return_to.take().unwrap_or(Route::Dashboard);
                self.state = AppState::Normal;
                self.navigate(target);
                true
            }
            Err(e) => {
                warn!(error = %e, "Login failed");
                self.login_error = Some(e.user_message());
                false
            }
        }
    }

    /// Persist the remembered username.
    pub fn save_config(&self) -> Result<()> {
        self.config.save()
    }

    pub async fn logout(&mut self) {
        if let Err(e) = self.session.logout(LogoutReason::Manual).await {
            warn!(error = %e, "Logout failed");
            self.status_message = Some(e.user_message());
        }
        self.sync_session();
    }

    pub async fn keep_alive(&mut self) {
        self.session.keep_alive().await;
        self.sync_session();
    }

    /// Start the login process (show login overlay)
    pub fn start_login(&mut self) {
        self.state = AppState::LoggingIn;
        self.login_focus = if self.login_username.is_empty() {
            LoginFocus::Username
        } else {
            LoginFocus::Password
        };
        self.login_error = None;
    }
}

// ============================================================================
// Input validation helpers (exported for use in input.rs)
// ============================================================================

/// Check if a character is valid for input (no control characters)
fn is_valid_input_char(c: char) -> bool {
    !c.is_control()
}

/// Check if a username character should be accepted
pub fn can_add_username_char(current_len: usize, c: char) -> bool {
    current_len < MAX_USERNAME_LENGTH && is_valid_input_char(c)
}

/// Check if a password character should be accepted
pub fn can_add_password_char(current_len: usize, c: char) -> bool {
    current_len < MAX_PASSWORD_LENGTH && is_valid_input_char(c)
}

// ============================================================================
// Tests
// ============================================================================
