//! Keyboard and mouse handling for the TUI.
//!
//! Key events drive application state; the main loop also reports every
//! key and mouse event to the session manager as user activity.

use anyhow::Result;
use crossterm::event::{Event, KeyCode, KeyEvent, MouseEventKind};
use tracing::warn;

use glassdesk_core::session::ActivityKind;
use glassdesk_core::Route;

use crate::app::{can_add_password_char, can_add_username_char, App, AppState, LoginFocus};

/// The activity a terminal event represents, if any.
pub fn activity_kind(event: &Event) -> Option<ActivityKind> {
    match event {
        Event::Key(_) | Event::Paste(_) => Some(ActivityKind::KeyPress),
        Event::Mouse(mouse) => match mouse.kind {
            MouseEventKind::Down(_) => Some(ActivityKind::PointerDown),
            MouseEventKind::Up(_) => Some(ActivityKind::Click),
            MouseEventKind::Moved | MouseEventKind::Drag(_) => Some(ActivityKind::PointerMove),
            MouseEventKind::ScrollUp
            | MouseEventKind::ScrollDown
            | MouseEventKind::ScrollLeft
            | MouseEventKind::ScrollRight => Some(ActivityKind::Scroll),
        },
        _ => None,
    }
}

/// Handle keyboard input. Returns true if the app should quit.
pub async fn handle_input(app: &mut App, key: KeyEvent) -> Result<bool> {
    // The inactivity warning sits above everything else
    if app.is_warning() {
        return handle_warning_input(app, key).await;
    }

    if matches!(app.state, AppState::LoggingIn) {
        return handle_login_input(app, key).await;
    }

    if matches!(app.state, AppState::ShowingHelp) {
        if matches!(key.code, KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('q')) {
            app.state = AppState::Normal;
        }
        return Ok(false);
    }

    if matches!(app.state, AppState::ConfirmingQuit) {
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => {
                app.state = AppState::Quitting;
                return Ok(true);
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                app.state = AppState::Normal;
            }
            _ => {}
        }
        return Ok(false);
    }

    match key.code {
        KeyCode::Char('q') => app.state = AppState::ConfirmingQuit,
        KeyCode::Char('?') => app.state = AppState::ShowingHelp,
        KeyCode::Char('L') => app.logout().await,
        KeyCode::Char('c') => app.navigate(Route::Catalog),
        KeyCode::Char('t') => app.navigate(Route::Timeline),
        KeyCode::Tab | KeyCode::Right => app.next_route(),
        KeyCode::BackTab | KeyCode::Left => app.prev_route(),
        KeyCode::Char(c) if c.is_ascii_digit() => {
            if let Some(n) = c.to_digit(10) {
                app.select_route(n as usize);
            }
        }
        KeyCode::Esc => app.status_message = None,
        _ => {}
    }

    Ok(false)
}

async fn handle_warning_input(app: &mut App, key: KeyEvent) -> Result<bool> {
    match key.code {
        KeyCode::Char('L') | KeyCode::Char('l') => app.logout().await,
        // Any other key is activity and already dismisses the warning;
        // Enter is the explicit "stay logged in"
        _ => app.keep_alive().await,
    }
    Ok(false)
}

async fn handle_login_input(app: &mut App, key: KeyEvent) -> Result<bool> {
    match key.code {
        KeyCode::Esc => {
            app.state = AppState::Quitting;
            return Ok(true);
        }
        KeyCode::Down | KeyCode::Tab => {
            app.login_focus = match app.login_focus {
                LoginFocus::Username => LoginFocus::Password,
                LoginFocus::Password => LoginFocus::Button,
                LoginFocus::Button => LoginFocus::Username,
            };
        }
        KeyCode::Up | KeyCode::BackTab => {
            app.login_focus = match app.login_focus {
                LoginFocus::Username => LoginFocus::Button,
                LoginFocus::Password => LoginFocus::Username,
                LoginFocus::Button => LoginFocus::Password,
            };
        }
        KeyCode::Enter => match app.login_focus {
            LoginFocus::Username => app.login_focus = LoginFocus::Password,
            LoginFocus::Password | LoginFocus::Button => {
                if app.attempt_login().await {
                    if let Err(e) = app.save_config() {
                        warn!(error = %e, "Failed to save config");
                    }
                }
            }
        },
        KeyCode::Backspace => match app.login_focus {
            LoginFocus::Username => {
                app.login_username.pop();
            }
            LoginFocus::Password => {
                app.login_password.pop();
            }
            LoginFocus::Button => {}
        },
        KeyCode::Char(c) => match app.login_focus {
            LoginFocus::Username => {
                if can_add_username_char(app.login_username.chars().count(), c) {
                    app.login_username.push(c);
                }
            }
            LoginFocus::Password => {
                if can_add_password_char(app.login_password.chars().count(), c) {
                    app.login_password.push(c);
                }
            }
            LoginFocus::Button => {}
        },
        _ => {}
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyModifiers, MouseButton, MouseEvent};

    fn mouse(kind: MouseEventKind) -> Event {
        Event::Mouse(MouseEvent {
            kind,
            column: 0,
            row: 0,
            modifiers: KeyModifiers::NONE,
        })
    }

    #[test]
    fn test_activity_kind_mapping() {
        let key = Event::Key(KeyEvent::new(KeyCode::Char('a'), KeyModifiers::NONE));
        assert_eq!(activity_kind(&key), Some(ActivityKind::KeyPress));
        assert_eq!(
            activity_kind(&mouse(MouseEventKind::Down(MouseButton::Left))),
            Some(ActivityKind::PointerDown)
        );
        assert_eq!(
            activity_kind(&mouse(MouseEventKind::Up(MouseButton::Left))),
            Some(ActivityKind::Click)
        );
        assert_eq!(
            activity_kind(&mouse(MouseEventKind::Moved)),
            Some(ActivityKind::PointerMove)
        );
        assert_eq!(
            activity_kind(&mouse(MouseEventKind::ScrollDown)),
            Some(ActivityKind::Scroll)
        );
        assert_eq!(activity_kind(&Event::Resize(80, 24)), None);
        assert_eq!(activity_kind(&Event::FocusGained), None);
    }
}
