use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Gauge, Paragraph, Wrap},
    Frame,
};

use glassdesk_core::Route;

use crate::app::{App, AppState, LoginFocus};

use super::styles;

pub fn render(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Title bar
            Constraint::Length(3), // Navigation
            Constraint::Min(6),    // Main content
            Constraint::Length(2), // Status bar
        ])
        .split(frame.area());

    render_title_bar(frame, app, chunks[0]);
    render_navigation(frame, app, chunks[1]);
    render_main_content(frame, app, chunks[2]);
    render_status_bar(frame, app, chunks[3]);

    // Overlays, lowest first
    if matches!(app.state, AppState::ShowingHelp) {
        render_help_overlay(frame, app);
    }

    if matches!(app.state, AppState::LoggingIn) {
        render_login_overlay(frame, app);
    }

    if matches!(app.state, AppState::ConfirmingQuit) {
        render_quit_overlay(frame);
    }

    if let Some(remaining) = app.snapshot.countdown.filter(|_| app.is_warning()) {
        render_warning_overlay(frame, app, remaining);
    }
}

fn render_title_bar(frame: &mut Frame, app: &App, area: Rect) {
    let title = "  JC Glasshouse";
    let right = match app.user_display_name() {
        Some(name) => format!("{}  [L] Logout  [?] Help", name),
        None => "[?] Help".to_string(),
    };

    let title_line = Line::from(vec![
        Span::styled(title, styles::title_style()),
        Span::raw(" ".repeat(
            (area.width as usize).saturating_sub(title.len() + right.chars().count() + 2),
        )),
        Span::styled(right, styles::muted_style()),
    ]);

    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(styles::muted_style());

    frame.render_widget(Paragraph::new(title_line).block(block), area);
}

fn render_navigation(frame: &mut Frame, app: &App, area: Rect) {
    let mut spans = vec![Span::raw(" ")];
    if app.is_authenticated() {
        for (i, route) in app.navigation().iter().enumerate() {
            if i > 0 {
                spans.push(Span::styled(" | ", styles::muted_style()));
            }
            let label = format!("[{}] {}", i + 1, route.title());
            if *route == app.route {
                spans.push(Span::styled(label, styles::tab_style(true)));
            } else {
                spans.push(Span::styled(label, styles::muted_style()));
            }
        }
    }

    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(styles::muted_style());

    frame.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
}

fn render_main_content(frame: &mut Frame, app: &App, area: Rect) {
    let mut lines = vec![
        Line::from(Span::styled(app.route.title(), styles::title_style())),
        Line::from(Span::styled(app.route.path(), styles::muted_style())),
        Line::from(""),
    ];

    match app.route {
        Route::Login => {}
        Route::Dashboard => lines.extend(session_summary(app)),
        route => lines.push(Line::from(Span::styled(
            view_description(route),
            styles::list_item_style(),
        ))),
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::muted_style());
    let paragraph = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, area);
}

fn session_summary(app: &App) -> Vec<Line<'static>> {
    let access = if app.snapshot.has_financial_access() {
        Span::styled("full (financial views enabled)", styles::success_style())
    } else {
        Span::styled("standard", styles::list_item_style())
    };
    let timeout_minutes = app.config.session.inactivity_timeout_secs / 60;

    vec![
        Line::from(vec![
            Span::styled("Signed in as  ", styles::muted_style()),
            Span::styled(
                app.user_display_name().unwrap_or("-").to_string(),
                styles::list_item_style(),
            ),
        ]),
        Line::from(vec![
            Span::styled("Access        ", styles::muted_style()),
            access,
        ]),
        Line::from(vec![
            Span::styled("Session       ", styles::muted_style()),
            Span::styled(
                format!(
                    "{} (logs out after {} min without activity)",
                    app.snapshot.state, timeout_minutes
                ),
                styles::list_item_style(),
            ),
        ]),
    ]
}

fn view_description(route: Route) -> &'static str {
    match route {
        Route::Inventory => "Glass stock on hand by product, thickness and size.",
        Route::Customers => "Customer accounts and contact details.",
        Route::StockIntake => "Record incoming stock deliveries.",
        Route::Sales => "Sales orders and invoices.",
        Route::Expenses => "Business expenses by category.",
        Route::Reports => "Revenue, margin and expense reports.",
        Route::Catalog => "Product catalog and pricing.",
        Route::Timeline => "Recent activity across the business.",
        Route::Login | Route::Dashboard => "",
    }
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let hints = if app.is_authenticated() {
        format!(
            " Tab/←→ navigate  {} jump  c catalog  t timeline  L logout  ? help  q quit",
            app.jump_keys()
        )
    } else {
        " Enter submit  Tab next field  Esc quit".to_string()
    };

    let mut spans = vec![Span::styled(hints, styles::muted_style())];
    if let Some(ref message) = app.status_message {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(message.clone(), styles::highlight_style()));
    }

    let paragraph = Paragraph::new(Line::from(spans)).style(styles::status_bar_style());
    frame.render_widget(paragraph, area);
}

fn render_help_overlay(frame: &mut Frame, app: &App) {
    let area = centered_rect_fixed(46, 16, frame.area());
    frame.render_widget(Clear, area);

    let entry = |key: &str, desc: &'static str| {
        Line::from(vec![
            Span::styled(format!("  {:<15}", key), styles::help_key_style()),
            Span::styled(desc, styles::help_desc_style()),
        ])
    };

    let lines = vec![
        Line::from(""),
        entry("Tab / →", "Next view"),
        entry("Shift-Tab / ←", "Previous view"),
        entry(&app.jump_keys(), "Jump to view"),
        entry("c", "Catalog"),
        entry("t", "Timeline"),
        entry("L", "Log out"),
        entry("?", "Toggle help"),
        entry("q", "Quit"),
        Line::from(""),
        Line::from(Span::styled(
            "  Idle sessions are logged out automatically.",
            styles::muted_style(),
        )),
        Line::from(Span::styled(
            "  Any key or mouse action counts as activity.",
            styles::muted_style(),
        )),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::title_style())
        .title(" Help ");
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_login_overlay(frame: &mut Frame, app: &App) {
    let height = if app.login_error.is_some() { 11 } else { 9 };
    let area = centered_rect_fixed(46, height, frame.area());
    frame.render_widget(Clear, area);

    let mut lines = vec![
        Line::from(Span::styled(
            "           JC Glasshouse Dashboard",
            styles::title_style(),
        )),
        Line::from(""),
    ];

    let username_focused = app.login_focus == LoginFocus::Username;
    let username_style = if username_focused {
        styles::selected_style()
    } else {
        styles::list_item_style()
    };
    let cursor = if username_focused { "▌" } else { "" };
    lines.push(Line::from(vec![
        Span::raw("      "),
        Span::styled("Username: [", styles::muted_style()),
        Span::styled(
            format!("{:<16}{}", app.login_username, cursor),
            username_style,
        ),
        Span::styled("]", styles::muted_style()),
    ]));

    let password_focused = app.login_focus == LoginFocus::Password;
    let password_style = if password_focused {
        styles::selected_style()
    } else {
        styles::list_item_style()
    };
    let password_masked = "*".repeat(app.login_password.chars().count().min(16));
    let cursor = if password_focused { "▌" } else { "" };
    lines.push(Line::from(vec![
        Span::raw("      "),
        Span::styled("Password: [", styles::muted_style()),
        Span::styled(format!("{:<16}{}", password_masked, cursor), password_style),
        Span::styled("]", styles::muted_style()),
    ]));

    let button_focused = app.login_focus == LoginFocus::Button;
    let button_style = if button_focused {
        styles::selected_style()
    } else {
        styles::list_item_style()
    };
    let label = if button_focused {
        " ▶ Login ◀ "
    } else {
        "   Login   "
    };
    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        Span::raw("            ["),
        Span::styled(label, button_style),
        Span::raw("]"),
    ]));

    if let Some(ref error) = app.login_error {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!(" {}", error),
            styles::error_style(),
        )));
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::title_style())
        .title(" Login ");
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_quit_overlay(frame: &mut Frame) {
    let area = centered_rect_fixed(46, 5, frame.area());
    frame.render_widget(Clear, area);

    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            "       Quit glassdesk? [y/n]",
            styles::list_item_style(),
        )),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::title_style());
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_warning_overlay(frame: &mut Frame, app: &App, remaining: u64) {
    let area = centered_rect_fixed(52, 9, frame.area());
    frame.render_widget(Clear, area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::countdown_style(remaining))
        .title(" Session timeout ");
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(inner);

    let message = Paragraph::new(vec![
        Line::from(""),
        Line::from(vec![
            Span::raw(" You will be logged out in "),
            Span::styled(
                format!("{} seconds", remaining),
                styles::countdown_style(remaining),
            ),
            Span::raw(" due to inactivity."),
        ]),
    ]);
    frame.render_widget(message, rows[0]);

    let gauge = Gauge::default()
        .gauge_style(styles::countdown_style(remaining))
        .ratio(countdown_ratio(remaining, app.countdown_total))
        .label(format!("{}s", remaining));
    frame.render_widget(gauge, rows[1]);

    let actions = Line::from(vec![
        Span::raw("   "),
        Span::styled("[Enter]", styles::help_key_style()),
        Span::styled(" Stay logged in     ", styles::help_desc_style()),
        Span::styled("[L]", styles::help_key_style()),
        Span::styled(" Logout now", styles::help_desc_style()),
    ]);
    frame.render_widget(Paragraph::new(actions), rows[3]);
}

/// Fraction of the countdown still left, in `0.0..=1.0`.
fn countdown_ratio(remaining: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (remaining as f64 / total as f64).clamp(0.0, 1.0)
}

/// Create a centered rectangle with fixed dimensions
fn centered_rect_fixed(width: u16, height: u16, r: Rect) -> Rect {
    let x = r.x + (r.width.saturating_sub(width)) / 2;
    let y = r.y + (r.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width.min(r.width), height.min(r.height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_countdown_ratio() {
        assert_eq!(countdown_ratio(60, 60), 1.0);
        assert_eq!(countdown_ratio(30, 60), 0.5);
        assert_eq!(countdown_ratio(0, 60), 0.0);
        assert_eq!(countdown_ratio(5, 0), 0.0);
        assert_eq!(countdown_ratio(90, 60), 1.0);
    }

    #[test]
    fn test_centered_rect_fits_small_terminal() {
        let r = centered_rect_fixed(52, 9, Rect::new(0, 0, 40, 6));
        assert_eq!(r, Rect::new(0, 0, 40, 6));
    }
}
