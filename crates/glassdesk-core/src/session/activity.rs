use std::time::Duration;

use tokio::time::Instant;

/// User interactions that count as activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityKind {
    PointerDown,
    PointerMove,
    KeyPress,
    Scroll,
    TouchStart,
    Click,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 6] = [
        ActivityKind::PointerDown,
        ActivityKind::PointerMove,
        ActivityKind::KeyPress,
        ActivityKind::Scroll,
        ActivityKind::TouchStart,
        ActivityKind::Click,
    ];
}

/// Rate limit for activity events: one admitted event per window.
///
/// Events arriving inside the window are dropped, not deferred.
#[derive(Debug, Clone)]
pub struct ActivityGate {
    window: Duration,
    last_admitted: Option<Instant>,
}

impl ActivityGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_admitted: None,
        }
    }

    /// Returns true if the event at `now` should be processed.
    pub fn admit(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_admitted {
            if now.saturating_duration_since(last) < self.window {
                return false;
            }
        }
        self.last_admitted = Some(now);
        true
    }

    pub fn last_admitted(&self) -> Option<Instant> {
        self.last_admitted
    }

    pub fn reset(&mut self) {
        self.last_admitted = None;
    }
}
