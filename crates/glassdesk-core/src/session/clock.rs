use chrono::Utc;

/// Wall-clock source for comparing against token expiry (epoch seconds).
///
/// Deadlines use Tokio's monotonic `Instant`; only token expiry and the
/// persisted last-activity timestamp need wall-clock time.
pub trait Clock: Send + Sync + 'static {
    fn now_epoch(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch(&self) -> i64 {
        Utc::now().timestamp()
    }
}
