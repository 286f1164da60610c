//! Session lifecycle: who is logged in, and for how long.
//!
//! The pieces, bottom-up:
//!
//! - `timeouts`: the five timing parameters
//! - `activity`: activity kinds and the coalescing gate
//! - `timer`: one generation-stamped deadline per concern
//! - `lifecycle`: the deterministic state machine
//!   (`anonymous → active ⇄ warning → expired → anonymous`)
//! - `manager`: a Tokio actor that owns the state machine, sleeps until
//!   its next deadline, and publishes snapshots and events to handles
//! - `guard`: route access decisions made from a snapshot
//!
//! ```text
//! UI input ──activity──▶ SessionHandle ──mpsc──▶ SessionActor ──▶ SessionLifecycle
//!                             ▲                       │
//!     RouteGuard / UI shell ◀─┴──── watch / broadcast ┘
//! ```

pub mod activity;
pub mod clock;
pub mod guard;
pub mod lifecycle;
pub mod manager;
pub mod state;
pub mod timeouts;
pub mod timer;

pub use activity::{ActivityGate, ActivityKind};
pub use clock::{Clock, SystemClock};
pub use guard::{Route, RouteDecision, RouteGuard};
pub use lifecycle::SessionLifecycle;
pub use manager::{SessionHandle, SessionManager};
pub use state::{LogoutReason, SessionError, SessionEvent, SessionSnapshot, SessionState};
pub use timeouts::SessionTimeouts;
pub use timer::{Timer, TimerKind, TimerSet};
