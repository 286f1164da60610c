use tokio::time::Instant;

/// The four things the session waits for. Declaration order breaks ties
/// between deadlines due at the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimerKind {
    Warning,
    Countdown,
    Logout,
    ExpiryPoll,
}

impl TimerKind {
    pub const ALL: [TimerKind; 4] = [
        TimerKind::Warning,
        TimerKind::Countdown,
        TimerKind::Logout,
        TimerKind::ExpiryPoll,
    ];

    fn slot(self) -> usize {
        match self {
            TimerKind::Warning => 0,
            TimerKind::Countdown => 1,
            TimerKind::Logout => 2,
            TimerKind::ExpiryPoll => 3,
        }
    }
}

/// An armed deadline. The generation identifies this particular arming;
/// re-arming or cancelling the slot makes older copies stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    pub kind: TimerKind,
    pub due: Instant,
    pub generation: u64,
}

/// At most one armed deadline per `TimerKind`.
#[derive(Debug, Default)]
pub struct TimerSet {
    slots: [Option<Timer>; 4],
    generation: u64,
}

impl TimerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `kind` for `due`, replacing whatever was armed before.
    pub fn arm(&mut self, kind: TimerKind, due: Instant) -> Timer {
        self.generation += 1;
        let timer = Timer {
            kind,
            due,
            generation: self.generation,
        };
        self.slots[kind.slot()] = Some(timer);
        timer
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        self.slots[kind.slot()] = None;
    }

    pub fn cancel_all(&mut self) {
        self.slots = [None; 4];
    }

    pub fn get(&self, kind: TimerKind) -> Option<Timer> {
        self.slots[kind.slot()]
    }

    pub fn due(&self, kind: TimerKind) -> Option<Instant> {
        self.get(kind).map(|t| t.due)
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.slots[kind.slot()].is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// The earliest armed deadline.
    pub fn next(&self) -> Option<Timer> {
        self.slots
            .iter()
            .flatten()
            .min_by_key(|t| (t.due, t.kind))
            .copied()
    }

    /// Disarm `timer` if it is still the current arming of its slot.
    /// Returns false for a stale timer, which the caller must ignore.
    pub fn take(&mut self, timer: &Timer) -> bool {
        let slot = &mut self.slots[timer.kind.slot()];
        match slot {
            Some(current) if current.generation == timer.generation => {
                *slot = None;
                true
            }
            _ => false,
        }
    }
}
