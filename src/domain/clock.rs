#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Stopped,
    Advanced,
    Elapsed,
}

/// Countdown for the current interval. Holds no timer handle; callers drive it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionClock {
    remaining_seconds: u32,
    is_active: bool,
}

impl SessionClock {
    pub fn idle(remaining_seconds: u32) -> Self {
        Self {
            remaining_seconds,
            is_active: false,
        }
    }

    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn set_active(&mut self, is_active: bool) {
        self.is_active = is_active;
    }

    pub fn load(&mut self, remaining_seconds: u32, is_active: bool) {
        self.remaining_seconds = remaining_seconds;
        self.is_active = is_active;
    }

    /// Reports `Elapsed` on the step that reaches zero, and again on every
    /// step while an active counter sits at zero. The owner must move it off zero.
    pub fn tick(&mut self) -> TickOutcome {
        if !self.is_active {
            return TickOutcome::Stopped;
        }
        if self.remaining_seconds == 0 {
            return TickOutcome::Elapsed;
        }
        self.remaining_seconds -= 1;
        if self.remaining_seconds == 0 {
            TickOutcome::Elapsed
        } else {
            TickOutcome::Advanced
        }
    }
}
