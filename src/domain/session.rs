use crate::domain::clock::{SessionClock, TickOutcome};
use crate::domain::models::{
    minutes_rounded_up, FocusTimerColor, LoggedInterval, SessionCompletion, SessionType,
    TimerSettings, TimerSnapshot,
};

/// Focus/break alternation. Pure and synchronous; logging and notification
/// are left to the caller through the returned values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMachine {
    clock: SessionClock,
    session_type: SessionType,
    current_task_id: Option<String>,
    sessions_completed: u32,
    session_length_minutes: u32,
    break_length_minutes: u32,
    interval_seconds: u32,
}

impl SessionMachine {
    pub fn new(settings: &TimerSettings, sessions_completed: u32) -> Self {
        let interval_seconds = length_seconds(settings.session_length_minutes);
        Self {
            clock: SessionClock::idle(interval_seconds),
            session_type: SessionType::Focus,
            current_task_id: None,
            sessions_completed,
            session_length_minutes: settings.session_length_minutes,
            break_length_minutes: settings.break_length_minutes,
            interval_seconds,
        }
    }

    pub fn time_remaining_seconds(&self) -> u32 {
        self.clock.remaining_seconds()
    }

    pub fn session_type(&self) -> SessionType {
        self.session_type
    }

    pub fn is_active(&self) -> bool {
        self.clock.is_active()
    }

    pub fn current_task_id(&self) -> Option<&str> {
        self.current_task_id.as_deref()
    }

    pub fn sessions_completed(&self) -> u32 {
        self.sessions_completed
    }

    pub fn session_length_minutes(&self) -> u32 {
        self.session_length_minutes
    }

    pub fn break_length_minutes(&self) -> u32 {
        self.break_length_minutes
    }

    pub fn interval_seconds(&self) -> u32 {
        self.interval_seconds
    }

    /// Always begins a fresh focus interval, discarding whatever was running.
    pub fn start(&mut self, settings: &TimerSettings, task_id: Option<String>) {
        self.adopt_lengths(settings);
        self.session_type = SessionType::Focus;
        self.current_task_id = task_id;
        self.begin_interval(length_seconds(self.session_length_minutes), true);
    }

    pub fn toggle_pause(&mut self) -> bool {
        let is_active = !self.clock.is_active();
        self.clock.set_active(is_active);
        is_active
    }

    /// Returns to an idle focus interval at the current configured length.
    pub fn reset(&mut self, settings: &TimerSettings) {
        self.adopt_lengths(settings);
        self.session_type = SessionType::Focus;
        self.current_task_id = None;
        self.begin_interval(length_seconds(self.session_length_minutes), false);
    }

    /// `settings` is only read when the interval completes; the next
    /// interval takes its length from there.
    pub fn tick(&mut self, settings: &TimerSettings) -> Option<SessionCompletion> {
        match self.clock.tick() {
            TickOutcome::Stopped | TickOutcome::Advanced => None,
            TickOutcome::Elapsed => Some(self.complete_session(settings)),
        }
    }

    /// Credit owed for the running focus interval if it were stopped now.
    /// Breaks are never credited, even with a task attached.
    pub fn partial_interval(&self) -> Option<LoggedInterval> {
        if !self.clock.is_active() || self.session_type != SessionType::Focus {
            return None;
        }
        let task_id = self.current_task_id.clone()?;
        let elapsed_seconds = self
            .interval_seconds
            .saturating_sub(self.clock.remaining_seconds());
        let elapsed_minutes = minutes_rounded_up(elapsed_seconds);
        if elapsed_minutes == 0 {
            return None;
        }
        Some(LoggedInterval::focus(Some(task_id), elapsed_minutes))
    }

    pub fn set_session_length(&mut self, minutes: u32) {
        self.session_length_minutes = minutes;
        self.preview_pending_interval();
    }

    pub fn set_break_length(&mut self, minutes: u32) {
        self.break_length_minutes = minutes;
        self.preview_pending_interval();
    }

    /// Returns whether the cached lengths were refreshed; a running
    /// countdown is never touched.
    pub fn sync_to_settings(&mut self, settings: &TimerSettings) -> bool {
        if self.clock.is_active() {
            return false;
        }
        let lengths_changed = self.session_length_minutes != settings.session_length_minutes
            || self.break_length_minutes != settings.break_length_minutes;
        self.adopt_lengths(settings);
        if lengths_changed {
            self.preview_pending_interval();
        }
        true
    }

    pub fn snapshot(&self, color: FocusTimerColor) -> TimerSnapshot {
        TimerSnapshot {
            time_remaining_seconds: self.clock.remaining_seconds(),
            session_type: self.session_type,
            is_active: self.clock.is_active(),
            current_task_id: self.current_task_id.clone(),
            sessions_completed: self.sessions_completed,
            total_duration_seconds: self.interval_seconds,
            focus_timer_color: color,
        }
    }

    fn complete_session(&mut self, settings: &TimerSettings) -> SessionCompletion {
        let finished = self.session_type;
        let interval = (finished == SessionType::Focus).then(|| {
            LoggedInterval::focus(
                self.current_task_id.clone(),
                minutes_rounded_up(self.interval_seconds),
            )
        });
        if finished == SessionType::Focus {
            self.sessions_completed = self.sessions_completed.saturating_add(1);
        }

        self.adopt_lengths(settings);
        let next = finished.flipped();
        let next_duration_minutes = settings.length_for(next);
        self.session_type = next;
        self.begin_interval(length_seconds(next_duration_minutes), true);

        SessionCompletion {
            finished,
            next,
            next_duration_minutes,
            sessions_completed: self.sessions_completed,
            interval,
        }
    }

    fn preview_pending_interval(&mut self) {
        if self.clock.is_active() {
            return;
        }
        let minutes = match self.session_type {
            SessionType::Focus => self.session_length_minutes,
            SessionType::Break => self.break_length_minutes,
        };
        self.begin_interval(length_seconds(minutes), false);
    }

    fn adopt_lengths(&mut self, settings: &TimerSettings) {
        self.session_length_minutes = settings.session_length_minutes;
        self.break_length_minutes = settings.break_length_minutes;
    }

    fn begin_interval(&mut self, seconds: u32, is_active: bool) {
        self.interval_seconds = seconds;
        self.clock.load(seconds, is_active);
    }
}

fn length_seconds(minutes: u32) -> u32 {
    minutes.saturating_mul(60)
}
