use serde::{Deserialize, Serialize};

pub const DEFAULT_SESSION_LENGTH_MINUTES: u32 = 25;
pub const DEFAULT_BREAK_LENGTH_MINUTES: u32 = 5;
/// Longest interval a length setting may ask for: one day.
pub const MAX_LENGTH_MINUTES: u32 = 24 * 60;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    #[default]
    Focus,
    Break,
}

impl SessionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Focus => "focus",
            Self::Break => "break",
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            Self::Focus => Self::Break,
            Self::Break => Self::Focus,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FocusTimerColor {
    #[default]
    Blue,
    Green,
    Orange,
    Red,
}

impl FocusTimerColor {
    /// Paint color used by timer surfaces for the progress ring.
    pub fn hex(self) -> &'static str {
        match self {
            Self::Blue => "#3b82f6",
            Self::Green => "#22c55e",
            Self::Orange => "#f97316",
            Self::Red => "#ef4444",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimerSettings {
    #[serde(rename = "sessionLength")]
    pub session_length_minutes: u32,
    #[serde(rename = "breakLength")]
    pub break_length_minutes: u32,
    #[serde(rename = "focusTimerColor", default)]
    pub focus_timer_color: FocusTimerColor,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            session_length_minutes: DEFAULT_SESSION_LENGTH_MINUTES,
            break_length_minutes: DEFAULT_BREAK_LENGTH_MINUTES,
            focus_timer_color: FocusTimerColor::Blue,
        }
    }
}

impl TimerSettings {
    pub fn validate(&self) -> Result<(), String> {
        validate_length_minutes(self.session_length_minutes, "settings.session_length")?;
        validate_length_minutes(self.break_length_minutes, "settings.break_length")?;
        Ok(())
    }

    pub fn length_for(&self, session_type: SessionType) -> u32 {
        match session_type {
            SessionType::Focus => self.session_length_minutes,
            SessionType::Break => self.break_length_minutes,
        }
    }
}

/// Request body recorded by the remote focus-session log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggedInterval {
    #[serde(rename = "taskId", default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(rename = "duration")]
    pub duration_minutes: u32,
    #[serde(rename = "sessionType")]
    pub session_type: SessionType,
}

impl LoggedInterval {
    pub fn focus(task_id: Option<String>, duration_minutes: u32) -> Self {
        Self {
            task_id,
            duration_minutes,
            session_type: SessionType::Focus,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_positive_minutes(self.duration_minutes, "interval.duration")?;
        if let Some(task_id) = self.task_id.as_deref() {
            validate_non_empty(task_id, "interval.task_id")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub time_remaining_seconds: u32,
    pub session_type: SessionType,
    pub is_active: bool,
    pub current_task_id: Option<String>,
    pub sessions_completed: u32,
    pub total_duration_seconds: u32,
    pub focus_timer_color: FocusTimerColor,
}

impl TimerSnapshot {
    pub fn formatted_time(&self) -> String {
        format_mm_ss(self.time_remaining_seconds)
    }

    pub fn progress_percent(&self) -> f64 {
        if self.total_duration_seconds == 0 {
            return 0.0;
        }
        let remaining = f64::from(self.time_remaining_seconds.min(self.total_duration_seconds));
        100.0 * (1.0 - remaining / f64::from(self.total_duration_seconds))
    }
}

/// Signal raised when an interval runs out and the next one has been started.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionCompletion {
    pub finished: SessionType,
    pub next: SessionType,
    pub next_duration_minutes: u32,
    pub sessions_completed: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<LoggedInterval>,
}

impl SessionCompletion {
    pub fn prompt(&self) -> String {
        match self.finished {
            SessionType::Focus => format!(
                "Focus session completed! Start a {}-minute break?",
                self.next_duration_minutes
            ),
            SessionType::Break => format!(
                "Break is over! Start a {}-minute focus session?",
                self.next_duration_minutes
            ),
        }
    }
}

pub fn format_mm_ss(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Whole minutes, counting any started minute as a full one.
pub fn minutes_rounded_up(seconds: u32) -> u32 {
    seconds.div_ceil(60)
}

/// Lengths are whole minutes in `1..=MAX_LENGTH_MINUTES`, so `minutes * 60`
/// always fits.
pub fn validate_length_minutes(value: u32, field_name: &str) -> Result<(), String> {
    validate_positive_minutes(value, field_name)?;
    if value > MAX_LENGTH_MINUTES {
        return Err(format!("{field_name} must be at most {MAX_LENGTH_MINUTES} minutes"));
    }
    Ok(())
}

fn validate_positive_minutes(value: u32, field_name: &str) -> Result<(), String> {
    if value == 0 {
        return Err(format!("{field_name} must be > 0"));
    }
    Ok(())
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}
