use crate::application::focus_session::{ensure_length_minutes, TimerControl};
use crate::application::runtime::DefaultFocusRuntime;
use crate::application::sync_bridge::{BridgeStatus, ToggleOutcome};
use crate::domain::models::{FocusTimerColor, TimerSettings, TimerSnapshot};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::surface::SurfaceHost;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

pub struct AppState {
    runtime: DefaultFocusRuntime,
    logs_dir: PathBuf,
}

impl AppState {
    pub fn new(workspace_root: PathBuf, host: Arc<dyn SurfaceHost>) -> Result<Self, InfraError> {
        let (runtime, workspace) = DefaultFocusRuntime::from_workspace(&workspace_root, host)?;
        Ok(Self {
            runtime,
            logs_dir: workspace.logs_dir,
        })
    }

    pub fn runtime(&self) -> &DefaultFocusRuntime {
        &self.runtime
    }

    pub fn log_path(&self) -> PathBuf {
        self.logs_dir.join("commands.log")
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.runtime.diagnostics().info(command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.runtime.diagnostics().error(command, message);
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimerStateResponse {
    #[serde(flatten)]
    pub snapshot: TimerSnapshot,
    pub formatted_time: String,
    pub progress_percent: f64,
}

impl From<TimerSnapshot> for TimerStateResponse {
    fn from(snapshot: TimerSnapshot) -> Self {
        Self {
            formatted_time: snapshot.formatted_time(),
            progress_percent: snapshot.progress_percent(),
            snapshot,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TogglePipResponse {
    pub outcome: String,
    pub status: String,
}

pub fn start_session_impl(
    state: &AppState,
    task_id: Option<String>,
) -> Result<TimerStateResponse, InfraError> {
    state.runtime.service().start(task_id).map(TimerStateResponse::from)
}

pub fn toggle_pause_impl(state: &AppState) -> Result<TimerStateResponse, InfraError> {
    state.runtime.service().toggle_pause().map(TimerStateResponse::from)
}

pub fn reset_session_impl(state: &AppState) -> Result<TimerStateResponse, InfraError> {
    state.runtime.service().reset().map(TimerStateResponse::from)
}

/// Resolves only after the partial interval (if any) was sent and the timer reset.
pub async fn stop_and_log_session_impl(state: &AppState) -> Result<TimerStateResponse, InfraError> {
    state
        .runtime
        .service()
        .stop_and_log_session()
        .await
        .map(TimerStateResponse::from)
}

pub fn set_session_length_impl(state: &AppState, minutes: u32) -> Result<TimerStateResponse, InfraError> {
    state
        .runtime
        .service()
        .set_session_length(minutes)
        .map(TimerStateResponse::from)
}

pub fn set_break_length_impl(state: &AppState, minutes: u32) -> Result<TimerStateResponse, InfraError> {
    state
        .runtime
        .service()
        .set_break_length(minutes)
        .map(TimerStateResponse::from)
}

pub fn get_timer_state_impl(state: &AppState) -> Result<TimerStateResponse, InfraError> {
    state.runtime.service().snapshot().map(TimerStateResponse::from)
}

pub fn update_settings_impl(
    state: &AppState,
    session_length: Option<u32>,
    break_length: Option<u32>,
    focus_timer_color: Option<String>,
) -> Result<TimerSettings, InfraError> {
    let mut settings = state.runtime.settings().current();
    if let Some(minutes) = session_length {
        ensure_length_minutes(minutes, "session length")?;
        settings.session_length_minutes = minutes;
    }
    if let Some(minutes) = break_length {
        ensure_length_minutes(minutes, "break length")?;
        settings.break_length_minutes = minutes;
    }
    if let Some(color) = focus_timer_color {
        settings.focus_timer_color = parse_color(&color)?;
    }

    let saved = state.runtime.settings().update(settings)?;
    state.runtime.service().sync_time_to_settings()?;
    state.log_info(
        "update_settings",
        &format!(
            "session={} break={} color={}",
            saved.session_length_minutes,
            saved.break_length_minutes,
            saved.focus_timer_color.hex()
        ),
    );
    Ok(saved)
}

pub async fn toggle_pip_impl(state: &AppState) -> Result<TogglePipResponse, InfraError> {
    let bridge = state.runtime.bridge();
    let outcome = bridge.toggle().await?;
    Ok(TogglePipResponse {
        outcome: toggle_outcome_label(outcome).to_string(),
        status: bridge_status_label(bridge.status()).to_string(),
    })
}

fn parse_color(raw: &str) -> Result<FocusTimerColor, InfraError> {
    serde_json::from_value(serde_json::Value::String(raw.trim().to_ascii_lowercase()))
        .map_err(|_| InfraError::InvalidConfig(format!("unknown focus timer color: {raw}")))
}

fn toggle_outcome_label(outcome: ToggleOutcome) -> &'static str {
    match outcome {
        ToggleOutcome::VideoPipEntered => "video_pip_entered",
        ToggleOutcome::VideoPipExited => "video_pip_exited",
        ToggleOutcome::Opened => "opened",
        ToggleOutcome::Closed => "closed",
    }
}

fn bridge_status_label(status: BridgeStatus) -> &'static str {
    match status {
        BridgeStatus::Closed => "closed",
        BridgeStatus::Opening => "opening",
        BridgeStatus::Open => "open",
    }
}
