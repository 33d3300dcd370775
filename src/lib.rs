pub mod application;
pub mod domain;
pub mod infrastructure;

#[cfg(feature = "desktop")]
pub mod desktop;

pub use application::commands::{AppState, TimerStateResponse, TogglePipResponse};
pub use application::focus_session::{FocusSessionService, SessionEvent, TimerControl};
pub use application::runtime::{DefaultFocusRuntime, DefaultFocusService, FocusRuntime, TickDriver};
pub use application::settings::SettingsProvider;
pub use application::sync_bridge::{BridgeStatus, SyncBridge, ToggleOutcome};
pub use domain::models::{
    FocusTimerColor, LoggedInterval, SessionCompletion, SessionType, TimerSettings, TimerSnapshot,
};
pub use infrastructure::error::InfraError;
