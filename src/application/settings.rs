use crate::domain::models::TimerSettings;
use crate::infrastructure::config::{read_timer_settings, save_timer_settings};
use crate::infrastructure::error::InfraError;
use std::path::{Path, PathBuf};
use tokio::sync::watch;

/// Source of configured durations and timer color. Every accepted update is
/// pushed to subscribers.
#[derive(Debug)]
pub struct SettingsProvider {
    config_dir: Option<PathBuf>,
    sender: watch::Sender<TimerSettings>,
}

impl SettingsProvider {
    pub fn load(config_dir: impl AsRef<Path>) -> Result<Self, InfraError> {
        let config_dir = config_dir.as_ref().to_path_buf();
        let settings = read_timer_settings(&config_dir)?;
        let (sender, _) = watch::channel(settings);
        Ok(Self {
            config_dir: Some(config_dir),
            sender,
        })
    }

    /// Provider that keeps settings only in memory.
    pub fn detached(settings: TimerSettings) -> Self {
        let (sender, _) = watch::channel(settings);
        Self {
            config_dir: None,
            sender,
        }
    }

    pub fn current(&self) -> TimerSettings {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TimerSettings> {
        self.sender.subscribe()
    }

    pub fn update(&self, settings: TimerSettings) -> Result<TimerSettings, InfraError> {
        settings.validate().map_err(InfraError::InvalidConfig)?;
        if let Some(config_dir) = self.config_dir.as_deref() {
            save_timer_settings(config_dir, &settings)?;
        }
        self.sender.send_replace(settings.clone());
        Ok(settings)
    }

    pub fn set_session_length(&self, minutes: u32) -> Result<TimerSettings, InfraError> {
        let mut settings = self.current();
        settings.session_length_minutes = minutes;
        self.update(settings)
    }

    pub fn set_break_length(&self, minutes: u32) -> Result<TimerSettings, InfraError> {
        let mut settings = self.current();
        settings.break_length_minutes = minutes;
        self.update(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::FocusTimerColor;
    use crate::infrastructure::config::ensure_default_configs;
    use std::fs;

    #[test]
    fn update_rejects_invalid_lengths_and_keeps_previous() {
        let provider = SettingsProvider::detached(TimerSettings::default());
        assert!(provider.set_session_length(0).is_err());
        assert_eq!(provider.current(), TimerSettings::default());
    }

    #[tokio::test]
    async fn subscribers_observe_updates() {
        let provider = SettingsProvider::detached(TimerSettings::default());
        let mut receiver = provider.subscribe();

        provider.set_session_length(30).expect("update");
        receiver.changed().await.expect("change notification");
        assert_eq!(receiver.borrow_and_update().session_length_minutes, 30);
    }

    #[test]
    fn updates_are_persisted_to_config() {
        let dir = std::env::temp_dir().join(format!(
            "studytrack-settings-tests-{}",
            std::process::id()
        ));
        fs::create_dir_all(&dir).expect("create dir");
        ensure_default_configs(&dir).expect("defaults");

        let provider = SettingsProvider::load(&dir).expect("load");
        provider
            .update(TimerSettings {
                session_length_minutes: 45,
                break_length_minutes: 15,
                focus_timer_color: FocusTimerColor::Red,
            })
            .expect("update");
        let reloaded = SettingsProvider::load(&dir).expect("reload").current();
        let _ = fs::remove_dir_all(&dir);

        assert_eq!(reloaded.session_length_minutes, 45);
        assert_eq!(reloaded.focus_timer_color, FocusTimerColor::Red);
    }
}
