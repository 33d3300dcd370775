use crate::domain::models::{
    validate_length_minutes, LoggedInterval, SessionCompletion, SessionType, TimerSnapshot,
};
use crate::domain::session::SessionMachine;
use crate::application::settings::SettingsProvider;
use crate::infrastructure::diagnostics::DiagnosticsSink;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::session_counter_repository::SessionCounterRepository;
use crate::infrastructure::session_log_client::SessionLogClient;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, watch};

const EVENT_CAPACITY: usize = 16;

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Completed(SessionCompletion),
}

/// Control surface shared by every timer view.
pub trait TimerControl: Send + Sync {
    fn toggle_pause(&self) -> Result<TimerSnapshot, InfraError>;
}

/// Single owner of the focus timer state. Transitions are committed under a
/// lock that is never held across a network call.
pub struct FocusSessionService<L, C>
where
    L: SessionLogClient,
    C: SessionCounterRepository,
{
    machine: Mutex<SessionMachine>,
    settings: Arc<SettingsProvider>,
    log_client: Arc<L>,
    counter_repository: Arc<C>,
    diagnostics: Arc<dyn DiagnosticsSink>,
    snapshots: watch::Sender<TimerSnapshot>,
    events: broadcast::Sender<SessionEvent>,
    now_provider: NowProvider,
}

impl<L, C> FocusSessionService<L, C>
where
    L: SessionLogClient,
    C: SessionCounterRepository,
{
    pub fn new(
        settings: Arc<SettingsProvider>,
        log_client: Arc<L>,
        counter_repository: Arc<C>,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> Result<Self, InfraError> {
        let sessions_completed = counter_repository.load()?.unwrap_or(0);
        let current = settings.current();
        let machine = SessionMachine::new(&current, sessions_completed);
        let (snapshots, _) = watch::channel(machine.snapshot(current.focus_timer_color));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            machine: Mutex::new(machine),
            settings,
            log_client,
            counter_repository,
            diagnostics,
            snapshots,
            events,
            now_provider: Arc::new(Utc::now),
        })
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<TimerSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> Result<TimerSnapshot, InfraError> {
        let machine = self.lock_machine()?;
        Ok(machine.snapshot(self.settings.current().focus_timer_color))
    }

    pub fn start(&self, task_id: Option<String>) -> Result<TimerSnapshot, InfraError> {
        let task_id = normalize_task_id(task_id);
        let settings = self.settings.current();
        let mut machine = self.lock_machine()?;
        machine.start(&settings, task_id.clone());
        let snapshot = self.publish(&machine);
        drop(machine);

        self.diagnostics.info(
            "start_session",
            &format!(
                "started focus interval minutes={} task_id={}",
                settings.session_length_minutes,
                task_id.as_deref().unwrap_or("none")
            ),
        );
        Ok(snapshot)
    }

    /// Returns to idle focus at the lengths the provider holds now, including
    /// changes that arrived while an interval was running.
    pub fn reset(&self) -> Result<TimerSnapshot, InfraError> {
        let settings = self.settings.current();
        let mut machine = self.lock_machine()?;
        machine.reset(&settings);
        let snapshot = self.publish(&machine);
        drop(machine);

        self.diagnostics.info("reset_session", "reset focus timer");
        Ok(snapshot)
    }

    /// Commits one clock step. The log call for a finished focus interval is
    /// left to [`Self::record_completion`].
    pub fn tick(&self) -> Result<Option<SessionCompletion>, InfraError> {
        let settings = self.settings.current();
        let mut machine = self.lock_machine()?;
        let completion = machine.tick(&settings);
        self.publish(&machine);
        drop(machine);

        if let Some(completion) = completion.as_ref() {
            if completion.finished == SessionType::Focus {
                self.persist_sessions_completed(completion.sessions_completed);
            }
            self.diagnostics.info(
                "complete_session",
                &format!(
                    "finished={} next={} sessions_completed={}",
                    completion.finished.as_str(),
                    completion.next.as_str(),
                    completion.sessions_completed
                ),
            );
            let _ = self.events.send(SessionEvent::Completed(completion.clone()));
        }
        Ok(completion)
    }

    /// Best effort: a failed log is recorded to diagnostics and dropped.
    pub async fn record_completion(&self, completion: &SessionCompletion) {
        if let Some(interval) = completion.interval.as_ref() {
            self.log_interval("complete_session", interval).await;
        }
    }

    pub async fn advance(&self) -> Result<Option<SessionCompletion>, InfraError> {
        let completion = self.tick()?;
        if let Some(completion) = completion.as_ref() {
            self.record_completion(completion).await;
        }
        Ok(completion)
    }

    /// Credits the elapsed part of a tracked focus interval, then resets.
    /// Returns only after the log request has finished or failed.
    pub async fn stop_and_log_session(&self) -> Result<TimerSnapshot, InfraError> {
        let pending = self.lock_machine()?.partial_interval();
        if let Some(interval) = pending.as_ref() {
            self.log_interval("stop_and_log_session", interval).await;
        }
        self.reset()
    }

    /// Persists through the settings provider, then previews the new length
    /// if the timer is not running.
    pub fn set_session_length(&self, minutes: u32) -> Result<TimerSnapshot, InfraError> {
        ensure_length_minutes(minutes, "session length")?;
        self.settings.set_session_length(minutes)?;
        let mut machine = self.lock_machine()?;
        machine.set_session_length(minutes);
        let snapshot = self.publish(&machine);
        drop(machine);

        self.diagnostics
            .info("set_session_length", &format!("session length set to {minutes} minutes"));
        Ok(snapshot)
    }

    pub fn set_break_length(&self, minutes: u32) -> Result<TimerSnapshot, InfraError> {
        ensure_length_minutes(minutes, "break length")?;
        self.settings.set_break_length(minutes)?;
        let mut machine = self.lock_machine()?;
        machine.set_break_length(minutes);
        let snapshot = self.publish(&machine);
        drop(machine);

        self.diagnostics
            .info("set_break_length", &format!("break length set to {minutes} minutes"));
        Ok(snapshot)
    }

    /// Pulls the provider's lengths while idle. Always republishes so a color
    /// change reaches every surface even mid-interval.
    pub fn sync_time_to_settings(&self) -> Result<bool, InfraError> {
        let settings = self.settings.current();
        let mut machine = self.lock_machine()?;
        let applied = machine.sync_to_settings(&settings);
        self.publish(&machine);
        Ok(applied)
    }

    fn publish(&self, machine: &SessionMachine) -> TimerSnapshot {
        let snapshot = machine.snapshot(self.settings.current().focus_timer_color);
        self.snapshots.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot.clone();
            true
        });
        snapshot
    }

    async fn log_interval(&self, scope: &str, interval: &LoggedInterval) {
        match self.log_client.log_interval(interval).await {
            Ok(()) => self.diagnostics.info(
                scope,
                &format!(
                    "logged {} minutes task_id={}",
                    interval.duration_minutes,
                    interval.task_id.as_deref().unwrap_or("none")
                ),
            ),
            Err(error) => self
                .diagnostics
                .error(scope, &format!("failed to save focus session: {error}")),
        }
    }

    fn persist_sessions_completed(&self, sessions_completed: u32) {
        if let Err(error) = self
            .counter_repository
            .save(sessions_completed, (self.now_provider)())
        {
            self.diagnostics.error(
                "persist_sessions_completed",
                &format!("failed to persist sessions_completed={sessions_completed}: {error}"),
            );
        }
    }

    fn lock_machine(&self) -> Result<MutexGuard<'_, SessionMachine>, InfraError> {
        self.machine
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("session lock poisoned: {error}")))
    }
}

impl<L, C> TimerControl for FocusSessionService<L, C>
where
    L: SessionLogClient,
    C: SessionCounterRepository,
{
    fn toggle_pause(&self) -> Result<TimerSnapshot, InfraError> {
        let mut machine = self.lock_machine()?;
        let is_active = machine.toggle_pause();
        let snapshot = self.publish(&machine);
        drop(machine);

        self.diagnostics.info(
            "toggle_pause",
            if is_active { "resumed focus timer" } else { "paused focus timer" },
        );
        Ok(snapshot)
    }
}

fn normalize_task_id(task_id: Option<String>) -> Option<String> {
    task_id
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

pub(crate) fn ensure_length_minutes(minutes: u32, field: &str) -> Result<(), InfraError> {
    validate_length_minutes(minutes, field).map_err(InfraError::InvalidConfig)
}
