use crate::application::bootstrap::{bootstrap_workspace, BootstrapResult};
use crate::application::focus_session::FocusSessionService;
use crate::application::settings::SettingsProvider;
use crate::application::sync_bridge::SyncBridge;
use crate::infrastructure::config::{read_api_base, read_document_base};
use crate::infrastructure::diagnostics::{DiagnosticsSink, JsonLineDiagnostics};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::pip_document::ReqwestPipDocumentSource;
use crate::infrastructure::session_counter_repository::{
    SessionCounterRepository, SqliteSessionCounterRepository,
};
use crate::infrastructure::session_log_client::{ReqwestSessionLogClient, SessionLogClient};
use crate::infrastructure::surface::SurfaceHost;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

const TICK_PERIOD: Duration = Duration::from_secs(1);

pub type DefaultFocusService = FocusSessionService<ReqwestSessionLogClient, SqliteSessionCounterRepository>;
pub type DefaultFocusRuntime = FocusRuntime<ReqwestSessionLogClient, SqliteSessionCounterRepository>;

/// Owns the one-second driver. At most one driver runs per instance and it
/// is aborted when stopped or dropped.
pub struct TickDriver {
    diagnostics: Arc<dyn DiagnosticsSink>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TickDriver {
    pub fn new(diagnostics: Arc<dyn DiagnosticsSink>) -> Self {
        Self {
            diagnostics,
            handle: Mutex::new(None),
        }
    }

    pub fn start<L, C>(&self, service: Arc<FocusSessionService<L, C>>) -> Result<(), InfraError>
    where
        L: SessionLogClient + 'static,
        C: SessionCounterRepository + 'static,
    {
        let mut handle = self.lock_handle()?;
        if handle.as_ref().is_some_and(|running| !running.is_finished()) {
            return Err(InfraError::InvalidConfig("tick driver already running".to_string()));
        }

        let diagnostics = Arc::clone(&self.diagnostics);
        *handle = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match service.tick() {
                    Ok(Some(completion)) => {
                        let service = Arc::clone(&service);
                        tokio::spawn(async move { service.record_completion(&completion).await });
                    }
                    Ok(None) => {}
                    Err(error) => diagnostics.error("tick", &error.to_string()),
                }
            }
        }));
        Ok(())
    }

    pub fn stop(&self) {
        if let Ok(mut handle) = self.handle.lock() {
            if let Some(running) = handle.take() {
                running.abort();
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .map(|handle| handle.as_ref().is_some_and(|running| !running.is_finished()))
            .unwrap_or(false)
    }

    fn lock_handle(&self) -> Result<MutexGuard<'_, Option<JoinHandle<()>>>, InfraError> {
        self.handle
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("tick driver lock poisoned: {error}")))
    }
}

impl Drop for TickDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Application root: owns the session service, the bridge, and every
/// background task that feeds them.
pub struct FocusRuntime<L, C>
where
    L: SessionLogClient,
    C: SessionCounterRepository,
{
    settings: Arc<SettingsProvider>,
    service: Arc<FocusSessionService<L, C>>,
    bridge: SyncBridge,
    diagnostics: Arc<dyn DiagnosticsSink>,
    driver: TickDriver,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl<L, C> FocusRuntime<L, C>
where
    L: SessionLogClient + 'static,
    C: SessionCounterRepository + 'static,
{
    pub fn new(
        settings: Arc<SettingsProvider>,
        service: Arc<FocusSessionService<L, C>>,
        bridge: SyncBridge,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> Self {
        Self {
            settings,
            driver: TickDriver::new(Arc::clone(&diagnostics)),
            service,
            bridge,
            diagnostics,
            background: Mutex::new(Vec::new()),
        }
    }

    pub fn settings(&self) -> &Arc<SettingsProvider> {
        &self.settings
    }

    pub fn service(&self) -> &Arc<FocusSessionService<L, C>> {
        &self.service
    }

    pub fn bridge(&self) -> &SyncBridge {
        &self.bridge
    }

    pub fn diagnostics(&self) -> &Arc<dyn DiagnosticsSink> {
        &self.diagnostics
    }

    pub fn is_running(&self) -> bool {
        self.driver.is_running()
    }

    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<(), InfraError> {
        let mut background = self
            .background
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("runtime lock poisoned: {error}")))?;
        self.driver.start(Arc::clone(&self.service))?;

        let service = Arc::clone(&self.service);
        let diagnostics = Arc::clone(&self.diagnostics);
        let mut settings = self.settings.subscribe();
        background.push(tokio::spawn(async move {
            while settings.changed().await.is_ok() {
                settings.borrow_and_update();
                if let Err(error) = service.sync_time_to_settings() {
                    diagnostics.error("sync_time_to_settings", &error.to_string());
                }
            }
        }));
        background.push(self.bridge.spawn_mirror(self.service.subscribe()));

        self.diagnostics.info("runtime", "focus runtime started");
        Ok(())
    }

    pub fn shutdown(&self) {
        self.driver.stop();
        if let Ok(mut background) = self.background.lock() {
            for task in background.drain(..) {
                task.abort();
            }
        }
        self.bridge.close();
        self.diagnostics.info("runtime", "focus runtime stopped");
    }
}

impl DefaultFocusRuntime {
    pub fn from_workspace(
        workspace_root: &Path,
        host: Arc<dyn SurfaceHost>,
    ) -> Result<(Self, BootstrapResult), InfraError> {
        let workspace = bootstrap_workspace(workspace_root)?;
        let diagnostics: Arc<dyn DiagnosticsSink> =
            Arc::new(JsonLineDiagnostics::new(&workspace.logs_dir));

        let settings = Arc::new(SettingsProvider::load(&workspace.config_dir)?);
        let log_client = Arc::new(ReqwestSessionLogClient::new(&read_api_base(
            &workspace.config_dir,
        )?)?);
        let documents = Arc::new(ReqwestPipDocumentSource::new(&read_document_base(
            &workspace.config_dir,
        )?)?);
        let counter = Arc::new(SqliteSessionCounterRepository::new(&workspace.database_path));

        let service = Arc::new(FocusSessionService::new(
            Arc::clone(&settings),
            log_client,
            counter,
            Arc::clone(&diagnostics),
        )?);
        let bridge = SyncBridge::new(host, documents, service.clone(), Arc::clone(&diagnostics));

        Ok((Self::new(settings, service, bridge, diagnostics), workspace))
    }
}

impl<L, C> Drop for FocusRuntime<L, C>
where
    L: SessionLogClient,
    C: SessionCounterRepository,
{
    fn drop(&mut self) {
        if let Ok(mut background) = self.background.lock() {
            for task in background.drain(..) {
                task.abort();
            }
        }
    }
}
