use crate::application::commands::{
    get_timer_state_impl, reset_session_impl, set_break_length_impl, set_session_length_impl,
    start_session_impl, stop_and_log_session_impl, toggle_pause_impl, toggle_pip_impl,
    update_settings_impl, AppState, TimerStateResponse, TogglePipResponse,
};
use crate::application::focus_session::SessionEvent;
use crate::domain::models::{SessionCompletion, TimerSettings};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::surface::{
    surface_pair, SurfaceChannel, SurfaceEvent, SurfaceFrame, SurfaceHost, VideoPipOutcome,
};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tauri::{AppHandle, Emitter, Manager, RunEvent, WebviewUrl, WebviewWindow, WebviewWindowBuilder, WindowEvent};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc::UnboundedSender;

const SESSION_COMPLETED_EVENT: &str = "focus://session-completed";
const PIP_HOST_PAGE: &str = "pip-host.html";

// Lets the injected page keep talking to `window.opener` as it would in a browser.
const OPENER_SHIM: &str = r#"window.opener = { postMessage: function (message) {
  window.__TAURI__.core.invoke('pip_message', { raw: JSON.stringify(message) });
} };"#;

/// Inbound event senders keyed by window label. The label of the invoking
/// window is the only identity a message carries.
#[derive(Default)]
struct PipRegistry {
    surfaces: Mutex<HashMap<String, UnboundedSender<SurfaceEvent>>>,
}

impl PipRegistry {
    fn insert(&self, label: String, events: UnboundedSender<SurfaceEvent>) {
        if let Ok(mut surfaces) = self.surfaces.lock() {
            surfaces.insert(label, events);
        }
    }

    fn remove(&self, label: &str) {
        if let Ok(mut surfaces) = self.surfaces.lock() {
            surfaces.remove(label);
        }
    }

    fn forward(&self, label: &str, event: SurfaceEvent) -> bool {
        self.surfaces
            .lock()
            .ok()
            .and_then(|surfaces| surfaces.get(label).map(|events| events.send(event).is_ok()))
            .unwrap_or(false)
    }
}

/// Always-on-top webview window standing in for the browser's document
/// picture-in-picture.
struct TauriSurfaceHost {
    app: AppHandle,
}

#[async_trait]
impl SurfaceHost for TauriSurfaceHost {
    async fn toggle_video_pip(&self) -> Result<VideoPipOutcome, InfraError> {
        Ok(VideoPipOutcome::Unsupported)
    }

    fn supports_floating_window(&self) -> bool {
        true
    }

    async fn open_floating_window(&self, width: u32, height: u32) -> Result<SurfaceChannel, InfraError> {
        let (channel, mut endpoint) = surface_pair();
        let label = format!("pip-{}", endpoint.id.value());
        let window = WebviewWindowBuilder::new(&self.app, &label, WebviewUrl::App(PIP_HOST_PAGE.into()))
            .title("Focus Timer")
            .inner_size(f64::from(width), f64::from(height))
            .resizable(false)
            .always_on_top(true)
            .build()
            .map_err(|error| InfraError::Surface(format!("failed to open timer window: {error}")))?;

        let registry = self.app.state::<PipRegistry>();
        registry.insert(label.clone(), endpoint.events.clone());
        let events = endpoint.events.clone();
        window.on_window_event(move |event| {
            if let WindowEvent::Destroyed = event {
                let _ = events.send(SurfaceEvent::PageHide);
            }
        });

        let app = self.app.clone();
        tauri::async_runtime::spawn(async move {
            while let Some(frame) = endpoint.frames.recv().await {
                if !render_frame(&window, frame) {
                    break;
                }
            }
            let _ = window.close();
            app.state::<PipRegistry>().remove(&label);
        });
        Ok(channel)
    }
}

/// Returns `false` once the window should go away.
fn render_frame(window: &WebviewWindow, frame: SurfaceFrame) -> bool {
    let script = match frame {
        SurfaceFrame::Document(html) => match serde_json::to_string(&html) {
            Ok(literal) => format!("{OPENER_SHIM}\ndocument.open();\ndocument.write({literal});"),
            Err(_) => return false,
        },
        SurfaceFrame::CloseDocument => format!("document.close();\n{OPENER_SHIM}"),
        SurfaceFrame::Message(message) => match serde_json::to_string(&message) {
            Ok(json) => format!("window.postMessage({json}, '*');"),
            Err(_) => return true,
        },
        SurfaceFrame::Close => return false,
    };
    window.eval(&script).is_ok()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletionNotice {
    prompt: String,
    completion: SessionCompletion,
}

#[tauri::command]
fn start_session(state: tauri::State<'_, AppState>, task_id: Option<String>) -> Result<TimerStateResponse, String> {
    start_session_impl(state.inner(), task_id).map_err(|error| state.command_error("start_session", &error))
}

#[tauri::command]
fn toggle_pause(state: tauri::State<'_, AppState>) -> Result<TimerStateResponse, String> {
    toggle_pause_impl(state.inner()).map_err(|error| state.command_error("toggle_pause", &error))
}

#[tauri::command]
fn reset_session(state: tauri::State<'_, AppState>) -> Result<TimerStateResponse, String> {
    reset_session_impl(state.inner()).map_err(|error| state.command_error("reset_session", &error))
}

#[tauri::command]
async fn stop_and_log_session(state: tauri::State<'_, AppState>) -> Result<TimerStateResponse, String> {
    stop_and_log_session_impl(state.inner())
        .await
        .map_err(|error| state.command_error("stop_and_log_session", &error))
}

#[tauri::command]
fn set_session_length(state: tauri::State<'_, AppState>, minutes: u32) -> Result<TimerStateResponse, String> {
    set_session_length_impl(state.inner(), minutes)
        .map_err(|error| state.command_error("set_session_length", &error))
}

#[tauri::command]
fn set_break_length(state: tauri::State<'_, AppState>, minutes: u32) -> Result<TimerStateResponse, String> {
    set_break_length_impl(state.inner(), minutes).map_err(|error| state.command_error("set_break_length", &error))
}

#[tauri::command]
fn get_timer_state(state: tauri::State<'_, AppState>) -> Result<TimerStateResponse, String> {
    get_timer_state_impl(state.inner()).map_err(|error| state.command_error("get_timer_state", &error))
}

#[tauri::command]
fn update_settings(
    state: tauri::State<'_, AppState>,
    session_length: Option<u32>,
    break_length: Option<u32>,
    focus_timer_color: Option<String>,
) -> Result<TimerSettings, String> {
    update_settings_impl(state.inner(), session_length, break_length, focus_timer_color)
        .map_err(|error| state.command_error("update_settings", &error))
}

#[tauri::command]
async fn toggle_pip(state: tauri::State<'_, AppState>) -> Result<TogglePipResponse, String> {
    toggle_pip_impl(state.inner())
        .await
        .map_err(|error| state.command_error("toggle_pip", &error))
}

#[tauri::command]
fn pip_message(window: WebviewWindow, registry: tauri::State<'_, PipRegistry>, raw: String) -> bool {
    registry.forward(window.label(), SurfaceEvent::Message(raw))
}

fn forward_completions(app: &AppHandle, state: &AppState) {
    let mut events = state.runtime().service().subscribe_events();
    let app = app.clone();
    tauri::async_runtime::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SessionEvent::Completed(completion)) => {
                    let notice = CompletionNotice {
                        prompt: completion.prompt(),
                        completion,
                    };
                    let _ = app.emit(SESSION_COMPLETED_EVENT, notice);
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });
}

pub fn run() {
    let app = tauri::Builder::default()
        .manage(PipRegistry::default())
        .setup(|app| {
            let workspace_root = std::env::current_dir()?;
            let host = Arc::new(TauriSurfaceHost {
                app: app.handle().clone(),
            });
            let state = AppState::new(workspace_root, host)?;
            tauri::async_runtime::block_on(async { state.runtime().start() })?;
            forward_completions(app.handle(), &state);
            app.manage(state);
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            start_session,
            toggle_pause,
            reset_session,
            stop_and_log_session,
            set_session_length,
            set_break_length,
            get_timer_state,
            update_settings,
            toggle_pip,
            pip_message
        ])
        .build(tauri::generate_context!())
        .expect("failed to build tauri app");

    app.run(|handle, event| {
        if let RunEvent::Exit = event {
            if let Some(state) = handle.try_state::<AppState>() {
                state.runtime().shutdown();
            }
        }
    });
}
