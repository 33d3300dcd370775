use crate::domain::models::{SessionType, TimerSnapshot};
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(u64);

impl SurfaceId {
    pub fn next() -> Self {
        Self(NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimerUpdatePayload {
    pub time_remaining: u32,
    pub total_duration: u32,
    pub is_active: bool,
    pub focus_timer_color: String,
    pub session_type: SessionType,
}

impl From<&TimerSnapshot> for TimerUpdatePayload {
    fn from(snapshot: &TimerSnapshot) -> Self {
        Self {
            time_remaining: snapshot.time_remaining_seconds,
            total_duration: snapshot.total_duration_seconds,
            is_active: snapshot.is_active,
            focus_timer_color: snapshot.focus_timer_color.hex().to_string(),
            session_type: snapshot.session_type,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum OutboundMessage {
    #[serde(rename = "TIMER_UPDATE")]
    TimerUpdate(TimerUpdatePayload),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum InboundMessage {
    #[serde(rename = "TIMER_TOGGLE_PAUSE")]
    TogglePause,
}

impl InboundMessage {
    /// Unknown or malformed messages yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

/// Instructions travelling from the main process to a detached surface.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceFrame {
    Document(String),
    CloseDocument,
    Message(OutboundMessage),
    Close,
}

/// Events raised by a detached surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    Message(String),
    PageHide,
}

/// Main-process side of a detached surface. The inbound half can only ever
/// carry events from the surface it was created with.
#[derive(Debug)]
pub struct SurfaceChannel {
    pub id: SurfaceId,
    pub outbound: UnboundedSender<SurfaceFrame>,
    pub inbound: UnboundedReceiver<SurfaceEvent>,
}

/// Surface side of the same link, held by the host that renders it.
#[derive(Debug)]
pub struct SurfaceEndpoint {
    pub id: SurfaceId,
    pub frames: UnboundedReceiver<SurfaceFrame>,
    pub events: UnboundedSender<SurfaceEvent>,
}

pub fn surface_pair() -> (SurfaceChannel, SurfaceEndpoint) {
    let id = SurfaceId::next();
    let (frame_tx, frame_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    (
        SurfaceChannel {
            id,
            outbound: frame_tx,
            inbound: event_rx,
        },
        SurfaceEndpoint {
            id,
            frames: frame_rx,
            events: event_tx,
        },
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoPipOutcome {
    Entered,
    Exited,
    Unsupported,
}

#[async_trait]
pub trait SurfaceHost: Send + Sync {
    /// Toggles the canvas-backed video picture-in-picture.
    async fn toggle_video_pip(&self) -> Result<VideoPipOutcome, InfraError>;

    fn supports_floating_window(&self) -> bool;

    async fn open_floating_window(&self, width: u32, height: u32) -> Result<SurfaceChannel, InfraError>;

    fn draw_video_frame(&self, _update: &TimerUpdatePayload) {}
}

/// Host without any detached rendering capability.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessSurfaceHost;

#[async_trait]
impl SurfaceHost for HeadlessSurfaceHost {
    async fn toggle_video_pip(&self) -> Result<VideoPipOutcome, InfraError> {
        Ok(VideoPipOutcome::Unsupported)
    }

    fn supports_floating_window(&self) -> bool {
        false
    }

    async fn open_floating_window(&self, _width: u32, _height: u32) -> Result<SurfaceChannel, InfraError> {
        Err(InfraError::CapabilityUnavailable(
            "floating timer windows are not supported by this host".to_string(),
        ))
    }
}
