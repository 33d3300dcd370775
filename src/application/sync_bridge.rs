use crate::application::focus_session::TimerControl;
use crate::domain::models::TimerSnapshot;
use crate::infrastructure::diagnostics::DiagnosticsSink;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::pip_document::PipDocumentSource;
use crate::infrastructure::surface::{
    InboundMessage, OutboundMessage, SurfaceChannel, SurfaceEvent, SurfaceFrame, SurfaceHost,
    SurfaceId, TimerUpdatePayload, VideoPipOutcome,
};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const PIP_WINDOW_WIDTH: u32 = 280;
pub const PIP_WINDOW_HEIGHT: u32 = 280;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeStatus {
    Closed,
    Opening,
    Open,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    VideoPipEntered,
    VideoPipExited,
    Opened,
    Closed,
}

struct OpenSurface {
    id: SurfaceId,
    outbound: UnboundedSender<SurfaceFrame>,
    listener: JoinHandle<()>,
}

impl OpenSurface {
    fn close(self) {
        let _ = self.outbound.send(SurfaceFrame::Close);
        self.listener.abort();
    }
}

enum BridgeState {
    Closed,
    Opening,
    Open(OpenSurface),
}

struct BridgeInner {
    host: Arc<dyn SurfaceHost>,
    documents: Arc<dyn PipDocumentSource>,
    timer: Arc<dyn TimerControl>,
    diagnostics: Arc<dyn DiagnosticsSink>,
    state: Mutex<BridgeState>,
    latest: Mutex<Option<TimerSnapshot>>,
}

/// Mirrors timer snapshots into at most one detached surface and relays its
/// pause requests back. The surface never owns timer state.
#[derive(Clone)]
pub struct SyncBridge {
    inner: Arc<BridgeInner>,
}

impl SyncBridge {
    pub fn new(
        host: Arc<dyn SurfaceHost>,
        documents: Arc<dyn PipDocumentSource>,
        timer: Arc<dyn TimerControl>,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                host,
                documents,
                timer,
                diagnostics,
                state: Mutex::new(BridgeState::Closed),
                latest: Mutex::new(None),
            }),
        }
    }

    pub fn status(&self) -> BridgeStatus {
        match self.inner.lock_state().as_deref() {
            Ok(BridgeState::Opening) => BridgeStatus::Opening,
            Ok(BridgeState::Open(_)) => BridgeStatus::Open,
            Ok(BridgeState::Closed) | Err(_) => BridgeStatus::Closed,
        }
    }

    pub async fn toggle(&self) -> Result<ToggleOutcome, InfraError> {
        match self.inner.host.toggle_video_pip().await {
            Ok(VideoPipOutcome::Entered) => {
                if let Some(snapshot) = self.inner.latest_snapshot() {
                    self.inner
                        .host
                        .draw_video_frame(&TimerUpdatePayload::from(&snapshot));
                }
                return Ok(ToggleOutcome::VideoPipEntered);
            }
            Ok(VideoPipOutcome::Exited) => return Ok(ToggleOutcome::VideoPipExited),
            Ok(VideoPipOutcome::Unsupported) => {}
            Err(error) => self.inner.diagnostics.error(
                "open_detached_surface",
                &format!("video picture-in-picture failed, using floating window: {error}"),
            ),
        }

        if !self.inner.host.supports_floating_window() {
            return Err(InfraError::CapabilityUnavailable(
                "picture-in-picture is not supported by this host".to_string(),
            ));
        }

        {
            let mut state = self.inner.lock_state()?;
            match std::mem::replace(&mut *state, BridgeState::Opening) {
                BridgeState::Open(surface) => {
                    *state = BridgeState::Closed;
                    drop(state);
                    surface.close();
                    self.inner
                        .diagnostics
                        .info("open_detached_surface", "closed detached surface");
                    return Ok(ToggleOutcome::Closed);
                }
                BridgeState::Opening => {
                    return Err(InfraError::Surface(
                        "detached surface is already opening".to_string(),
                    ));
                }
                BridgeState::Closed => {}
            }
        }

        match self.open_surface().await {
            Ok(()) => Ok(ToggleOutcome::Opened),
            Err(error) => {
                if let Ok(mut state) = self.inner.lock_state() {
                    if matches!(*state, BridgeState::Opening) {
                        *state = BridgeState::Closed;
                    }
                }
                self.inner.diagnostics.error(
                    "open_detached_surface",
                    &format!("failed to open detached surface: {error}"),
                );
                Err(error)
            }
        }
    }

    /// Closes whatever surface is tracked, including one still opening.
    pub fn close(&self) {
        let Ok(mut state) = self.inner.lock_state() else {
            return;
        };
        if let BridgeState::Open(surface) = std::mem::replace(&mut *state, BridgeState::Closed) {
            drop(state);
            surface.close();
        }
    }

    /// Posts the snapshot to the open surface, if any. The snapshot is kept so
    /// a surface opened later starts from it.
    pub fn publish(&self, snapshot: &TimerSnapshot) {
        if let Ok(mut latest) = self.inner.latest.lock() {
            *latest = Some(snapshot.clone());
        }
        let payload = TimerUpdatePayload::from(snapshot);
        self.inner.host.draw_video_frame(&payload);
        self.inner.post(OutboundMessage::TimerUpdate(payload));
    }

    pub fn handle_inbound(&self, source: SurfaceId, raw: &str) -> bool {
        self.inner.handle_inbound(source, raw)
    }

    pub fn spawn_mirror(&self, mut snapshots: watch::Receiver<TimerSnapshot>) -> JoinHandle<()> {
        let bridge = self.clone();
        tokio::spawn(async move {
            let current = snapshots.borrow_and_update().clone();
            bridge.publish(&current);
            while snapshots.changed().await.is_ok() {
                let snapshot = snapshots.borrow_and_update().clone();
                bridge.publish(&snapshot);
            }
        })
    }

    async fn open_surface(&self) -> Result<(), InfraError> {
        let SurfaceChannel {
            id,
            outbound,
            inbound,
        } = self
            .inner
            .host
            .open_floating_window(PIP_WINDOW_WIDTH, PIP_WINDOW_HEIGHT)
            .await?;

        let document = match self.inner.documents.fetch_document().await {
            Ok(document) => document,
            Err(error) => {
                let _ = outbound.send(SurfaceFrame::Close);
                return Err(error);
            }
        };
        for frame in [SurfaceFrame::Document(document), SurfaceFrame::CloseDocument] {
            outbound.send(frame).map_err(|_| {
                InfraError::Surface("detached surface closed before the document was written".to_string())
            })?;
        }

        {
            let mut state = self.inner.lock_state()?;
            if !matches!(*state, BridgeState::Opening) {
                let _ = outbound.send(SurfaceFrame::Close);
                return Err(InfraError::Surface(
                    "detached surface was closed while opening".to_string(),
                ));
            }
            let listener = tokio::spawn(listen(Arc::clone(&self.inner), id, inbound));
            *state = BridgeState::Open(OpenSurface {
                id,
                outbound,
                listener,
            });
        }

        self.inner.diagnostics.info(
            "open_detached_surface",
            &format!("opened detached surface id={}", id.value()),
        );
        if let Some(snapshot) = self.inner.latest_snapshot() {
            self.publish(&snapshot);
        }
        Ok(())
    }
}

impl BridgeInner {
    fn lock_state(&self) -> Result<MutexGuard<'_, BridgeState>, InfraError> {
        self.state
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("bridge lock poisoned: {error}")))
    }

    fn latest_snapshot(&self) -> Option<TimerSnapshot> {
        self.latest.lock().ok().and_then(|latest| latest.clone())
    }

    fn is_tracked(&self, source: SurfaceId) -> bool {
        matches!(
            self.lock_state().as_deref(),
            Ok(BridgeState::Open(surface)) if surface.id == source
        )
    }

    fn post(&self, message: OutboundMessage) {
        let Ok(mut state) = self.lock_state() else {
            return;
        };
        let BridgeState::Open(surface) = &*state else {
            return;
        };
        if surface.outbound.send(SurfaceFrame::Message(message)).is_ok() {
            return;
        }
        if let BridgeState::Open(surface) = std::mem::replace(&mut *state, BridgeState::Closed) {
            drop(state);
            surface.listener.abort();
            self.diagnostics
                .info("open_detached_surface", "detached surface went away");
        }
    }

    fn handle_inbound(&self, source: SurfaceId, raw: &str) -> bool {
        if !self.is_tracked(source) {
            return false;
        }
        match InboundMessage::parse(raw) {
            Some(InboundMessage::TogglePause) => match self.timer.toggle_pause() {
                Ok(_) => true,
                Err(error) => {
                    self.diagnostics
                        .error("toggle_pause", &format!("detached toggle failed: {error}"));
                    false
                }
            },
            None => false,
        }
    }

    fn forget(&self, source: SurfaceId) {
        let Ok(mut state) = self.lock_state() else {
            return;
        };
        if matches!(&*state, BridgeState::Open(surface) if surface.id == source) {
            *state = BridgeState::Closed;
            self.diagnostics.info(
                "open_detached_surface",
                &format!("detached surface id={} hidden", source.value()),
            );
        }
    }
}

async fn listen(inner: Arc<BridgeInner>, id: SurfaceId, mut inbound: UnboundedReceiver<SurfaceEvent>) {
    while let Some(event) = inbound.recv().await {
        match event {
            SurfaceEvent::Message(raw) => {
                inner.handle_inbound(id, &raw);
            }
            SurfaceEvent::PageHide => break,
        }
    }
    inner.forget(id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{FocusTimerColor, TimerSettings};
    use crate::domain::session::SessionMachine;
    use crate::infrastructure::diagnostics::MemoryDiagnostics;
    use crate::infrastructure::pip_document::StaticPipDocument;
    use crate::infrastructure::surface::{surface_pair, SurfaceEndpoint};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    const PIP_HTML: &str = "<html><body>timer</body></html>";

    struct FakeHost {
        video: VideoPipOutcome,
        floating: bool,
        opened: AtomicUsize,
        endpoints: Mutex<Vec<SurfaceEndpoint>>,
    }

    impl FakeHost {
        fn floating_only() -> Self {
            Self::new(VideoPipOutcome::Unsupported, true)
        }

        fn new(video: VideoPipOutcome, floating: bool) -> Self {
            Self {
                video,
                floating,
                opened: AtomicUsize::new(0),
                endpoints: Mutex::new(Vec::new()),
            }
        }

        fn take_endpoint(&self) -> SurfaceEndpoint {
            self.endpoints
                .lock()
                .expect("endpoints mutex poisoned")
                .pop()
                .expect("an opened surface")
        }
    }

    #[async_trait]
    impl SurfaceHost for FakeHost {
        async fn toggle_video_pip(&self) -> Result<VideoPipOutcome, InfraError> {
            Ok(self.video)
        }

        fn supports_floating_window(&self) -> bool {
            self.floating
        }

        async fn open_floating_window(&self, width: u32, height: u32) -> Result<SurfaceChannel, InfraError> {
            assert_eq!((width, height), (PIP_WINDOW_WIDTH, PIP_WINDOW_HEIGHT));
            self.opened.fetch_add(1, Ordering::SeqCst);
            let (channel, endpoint) = surface_pair();
            self.endpoints
                .lock()
                .expect("endpoints mutex poisoned")
                .push(endpoint);
            Ok(channel)
        }
    }

    struct MissingDocument;

    #[async_trait]
    impl PipDocumentSource for MissingDocument {
        async fn fetch_document(&self) -> Result<String, InfraError> {
            Err(InfraError::Http {
                status: 404,
                body: "failed to fetch pip.html".to_string(),
            })
        }
    }

    #[derive(Default)]
    struct CountingTimer {
        toggles: AtomicUsize,
        toggled: Notify,
    }

    impl TimerControl for CountingTimer {
        fn toggle_pause(&self) -> Result<TimerSnapshot, InfraError> {
            self.toggles.fetch_add(1, Ordering::SeqCst);
            self.toggled.notify_one();
            Ok(sample_snapshot(1500))
        }
    }

    fn sample_snapshot(remaining: u32) -> TimerSnapshot {
        let mut snapshot =
            SessionMachine::new(&TimerSettings::default(), 0).snapshot(FocusTimerColor::Red);
        snapshot.time_remaining_seconds = remaining;
        snapshot
    }

    fn bridge_with(
        host: Arc<FakeHost>,
        documents: Arc<dyn PipDocumentSource>,
    ) -> (SyncBridge, Arc<CountingTimer>) {
        let timer = Arc::new(CountingTimer::default());
        let bridge = SyncBridge::new(
            host,
            documents,
            timer.clone(),
            Arc::new(MemoryDiagnostics::default()),
        );
        (bridge, timer)
    }

    fn bridge(host: Arc<FakeHost>) -> (SyncBridge, Arc<CountingTimer>) {
        bridge_with(host, Arc::new(StaticPipDocument::new(PIP_HTML)))
    }

    fn update_frame(snapshot: &TimerSnapshot) -> SurfaceFrame {
        SurfaceFrame::Message(OutboundMessage::TimerUpdate(TimerUpdatePayload::from(snapshot)))
    }

    async fn wait_for_status(bridge: &SyncBridge, expected: BridgeStatus) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while bridge.status() != expected {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("bridge reached expected status");
    }

    #[tokio::test]
    async fn opening_writes_document_then_mirrors_latest_snapshot() {
        let host = Arc::new(FakeHost::floating_only());
        let (bridge, _) = bridge(Arc::clone(&host));
        let snapshot = sample_snapshot(1200);
        bridge.publish(&snapshot);

        assert_eq!(bridge.toggle().await.expect("toggle"), ToggleOutcome::Opened);
        assert_eq!(bridge.status(), BridgeStatus::Open);

        let mut endpoint = host.take_endpoint();
        assert_eq!(
            endpoint.frames.try_recv().expect("document"),
            SurfaceFrame::Document(PIP_HTML.to_string())
        );
        assert_eq!(endpoint.frames.try_recv().expect("close document"), SurfaceFrame::CloseDocument);
        assert_eq!(endpoint.frames.try_recv().expect("first update"), update_frame(&snapshot));
    }

    #[tokio::test]
    async fn toggling_an_open_surface_closes_it() {
        let host = Arc::new(FakeHost::floating_only());
        let (bridge, _) = bridge(Arc::clone(&host));
        bridge.toggle().await.expect("open");
        let mut endpoint = host.take_endpoint();

        assert_eq!(bridge.toggle().await.expect("close"), ToggleOutcome::Closed);
        assert_eq!(bridge.status(), BridgeStatus::Closed);
        assert_eq!(host.opened.load(Ordering::SeqCst), 1);

        let mut frames = Vec::new();
        while let Ok(frame) = endpoint.frames.try_recv() {
            frames.push(frame);
        }
        assert_eq!(frames.last(), Some(&SurfaceFrame::Close));
    }

    #[tokio::test]
    async fn every_published_snapshot_reaches_the_open_surface() {
        let host = Arc::new(FakeHost::floating_only());
        let (bridge, _) = bridge(Arc::clone(&host));
        bridge.toggle().await.expect("open");
        let mut endpoint = host.take_endpoint();
        endpoint.frames.try_recv().expect("document");
        endpoint.frames.try_recv().expect("close document");

        let snapshots = [sample_snapshot(1499), sample_snapshot(1498)];
        for snapshot in &snapshots {
            bridge.publish(snapshot);
        }
        for snapshot in &snapshots {
            assert_eq!(endpoint.frames.try_recv().expect("update"), update_frame(snapshot));
        }
    }

    #[tokio::test]
    async fn mirror_task_forwards_watch_updates() {
        let host = Arc::new(FakeHost::floating_only());
        let (bridge, _) = bridge(Arc::clone(&host));
        bridge.toggle().await.expect("open");
        let mut endpoint = host.take_endpoint();
        endpoint.frames.try_recv().expect("document");
        endpoint.frames.try_recv().expect("close document");

        let (sender, receiver) = watch::channel(sample_snapshot(900));
        let mirror = bridge.spawn_mirror(receiver);
        assert_eq!(endpoint.frames.recv().await.expect("initial"), update_frame(&sample_snapshot(900)));

        sender.send_replace(sample_snapshot(899));
        assert_eq!(endpoint.frames.recv().await.expect("change"), update_frame(&sample_snapshot(899)));
        mirror.abort();
    }

    #[tokio::test]
    async fn toggle_pause_from_tracked_surface_reaches_timer() {
        let host = Arc::new(FakeHost::floating_only());
        let (bridge, timer) = bridge(Arc::clone(&host));
        bridge.toggle().await.expect("open");
        let endpoint = host.take_endpoint();

        endpoint
            .events
            .send(SurfaceEvent::Message(r#"{"type":"TIMER_TOGGLE_PAUSE"}"#.to_string()))
            .expect("send inbound");
        tokio::time::timeout(Duration::from_secs(1), timer.toggled.notified())
            .await
            .expect("toggle relayed");

        assert_eq!(timer.toggles.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_or_unknown_input_changes_nothing() {
        let host = Arc::new(FakeHost::floating_only());
        let (bridge, timer) = bridge(Arc::clone(&host));
        bridge.toggle().await.expect("open first");
        let first = host.take_endpoint();
        bridge.toggle().await.expect("close first");
        bridge.toggle().await.expect("open second");
        let second = host.take_endpoint();
        let (first, second) = (first.id, second.id);

        assert!(!bridge.handle_inbound(first, r#"{"type":"TIMER_TOGGLE_PAUSE"}"#));
        assert!(!bridge.handle_inbound(second, r#"{"type":"TIMER_RESET"}"#));
        assert!(!bridge.handle_inbound(second, "garbage"));
        assert_eq!(timer.toggles.load(Ordering::SeqCst), 0);

        assert!(bridge.handle_inbound(second, r#"{"type":"TIMER_TOGGLE_PAUSE"}"#));
        assert_eq!(timer.toggles.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn page_hide_stops_delivery() {
        let host = Arc::new(FakeHost::floating_only());
        let (bridge, timer) = bridge(Arc::clone(&host));
        bridge.toggle().await.expect("open");
        let endpoint = host.take_endpoint();

        endpoint.events.send(SurfaceEvent::PageHide).expect("page hide");
        wait_for_status(&bridge, BridgeStatus::Closed).await;

        assert!(!bridge.handle_inbound(endpoint.id, r#"{"type":"TIMER_TOGGLE_PAUSE"}"#));
        assert_eq!(timer.toggles.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dropped_surface_is_forgotten_on_publish() {
        let host = Arc::new(FakeHost::floating_only());
        let (bridge, _) = bridge(Arc::clone(&host));
        bridge.toggle().await.expect("open");
        drop(host.take_endpoint());

        bridge.publish(&sample_snapshot(10));

        assert_eq!(bridge.status(), BridgeStatus::Closed);
    }

    #[tokio::test]
    async fn unsupported_host_reports_capability_error() {
        let host = Arc::new(FakeHost::new(VideoPipOutcome::Unsupported, false));
        let (bridge, _) = bridge(host);

        assert!(matches!(
            bridge.toggle().await,
            Err(InfraError::CapabilityUnavailable(_))
        ));
        assert_eq!(bridge.status(), BridgeStatus::Closed);
    }

    #[tokio::test]
    async fn video_pip_is_preferred_over_floating_window() {
        let host = Arc::new(FakeHost::new(VideoPipOutcome::Entered, true));
        let (bridge, _) = bridge(Arc::clone(&host));

        assert_eq!(
            bridge.toggle().await.expect("toggle"),
            ToggleOutcome::VideoPipEntered
        );
        assert_eq!(host.opened.load(Ordering::SeqCst), 0);
        assert_eq!(bridge.status(), BridgeStatus::Closed);
    }

    #[tokio::test]
    async fn failed_document_fetch_returns_to_closed() {
        let host = Arc::new(FakeHost::floating_only());
        let (bridge, _) = bridge_with(Arc::clone(&host), Arc::new(MissingDocument));

        assert!(matches!(
            bridge.toggle().await,
            Err(InfraError::Http { status: 404, .. })
        ));
        assert_eq!(bridge.status(), BridgeStatus::Closed);
        let mut endpoint = host.take_endpoint();
        assert_eq!(endpoint.frames.try_recv().expect("close"), SurfaceFrame::Close);
    }
}
