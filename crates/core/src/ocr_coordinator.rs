//! Debounced hover OCR requests
//!
//! Pointer hover produces a stream of recognition requests. The coordinator
//! keeps only the newest one, waits for the pointer to settle, and runs at
//! most one recognition at a time on a background worker.
//!
//! Requests made while the engine is busy are ignored. A request accepted
//! just before a recognition started may still fire while it is in flight;
//! it then waits in a one-element slot, later ones overwrite it, and only
//! the newest runs once the in-flight call finishes.

use crate::ocr::{EngineEvent, OcrEngine, OcrEngineState, OcrError, OcrResult};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use image::DynamicImage;
use parking_lot::{Mutex, RwLock};
use pdf_viewer_cache::{Point, Rect};
use pdf_viewer_scheduler::{PoolError, WorkerPool, WorkerPoolConfig};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Default quiet period before a request fires.
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// Largest accepted debounce delay.
pub const MAX_DEBOUNCE_MS: u64 = 2000;

/// Notifications for the UI layer.
#[derive(Debug, Clone, PartialEq)]
pub enum OcrEvent {
    /// Recognition succeeded for the request made at `pointer` over `region`.
    Completed {
        result: OcrResult,
        region: Rect,
        pointer: Point,
        /// Pixel size of the recognized image
        image_size: (u32, u32),
    },
    /// Recognition failed
    Failed {
        error: String,
        region: Rect,
        pointer: Point,
    },
    StateChanged(OcrEngineState),
    HoverEnabledChanged(bool),
}

/// A request waiting for its debounce timer.
struct OcrRequest {
    image: Arc<DynamicImage>,
    region: Rect,
    pointer: Point,
}

enum Command {
    Request(OcrRequest),
    Cancel,
    Finished,
    Shutdown,
}

struct Shared {
    engine: RwLock<Option<Arc<OcrEngine>>>,
    debounce_ms: AtomicU64,
    events: Sender<OcrEvent>,
    last_error: Mutex<Option<String>>,
}

impl Shared {
    fn new(events: Sender<OcrEvent>) -> Self {
        Self {
            engine: RwLock::new(None),
            debounce_ms: AtomicU64::new(DEFAULT_DEBOUNCE_MS),
            events,
            last_error: Mutex::new(None),
        }
    }

    fn emit(&self, event: OcrEvent) {
        let _ = self.events.send(event);
    }

    fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.load(Ordering::Acquire))
    }
}

/// Hover OCR coordinator.
///
/// Owns a debounce thread and a single recognition worker. Results arrive as
/// [`OcrEvent`]s.
pub struct OcrCoordinator {
    shared: Arc<Shared>,
    hover_enabled: AtomicBool,
    commands: Sender<Command>,
    events: Receiver<OcrEvent>,
    debounce_thread: Option<JoinHandle<()>>,
}

impl OcrCoordinator {
    /// Create a coordinator without an engine.
    pub fn new() -> Result<Self, PoolError> {
        let (events_tx, events) = channel::unbounded();
        let (commands, command_rx) = channel::unbounded();

        let shared = Arc::new(Shared::new(events_tx));

        let recognizer = WorkerPool::new(
            WorkerPoolConfig::new(1).with_thread_name_prefix("ocr-recognizer"),
        )?;

        let loop_shared = shared.clone();
        let loop_commands = commands.clone();
        let debounce_thread = thread::Builder::new()
            .name("ocr-debounce".to_string())
            .spawn(move || {
                DebounceLoop::new(loop_shared, recognizer, loop_commands).run(command_rx)
            })?;

        Ok(Self {
            shared,
            hover_enabled: AtomicBool::new(true),
            commands,
            events,
            debounce_thread: Some(debounce_thread),
        })
    }

    /// Create a coordinator driving `engine`.
    pub fn with_engine(engine: Arc<OcrEngine>) -> Result<Self, PoolError> {
        let coordinator = Self::new()?;
        coordinator.set_engine(engine);
        Ok(coordinator)
    }

    pub fn set_engine(&self, engine: Arc<OcrEngine>) {
        *self.shared.engine.write() = Some(engine);
    }

    pub fn engine(&self) -> Option<Arc<OcrEngine>> {
        self.shared.engine.read().clone()
    }

    /// Start loading the engine's model in the background.
    ///
    /// State changes arrive through [`poll_events`](Self::poll_events).
    pub fn initialize(&self, model_dir: impl AsRef<Path>) -> Result<(), OcrError> {
        let Some(engine) = self.engine() else {
            let error = OcrError::InitializationFailed("no OCR engine configured".to_string());
            *self.shared.last_error.lock() = Some(error.to_string());
            return Err(error);
        };

        engine.initialize_async(model_dir).inspect_err(|error| {
            *self.shared.last_error.lock() = Some(error.to_string());
        })
    }

    /// Current engine state, `Uninitialized` without an engine.
    pub fn state(&self) -> OcrEngineState {
        self.engine()
            .map_or(OcrEngineState::Uninitialized, |engine| engine.state())
    }

    /// Queue a recognition of `image`, captured over `region` with the
    /// pointer at `pointer`.
    ///
    /// Restarts the debounce timer and replaces any pending request. Ignored
    /// (returns false) when hover OCR is disabled or the engine is not
    /// `Ready`, which includes a recognition in progress.
    pub fn request_ocr(&self, image: DynamicImage, region: Rect, pointer: Point) -> bool {
        if !self.is_ocr_hover_enabled() {
            return false;
        }

        let state = self.state();
        if state != OcrEngineState::Ready {
            tracing::trace!(%state, "ignoring OCR request, engine not ready");
            return false;
        }

        let request = OcrRequest {
            image: Arc::new(image),
            region,
            pointer,
        };
        self.commands.send(Command::Request(request)).is_ok()
    }

    /// Stop the debounce timer and drop the pending request.
    ///
    /// A recognition already running is not interrupted.
    pub fn cancel_pending(&self) {
        let _ = self.commands.send(Command::Cancel);
    }

    /// Set the debounce delay in milliseconds.
    ///
    /// Values outside `0..=2000` are rejected and leave the delay unchanged.
    pub fn set_debounce_delay(&self, ms: i64) -> bool {
        match u64::try_from(ms) {
            Ok(ms) if ms <= MAX_DEBOUNCE_MS => {
                self.shared.debounce_ms.store(ms, Ordering::Release);
                true
            }
            _ => {
                tracing::warn!(ms, max = MAX_DEBOUNCE_MS, "debounce delay out of range");
                false
            }
        }
    }

    pub fn debounce_delay(&self) -> Duration {
        self.shared.debounce()
    }

    pub fn set_ocr_hover_enabled(&self, enabled: bool) {
        let previous = self.hover_enabled.swap(enabled, Ordering::AcqRel);
        if previous == enabled {
            return;
        }

        if !enabled {
            self.cancel_pending();
        }
        tracing::debug!(enabled, "hover OCR toggled");
        self.shared.emit(OcrEvent::HoverEnabledChanged(enabled));
    }

    pub fn is_ocr_hover_enabled(&self) -> bool {
        self.hover_enabled.load(Ordering::Acquire)
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error.lock().clone()
    }

    /// Receiver for coordinator notifications.
    ///
    /// Engine state changes are only forwarded by
    /// [`poll_events`](Self::poll_events).
    pub fn events(&self) -> Receiver<OcrEvent> {
        self.events.clone()
    }

    /// Forward engine state changes and drain every pending notification.
    pub fn poll_events(&self) -> Vec<OcrEvent> {
        if let Some(engine) = self.engine() {
            for event in engine.poll_events() {
                match event {
                    EngineEvent::StateChanged(state) => {
                        self.shared.emit(OcrEvent::StateChanged(state))
                    }
                    EngineEvent::InitializationFinished {
                        success: false,
                        error,
                    } => {
                        *self.shared.last_error.lock() = error;
                    }
                    EngineEvent::InitializationFinished { .. } => {}
                }
            }
        }

        self.events.try_iter().collect()
    }
}

impl Drop for OcrCoordinator {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(handle) = self.debounce_thread.take() {
            if handle.join().is_err() {
                tracing::error!("OCR debounce thread panicked");
            }
        }
    }
}

/// State owned by the debounce thread.
struct DebounceLoop {
    shared: Arc<Shared>,
    recognizer: WorkerPool,
    commands: Sender<Command>,
    pending: Option<(OcrRequest, Instant)>,
    queued: Option<OcrRequest>,
    in_flight: bool,
}

impl DebounceLoop {
    fn new(shared: Arc<Shared>, recognizer: WorkerPool, commands: Sender<Command>) -> Self {
        Self {
            shared,
            recognizer,
            commands,
            pending: None,
            queued: None,
            in_flight: false,
        }
    }

    fn run(mut self, commands: Receiver<Command>) {
        loop {
            let received = match &self.pending {
                Some((_, deadline)) => commands.recv_deadline(*deadline),
                None => commands.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            if !self.handle(received) {
                break;
            }
        }

        tracing::trace!("OCR debounce loop exiting");
        // Dropping the pool waits for an in-flight recognition.
    }

    /// Apply one command or timer expiry. Returns false when the loop should
    /// stop.
    fn handle(&mut self, received: Result<Command, RecvTimeoutError>) -> bool {
        match received {
            Ok(Command::Request(request)) => {
                let deadline = Instant::now() + self.shared.debounce();
                self.pending = Some((request, deadline));
            }
            Ok(Command::Cancel) => {
                let dropped_pending = self.pending.take().is_some();
                let dropped_queued = self.queued.take().is_some();
                if dropped_pending || dropped_queued {
                    tracing::trace!(dropped_pending, dropped_queued, "OCR requests cancelled");
                }
            }
            Ok(Command::Finished) => {
                self.in_flight = false;
                if let Some(request) = self.queued.take() {
                    self.dispatch(request);
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if let Some((request, _)) = self.pending.take() {
                    if self.in_flight {
                        self.queued = Some(request);
                    } else {
                        self.dispatch(request);
                    }
                }
            }
            Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => return false,
        }

        true
    }

    fn dispatch(&mut self, request: OcrRequest) {
        let shared = self.shared.clone();
        let commands = self.commands.clone();

        let submitted = self.recognizer.execute(move || {
            run_recognition(&shared, request);
            let _ = commands.send(Command::Finished);
        });

        match submitted {
            Ok(()) => self.in_flight = true,
            Err(error) => tracing::error!(%error, "could not dispatch OCR request"),
        }
    }
}

fn run_recognition(shared: &Shared, request: OcrRequest) {
    let OcrRequest {
        image,
        region,
        pointer,
    } = request;

    let engine = shared.engine.read().clone();
    let Some(engine) = engine else {
        shared.emit(OcrEvent::Failed {
            error: "no OCR engine configured".to_string(),
            region,
            pointer,
        });
        return;
    };

    let result = engine.recognize_detailed(&image);

    if result.success {
        tracing::debug!(
            lines = result.texts.len(),
            elapsed_ms = result.elapsed_ms,
            "hover OCR completed"
        );
        shared.emit(OcrEvent::Completed {
            result,
            region,
            pointer,
            image_size: (image.width(), image.height()),
        });
    } else {
        let error = result
            .error
            .unwrap_or_else(|| "OCR recognition failed".to_string());
        tracing::warn!(%error, "hover OCR failed");
        *shared.last_error.lock() = Some(error.clone());
        shared.emit(OcrEvent::Failed {
            error,
            region,
            pointer,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::testing::*;

    const TEST_DEBOUNCE_MS: i64 = 40;

    fn region() -> Rect {
        Rect::new(100.0, 200.0, 64.0, 32.0)
    }

    fn coordinator_for(model: Arc<ScriptedModel>) -> OcrCoordinator {
        let coordinator = OcrCoordinator::with_engine(ready_engine(model)).unwrap();
        assert!(coordinator.set_debounce_delay(TEST_DEBOUNCE_MS));
        coordinator
    }

    fn next_result(coordinator: &OcrCoordinator) -> OcrEvent {
        let events = coordinator.events();
        loop {
            let event = events
                .recv_timeout(Duration::from_secs(5))
                .expect("no OCR result delivered");
            if matches!(event, OcrEvent::Completed { .. } | OcrEvent::Failed { .. }) {
                return event;
            }
        }
    }

    #[test]
    fn test_defaults() {
        let coordinator = OcrCoordinator::new().unwrap();
        assert_eq!(
            coordinator.debounce_delay(),
            Duration::from_millis(DEFAULT_DEBOUNCE_MS)
        );
        assert!(coordinator.is_ocr_hover_enabled());
        assert_eq!(coordinator.state(), OcrEngineState::Uninitialized);
        assert!(coordinator.last_error().is_none());
    }

    #[test]
    fn test_set_debounce_delay_bounds() {
        let coordinator = OcrCoordinator::new().unwrap();

        assert!(!coordinator.set_debounce_delay(3000));
        assert_eq!(coordinator.debounce_delay(), Duration::from_millis(300));

        assert!(!coordinator.set_debounce_delay(-1));
        assert_eq!(coordinator.debounce_delay(), Duration::from_millis(300));

        assert!(coordinator.set_debounce_delay(0));
        assert_eq!(coordinator.debounce_delay(), Duration::ZERO);

        assert!(coordinator.set_debounce_delay(2000));
        assert_eq!(coordinator.debounce_delay(), Duration::from_millis(2000));
    }

    #[test]
    fn test_rapid_requests_collapse_to_last() {
        let model = Arc::new(ScriptedModel::new(&[(
            "hello",
            Rect::new(0.0, 0.0, 50.0, 10.0),
            0.9,
        )]));
        let coordinator = coordinator_for(model.clone());

        assert!(coordinator.request_ocr(image(10, 10), region(), point(1.0, 1.0)));
        assert!(coordinator.request_ocr(image(20, 10), region(), point(2.0, 2.0)));
        assert!(coordinator.request_ocr(image(30, 10), region(), point(3.0, 3.0)));

        match next_result(&coordinator) {
            OcrEvent::Completed {
                result,
                pointer,
                region: event_region,
                image_size,
            } => {
                assert!(result.success);
                assert_eq!(result.text, "hello");
                assert_eq!(pointer, point(3.0, 3.0));
                assert_eq!(event_region, region());
                assert_eq!(image_size, (30, 10));
            }
            other => panic!("unexpected event {other:?}"),
        }

        thread::sleep(Duration::from_millis(150));
        assert_eq!(model.calls(), 1);
        assert_eq!(*model.seen_widths.lock(), vec![30]);
    }

    #[test]
    fn test_request_ignored_when_hover_disabled() {
        let model = Arc::new(ScriptedModel::new(&[]));
        let coordinator = coordinator_for(model.clone());

        coordinator.set_ocr_hover_enabled(false);
        assert!(!coordinator.request_ocr(image(10, 10), region(), point(0.0, 0.0)));

        thread::sleep(Duration::from_millis(120));
        assert_eq!(model.calls(), 0);
        assert_eq!(
            coordinator.poll_events(),
            vec![OcrEvent::HoverEnabledChanged(false)]
        );
    }

    #[test]
    fn test_hover_toggle_only_reports_changes() {
        let coordinator = OcrCoordinator::new().unwrap();

        coordinator.set_ocr_hover_enabled(true);
        coordinator.set_ocr_hover_enabled(false);
        coordinator.set_ocr_hover_enabled(false);
        coordinator.set_ocr_hover_enabled(true);

        assert_eq!(
            coordinator.poll_events(),
            vec![
                OcrEvent::HoverEnabledChanged(false),
                OcrEvent::HoverEnabledChanged(true)
            ]
        );
    }

    #[test]
    fn test_request_ignored_without_loaded_engine() {
        let coordinator = OcrCoordinator::new().unwrap();
        assert!(!coordinator.request_ocr(image(10, 10), region(), point(0.0, 0.0)));

        let model = Arc::new(ScriptedModel::new(&[]));
        let engine = Arc::new(OcrEngine::new(loader_for(model.clone())));
        coordinator.set_engine(engine);
        assert!(!coordinator.request_ocr(image(10, 10), region(), point(0.0, 0.0)));

        thread::sleep(Duration::from_millis(50));
        assert_eq!(model.calls(), 0);
    }

    #[test]
    fn test_cancel_pending_discards_request() {
        let model = Arc::new(ScriptedModel::new(&[]));
        let coordinator = coordinator_for(model.clone());
        assert!(coordinator.set_debounce_delay(100));

        assert!(coordinator.request_ocr(image(10, 10), region(), point(0.0, 0.0)));
        coordinator.cancel_pending();

        thread::sleep(Duration::from_millis(250));
        assert_eq!(model.calls(), 0);
    }

    #[test]
    fn test_disabling_hover_cancels_pending() {
        let model = Arc::new(ScriptedModel::new(&[]));
        let coordinator = coordinator_for(model.clone());
        assert!(coordinator.set_debounce_delay(100));

        assert!(coordinator.request_ocr(image(10, 10), region(), point(0.0, 0.0)));
        coordinator.set_ocr_hover_enabled(false);

        thread::sleep(Duration::from_millis(250));
        assert_eq!(model.calls(), 0);
    }

    #[test]
    fn test_request_ignored_while_processing() {
        let (model, release) = ScriptedModel::new(&[]).gated();
        let model = Arc::new(model);
        let coordinator = coordinator_for(model.clone());

        assert!(coordinator.request_ocr(image(10, 10), region(), point(1.0, 1.0)));
        let deadline = Instant::now() + Duration::from_secs(5);
        while model.calls() == 0 {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(coordinator.state(), OcrEngineState::Processing);
        assert!(!coordinator.request_ocr(image(20, 10), region(), point(2.0, 2.0)));

        release.send(()).unwrap();
        assert!(matches!(
            next_result(&coordinator),
            OcrEvent::Completed { pointer, .. } if pointer == point(1.0, 1.0)
        ));

        thread::sleep(Duration::from_millis(120));
        assert_eq!(*model.seen_widths.lock(), vec![10]);
    }

    fn debounce_loop(model: Arc<ScriptedModel>) -> (DebounceLoop, Receiver<OcrEvent>) {
        let (events_tx, events) = channel::unbounded();
        let shared = Arc::new(Shared::new(events_tx));
        *shared.engine.write() = Some(ready_engine(model));
        let recognizer = WorkerPool::new(WorkerPoolConfig::new(1)).unwrap();
        // Finished notifications are fed by hand.
        let (commands, _unused) = channel::unbounded();
        (DebounceLoop::new(shared, recognizer, commands), events)
    }

    fn request(width: u32) -> OcrRequest {
        OcrRequest {
            image: Arc::new(image(width, 10)),
            region: region(),
            pointer: point(width as f32, 0.0),
        }
    }

    #[test]
    fn test_newest_fired_request_runs_after_in_flight() {
        let model = Arc::new(ScriptedModel::new(&[]));
        let (mut debounce, events) = debounce_loop(model.clone());
        debounce.in_flight = true;

        for width in [20, 30] {
            assert!(debounce.handle(Ok(Command::Request(request(width)))));
            assert!(debounce.handle(Err(RecvTimeoutError::Timeout)));
        }
        assert_eq!(model.calls(), 0);

        assert!(debounce.handle(Ok(Command::Finished)));
        let event = events.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(event, OcrEvent::Completed { image_size: (30, 10), .. }));
        assert_eq!(*model.seen_widths.lock(), vec![30]);
    }

    #[test]
    fn test_cancel_drops_pending_and_queued_requests() {
        let model = Arc::new(ScriptedModel::new(&[]));
        let (mut debounce, events) = debounce_loop(model.clone());
        debounce.in_flight = true;

        assert!(debounce.handle(Ok(Command::Request(request(20)))));
        assert!(debounce.handle(Err(RecvTimeoutError::Timeout)));
        assert!(debounce.handle(Ok(Command::Request(request(30)))));
        assert!(debounce.queued.is_some());
        assert!(debounce.pending.is_some());

        assert!(debounce.handle(Ok(Command::Cancel)));
        assert!(debounce.queued.is_none());
        assert!(debounce.pending.is_none());

        assert!(debounce.handle(Ok(Command::Finished)));
        assert!(events.recv_timeout(Duration::from_millis(150)).is_err());
        assert_eq!(model.calls(), 0);
    }

    #[test]
    fn test_shutdown_stops_loop() {
        let model = Arc::new(ScriptedModel::new(&[]));
        let (mut debounce, _events) = debounce_loop(model);

        assert!(!debounce.handle(Ok(Command::Shutdown)));
        assert!(!debounce.handle(Err(RecvTimeoutError::Disconnected)));
    }

    #[test]
    fn test_model_failure_is_reported() {
        let model = Arc::new(ScriptedModel::failing("bad tensor"));
        let coordinator = coordinator_for(model);

        coordinator.request_ocr(image(10, 10), region(), point(5.0, 6.0));

        match next_result(&coordinator) {
            OcrEvent::Failed { error, pointer, .. } => {
                assert_eq!(error, "OCR processing failed: bad tensor");
                assert_eq!(pointer, point(5.0, 6.0));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(
            coordinator.last_error().as_deref(),
            Some("OCR processing failed: bad tensor")
        );
    }

    #[test]
    fn test_small_image_fails_without_model_call() {
        let model = Arc::new(ScriptedModel::new(&[]));
        let coordinator = coordinator_for(model.clone());

        coordinator.request_ocr(image(2, 2), region(), point(0.0, 0.0));

        assert!(matches!(
            next_result(&coordinator),
            OcrEvent::Failed { error, .. } if error.starts_with("Invalid image")
        ));
        assert_eq!(model.calls(), 0);
    }

    #[test]
    fn test_initialize_forwards_state_changes() {
        let model = Arc::new(ScriptedModel::new(&[]));
        let engine = Arc::new(OcrEngine::new(loader_for(model)));
        let coordinator = OcrCoordinator::with_engine(engine.clone()).unwrap();

        coordinator.initialize("/models").unwrap();
        assert!(engine.wait_initialized(Duration::from_secs(5)));

        let events = coordinator.poll_events();
        assert_eq!(
            events,
            vec![
                OcrEvent::StateChanged(OcrEngineState::Loading),
                OcrEvent::StateChanged(OcrEngineState::Ready),
            ]
        );
        assert_eq!(coordinator.state(), OcrEngineState::Ready);
    }

    #[test]
    fn test_initialize_without_engine_fails() {
        let coordinator = OcrCoordinator::new().unwrap();
        assert!(coordinator.initialize("/models").is_err());
        assert_eq!(
            coordinator.last_error().as_deref(),
            Some("OCR initialization failed: no OCR engine configured")
        );
    }
}
