//! OCR engine wrapper
//!
//! Wraps an [`OcrModel`] behind a small state machine:
//!
//! ```text
//! Uninitialized -> Loading -> Ready <-> Processing
//!                     \
//!                      -> Error -> Loading (retry)
//! ```
//!
//! Model construction can run on a background thread. Its outcome is posted
//! to the engine inbox and applied by whoever calls [`OcrEngine::poll_events`]
//! or [`OcrEngine::wait_initialized`].

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use image::DynamicImage;
use parking_lot::{Mutex, RwLock};
use pdf_viewer_cache::Quad;
use pdf_viewer_scheduler::panic_message;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Smallest accepted image width and height, in pixels.
pub const MIN_IMAGE_DIMENSION: u32 = 4;

/// Lifecycle state of the OCR engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum OcrEngineState {
    Uninitialized = 0,
    Loading = 1,
    Ready = 2,
    Processing = 3,
    Error = 4,
}

impl OcrEngineState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Loading,
            2 => Self::Ready,
            3 => Self::Processing,
            4 => Self::Error,
            _ => Self::Uninitialized,
        }
    }

    /// True once a model is loaded, whether or not it is busy.
    pub fn is_loaded(self) -> bool {
        matches!(self, Self::Ready | Self::Processing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Processing => "processing",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for OcrEngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-line output of an OCR model, in image pixel coordinates.
///
/// `texts`, `boxes` and `scores` are parallel; consumers pair them up to the
/// shortest length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawOcrOutput {
    pub texts: Vec<String>,
    pub boxes: Vec<Quad>,
    pub scores: Vec<f32>,
}

/// Result of one recognition call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrResult {
    pub success: bool,

    /// Recognized lines joined with `\n`
    pub text: String,

    /// Average score over lines with non-empty text (0.0 to 1.0)
    pub confidence: f32,

    /// Per-line quadrilaterals (detailed results only)
    #[serde(default)]
    pub boxes: Vec<Quad>,

    /// Per-line text (detailed results only)
    #[serde(default)]
    pub texts: Vec<String>,

    /// Per-line scores (detailed results only)
    #[serde(default)]
    pub scores: Vec<f32>,

    /// Wall time spent in the call
    pub elapsed_ms: u64,

    /// Failure description when `success` is false
    #[serde(default)]
    pub error: Option<String>,
}

impl OcrResult {
    /// Build a successful result from raw model output.
    pub fn from_raw(raw: RawOcrOutput, elapsed: Duration) -> Self {
        let text = raw.texts.join("\n");

        let line_scores: Vec<f32> = raw
            .texts
            .iter()
            .zip(&raw.scores)
            .filter(|(text, _)| !text.trim().is_empty())
            .map(|(_, score)| *score)
            .collect();
        let confidence = if line_scores.is_empty() {
            0.0
        } else {
            line_scores.iter().sum::<f32>() / line_scores.len() as f32
        };

        Self {
            success: true,
            text,
            confidence,
            boxes: raw.boxes,
            texts: raw.texts,
            scores: raw.scores,
            elapsed_ms: elapsed.as_millis() as u64,
            error: None,
        }
    }

    /// Build a failure result
    pub fn failure(error: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            success: false,
            elapsed_ms: elapsed.as_millis() as u64,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Drop the per-line detail, keeping text, confidence and timing.
    pub fn into_summary(mut self) -> Self {
        self.boxes.clear();
        self.texts.clear();
        self.scores.clear();
        self
    }

    /// Number of complete (text, box) line pairs
    pub fn line_count(&self) -> usize {
        self.texts.len().min(self.boxes.len())
    }
}

/// OCR error types
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OcrError {
    /// No model is loaded, or a recognition is already running
    #[error("OCR engine not ready")]
    NotReady,

    /// Image is empty or too small to recognize
    #[error("Invalid image: {width}x{height} (minimum {min}x{min})", min = MIN_IMAGE_DIMENSION)]
    InvalidImage { width: u32, height: u32 },

    /// Model construction failed
    #[error("OCR initialization failed: {0}")]
    InitializationFailed(String),

    /// The model failed while recognizing
    #[error("OCR processing failed: {0}")]
    ModelError(String),

    /// A model is already being loaded
    #[error("OCR engine is already initializing")]
    AlreadyInitializing,

    /// A model is already loaded
    #[error("OCR engine is already initialized")]
    AlreadyInitialized,
}

/// A loaded OCR model (text detection plus recognition).
///
/// Implementations must tolerate calls from a background thread.
pub trait OcrModel: Send + Sync {
    fn recognize(&self, image: &DynamicImage) -> Result<RawOcrOutput, OcrError>;
}

/// Builds an [`OcrModel`] from a model directory. May block for seconds.
pub trait OcrModelLoader: Send + Sync {
    fn load(&self, model_dir: &Path) -> Result<Arc<dyn OcrModel>, OcrError>;
}

impl<F> OcrModelLoader for F
where
    F: Fn(&Path) -> Result<Arc<dyn OcrModel>, OcrError> + Send + Sync,
{
    fn load(&self, model_dir: &Path) -> Result<Arc<dyn OcrModel>, OcrError> {
        self(model_dir)
    }
}

/// Notifications produced by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    StateChanged(OcrEngineState),
    InitializationFinished { success: bool, error: Option<String> },
}

/// Outcome of a background model load.
struct LoadOutcome {
    generation: u64,
    result: Result<Arc<dyn OcrModel>, OcrError>,
}

/// OCR engine with a load/recognize state machine.
///
/// Shared between threads as `Arc<OcrEngine>`. Only one recognition runs at
/// a time; a call made while another is in flight fails with
/// [`OcrError::NotReady`] instead of blocking.
pub struct OcrEngine {
    loader: Arc<dyn OcrModelLoader>,
    state: AtomicU8,
    model: RwLock<Option<Arc<dyn OcrModel>>>,
    last_error: Mutex<Option<String>>,

    /// Bumped on shutdown so late load outcomes are ignored
    generation: AtomicU64,

    inbox_tx: Sender<LoadOutcome>,
    inbox_rx: Receiver<LoadOutcome>,
    events_tx: Sender<EngineEvent>,
    events_rx: Receiver<EngineEvent>,
}

impl OcrEngine {
    /// Create an uninitialized engine
    pub fn new(loader: Arc<dyn OcrModelLoader>) -> Self {
        let (inbox_tx, inbox_rx) = channel::unbounded();
        let (events_tx, events_rx) = channel::unbounded();

        Self {
            loader,
            state: AtomicU8::new(OcrEngineState::Uninitialized as u8),
            model: RwLock::new(None),
            last_error: Mutex::new(None),
            generation: AtomicU64::new(0),
            inbox_tx,
            inbox_rx,
            events_tx,
            events_rx,
        }
    }

    pub fn state(&self) -> OcrEngineState {
        OcrEngineState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_ready(&self) -> bool {
        self.state() == OcrEngineState::Ready
    }

    /// Last initialization or recognition error
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    /// Start loading the model on a background thread.
    ///
    /// Returns immediately. The outcome is applied by the next
    /// [`poll_events`](Self::poll_events) or
    /// [`wait_initialized`](Self::wait_initialized).
    pub fn initialize_async(&self, model_dir: impl AsRef<Path>) -> Result<(), OcrError> {
        let generation = self.begin_loading()?;
        let model_dir: PathBuf = model_dir.as_ref().to_path_buf();
        let loader = self.loader.clone();
        let inbox = self.inbox_tx.clone();

        tracing::info!(model_dir = %model_dir.display(), "loading OCR model in background");

        let spawned = thread::Builder::new()
            .name("ocr-model-loader".to_string())
            .spawn(move || {
                let result = load_guarded(loader.as_ref(), &model_dir);
                let _ = inbox.send(LoadOutcome { generation, result });
            });

        if let Err(error) = spawned {
            let error = OcrError::InitializationFailed(format!("could not spawn loader: {error}"));
            self.apply_load_outcome(LoadOutcome {
                generation,
                result: Err(error.clone()),
            });
            return Err(error);
        }

        Ok(())
    }

    /// Load the model on the calling thread.
    pub fn initialize_sync(&self, model_dir: impl AsRef<Path>) -> Result<(), OcrError> {
        let generation = self.begin_loading()?;
        let model_dir = model_dir.as_ref();

        tracing::info!(model_dir = %model_dir.display(), "loading OCR model");

        let result = load_guarded(self.loader.as_ref(), model_dir);
        let outcome = result.as_ref().map(|_| ()).map_err(|error| error.clone());
        self.apply_load_outcome(LoadOutcome { generation, result });
        outcome
    }

    /// Block until a pending load finishes or the timeout expires.
    ///
    /// Returns true if the engine ends up loaded.
    pub fn wait_initialized(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;

        loop {
            let state = self.state();
            if state != OcrEngineState::Loading {
                return state.is_loaded();
            }

            match self.inbox_rx.recv_deadline(deadline) {
                Ok(outcome) => self.apply_load_outcome(outcome),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return false
                }
            }
        }
    }

    /// Apply finished background loads and drain pending notifications.
    pub fn poll_events(&self) -> Vec<EngineEvent> {
        while let Ok(outcome) = self.inbox_rx.try_recv() {
            self.apply_load_outcome(outcome);
        }
        self.events_rx.try_iter().collect()
    }

    /// Release the model and return to `Uninitialized`.
    ///
    /// A load still running in the background is abandoned. A recognition
    /// in flight completes but the engine stays uninitialized afterwards.
    pub fn shutdown(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.model.write().take();

        let previous = self.swap_state(OcrEngineState::Uninitialized);
        if previous != OcrEngineState::Uninitialized {
            tracing::info!(from = %previous, "OCR engine shut down");
            self.emit(EngineEvent::StateChanged(OcrEngineState::Uninitialized));
        }
    }

    /// Recognize text, returning merged text, confidence and timing only.
    pub fn recognize(&self, image: &DynamicImage) -> OcrResult {
        self.recognize_detailed(image).into_summary()
    }

    /// Recognize text, keeping per-line boxes, texts and scores.
    ///
    /// Never panics or blocks on another recognition; every failure is
    /// reported through the returned result.
    pub fn recognize_detailed(&self, image: &DynamicImage) -> OcrResult {
        let start = Instant::now();

        if !self.is_ready() {
            return OcrResult::failure(OcrError::NotReady.to_string(), start.elapsed());
        }

        let (width, height) = (image.width(), image.height());
        if width < MIN_IMAGE_DIMENSION || height < MIN_IMAGE_DIMENSION {
            let error = OcrError::InvalidImage { width, height };
            tracing::debug!(width, height, "rejecting image before recognition");
            return OcrResult::failure(error.to_string(), start.elapsed());
        }

        if !self.transition(OcrEngineState::Ready, OcrEngineState::Processing) {
            return OcrResult::failure(OcrError::NotReady.to_string(), start.elapsed());
        }

        let result = match self.model.read().clone() {
            Some(model) => {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| model.recognize(image)))
                    .unwrap_or_else(|payload| {
                        Err(OcrError::ModelError(format!(
                            "model panicked: {}",
                            panic_message(payload.as_ref())
                        )))
                    });

                match outcome {
                    Ok(raw) => OcrResult::from_raw(raw, start.elapsed()),
                    Err(error) => {
                        tracing::warn!(%error, "OCR recognition failed");
                        *self.last_error.lock() = Some(error.to_string());
                        OcrResult::failure(error.to_string(), start.elapsed())
                    }
                }
            }
            None => OcrResult::failure(OcrError::NotReady.to_string(), start.elapsed()),
        };

        // Fails only if shutdown() ran meanwhile; the engine then stays down.
        self.transition(OcrEngineState::Processing, OcrEngineState::Ready);

        tracing::debug!(
            width,
            height,
            lines = result.texts.len(),
            elapsed_ms = result.elapsed_ms,
            success = result.success,
            "OCR recognition finished"
        );

        result
    }

    fn begin_loading(&self) -> Result<u64, OcrError> {
        let mut current = self.state.load(Ordering::Acquire);

        loop {
            match OcrEngineState::from_u8(current) {
                OcrEngineState::Loading => return Err(OcrError::AlreadyInitializing),
                OcrEngineState::Ready | OcrEngineState::Processing => {
                    return Err(OcrError::AlreadyInitialized)
                }
                OcrEngineState::Uninitialized | OcrEngineState::Error => {}
            }

            match self.state.compare_exchange(
                current,
                OcrEngineState::Loading as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        self.last_error.lock().take();
        self.emit(EngineEvent::StateChanged(OcrEngineState::Loading));
        Ok(self.generation.load(Ordering::Acquire))
    }

    fn apply_load_outcome(&self, outcome: LoadOutcome) {
        if outcome.generation != self.generation.load(Ordering::Acquire) {
            tracing::debug!(generation = outcome.generation, "ignoring stale OCR model load");
            return;
        }

        match outcome.result {
            Ok(model) => {
                // The model must be in place before Ready becomes visible.
                *self.model.write() = Some(model);
                if !self.transition(OcrEngineState::Loading, OcrEngineState::Ready) {
                    self.model.write().take();
                    tracing::debug!(state = %self.state(), "OCR model load superseded");
                    return;
                }
                tracing::info!("OCR model ready");
                self.emit(EngineEvent::StateChanged(OcrEngineState::Ready));
                self.emit(EngineEvent::InitializationFinished {
                    success: true,
                    error: None,
                });
            }
            Err(error) => {
                if !self.transition(OcrEngineState::Loading, OcrEngineState::Error) {
                    tracing::debug!(state = %self.state(), "OCR model load failure superseded");
                    return;
                }
                let message = error.to_string();
                tracing::warn!(error = %message, "OCR model failed to load");
                *self.last_error.lock() = Some(message.clone());
                self.emit(EngineEvent::StateChanged(OcrEngineState::Error));
                self.emit(EngineEvent::InitializationFinished {
                    success: false,
                    error: Some(message),
                });
            }
        }
    }

    fn transition(&self, from: OcrEngineState, to: OcrEngineState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn swap_state(&self, to: OcrEngineState) -> OcrEngineState {
        OcrEngineState::from_u8(self.state.swap(to as u8, Ordering::AcqRel))
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.events_tx.send(event);
    }
}

impl fmt::Debug for OcrEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OcrEngine")
            .field("state", &self.state())
            .field("last_error", &self.last_error())
            .finish()
    }
}

fn load_guarded(loader: &dyn OcrModelLoader, model_dir: &Path) -> Result<Arc<dyn OcrModel>, OcrError> {
    panic::catch_unwind(AssertUnwindSafe(|| loader.load(model_dir))).unwrap_or_else(|payload| {
        Err(OcrError::InitializationFailed(format!(
            "model loader panicked: {}",
            panic_message(payload.as_ref())
        )))
    })
}
