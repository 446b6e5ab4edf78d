//! Page text cache with background preloading
//!
//! Maps page index to extracted [`PageTextData`]. A preload sweep fans one
//! extraction task per missing page out to a [`WorkerPool`]; workers insert
//! their results directly under the cache lock and report progress through
//! a [`CacheEvent`] channel drained by the owning (UI) thread.

use crate::config::TextCacheConfig;
use crate::page_text::{ExtractError, PageExtractor, PageTextData};
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use pdf_viewer_scheduler::{panic_message, PoolError, WorkerPool, WorkerPoolConfig};
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

/// Notifications emitted by the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// One more preload task finished (in completion order).
    Progress {
        completed: usize,
        total: usize,
        percent: u8,
    },
    /// The preload sweep finished every task.
    Completed { loaded: usize, failed: usize },
    /// The active preload sweep was cancelled.
    Cancelled,
    /// A page could not be extracted. The sweep continues.
    PageFailed { page_index: usize, error: ExtractError },
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStatistics {
    /// Lookups that found an entry
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// Pages currently cached
    pub entries: usize,
    /// Page cap, `None` for unlimited
    pub max_entries: Option<usize>,
    /// Pages whose extraction failed during preloading
    pub extraction_failures: u64,
}

impl CacheStatistics {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl fmt::Display for CacheStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let limit = self
            .max_entries
            .map_or_else(|| "unlimited".to_string(), |n| n.to_string());

        write!(
            f,
            "hits: {}, misses: {}, hit rate: {:.1}%, entries: {}/{}, extraction failures: {}",
            self.hits,
            self.misses,
            self.hit_rate() * 100.0,
            self.entries,
            limit,
            self.extraction_failures
        )
    }
}

/// A substring match inside a cached page's full text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSearchHit {
    pub page_index: usize,
    /// Character offset of the first matched character
    pub char_start: usize,
    /// Character offset one past the last matched character
    pub char_end: usize,
}

const RUN_ACTIVE: u8 = 0;
const RUN_COMPLETED: u8 = 1;
const RUN_CANCELLED: u8 = 2;

/// State of one preload sweep.
///
/// Tasks keep an `Arc` to the run that spawned them, so a superseded run's
/// stragglers only ever touch their own counters.
struct PreloadRun {
    generation: u64,
    total: usize,
    dispatched: AtomicUsize,
    completed: AtomicUsize,
    loaded: AtomicUsize,
    failed: AtomicUsize,
    status: AtomicU8,
}

impl PreloadRun {
    fn new(generation: u64, total: usize) -> Self {
        Self {
            generation,
            total,
            dispatched: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            loaded: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            status: AtomicU8::new(RUN_ACTIVE),
        }
    }

    fn is_active(&self) -> bool {
        self.status.load(Ordering::Acquire) == RUN_ACTIVE
    }

    fn is_cancelled(&self) -> bool {
        self.status.load(Ordering::Acquire) == RUN_CANCELLED
    }

    /// Moves an active run to a terminal status. Only the first caller wins.
    fn finish(&self, status: u8) -> bool {
        self.status
            .compare_exchange(RUN_ACTIVE, status, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn percent(&self) -> u8 {
        percent_of(self.completed.load(Ordering::Acquire), self.total)
    }
}

fn percent_of(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let ratio = completed.min(total) as f64 / total as f64;
    (ratio * 100.0).round() as u8
}

struct CacheState {
    entries: HashMap<usize, Arc<PageTextData>>,
    max_entries: Option<usize>,
    run: Option<Arc<PreloadRun>>,
    next_generation: u64,
}

impl CacheState {
    /// Insert or overwrite an entry. New keys are rejected once the cap is hit.
    fn insert(&mut self, page_index: usize, data: Arc<PageTextData>) -> bool {
        let at_capacity = self
            .max_entries
            .is_some_and(|max| self.entries.len() >= max);

        if at_capacity && !self.entries.contains_key(&page_index) {
            tracing::debug!(page_index, "text cache full, entry rejected");
            return false;
        }

        self.entries.insert(page_index, data);
        true
    }

    fn is_current(&self, run: &PreloadRun) -> bool {
        self.run
            .as_ref()
            .is_some_and(|current| current.generation == run.generation)
    }
}

/// State shared between the cache handle and its worker tasks.
struct Shared {
    state: Mutex<CacheState>,
    extractor: Arc<dyn PageExtractor>,
    hits: AtomicU64,
    misses: AtomicU64,
    failures: AtomicU64,
    events: Sender<CacheEvent>,
}

impl Shared {
    fn emit(&self, event: CacheEvent) {
        // The receiver lives as long as the cache; a send can only fail
        // while the cache is being dropped.
        let _ = self.events.send(event);
    }

    fn run_preload_task(&self, run: &PreloadRun, page_index: usize) {
        if run.is_cancelled() {
            tracing::trace!(page_index, "preload cancelled, page skipped");
        } else {
            match self.extract_guarded(page_index) {
                Ok(data) => {
                    if self.store_preloaded(run, page_index, data) {
                        run.loaded.fetch_add(1, Ordering::AcqRel);
                    }
                }
                Err(error) => {
                    self.failures.fetch_add(1, Ordering::AcqRel);
                    run.failed.fetch_add(1, Ordering::AcqRel);
                    tracing::warn!(page_index, %error, "page text extraction failed");
                    if run.is_active() {
                        self.emit(CacheEvent::PageFailed { page_index, error });
                    }
                }
            }
        }

        self.finish_task(run);
    }

    /// Runs the extractor, turning a panic into an extraction failure so the
    /// run's completion accounting still happens.
    fn extract_guarded(&self, page_index: usize) -> Result<PageTextData, ExtractError> {
        let data = panic::catch_unwind(AssertUnwindSafe(|| self.extractor.extract(page_index)))
            .unwrap_or_else(|payload| {
                Err(ExtractError::Failed {
                    page: page_index,
                    message: format!("extractor panicked: {}", panic_message(payload.as_ref())),
                })
            })?;

        if data.page() != Some(page_index) {
            return Err(ExtractError::Failed {
                page: page_index,
                message: format!("extractor returned page {}", data.page_index()),
            });
        }

        Ok(data)
    }

    /// Stores a preloaded page unless its run was cancelled or superseded.
    ///
    /// The check and the insert happen under one lock, and cancellation
    /// flips the run status under the same lock.
    fn store_preloaded(&self, run: &PreloadRun, page_index: usize, data: PageTextData) -> bool {
        let mut state = self.state.lock();

        if !state.is_current(run) || !run.is_active() {
            tracing::debug!(
                page_index,
                generation = run.generation,
                "discarding result of stale preload run"
            );
            return false;
        }

        state.insert(page_index, Arc::new(data))
    }

    fn finish_task(&self, run: &PreloadRun) {
        let completed = run.completed.fetch_add(1, Ordering::AcqRel) + 1;

        if !run.is_active() {
            return;
        }

        self.emit(CacheEvent::Progress {
            completed,
            total: run.total,
            percent: percent_of(completed, run.total),
        });

        // Remaining hits zero exactly once; `finish` arbitrates against a
        // concurrent cancellation.
        if completed == run.total && run.finish(RUN_COMPLETED) {
            let loaded = run.loaded.load(Ordering::Acquire);
            let failed = run.failed.load(Ordering::Acquire);
            tracing::info!(
                generation = run.generation,
                loaded,
                failed,
                "text preload finished"
            );
            self.emit(CacheEvent::Completed { loaded, failed });
        }
    }
}

/// Thread-safe page text cache.
///
/// # Example
///
/// ```
/// use pdf_viewer_cache::{ExtractError, PageExtractor, PageTextData, TextCache, TextCacheConfig};
/// use std::sync::Arc;
///
/// struct BlankPages;
///
/// impl PageExtractor for BlankPages {
///     fn page_count(&self) -> usize {
///         3
///     }
///
///     fn extract(&self, page_index: usize) -> Result<PageTextData, ExtractError> {
///         Ok(PageTextData::new(page_index, Vec::new()))
///     }
/// }
///
/// let cache = TextCache::new(Arc::new(BlankPages), &TextCacheConfig::default()).unwrap();
/// cache.add_page_text_data(1, PageTextData::new(1, Vec::new()));
///
/// assert!(cache.contains(1));
/// assert!(cache.get_page_text_data(1).is_valid());
/// assert!(!cache.get_page_text_data(2).is_valid());
/// ```
pub struct TextCache {
    shared: Arc<Shared>,
    pool: Arc<WorkerPool>,
    events: Receiver<CacheEvent>,
}

impl TextCache {
    /// Create a cache with its own preload pool.
    pub fn new(
        extractor: Arc<dyn PageExtractor>,
        config: &TextCacheConfig,
    ) -> Result<Self, PoolError> {
        let pool = WorkerPool::new(
            WorkerPoolConfig::new(config.preload_workers).with_thread_name_prefix("text-preload"),
        )?;
        Ok(Self::with_pool(extractor, Arc::new(pool), config.max_entries))
    }

    /// Create a cache that dispatches preload work to an existing pool.
    pub fn with_pool(
        extractor: Arc<dyn PageExtractor>,
        pool: Arc<WorkerPool>,
        max_entries: Option<usize>,
    ) -> Self {
        let (sender, events) = channel::unbounded();
        let shared = Shared {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                max_entries,
                run: None,
                next_generation: 0,
            }),
            extractor,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            events: sender,
        };

        Self {
            shared: Arc::new(shared),
            pool,
            events,
        }
    }

    /// Start a preload sweep over every page that is not cached yet.
    ///
    /// Any active sweep is cancelled first. Returns immediately; progress
    /// arrives as [`CacheEvent`]s.
    pub fn start_preload(&self) {
        self.cancel_preload();

        let page_count = self.shared.extractor.page_count();
        let (run, missing) = {
            let mut state = self.shared.state.lock();
            let missing: Vec<usize> = (0..page_count)
                .filter(|page| !state.entries.contains_key(page))
                .collect();

            let generation = state.next_generation;
            state.next_generation += 1;

            let run = Arc::new(PreloadRun::new(generation, missing.len()));
            state.run = Some(run.clone());
            (run, missing)
        };

        tracing::info!(
            generation = run.generation,
            pages = missing.len(),
            page_count,
            "starting text preload"
        );

        if missing.is_empty() {
            if run.finish(RUN_COMPLETED) {
                self.shared.emit(CacheEvent::Completed {
                    loaded: 0,
                    failed: 0,
                });
            }
            return;
        }

        for (position, page_index) in missing.iter().copied().enumerate() {
            if run.is_cancelled() {
                // Pages never handed to a worker count as cancelled away.
                for _ in position..missing.len() {
                    self.shared.finish_task(&run);
                }
                break;
            }

            let shared = self.shared.clone();
            let task_run = run.clone();
            let dispatched = self
                .pool
                .execute(move || shared.run_preload_task(&task_run, page_index));

            match dispatched {
                Ok(()) => {
                    run.dispatched.fetch_add(1, Ordering::AcqRel);
                }
                Err(error) => {
                    tracing::warn!(page_index, %error, "could not dispatch preload task");
                    run.failed.fetch_add(1, Ordering::AcqRel);
                    self.shared.finish_task(&run);
                }
            }
        }

        tracing::debug!(
            generation = run.generation,
            dispatched = run.dispatched.load(Ordering::Acquire),
            "preload tasks dispatched"
        );
    }

    /// Cancel the active preload sweep.
    ///
    /// Tasks already running finish but their results are dropped. Emits
    /// [`CacheEvent::Cancelled`] only if a sweep was actually running.
    pub fn cancel_preload(&self) {
        let state = self.shared.state.lock();
        let Some(run) = state.run.as_ref() else {
            return;
        };

        if run.finish(RUN_CANCELLED) {
            tracing::info!(
                generation = run.generation,
                completed = run.completed.load(Ordering::Acquire),
                total = run.total,
                "text preload cancelled"
            );
            self.shared.emit(CacheEvent::Cancelled);
        }
    }

    /// True while a sweep is running (not yet completed or cancelled).
    pub fn is_preloading(&self) -> bool {
        let state = self.shared.state.lock();
        state.run.as_ref().is_some_and(|run| run.is_active())
    }

    /// Percentage of finished tasks in the current or most recent sweep.
    pub fn compute_preload_progress(&self) -> u8 {
        let state = self.shared.state.lock();
        state.run.as_ref().map_or(0, |run| run.percent())
    }

    /// Look up a page. Returns the invalid sentinel on a miss.
    pub fn get_page_text_data(&self, page_index: usize) -> Arc<PageTextData> {
        let cached = {
            let state = self.shared.state.lock();
            state.entries.get(&page_index).cloned()
        };

        match cached {
            Some(data) => {
                self.shared.hits.fetch_add(1, Ordering::Relaxed);
                data
            }
            None => {
                self.shared.misses.fetch_add(1, Ordering::Relaxed);
                Arc::new(PageTextData::invalid())
            }
        }
    }

    /// Insert or overwrite a page. Returns false if the page cap rejected it
    /// or `data` belongs to another page.
    pub fn add_page_text_data(&self, page_index: usize, data: PageTextData) -> bool {
        if data.page() != Some(page_index) {
            tracing::warn!(
                page_index,
                data_page = data.page_index(),
                "rejecting page text stored under the wrong index"
            );
            return false;
        }

        let mut state = self.shared.state.lock();
        state.insert(page_index, Arc::new(data))
    }

    pub fn contains(&self, page_index: usize) -> bool {
        let state = self.shared.state.lock();
        state.entries.contains_key(&page_index)
    }

    /// Remove every cached page. Hit/miss counters are kept.
    pub fn clear(&self) {
        let mut state = self.shared.state.lock();
        state.entries.clear();
    }

    /// Set the page cap. Negative values mean unlimited.
    ///
    /// Lowering the cap below the current size evicts nothing; further new
    /// pages are rejected until the cache is cleared.
    pub fn set_max_cache_size(&self, max_entries: i64) {
        let mut state = self.shared.state.lock();
        state.max_entries = usize::try_from(max_entries).ok();
    }

    pub fn max_cache_size(&self) -> Option<usize> {
        self.shared.state.lock().max_entries
    }

    pub fn cache_size(&self) -> usize {
        self.shared.state.lock().entries.len()
    }

    /// Pages whose extraction failed over the lifetime of the cache.
    pub fn failure_count(&self) -> u64 {
        self.shared.failures.load(Ordering::Acquire)
    }

    pub fn statistics(&self) -> CacheStatistics {
        let state = self.shared.state.lock();
        CacheStatistics {
            hits: self.shared.hits.load(Ordering::Relaxed),
            misses: self.shared.misses.load(Ordering::Relaxed),
            entries: state.entries.len(),
            max_entries: state.max_entries,
            extraction_failures: self.shared.failures.load(Ordering::Acquire),
        }
    }

    /// Human-readable statistics line.
    pub fn get_statistics(&self) -> String {
        self.statistics().to_string()
    }

    /// Search the full text of every cached page.
    ///
    /// Offsets are character offsets into [`PageTextData::full_text`]. Results
    /// are ordered by page, then by position.
    pub fn search(&self, query: &str, case_sensitive: bool) -> Vec<PageSearchHit> {
        if query.is_empty() {
            return Vec::new();
        }

        // Snapshot the entries so the scan runs without holding the lock.
        let pages: Vec<(usize, Arc<PageTextData>)> = {
            let state = self.shared.state.lock();
            state
                .entries
                .iter()
                .map(|(page, data)| (*page, data.clone()))
                .collect()
        };

        let needle = fold_case(query, case_sensitive);
        let needle_chars = needle.chars().count();
        let mut hits = Vec::new();

        for (page_index, data) in pages {
            let haystack = fold_case(data.full_text(), case_sensitive);
            for (byte_offset, _) in haystack.match_indices(needle.as_str()) {
                let char_start = haystack[..byte_offset].chars().count();
                hits.push(PageSearchHit {
                    page_index,
                    char_start,
                    char_end: char_start + needle_chars,
                });
            }
        }

        hits.sort_by_key(|hit| (hit.page_index, hit.char_start));
        hits
    }

    /// Receiver for cache notifications.
    pub fn events(&self) -> Receiver<CacheEvent> {
        self.events.clone()
    }

    /// Drain every pending notification without blocking.
    pub fn drain_events(&self) -> Vec<CacheEvent> {
        self.events.try_iter().collect()
    }

    pub fn extractor(&self) -> &Arc<dyn PageExtractor> {
        &self.shared.extractor
    }
}

impl Drop for TextCache {
    fn drop(&mut self) {
        self.cancel_preload();
    }
}

/// Lowercases one character at a time so character offsets stay aligned
/// with the original text.
fn fold_case(text: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        text.to_string()
    } else {
        text.chars()
            .map(|c| c.to_lowercase().next().unwrap_or(c))
            .collect()
    }
}
