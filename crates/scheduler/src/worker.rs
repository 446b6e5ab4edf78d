//! Fixed-size worker pool for background text work.
//!
//! Workers run on named threads and pull boxed tasks from a shared channel.
//! A task that panics is logged and dropped; the worker keeps serving the
//! queue, so one bad page never takes the pool (or the process) down.

use crossbeam::channel::{self, Receiver, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// A unit of work executed on a pool thread.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Errors raised by the worker pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// A worker thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// The pool no longer accepts tasks.
    #[error("worker pool is shut down")]
    ShutDown,
}

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker threads to spawn.
    /// Default: number of logical CPU cores.
    pub num_workers: usize,

    /// Prefix for worker thread names (`{prefix}-{id}`).
    pub thread_name_prefix: String,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            num_workers: num_cpus(),
            thread_name_prefix: "pdf-text-worker".to_string(),
        }
    }
}

impl WorkerPoolConfig {
    /// Create a configuration with an explicit worker count.
    ///
    /// A count of zero is raised to one so submitted tasks always run.
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers: num_workers.max(1),
            ..Self::default()
        }
    }

    /// Set the thread name prefix.
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }
}

/// Worker pool for parallel task execution.
///
/// # Example
///
/// ```
/// use pdf_viewer_scheduler::{WorkerPool, WorkerPoolConfig};
/// use std::sync::mpsc;
///
/// let pool = WorkerPool::new(WorkerPoolConfig::new(2)).unwrap();
/// let (tx, rx) = mpsc::channel();
///
/// pool.execute(move || {
///     tx.send(21 * 2).unwrap();
/// })
/// .unwrap();
///
/// assert_eq!(rx.recv().unwrap(), 42);
/// pool.shutdown();
/// ```
pub struct WorkerPool {
    sender: Option<Sender<Task>>,
    workers: Vec<Worker>,
    queued: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// Create and start a new worker pool.
    pub fn new(config: WorkerPoolConfig) -> Result<Self, PoolError> {
        let (sender, receiver) = channel::unbounded::<Task>();
        let queued = Arc::new(AtomicUsize::new(0));
        let num_workers = config.num_workers.max(1);
        let mut workers = Vec::with_capacity(num_workers);

        for id in 0..num_workers {
            let name = format!("{}-{}", config.thread_name_prefix, id);
            workers.push(Worker::spawn(id, name, receiver.clone(), queued.clone())?);
        }

        tracing::debug!(workers = num_workers, "worker pool started");

        Ok(Self {
            sender: Some(sender),
            workers,
            queued,
        })
    }

    /// Queue a task for execution on the next free worker.
    pub fn execute<F>(&self, task: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or(PoolError::ShutDown)?;
        self.queued.fetch_add(1, Ordering::AcqRel);
        sender.send(Box::new(task)).map_err(|_| {
            self.queued.fetch_sub(1, Ordering::AcqRel);
            PoolError::ShutDown
        })
    }

    /// Get the number of worker threads.
    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Number of tasks waiting for a worker.
    pub fn queued_tasks(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    /// Stop accepting tasks, drain the queue and wait for every worker.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        // Closing the channel lets workers exit once the queue is empty.
        self.sender.take();

        let current = thread::current().id();
        for worker in self.workers.drain(..) {
            worker.join(current);
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A single worker thread in the pool.
struct Worker {
    id: usize,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn(
        id: usize,
        name: String,
        receiver: Receiver<Task>,
        queued: Arc<AtomicUsize>,
    ) -> Result<Self, PoolError> {
        let thread = thread::Builder::new()
            .name(name)
            .spawn(move || Self::run(id, receiver, queued))?;

        Ok(Self {
            id,
            thread: Some(thread),
        })
    }

    fn run(id: usize, receiver: Receiver<Task>, queued: Arc<AtomicUsize>) {
        for task in receiver.iter() {
            queued.fetch_sub(1, Ordering::AcqRel);

            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
                tracing::error!(
                    worker = id,
                    panic = panic_message(payload.as_ref()),
                    "task panicked"
                );
            }
        }

        tracing::trace!(worker = id, "worker exiting");
    }

    fn join(mut self, current: thread::ThreadId) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        // The pool can be dropped from inside one of its own tasks; a thread
        // cannot join itself, so that worker is left to exit on its own.
        if thread.thread().id() == current {
            return;
        }

        if thread.join().is_err() {
            tracing::error!(worker = self.id, "worker thread terminated abnormally");
        }
    }
}

/// Extract a printable message from a panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Get the number of logical CPU cores.
fn num_cpus() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[test]
    fn test_worker_pool_config_default() {
        let config = WorkerPoolConfig::default();
        assert!(config.num_workers > 0);
        assert_eq!(config.thread_name_prefix, "pdf-text-worker");
    }

    #[test]
    fn test_worker_pool_config_zero_workers_raised() {
        let config = WorkerPoolConfig::new(0);
        assert_eq!(config.num_workers, 1);
    }

    #[test]
    fn test_worker_pool_config_builder() {
        let config = WorkerPoolConfig::new(3).with_thread_name_prefix("preload");
        assert_eq!(config.num_workers, 3);
        assert_eq!(config.thread_name_prefix, "preload");
    }

    #[test]
    fn test_worker_pool_creation() {
        let pool = WorkerPool::new(WorkerPoolConfig::new(2)).unwrap();
        assert_eq!(pool.num_workers(), 2);
        assert_eq!(pool.queued_tasks(), 0);
        pool.shutdown();
    }

    #[test]
    fn test_worker_pool_executes_tasks() {
        let pool = WorkerPool::new(WorkerPoolConfig::new(2)).unwrap();
        let executed = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let executed = executed.clone();
            pool.execute(move || {
                executed.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(5));
            })
            .unwrap();
        }

        // Shutdown drains the queue before joining.
        pool.shutdown();
        assert_eq!(executed.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_worker_pool_survives_panicking_task() {
        let pool = WorkerPool::new(WorkerPoolConfig::new(1)).unwrap();
        let executed = Arc::new(AtomicUsize::new(0));

        pool.execute(|| panic!("page exploded")).unwrap();

        let after = executed.clone();
        pool.execute(move || {
            after.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        pool.shutdown();
        assert_eq!(executed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_worker_pool_single_worker_runs_in_order() {
        let pool = WorkerPool::new(WorkerPoolConfig::new(1)).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..4 {
            let order = order.clone();
            pool.execute(move || order.lock().unwrap().push(i)).unwrap();
        }

        pool.shutdown();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_worker_threads_are_named() {
        let pool = WorkerPool::new(WorkerPoolConfig::new(1).with_thread_name_prefix("named"))
            .unwrap();
        let (tx, rx) = std::sync::mpsc::channel();

        pool.execute(move || {
            let name = thread::current().name().map(str::to_string);
            tx.send(name).unwrap();
        })
        .unwrap();

        assert_eq!(rx.recv().unwrap().as_deref(), Some("named-0"));
        pool.shutdown();
    }

    #[test]
    fn test_panic_message_formats() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("static message");
        assert_eq!(panic_message(payload.as_ref()), "static message");

        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");

        let payload: Box<dyn std::any::Any + Send> = Box::new(7u32);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }

    #[test]
    fn test_num_cpus() {
        let cpus = num_cpus();
        assert!(cpus > 0);
        assert!(cpus <= 1024);
    }
}
