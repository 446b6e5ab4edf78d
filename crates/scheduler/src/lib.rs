//! PDF Viewer Scheduler Library
//!
//! Bounded worker pool used to fan background text work (page extraction,
//! OCR recognition) out across threads.
//!
//! # Example
//!
//! ```
//! use pdf_viewer_scheduler::{WorkerPool, WorkerPoolConfig};
//!
//! let pool = WorkerPool::new(WorkerPoolConfig::new(4)).unwrap();
//! for page in 0..8 {
//!     pool.execute(move || {
//!         let _ = page; // extract the page here
//!     })
//!     .unwrap();
//! }
//! pool.shutdown();
//! ```

mod worker;

pub use worker::{panic_message, PoolError, Task, WorkerPool, WorkerPoolConfig};
