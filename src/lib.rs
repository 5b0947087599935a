//! tickio: a cooperative, single-threaded task runtime
//!
//! Tasks, timers, promises, coroutines and a bounded worker pool, all fed
//! into one tick-driven loop.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use tickio::runtime::scheduler::TaskBuilder;
//! use tickio::Runtime;
//!
//! let rt = Runtime::new();
//! rt.submit_with(TaskBuilder::new().name("hello").priority(5), || {
//!     println!("runs first");
//! });
//! rt.set_timeout(Duration::from_millis(50), || println!("runs later"));
//! rt.run();
//! ```

#![doc(html_root_url = "https://docs.rs/tickio")]
#![warn(rust_2018_idioms)]

// Public modules
pub mod demo;
pub mod runtime;

// Utility modules
pub mod util;

// Re-exports
pub use anyhow::{Context, Result};
pub use runtime::error::TaskError;
pub use runtime::promise::Promise;
pub use runtime::{Handle, Runtime};
pub use thiserror::Error;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = "tickio";
