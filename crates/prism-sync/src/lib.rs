//! Scheduled data synchronization for Prism.
//!
//! Keeps externally-sourced record sets fresh: a scheduler decides which
//! data sources are due, and an executor runs one refresh per source under
//! a per-source exclusive lock, reconciling the fetched snapshot against
//! the local cache.

pub mod client;
pub mod error;
pub mod executor;
pub mod lock;
pub mod scheduler;

pub use client::{QueryDescriptor, RecordSource, SourceError, StaticSource};
pub use error::SyncError;
pub use executor::{RefreshExecutor, RunReport};
pub use lock::{RefreshGuard, RefreshLocks};
pub use scheduler::RefreshScheduler;
