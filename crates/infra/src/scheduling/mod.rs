//! Scheduling infrastructure for the recurring sharing job
//!
//! The reconciliation worker itself lives in `umbono-core`; this module
//! owns the cron-based trigger with explicit lifecycle management:
//! - start/stop with join handles for spawned tasks
//! - cancellation token support
//! - timeout wrapping on all async operations

pub mod error;
pub mod sharing_scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use sharing_scheduler::{SharingJob, SharingScheduler, SharingSchedulerConfig};
