//! Background Tasks Module
//!
//! Work that runs outside the request path.
//!
//! # Tasks
//! - Expiry sweep: removes expired entries from the in-process store
//! - Warm: builds warm batches from a `WarmSource` and runs them at startup

mod cleanup;
mod warm;

pub use cleanup::spawn_cleanup_task;
pub use warm::{run_startup_warm, SeedEntry, SeedWarmSource, WarmSource};
