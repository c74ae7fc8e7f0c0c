pub mod args;
pub mod batch;
pub mod config;
pub mod core;
pub mod errors;
pub mod readwrite;
pub mod runner;
pub mod stats;

pub use batch::{BatchOptions, BatchResult, SiteFailure, SiteResult, simulate_batch};
pub use errors::{QmraError, Result};
