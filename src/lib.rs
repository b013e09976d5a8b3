//! resfetch - resource fetch and cache engine
//!
//! Materializes versioned CI resources into worker volumes exactly once per
//! cache identity and worker, and runs resource scripts and build tasks in
//! containers owned by deterministic keys.

pub mod atc;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
mod persist;
pub mod resource;
pub mod runtime;
pub mod worker;

pub use error::{ResfetchError, ResfetchResult};
