//! CLI command implementations

pub mod cache;
pub mod check;
mod common;
pub mod config;
pub mod fetch;
pub mod put;
pub mod task;

pub use cache::execute as cache;
pub use check::execute as check;
pub use config::execute as config;
pub use fetch::execute as fetch;
pub use put::execute as put;
pub use task::execute as task;
