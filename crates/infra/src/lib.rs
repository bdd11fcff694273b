//! Infrastructure layer: configuration, task storage, the durable queue,
//! lane dispatch and the queue worker.

pub mod config;
pub mod jobs;

pub use config::{ConfigError, Settings};
