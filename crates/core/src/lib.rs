//! `pathforge-core`: request and task primitives shared by every crate.
//!
//! This crate is pure data + validation (no IO, no async).

pub mod error;
pub mod id;
pub mod params;
pub mod task;

pub use error::{DomainError, DomainResult};
pub use id::TaskId;
pub use params::{AiProvider, GenerationParams};
pub use task::{TaskRecord, TaskState, TaskStatus, TransitionError};
