//! `pathforge-ai`
//!
//! **Responsibility:** turn validated generation parameters into a learning path.
//!
//! - The [`TaskExecutor`] trait is the seam the orchestration layer depends on.
//! - [`LearningPathGenerator`] is the production executor: prompt, provider call,
//!   output extraction and normalization.
//! - Provider transport lives behind [`llm::LlmClient`] so tests and dev mode
//!   never touch the network.
//!
//! The executor never mutates caller-visible state; it only returns a result or
//! an error description.

pub mod executor;
pub mod generator;
pub mod llm;
pub mod prompt;
pub mod provider;
pub mod result;

pub use executor::TaskExecutor;
pub use generator::LearningPathGenerator;
pub use provider::{ProviderConfig, ProviderEndpoint};
pub use result::{ExecutionError, LearningPath, Milestone, Resource};
