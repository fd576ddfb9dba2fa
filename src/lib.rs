//! Sportsbook odds acquisition and validated prediction generation.
//!
//! Rendered sportsbook pages are scraped into a match cache. A generative model
//! picks bets from the cached matches under a strict output schema, and every
//! pick is checked against the real quoted odds before it is pooled. Consumers
//! draw from the pool instead of waiting on the model.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod events;
pub mod health;
pub mod llm;
pub mod pacing;
pub mod pool;
pub mod registry;
pub mod scheduler;
pub mod search;
pub mod source;
pub mod types;

pub use error::{PipelineError, Result};
