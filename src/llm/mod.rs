//! Schema-constrained text generation.

pub mod openai;
pub mod schema;

use crate::error::Result;
use async_trait::async_trait;

pub use openai::{OpenAiClient, OpenAiConfig};
pub use schema::OutputSchema;

/// A generative model that can be forced to emit JSON matching a schema
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str, schema: &OutputSchema, temperature: f32)
        -> Result<String>;
}
