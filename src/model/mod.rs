//! Hosted language model integration.
//! The comparison handler only needs "prompt in, text out", so the
//! provider sits behind [`CompletionModel`].

mod gemini;

use async_trait::async_trait;
use thiserror::Error;

pub use gemini::GeminiClient;

/// Errors raised while calling the language model
#[derive(Error, Debug)]
pub enum ModelError {
    /// Transport-level failure
    #[error("{0}")]
    Http(#[from] reqwest::Error),

    /// The provider rejected the request
    #[error("{status} {message}")]
    Api { status: u16, message: String },

    /// The provider answered without any text
    #[error("model response contained no text")]
    EmptyResponse,
}

/// Opaque text-completion service
#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Send `prompt` and return the model's text reply
    async fn generate(&self, prompt: &str) -> Result<String, ModelError>;
}
