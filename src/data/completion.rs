use std::sync::Arc;

use thiserror::Error;

/// Errors raised by a text-completion collaborator. Always fatal to the
/// operation that issued the request; retrying is the collaborator's call.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("model credential is not configured (set GROQ_API_KEY)")]
    MissingCredential,
    #[error("model request failed: {0}")]
    Request(String),
    #[error("model returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("model response could not be decoded: {0}")]
    Decode(String),
}

/// Synchronous prompt-in, text-out model call.
pub trait Completion: Send + Sync {
    /// Identifier of the model answering the prompts.
    fn model_name(&self) -> &str;

    fn complete(&self, prompt: &str) -> Result<String, TransportError>;
}

impl<T: Completion + ?Sized> Completion for Arc<T> {
    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn complete(&self, prompt: &str) -> Result<String, TransportError> {
        (**self).complete(prompt)
    }
}

impl<T: Completion + ?Sized> Completion for &T {
    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn complete(&self, prompt: &str) -> Result<String, TransportError> {
        (**self).complete(prompt)
    }
}
