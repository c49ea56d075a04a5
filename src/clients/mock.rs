use std::collections::VecDeque;
use std::sync::Mutex;

use crate::data::{Completion, TransportError};

/// Completion that answers from a fixed script, in order, and records every
/// prompt it receives. Running out of replies is a transport error.
pub struct ScriptedCompletion {
    name: String,
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedCompletion {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: "scripted".to_string(),
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Prompts received so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Completion for ScriptedCompletion {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn complete(&self, prompt: &str) -> Result<String, TransportError> {
        self.prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(prompt.to_string());
        self.replies
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
            .ok_or_else(|| TransportError::Request("scripted completion has no reply left".to_string()))
    }
}
