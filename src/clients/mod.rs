mod cached;
mod groq;
mod mock;

pub use cached::{CachedCompletion, model_hash};
pub use groq::{DEFAULT_MODEL, GROQ_API_BASE, GroqClient, GroqConfig};
pub use mock::ScriptedCompletion;
