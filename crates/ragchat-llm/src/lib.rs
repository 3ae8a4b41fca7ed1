//! ragchat-llm - Language model clients
//!
//! - [`GeminiClient`] talks to the Google Generative Language REST API.
//! - [`MockLanguageModel`] returns canned answers and records prompts.

mod gemini;
mod mock;

pub use gemini::GeminiClient;
pub use mock::MockLanguageModel;

// Re-export the LanguageModel trait for convenience
pub use ragchat_core::LanguageModel;
