//! ragchat-bot - Retrieval-augmented chatbot
//!
//! Ties the pipeline together: load files from the documents directory,
//! split and embed them into the vector store, then answer questions by
//! retrieving the closest chunks and asking Gemini with a fixed prompt.
//!
//! The [`Chatbot`] is shared by the interactive CLI and the REST server.

mod chatbot;
pub mod loader;
pub mod prompt;

pub use chatbot::{Answer, Chatbot, ChatbotStatus};
pub use loader::{load_documents, load_file};
pub use prompt::{build_prompt, PROMPT_TEMPLATE};
