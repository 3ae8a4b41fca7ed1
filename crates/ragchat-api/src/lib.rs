//! ragchat-api - REST API server
//!
//! Exposes the chatbot over HTTP: chat, history, document listing and
//! upload, background reload, status and health, plus a small web chat page
//! at `/`.

mod error;
mod handlers;
mod routes;
mod server;
mod state;
mod types;

pub use error::ApiError;
pub use routes::router;
pub use server::serve;
pub use state::AppState;
pub use types::*;
