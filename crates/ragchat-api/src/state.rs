//! Shared application state.

use std::path::PathBuf;
use std::sync::Arc;

use ragchat_bot::Chatbot;
use ragchat_core::RagConfig;

use crate::error::ApiError;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    /// `None` when startup initialisation failed.
    pub chatbot: Option<Arc<Chatbot>>,
    pub documents_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub cors: bool,
}

impl AppState {
    pub fn new(chatbot: Option<Arc<Chatbot>>, config: &RagConfig) -> Self {
        Self {
            chatbot,
            documents_dir: config.storage.documents_dir.clone(),
            max_upload_bytes: config.server.max_upload_bytes,
            cors: config.server.cors,
        }
    }

    /// The chatbot, or a 503 when it never came up.
    pub fn bot(&self) -> Result<Arc<Chatbot>, ApiError> {
        self.chatbot.clone().ok_or_else(ApiError::not_initialized)
    }
}
