//! Server startup.

use std::sync::Arc;

use tracing::{error, info, warn};

use ragchat_bot::Chatbot;
use ragchat_core::{RagConfig, Result};

use crate::routes::router;
use crate::state::AppState;

/// Initialise the chatbot and serve the API until Ctrl-C.
///
/// A chatbot that fails to come up is logged and the server keeps running;
/// bot routes then answer 503.
pub async fn serve(config: RagConfig) -> Result<()> {
    info!("Starting ragchat API server...");

    let chatbot = match init_chatbot(config.clone()).await {
        Ok(bot) => Some(bot),
        Err(e) => {
            error!("Failed to initialize chatbot: {}", e);
            None
        }
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let app = router(AppState::new(chatbot, &config));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("API server listening on http://{}", addr);
    info!("Web interface available at http://{}/", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("API server stopped");
    Ok(())
}

async fn init_chatbot(config: RagConfig) -> Result<Arc<Chatbot>> {
    let bot = Chatbot::from_config(config)?;

    match bot.initialize().await {
        Ok(0) => warn!("No documents found. Upload documents and reload to enable retrieval."),
        Ok(count) => info!("Chatbot initialized with {} documents", count),
        Err(e) => warn!("Document indexing failed, continuing without context: {}", e),
    }

    Ok(Arc::new(bot))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
