//! Route handlers.

use std::path::Path;

use axum::extract::{Multipart, Query, State};
use axum::http::{Method, StatusCode, Uri};
use axum::response::{Html, IntoResponse};
use axum::Json;
use chrono::Utc;
use tracing::{error, info, warn};

use ragchat_core::SUPPORTED_EXTENSIONS;

use crate::error::ApiError;
use crate::state::AppState;
use crate::types::*;

const INDEX_HTML: &str = include_str!("../static/index.html");

/// Multipart field carrying uploaded files.
const UPLOAD_FIELD: &str = "files";

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

pub async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let bot = state.bot()?;
    let status = bot.status().await?;

    Ok(Json(StatusResponse {
        status: "ready".to_string(),
        message: "Chatbot is ready".to_string(),
        documents_loaded: status.documents_loaded,
        vector_store_ready: status.vector_store_ready,
    }))
}

pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let bot = state.bot()?;

    if request.message.trim().is_empty() {
        return Err(ApiError::bad_request("Message cannot be empty"));
    }

    let response = bot
        .generate_response(&request.message, request.include_context)
        .await;

    let now = Utc::now();
    let session_id = request.session_id.unwrap_or_else(|| {
        format!("session_{:.6}", now.timestamp_micros() as f64 / 1_000_000.0)
    });

    Ok(Json(ChatResponse {
        response,
        session_id,
        timestamp: now.to_rfc3339(),
        include_context: request.include_context,
    }))
}

pub async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let bot = state.bot()?;

    let mut history = bot.chat_history();
    let total_count = history.len();

    if query.limit > 0 {
        let keep = usize::try_from(query.limit).unwrap_or(usize::MAX);
        if history.len() > keep {
            history.drain(..history.len() - keep);
        }
    }

    Ok(Json(HistoryResponse {
        history,
        total_count,
    }))
}

pub async fn clear_history(
    State(state): State<AppState>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.bot()?.clear_chat_history();
    Ok(Json(MessageResponse::new("Chat history cleared successfully")))
}

pub async fn reload(State(state): State<AppState>) -> Result<Json<MessageResponse>, ApiError> {
    let bot = state.bot()?;

    tokio::spawn(async move {
        match bot.reload(None).await {
            Ok(0) => warn!("No documents found during reload via API"),
            Ok(count) => info!("Reloaded {} documents via API", count),
            Err(e) => error!("Error reloading documents via API: {}", e),
        }
    });

    Ok(Json(MessageResponse::new("Document reload started in background")))
}

pub async fn list_documents(
    State(state): State<AppState>,
) -> Result<Json<DocumentListResponse>, ApiError> {
    state.bot()?;

    let mut documents = Vec::new();

    if state.documents_dir.exists() {
        let mut entries = tokio::fs::read_dir(&state.documents_dir)
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?
        {
            let metadata = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };

            let path = entry.path();
            documents.push(DocumentInfo {
                filename: entry.file_name().to_string_lossy().into_owned(),
                size: metadata.len(),
                file_type: dotted_extension(&path),
            });
        }
    }

    documents.sort_by(|a, b| a.filename.cmp(&b.filename));

    Ok(Json(DocumentListResponse {
        total_count: documents.len(),
        documents,
    }))
}

pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    state.bot()?;

    tokio::fs::create_dir_all(&state.documents_dir)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let max_mb = state.max_upload_bytes / (1024 * 1024);
    let mut uploaded = Vec::new();
    let mut errors = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let name = field.file_name().unwrap_or_default().to_string();
        if name.is_empty() {
            errors.push("File has no name".to_string());
            continue;
        }

        let Some(safe_name) = safe_file_name(&name) else {
            errors.push(format!("{}: Invalid file name", name));
            continue;
        };

        if !SUPPORTED_EXTENSIONS.contains(&dotted_extension(Path::new(&safe_name)).as_str()) {
            errors.push(format!(
                "{}: Unsupported file type. Only PDF, TXT, and MD files are allowed.",
                name
            ));
            continue;
        }

        let bytes = match field.bytes().await {
            Ok(b) => b,
            Err(e) => {
                errors.push(format!("{}: {}", name, e.body_text()));
                continue;
            }
        };

        if bytes.len() > state.max_upload_bytes {
            errors.push(format!(
                "{}: File too large. Maximum size is {}MB.",
                name, max_mb
            ));
            continue;
        }

        let target = state.documents_dir.join(&safe_name);
        if let Err(e) = tokio::fs::write(&target, &bytes).await {
            errors.push(format!("{}: {}", name, e));
            continue;
        }

        info!("Uploaded file: {} ({} bytes)", safe_name, bytes.len());
        uploaded.push(safe_name);
    }

    if uploaded.is_empty() {
        return Err(ApiError::bad_request(format!(
            "No files uploaded. Errors: {}",
            errors.join("; ")
        )));
    }

    Ok(Json(UploadResponse {
        message: format!("Successfully uploaded {} file(s)", uploaded.len()),
        uploaded_count: uploaded.len(),
        errors,
    }))
}

pub async fn not_found(method: Method, uri: Uri) -> impl IntoResponse {
    ApiError::new(
        StatusCode::NOT_FOUND,
        "Endpoint not found",
        format!("No route for {} {}", method, uri.path()),
    )
}

/// Final path component of a client-supplied file name.
fn safe_file_name(name: &str) -> Option<String> {
    Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
}

/// Lower-cased extension with its leading dot, or an empty string.
fn dotted_extension(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dotted_extension() {
        assert_eq!(dotted_extension(Path::new("Report.PDF")), ".pdf");
        assert_eq!(dotted_extension(Path::new("notes.md")), ".md");
        assert_eq!(dotted_extension(Path::new("README")), "");
    }

    #[test]
    fn test_safe_file_name() {
        assert_eq!(safe_file_name("notes.txt").as_deref(), Some("notes.txt"));
        assert_eq!(safe_file_name("../../etc/notes.txt").as_deref(), Some("notes.txt"));
        assert_eq!(safe_file_name("dir/"), Some("dir".to_string()));
        assert_eq!(safe_file_name(".."), None);
    }
}
