//! Multipart upload into a session's working directory.
//!
//! The file lands where the model's shell commands can reach it, and a
//! synthesized user message tells the model it is there. Conversion of
//! rich formats to plain text is left to the model itself (`pandoc` is on
//! the command whitelist).

use std::path::Path as FsPath;
use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::Json;
use serde::Serialize;
use tracing::info;

use crate::state::AppState;

use super::{bad_request, internal, ApiError, ErrorResponse};

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UploadResponse {
    pub success: bool,
    pub filename: String,
    pub path: String,
}

/// Upload a file
///
/// Saves the first file field into the session's work dir and injects a
/// file-context message into the conversation.
#[utoipa::path(
    post,
    path = "/api/chats/{id}/files",
    tag = "Chats",
    params(("id" = String, Path, description = "Chat ID")),
    responses(
        (status = 200, description = "File stored in the session work dir", body = UploadResponse),
        (status = 400, description = "No file in request", body = ErrorResponse),
        (status = 500, description = "Session or filesystem failure", body = ErrorResponse)
    )
)]
pub async fn chat_upload(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let handle = state
        .registry
        .get_or_start(&id)
        .await
        .map_err(|e| internal(format!("Failed to start session: {e}")))?;
    let work_dir = handle
        .work_dir()
        .await
        .ok_or_else(|| internal("Session unavailable"))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Invalid multipart body: {e}")))?
    {
        let Some(raw_name) = field.file_name().map(ToString::to_string) else {
            continue;
        };
        // Strip any client-supplied directories.
        let filename = FsPath::new(&raw_name)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload.bin")
            .to_string();

        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("Failed to read upload: {e}")))?;

        let dest = work_dir.join(&filename);
        tokio::fs::write(&dest, &bytes)
            .await
            .map_err(|e| internal(format!("Failed to save file: {e}")))?;
        handle
            .add_file_context(&filename)
            .await
            .map_err(|e| internal(format!("Failed to record upload: {e}")))?;

        info!(chat_id = %id, filename = %filename, bytes = bytes.len(), "file uploaded");
        return Ok(Json(UploadResponse {
            success: true,
            filename,
            path: dest.display().to_string(),
        }));
    }

    Err(bad_request("No file field in upload"))
}
