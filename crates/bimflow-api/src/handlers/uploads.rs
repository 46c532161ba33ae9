use crate::error::{ErrorResponse, HttpAppError};
use crate::identity::Caller;
use crate::services::ingestion::UploadRequest;
use crate::state::AppState;
use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    Json,
};
use bimflow_core::AppError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    /// Hex SHA-256 of the uploaded bytes.
    pub content_id: String,
    /// `staged` for new content, `duplicate` when the bytes were already known.
    pub status: String,
    pub job_id: uuid::Uuid,
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(err.body_text())
    } else {
        AppError::InvalidInput(format!("Malformed multipart body: {}", err.body_text()))
    }
}

/// Upload a design file and queue its translation.
///
/// Text parts `declaredName` and `declaredSize` are honoured only when they
/// come before the `file` part; the file is streamed straight to disk and
/// nothing after it is read.
#[utoipa::path(
    post,
    path = "/api/v0/uploads",
    tag = "uploads",
    params(
        ("X-User-Id" = Option<String>, Header, description = "Caller identity recorded on the job")
    ),
    request_body(content = inline(Object), content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "New content stored, translation queued", body = UploadResponse),
        (status = 200, description = "Content already known", body = UploadResponse),
        (status = 400, description = "Invalid type, size or missing file", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    )
)]
pub async fn upload_model(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), HttpAppError> {
    let mut declared_name: Option<String> = None;
    let mut declared_size: Option<u64> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let part = field.name().map(str::to_owned);
        match part.as_deref() {
            Some("declaredName") => {
                let name = field.text().await.map_err(multipart_error)?;
                declared_name = Some(name.trim().to_string()).filter(|n| !n.is_empty());
            }
            Some("declaredSize") => {
                let raw = field.text().await.map_err(multipart_error)?;
                let size = raw.trim().parse::<u64>().map_err(|_| {
                    AppError::InvalidInput(format!("declaredSize is not a byte count: {}", raw))
                })?;
                declared_size = Some(size);
            }
            Some("file") => {
                let name = declared_name
                    .take()
                    .or_else(|| field.file_name().map(String::from))
                    .unwrap_or_default();
                let mime_hint = field.content_type().map(String::from);

                tracing::debug!(
                    declared_name = %name,
                    declared_size = ?declared_size,
                    mime = ?mime_hint,
                    user = %caller.as_str(),
                    "Receiving upload"
                );

                let request = UploadRequest {
                    stream: field,
                    declared_name: name,
                    declared_size,
                    mime_hint,
                };
                let outcome = state.ingestion.ingest(request, caller.as_str()).await?;

                let (status, label) = if outcome.duplicate {
                    (StatusCode::OK, "duplicate")
                } else {
                    (StatusCode::CREATED, "staged")
                };
                return Ok((
                    status,
                    Json(UploadResponse {
                        content_id: outcome.record.content_id,
                        status: label.to_string(),
                        job_id: outcome.job.job_id,
                    }),
                ));
            }
            other => {
                tracing::debug!(part = ?other, "Ignoring unknown multipart part");
            }
        }
    }

    Err(AppError::InvalidInput("Missing file part".to_string()).into())
}
