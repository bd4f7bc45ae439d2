//! Request handlers.

use axum::Json;
use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::{Value, json};
use tokio_util::io::ReaderStream;

use crate::error::Result;
use crate::intake::{self, RawUpload, UploadLimits};
use crate::order;
use crate::pipeline::MergeRequest;
use crate::server::AppState;
use crate::server::error::from_multipart;

/// Multipart field carrying one uploaded file.
pub const FILES_FIELD: &str = "files";
/// Multipart field carrying the JSON order hint.
pub const ORDER_FIELD: &str = "order";

/// Body of a successful merge response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResponse {
    pub success: bool,
    pub message: String,
    /// Download path of the merged document.
    pub file: String,
    pub page_count: usize,
    pub normalized: bool,
}

/// `POST /merge`
pub async fn merge(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<MergeResponse>> {
    let request = read_merge_request(&mut multipart, state.pipeline.limits()).await?;
    let artifact = state.pipeline.run(request).await?;

    Ok(Json(MergeResponse {
        success: true,
        message: "Documents merged successfully".to_string(),
        file: format!("/download/{}", artifact.file_name),
        page_count: artifact.page_count,
        normalized: artifact.normalized,
    }))
}

/// Collect files and the order hint from the multipart stream.
///
/// File types are checked as soon as a part's headers arrive and sizes are
/// checked chunk by chunk, so oversized or unsupported uploads are refused
/// before their body is buffered.
async fn read_merge_request(
    multipart: &mut Multipart,
    limits: &UploadLimits,
) -> Result<MergeRequest> {
    let mut request = MergeRequest::default();
    let mut request_bytes = 0_u64;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| from_multipart(e, limits))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some(FILES_FIELD) => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_owned);
                intake::classify(&file_name, content_type.as_deref())?;

                let mut data = Vec::new();
                while let Some(chunk) = field.chunk().await.map_err(|e| from_multipart(e, limits))? {
                    request_bytes = request_bytes.saturating_add(chunk.len() as u64);
                    limits.check(
                        &file_name,
                        (data.len() + chunk.len()) as u64,
                        request_bytes,
                    )?;
                    data.extend_from_slice(&chunk);
                }

                request.uploads.push(RawUpload {
                    file_name,
                    content_type,
                    data,
                });
            }
            Some(ORDER_FIELD) => {
                let text = field.text().await.map_err(|e| from_multipart(e, limits))?;
                request.order = Some(order::parse_order_hint(&text)?);
            }
            other => {
                tracing::debug!(field = ?other, "Ignoring unknown multipart field");
            }
        }
    }

    Ok(request)
}

/// `GET /download/{filename}`
pub async fn download(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response> {
    let artifact = state.delivery.open_artifact(&filename).await?;

    let headers = [
        (header::CONTENT_TYPE, "application/pdf".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", artifact.name),
        ),
        (header::CONTENT_LENGTH, artifact.size.to_string()),
    ];
    let body = Body::from_stream(ReaderStream::new(artifact.file));

    Ok((headers, body).into_response())
}

/// `GET /health`
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
