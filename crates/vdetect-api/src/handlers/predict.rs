//! Video upload handler.

use axum::extract::{Multipart, State};
use axum::Extension;
use axum::Json;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use vdetect_models::PredictResponse;
use vdetect_worker::validate_filename;

use crate::error::{ApiError, ApiResult};
use crate::middleware::RequestId;
use crate::state::AppState;

/// Multipart field carrying the video.
const FILE_FIELD: &str = "file";

/// Accept a video upload and queue it for object detection.
///
/// The upload is streamed to a scratch file as received. The response is
/// returned as soon as the job is queued; poll `status_url` or the download
/// URL for the result.
pub async fn predict(
    State(state): State<AppState>,
    request_id: Option<Extension<RequestId>>,
    mut multipart: Multipart,
) -> ApiResult<Json<PredictResponse>> {
    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            debug!(field = ?field.name(), "Skipping multipart field");
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ApiError::bad_request("Upload is missing a filename"))?;
        validate_filename(&filename)?;

        let scratch = state.workspace().new_scratch()?;
        let mut file = tokio::fs::File::create(scratch.path()).await?;
        let mut received: u64 = 0;
        while let Some(chunk) = field.chunk().await? {
            file.write_all(&chunk).await?;
            received += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        let record = state.executor.submit(filename, scratch).await?;
        info!(
            request_id = request_id.as_ref().map(|Extension(id)| id.0.as_str()),
            job_id = %record.job_id,
            filename = %record.filename,
            bytes = received,
            "Upload accepted"
        );

        return Ok(Json(PredictResponse::accepted(
            record.job_id,
            &record.filename,
        )));
    }

    Err(ApiError::bad_request(format!(
        "Missing '{}' field in multipart body",
        FILE_FIELD
    )))
}
