//! Annotated video download handler.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tokio_util::io::ReaderStream;
use tracing::debug;

use vdetect_models::{DownloadNotFound, JobStatus};

use crate::error::ApiResult;
use crate::state::AppState;

/// Build a `Content-Disposition` header value for `filename`.
///
/// Non-ASCII names get an ASCII fallback plus an RFC 5987 `filename*`.
pub fn content_disposition(filename: &str) -> String {
    let plain = |c: char| (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ';

    if filename.chars().all(plain) {
        return format!("attachment; filename=\"{}\"", filename);
    }

    let fallback: String = filename
        .chars()
        .map(|c| if plain(c) { c } else { '_' })
        .collect();

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(filename)
    )
}

/// Download the annotated video for an uploaded filename.
///
/// Unknown or unfinished names answer 200 with `{"error": "File not found"}`
/// (plus the job `status` when a job exists) so existing clients keep
/// working.
pub async fn download(
    State(state): State<AppState>,
    Path(video_name): Path<String>,
) -> ApiResult<Response> {
    let latest = state.jobs().latest_for_filename(&video_name).await;
    let servable = latest
        .as_ref()
        .map_or(true, |record| record.status == JobStatus::Succeeded);

    if servable {
        if let Some(path) = state.workspace().find_output(&video_name).await {
            let file = tokio::fs::File::open(&path).await?;
            let length = file.metadata().await?.len();
            debug!(path = %path.display(), bytes = length, "Serving annotated video");

            let headers = [
                (header::CONTENT_TYPE, "video/mp4".to_string()),
                (header::CONTENT_LENGTH, length.to_string()),
                (header::CONTENT_DISPOSITION, content_disposition(&video_name)),
            ];
            let body = Body::from_stream(ReaderStream::new(file));
            return Ok((headers, body).into_response());
        }
    }

    let status = latest
        .map(|record| record.status)
        .filter(|status| *status != JobStatus::Succeeded);
    Ok(Json(DownloadNotFound::new(status)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_ascii() {
        assert_eq!(
            content_disposition("my clip.mp4"),
            "attachment; filename=\"my clip.mp4\""
        );
    }

    #[test]
    fn test_content_disposition_unicode() {
        assert_eq!(
            content_disposition("vidéo.mp4"),
            "attachment; filename=\"vid_o.mp4\"; filename*=UTF-8''vid%C3%A9o.mp4"
        );
    }

    #[test]
    fn test_content_disposition_quotes() {
        let value = content_disposition("a\"b.mp4");
        assert!(value.starts_with("attachment; filename=\"a_b.mp4\""));
        assert!(value.ends_with("a%22b.mp4"));
    }
}
