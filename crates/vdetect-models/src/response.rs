//! HTTP payloads shared by the API and its clients.

use serde::{Deserialize, Serialize};

use crate::{JobId, JobStatus};

/// Build the download URL for an output artifact.
///
/// The filename is used verbatim: no escaping, no normalization.
pub fn download_url_for(filename: &str) -> String {
    format!("/download/{}", filename)
}

/// Acknowledgement returned by `POST /predict/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictResponse {
    pub message: String,
    pub download_url: String,
    pub job_id: JobId,
    pub status_url: String,
}

impl PredictResponse {
    pub fn accepted(job_id: JobId, filename: &str) -> Self {
        Self {
            message: format!("Video {} is being processed.", filename),
            download_url: download_url_for(filename),
            status_url: format!("/jobs/{}", job_id),
            job_id,
        }
    }
}

/// Body returned by `GET /download/{name}` when no finished output exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadNotFound {
    pub error: String,
    /// Status of the most recent job for the name, if one exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
}

impl DownloadNotFound {
    pub const MESSAGE: &'static str = "File not found";

    pub fn new(status: Option<JobStatus>) -> Self {
        Self {
            error: Self::MESSAGE.to_string(),
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_url_is_verbatim() {
        assert_eq!(download_url_for("clip.mp4"), "/download/clip.mp4");
        assert_eq!(download_url_for("my video.mp4"), "/download/my video.mp4");
        assert_eq!(download_url_for("видео 🎥.mp4"), "/download/видео 🎥.mp4");
    }

    #[test]
    fn test_predict_response_shape() {
        let resp = PredictResponse::accepted(JobId::from_string("j1"), "cat.mp4");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["message"], "Video cat.mp4 is being processed.");
        assert_eq!(json["download_url"], "/download/cat.mp4");
        assert_eq!(json["job_id"], "j1");
        assert_eq!(json["status_url"], "/jobs/j1");
    }

    #[test]
    fn test_not_found_body() {
        let json = serde_json::to_string(&DownloadNotFound::new(None)).unwrap();
        assert_eq!(json, r#"{"error":"File not found"}"#);

        let json = serde_json::to_value(DownloadNotFound::new(Some(JobStatus::Running))).unwrap();
        assert_eq!(json["error"], "File not found");
        assert_eq!(json["status"], "running");
    }
}
