use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::adapters::local::fs::{path_is_valid, sanitize_file_name, stream_to_file};
use crate::domain::jobs::{download_url, JobId, JobSnapshot, JobSource, JobState};
use crate::ports::queue::JobQueuePort;
use crate::ports::repository::JobStateRepository;
use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::io::ErrorKind;
use std::path::Component;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_files: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_urls: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl StatusResponse {
    pub fn unknown() -> Self {
        Self {
            status: "unknown",
            job_id: None,
            output_files: None,
            download_urls: None,
            error: None,
            updated_at: None,
        }
    }

    pub fn from_snapshot(snapshot: &JobSnapshot, server_url: &str) -> Self {
        let mut response = Self {
            status: status_label(snapshot.state),
            job_id: Some(snapshot.job_id),
            updated_at: Some(snapshot.updated_at),
            ..Self::unknown()
        };
        match snapshot.state {
            JobState::Succeeded => {
                let files: Vec<String> = snapshot
                    .outputs()
                    .iter()
                    .map(|output| output.file_name.clone())
                    .collect();
                response.download_urls = Some(
                    files
                        .iter()
                        .map(|file| download_url(server_url, file))
                        .collect(),
                );
                response.output_files = Some(files);
            }
            JobState::Failed => response.error = snapshot.error().map(str::to_owned),
            JobState::Pending | JobState::Running => {}
        }
        response
    }
}

fn status_label(state: JobState) -> &'static str {
    match state {
        JobState::Pending => "pending",
        JobState::Running => "running",
        JobState::Succeeded => "completed",
        JobState::Failed => "failed",
    }
}

/// Accept a multipart `file` upload or a `url` field and queue a job for it.
pub async fn convert<Q, R>(
    State(state): State<AppState<Q, R>>,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse>
where
    Q: JobQueuePort + 'static,
    R: JobStateRepository + 'static,
{
    let mut source = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                let Some(original) = field.file_name().map(str::to_owned) else {
                    continue;
                };
                let file_name = format!(
                    "{}_{}",
                    Uuid::new_v4().simple(),
                    sanitize_file_name(&original)
                );
                let path = state.upload_dir.join(&file_name);
                tokio::fs::create_dir_all(&state.upload_dir)
                    .await
                    .map_err(|e| ApiError::internal(e.to_string()))?;
                stream_to_file(&path, field)
                    .await
                    .map_err(|e| ApiError::internal(e.to_string()))?;
                info!(path = %path.display(), "upload saved");
                source = Some(JobSource::Upload { path });
                break;
            }
            Some("url") => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(e.to_string()))?;
                let url = raw.trim();
                if url.is_empty() {
                    continue;
                }
                source = Some(JobSource::Url {
                    url: validate_source_url(url)?,
                });
                break;
            }
            _ => continue,
        }
    }

    let source = source.ok_or_else(|| ApiError::bad_request("No file provided"))?;
    let job_id = state.service.submit(source).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "accepted", "job_id": job_id })),
    ))
}

fn validate_source_url(raw: &str) -> ApiResult<String> {
    let url = reqwest::Url::parse(raw)
        .map_err(|e| ApiError::bad_request(format!("Invalid url: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url.to_string()),
        other => Err(ApiError::bad_request(format!(
            "Unsupported url scheme: {other}"
        ))),
    }
}

/// Unknown and malformed ids both answer `unknown`, as does an unreachable store.
pub async fn status<Q, R>(
    State(state): State<AppState<Q, R>>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<StatusResponse>>
where
    Q: JobQueuePort + 'static,
    R: JobStateRepository + 'static,
{
    let Ok(job_id) = job_id.parse::<JobId>() else {
        return Ok(Json(StatusResponse::unknown()));
    };
    let response = match state.service.status(&job_id).await {
        Ok(Some(snapshot)) => StatusResponse::from_snapshot(&snapshot, &state.server_url),
        Ok(None) => StatusResponse::unknown(),
        Err(e) => {
            warn!(job_id = %job_id, error = %e, "status lookup failed, answering unknown");
            StatusResponse::unknown()
        }
    };
    Ok(Json(response))
}

pub async fn download<Q, R>(
    State(state): State<AppState<Q, R>>,
    Path(filename): Path<String>,
) -> ApiResult<Response>
where
    Q: JobQueuePort + 'static,
    R: JobStateRepository + 'static,
{
    let requested = std::path::Path::new(&filename);
    let single_name = matches!(
        requested.components().collect::<Vec<_>>().as_slice(),
        [Component::Normal(_)]
    );
    if !single_name || !path_is_valid(requested) {
        return Err(ApiError::bad_request("Invalid file name"));
    }

    let path = state.output_dir.join(requested);
    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ApiError::not_found(format!("{filename} not found")))
        }
        Err(e) => return Err(ApiError::internal(e.to_string())),
    };

    let headers = [
        (header::CONTENT_TYPE, content_type(&filename).to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        ),
    ];
    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}

fn content_type(filename: &str) -> &'static str {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "mp3" => "audio/mpeg",
        "ogg" | "oga" | "opus" => "audio/ogg",
        "m4a" | "aac" => "audio/mp4",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        _ => "application/octet-stream",
    }
}
