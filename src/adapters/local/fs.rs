use crate::domain::jobs::JobSource;
use crate::ports::storage::{SourceStorage, StageError};
use async_trait::async_trait;
use axum::body::Bytes;
use axum::BoxError;
use futures::{Stream, TryStreamExt};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::io::StreamReader;
use tracing::info;

/// Stages job sources on the local filesystem, downloading remote ones.
#[derive(Clone)]
pub struct FsAdapter {
    client: reqwest::Client,
}

impl FsAdapter {
    pub fn new(fetch_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(fetch_timeout).build()?;
        Ok(Self { client })
    }

    async fn fetch(&self, url: &str, work_dir: &Path) -> Result<PathBuf, StageError> {
        let fetch_error = |message: String| StageError::Fetch {
            url: url.to_string(),
            message,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| fetch_error(e.to_string()))?;

        let path = work_dir.join(remote_file_name(url));
        stream_to_file(&path, response.bytes_stream())
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        info!(url, path = %path.display(), "source fetched");
        Ok(path)
    }
}

#[async_trait]
impl SourceStorage for FsAdapter {
    async fn stage(&self, source: &JobSource, work_dir: &Path) -> Result<PathBuf, StageError> {
        match source {
            JobSource::Upload { path } => {
                if tokio::fs::try_exists(path).await? {
                    Ok(path.clone())
                } else {
                    Err(StageError::Missing(path.clone()))
                }
            }
            JobSource::Url { url } => self.fetch(url, work_dir).await,
        }
    }
}

// Save a `Stream` to a file
pub async fn stream_to_file<S, E>(path: &Path, stream: S) -> io::Result<()>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<BoxError>,
{
    let body_with_io_error = stream.map_err(|err| io::Error::new(io::ErrorKind::Other, err));
    let body_reader = StreamReader::new(body_with_io_error);
    futures::pin_mut!(body_reader);

    let mut file = BufWriter::new(File::create(path).await?);
    tokio::io::copy(&mut body_reader, &mut file).await?;
    file.flush().await?;
    Ok(())
}

pub fn path_is_valid(path: &Path) -> bool {
    path.components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

/// Reduce a client-supplied name to a single safe path component.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

fn remote_file_name(url: &str) -> String {
    let last = reqwest::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_owned))
        })
        .filter(|segment| !segment.is_empty());
    format!(
        "source_{}",
        sanitize_file_name(last.as_deref().unwrap_or("download"))
    )
}
