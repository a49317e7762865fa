//! HTTP inbound adapter.
//!
//! - `POST /convert` queues a job for an uploaded file or a URL
//! - `GET /status/:job_id` reports a job's externally visible state
//! - `GET /download/:filename` serves a produced artifact

pub mod error;
pub mod handlers;

use crate::application::submission::SubmissionService;
use crate::ports::queue::JobQueuePort;
use crate::ports::repository::JobStateRepository;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub struct AppState<Q, R> {
    pub service: Arc<SubmissionService<Q, R>>,
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
    pub server_url: String,
}

// derive(Clone) would require Q: Clone and R: Clone
impl<Q, R> Clone for AppState<Q, R> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            upload_dir: self.upload_dir.clone(),
            output_dir: self.output_dir.clone(),
            server_url: self.server_url.clone(),
        }
    }
}

pub fn router<Q, R>(state: AppState<Q, R>) -> Router
where
    Q: JobQueuePort + 'static,
    R: JobStateRepository + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/convert", post(handlers::convert::<Q, R>))
        .route("/status/:job_id", get(handlers::status::<Q, R>))
        .route("/download/:filename", get(handlers::download::<Q, R>))
        .layer(DefaultBodyLimit::disable())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
