use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use clap::Parser;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnResponse, TraceLayer};
use tracing::{Level, error, info, warn};

mod handlers;
mod metrics;

use voicebook::cli::RecognizerArgs;
use voicebook::{Library, ProcessRecognizer, Recognizer};

#[derive(Parser, Debug)]
#[command(name = "voicebook-server")]
#[command(about = "HTTP server for narrating books paragraph by paragraph")]
struct Params {
    /// Directory holding one sub-directory per book.
    #[arg(long = "books-dir", env = "VOICEBOOK_BOOKS_DIR", default_value = "books")]
    books_dir: PathBuf,

    /// Host interface to bind to.
    #[arg(long = "host", default_value = "0.0.0.0")]
    host: String,

    /// TCP port to listen on.
    #[arg(long = "port", default_value_t = 5001)]
    port: u16,

    /// Maximum request body size (bytes).
    #[arg(long = "max-bytes", default_value_t = 100 * 1024 * 1024)]
    max_bytes: usize,

    #[command(flatten)]
    recognizer: RecognizerArgs,
}

#[derive(Clone)]
struct AppState {
    library: Arc<Library>,
    recognizer: Arc<dyn Recognizer>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<voicebook::Error> for AppError {
    fn from(err: voicebook::Error) -> Self {
        use voicebook::Error;

        let status = match &err {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Recognition(_) => StatusCode::BAD_GATEWAY,
            Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %err, "request failed");
        }

        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        Self {
            status: err.status(),
            message: err.body_text(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            success: false,
            message: self.message,
        });
        (self.status, body).into_response()
    }
}

#[tokio::main]
async fn main() {
    voicebook::init_logging();

    if let Err(err) = run().await {
        error!(error = ?err, "voicebook-server failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let params = Params::parse();

    if let Err(err) = metrics::init() {
        warn!(error = ?err, "metrics disabled (init failed)");
    }

    let addr: SocketAddr = format!("{}:{}", params.host, params.port)
        .parse()
        .context("invalid host/port bind address")?;

    let library = Library::open(&params.books_dir).with_context(|| {
        format!("failed to open books directory {}", params.books_dir.display())
    })?;
    let opts = params.recognizer.to_opts();
    info!(
        books_dir = %params.books_dir.display(),
        recognizer = %opts.program.display(),
        timeout = ?opts.timeout,
        "library ready"
    );

    let state = AppState {
        library: Arc::new(library),
        recognizer: Arc::new(ProcessRecognizer::new(opts)),
    };

    let app = router(state, params.max_bytes);

    let listener = TcpListener::bind(addr).await.context("bind failed")?;
    info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

fn router(state: AppState, max_bytes: usize) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics::prometheus_metrics))
        .route("/api/books", get(handlers::list_books))
        .route("/api/book/new", post(handlers::new_book))
        .route("/api/book/{book_id}", get(handlers::get_book))
        .route("/api/book/{book_id}/update", post(handlers::update_book))
        .route("/api/book/{book_id}/delete", delete(handlers::delete_book))
        .route("/api/book/{book_id}/chapter/new", post(handlers::new_chapter))
        .route(
            "/api/book/{book_id}/chapter/{chapter_id}/update",
            post(handlers::update_chapter),
        )
        .route(
            "/api/book/{book_id}/chapter/{chapter_id}/delete",
            delete(handlers::delete_chapter),
        )
        .route(
            "/api/chapter/{book_id}/{chapter_id}/paragraphs",
            get(handlers::get_paragraphs),
        )
        .route(
            "/api/chapter/{book_id}/{chapter_id}/paragraph/add",
            post(handlers::add_paragraph),
        )
        .route(
            "/api/chapter/{book_id}/{chapter_id}/paragraph/update",
            post(handlers::update_paragraph),
        )
        .route(
            "/api/chapter/{book_id}/{chapter_id}/paragraph/delete/{paragraph_id}",
            delete(handlers::delete_paragraph),
        )
        .route(
            "/api/chapter/{book_id}/{chapter_id}/paragraph/move/{paragraph_id}/{direction}",
            post(handlers::move_paragraph),
        )
        .route(
            "/api/chapter/{book_id}/{chapter_id}/audio/upload/{paragraph_id}",
            post(handlers::upload_audio),
        )
        .route(
            "/api/chapter/{book_id}/{chapter_id}/audio/delete/{paragraph_id}",
            post(handlers::delete_audio),
        )
        .route(
            "/api/audio/{book_id}/{chapter_id}/{filename}",
            get(handlers::get_audio),
        )
        .route("/api/recognize-audio", post(handlers::recognize_audio))
        .route_layer(from_fn(metrics::track_http_metrics))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_bytes))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(
                    DefaultMakeSpan::new()
                        .level(Level::INFO)
                        .include_headers(false),
                )
                .on_response(DefaultOnResponse::new().level(Level::INFO))
                .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
        )
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

async fn root() -> &'static str {
    "voicebook-server: JSON API under /api (books, chapters, paragraphs, audio, recognize-audio)"
}

async fn healthz() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_defaults() -> anyhow::Result<()> {
        let params = Params::try_parse_from(["voicebook-server"])?;
        assert_eq!(params.books_dir, PathBuf::from("books"));
        assert_eq!(params.host, "0.0.0.0");
        assert_eq!(params.port, 5001);
        assert_eq!(params.max_bytes, 100 * 1024 * 1024);
        assert_eq!(params.recognizer.timeout_secs, 600);
        Ok(())
    }

    #[test]
    fn library_errors_map_to_statuses() {
        use std::time::Duration;
        use voicebook::{Entity, Error};

        let cases = [
            (Error::NotFound(Entity::Chapter), StatusCode::NOT_FOUND),
            (Error::Validation("x".into()), StatusCode::BAD_REQUEST),
            (Error::Recognition("x".into()), StatusCode::BAD_GATEWAY),
            (Error::Timeout(Duration::from_secs(1)), StatusCode::GATEWAY_TIMEOUT),
            (Error::Message("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status, status);
        }
    }

    #[test]
    fn not_found_message_names_the_entity() {
        let err = AppError::from(voicebook::Error::NotFound(voicebook::Entity::Audio));
        assert_eq!(err.message, "audio file not found");
    }
}
