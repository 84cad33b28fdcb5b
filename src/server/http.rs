//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo, one task per connection. Request bodies
//! are consumed as streams (multipart uploads never buffer a whole file) and
//! download responses are pull-driven streams, so a slow client throttles
//! storage reads.

use bytes::Bytes;
use futures::TryStreamExt;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Body, Frame};
use hyper::header::{HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::blob::{BlobStore, GridFsBlobStore, MemoryBlobStore};
use crate::config::Args;
use crate::db::MongoClient;
use crate::records::{MemoryRecordStore, MongoRecordStore, RecordStore};
use crate::routes;
use crate::transfer::ChunkStream;
use crate::types::{EmogoError, Result};

/// Response body for every route; streaming bodies are `Send` but not `Sync`.
pub type ResponseBody = UnsyncBoxBody<Bytes, EmogoError>;

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// Vlog blob storage (GridFS or in-memory)
    pub blobs: Arc<dyn BlobStore>,
    /// Sentiment and GPS records
    pub records: Arc<dyn RecordStore>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(args: Args, blobs: Arc<dyn BlobStore>, records: Arc<dyn RecordStore>) -> Self {
        Self {
            args,
            blobs,
            records,
            started_at: Instant::now(),
        }
    }

    /// Create AppState backed by process-local stores (dev mode, tests)
    pub fn in_memory(args: Args) -> Self {
        Self::new(
            args,
            Arc::new(MemoryBlobStore::new()),
            Arc::new(MemoryRecordStore::new()),
        )
    }

    /// Connect to MongoDB and build the GridFS and record stores
    pub async fn connect(args: Args) -> Result<Self> {
        let mongo = MongoClient::new(&args.mongodb_url, &args.mongodb_db).await?;
        let blobs = GridFsBlobStore::new(&mongo, &args.gridfs_bucket);
        let records = MongoRecordStore::new(&mongo).await?;
        Ok(Self::new(args, Arc::new(blobs), Arc::new(records)))
    }

    /// Operating mode reported by `/health`
    pub fn mode(&self) -> &'static str {
        if self.args.dev_mode {
            "development"
        } else {
            "production"
        }
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "EmoGo listening on {} (storage: {})",
        state.args.listen,
        state.blobs.backend()
    );

    if state.args.dev_mode {
        warn!("Development mode enabled");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .preserve_header_case(true)
                        .title_case_headers(true)
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
///
/// Generic over the request body so the router can be driven directly with
/// in-memory bodies.
pub async fn handle_request<B>(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<B>,
) -> std::result::Result<Response<ResponseBody>, Infallible>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("[{}] {} {}", addr, method, path);

    let mut response = match (method, path.as_str()) {
        (Method::OPTIONS, _) => to_boxed(preflight_response()),

        (Method::GET, "/") => to_boxed(routes::root()),

        (Method::GET, "/health") | (Method::GET, "/healthz") => {
            to_boxed(routes::health_check(Arc::clone(&state)))
        }

        // Ingestion
        (Method::POST, "/upload/vlog") => routes::upload_vlog(Arc::clone(&state), req).await,
        (Method::POST, "/upload/sentiment") => {
            routes::upload_sentiment(Arc::clone(&state), req).await
        }
        (Method::POST, "/upload/gps") => routes::upload_gps(Arc::clone(&state), req).await,

        // Bulk export must match before the per-id prefix
        (Method::GET, "/download/vlogs") => routes::download_all(Arc::clone(&state)),
        (Method::GET, p) if p.starts_with("/download/") => {
            routes::download_blob(Arc::clone(&state), p).await
        }

        // Listing
        (Method::GET, "/data") => routes::data_page(Arc::clone(&state)).await,
        (Method::GET, "/api/data") => routes::data_json(Arc::clone(&state)).await,

        _ => to_boxed(not_found_response(&path)),
    };

    response
        .headers_mut()
        .insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));

    Ok(response)
}

/// Convert a Full<Bytes> body to ResponseBody
pub fn to_boxed(response: Response<Full<Bytes>>) -> Response<ResponseBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed_unsync())
}

/// Wrap a chunk stream as a response body; an error aborts the response
pub fn stream_body(chunks: ChunkStream) -> ResponseBody {
    StreamBody::new(chunks.map_ok(Frame::data)).boxed_unsync()
}

/// JSON response with the given status
pub fn json_response(status: StatusCode, body: &serde_json::Value) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

/// Error response with a `detail` message, status picked by the error kind
pub fn error_response(err: &EmogoError) -> Response<Full<Bytes>> {
    let detail = match err {
        EmogoError::NotFound(_) => "File not found".to_string(),
        other => other.to_string(),
    };
    json_response(err.status_code(), &serde_json::json!({ "detail": detail }))
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Access-Control-Allow-Headers", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .body(Full::new(Bytes::new()))
        .unwrap()
}

/// Not found response
fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::NOT_FOUND,
        &serde_json::json!({ "detail": "Not Found", "path": path }),
    )
}
