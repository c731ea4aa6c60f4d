//! Internal implementation of the classification server

use anyhow::{Context, Result};
use base64::Engine as _;
use serde::Deserialize;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener};
use std::sync::Arc;
use std::time::Instant;

use wastesort::classifier::{ClassifyError, ModelService, PredictionResult};
use wastesort::storage::{HistoryRepository, HistoryStore, NewHistoryEntry, PersistenceError};
use wastesort::Config;

use super::microserver::{self, HttpRequest, HttpResponse};
use super::multipart::{self, Part};

/// Form field carrying the uploaded image
const UPLOAD_FIELD: &str = "file";

/// History page size when `limit` is not given
const DEFAULT_LIMIT: i64 = 20;

/// Largest page `/history` serves
const MAX_LIMIT: i64 = 100;

const WELCOME: &str = "Welcome to the Waste Classification API";

// === Server state ===

/// Server state shared across request handlers
pub struct ServerState {
    start_time: Instant,
    version: String,
    max_body: usize,
    model: ModelService,
    history: Box<dyn HistoryRepository>,
}

impl ServerState {
    pub fn new(model: ModelService, history: Box<dyn HistoryRepository>, max_body: usize) -> Self {
        Self {
            start_time: Instant::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            max_body,
            model,
            history,
        }
    }

    fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

// === Errors surfaced to clients ===

#[derive(Debug, thiserror::Error)]
enum ApiError {
    #[error("File must be an image")]
    InvalidMediaType,

    #[error("{0}")]
    BadUpload(String),

    #[error("{0}")]
    InvalidQuery(String),

    #[error(transparent)]
    Classify(#[from] ClassifyError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl ApiError {
    fn status(&self) -> u16 {
        match self {
            ApiError::InvalidMediaType => 400,
            ApiError::BadUpload(_) | ApiError::InvalidQuery(_) => 422,
            ApiError::Classify(_) | ApiError::Persistence(_) => 500,
        }
    }
}

// === API types ===

/// Query string of GET /history
#[derive(Debug, Default, Deserialize)]
struct HistoryQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

// === Helpers ===

/// Consistent JSON error response
fn json_error(status: u16, message: &str) -> HttpResponse {
    HttpResponse::json(status, &serde_json::json!({ "detail": message }))
}

/// Headers on every response: any origin may call the API (the browser
/// front-end is served elsewhere) and clients must not sniff content types
fn with_common_headers(response: HttpResponse) -> HttpResponse {
    response
        .with_header("Access-Control-Allow-Origin", "*")
        .with_header("X-Content-Type-Options", "nosniff")
}

fn is_image(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|ct| ct.parse::<mime::Mime>().ok())
        .map(|m| m.type_() == mime::IMAGE)
        .unwrap_or(false)
}

/// `data:<media-type>;base64,<payload>` for the history log
fn data_uri(upload: &Part) -> Option<String> {
    let content_type = upload.content_type.as_deref()?;
    if upload.data.is_empty() {
        return None;
    }
    let encoded = base64::engine::general_purpose::STANDARD.encode(&upload.data);
    Some(format!("data:{};base64,{}", content_type, encoded))
}

/// Validate `limit`/`offset`; out-of-range values are client errors
fn parse_history_query(query: &str) -> Result<(usize, usize), ApiError> {
    let parsed: HistoryQuery = serde_urlencoded::from_str(query)
        .map_err(|e| ApiError::InvalidQuery(format!("Invalid query parameters: {}", e)))?;

    let limit = parsed.limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(ApiError::InvalidQuery(format!(
            "limit must be between 1 and {}",
            MAX_LIMIT
        )));
    }

    let offset = parsed.offset.unwrap_or(0);
    if offset < 0 {
        return Err(ApiError::InvalidQuery(
            "offset must be greater than or equal to 0".to_string(),
        ));
    }

    Ok((limit as usize, offset as usize))
}

// === Transport-free handlers ===
// Business logic below this line never touches sockets.

/// Route request to handler
fn route_request(request: &HttpRequest, state: &ServerState) -> HttpResponse {
    let result = match (request.method.as_str(), request.path.as_str()) {
        ("OPTIONS", _) => Ok(handle_preflight()),
        ("GET", "/") => Ok(handle_root()),
        ("GET", "/health") => Ok(handle_health(state)),
        ("POST", "/predict") => handle_predict(request, state),
        ("GET", "/history") => handle_history_list(request, state),
        ("DELETE", "/history") => handle_history_clear(state),
        (_, "/" | "/health" | "/predict" | "/history") => {
            Ok(json_error(405, "Method Not Allowed"))
        }
        _ => Ok(json_error(404, "Not Found")),
    };

    let response = result.unwrap_or_else(|e| json_error(e.status(), &e.to_string()));
    with_common_headers(response)
}

/// Handle OPTIONS (CORS preflight)
fn handle_preflight() -> HttpResponse {
    HttpResponse::empty(204)
        .with_header("Access-Control-Allow-Methods", "GET, POST, DELETE, OPTIONS")
        .with_header("Access-Control-Allow-Headers", "*")
        .with_header("Access-Control-Max-Age", "600")
}

/// Handle GET /
fn handle_root() -> HttpResponse {
    HttpResponse::json(200, &serde_json::json!({ "message": WELCOME }))
}

/// Handle GET /health
fn handle_health(state: &ServerState) -> HttpResponse {
    HttpResponse::json(
        200,
        &serde_json::json!({
            "status": "ok",
            "version": state.version,
            "uptime_secs": state.uptime_secs(),
            "model_loaded": state.model.is_loaded(),
        }),
    )
}

/// Handle POST /predict
fn handle_predict(request: &HttpRequest, state: &ServerState) -> Result<HttpResponse, ApiError> {
    let content_type = request
        .header("Content-Type")
        .ok_or_else(|| ApiError::BadUpload("Missing Content-Type header".to_string()))?;
    let parts = multipart::parse(content_type, &request.body)
        .map_err(|e| ApiError::BadUpload(e.to_string()))?;
    let upload = multipart::find_field(&parts, UPLOAD_FIELD)
        .ok_or_else(|| ApiError::BadUpload(format!("Missing form field '{}'", UPLOAD_FIELD)))?;

    if !is_image(upload.content_type.as_deref()) {
        return Err(ApiError::InvalidMediaType);
    }

    let prediction = state.model.classify(&upload.data).map_err(|e| {
        tracing::error!(error = %e, "Error during prediction");
        e
    })?;

    record_history(state, upload, &prediction);

    Ok(HttpResponse::json(200, &prediction))
}

/// Persist a prediction, best effort: failures are logged and never reach the client
fn record_history(state: &ServerState, upload: &Part, prediction: &PredictionResult) {
    let entry = NewHistoryEntry::from_prediction(
        prediction,
        upload.filename.clone(),
        upload.content_type.clone(),
        data_uri(upload),
    );

    match state.history.record(&entry) {
        Ok(id) => tracing::debug!(id, class = %prediction.label, "Recorded prediction"),
        Err(e) => tracing::error!(error = %e, "Failed to save history"),
    }
}

/// Handle GET /history
fn handle_history_list(
    request: &HttpRequest,
    state: &ServerState,
) -> Result<HttpResponse, ApiError> {
    let (limit, offset) = parse_history_query(&request.query)?;
    let items = state.history.list(limit, offset)?;
    Ok(HttpResponse::json(200, &serde_json::json!({ "items": items })))
}

/// Handle DELETE /history
fn handle_history_clear(state: &ServerState) -> Result<HttpResponse, ApiError> {
    let removed = state.history.clear()?;
    tracing::info!(removed, "History cleared");
    Ok(HttpResponse::json(
        200,
        &serde_json::json!({ "message": "History cleared" }),
    ))
}

// === Transport: microserver accept loop ===
// One request per connection. Thread per connection.

/// Handle one connection on any Read + Write stream.
///
/// Takes `&mut` so the caller retains ownership and can call `shutdown(Write)`
/// on the concrete stream type after this returns.
fn handle_connection(stream: &mut (impl Read + Write), state: &ServerState) {
    let started = Instant::now();

    let req = match microserver::read_request(stream, state.max_body) {
        Some(Ok(req)) => req,
        Some(Err(e)) => {
            tracing::warn!(status = e.status(), error = %e.message(), "Rejected request");
            let resp = with_common_headers(json_error(e.status(), &e.message()));
            microserver::write_response(stream, &resp);
            return;
        }
        None => return, // clean close, no response needed
    };

    let resp = route_request(&req, state);
    tracing::info!(
        method = %req.method,
        path = %req.path,
        status = resp.status,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request"
    );

    microserver::write_response(stream, &resp);
}

/// Build state from config: eager model load (failure is logged, retried
/// lazily) and an opened, migrated history store.
pub fn build_state(config: &Config) -> Result<ServerState> {
    let model = ModelService::onnx(
        config.model_path.clone(),
        config.labels.clone(),
        config.image_size,
        config.input_layout,
    );
    model.load();

    let history = HistoryStore::open(&config.database_path).with_context(|| {
        format!(
            "Failed to open history database {}",
            config.database_path.display()
        )
    })?;

    Ok(ServerState::new(
        model,
        Box::new(history),
        config.max_upload_bytes,
    ))
}

/// Run the classification server
pub fn run_server(config: &Config) -> Result<()> {
    let state = Arc::new(build_state(config)?);
    let addr = config.bind_addr();

    let listener =
        TcpListener::bind(&addr).with_context(|| format!("Failed to bind {}", addr))?;

    println!("🚀 wastesort server starting...");
    println!("   Listening on http://{}", addr);
    println!("   Model: {}", config.model_path.display());
    println!("   History: {}", config.database_path.display());
    println!("   Press Ctrl+C to stop\n");
    tracing::info!(%addr, "Server listening");

    accept_loop(listener, state);
    Ok(())
}

/// Accept loop for the TCP listener
fn accept_loop(listener: TcpListener, state: Arc<ServerState>) {
    for stream in listener.incoming() {
        match stream {
            Ok(mut stream) => {
                let state = Arc::clone(&state);
                std::thread::spawn(move || {
                    handle_connection(&mut stream, &state);
                    let _ = stream.shutdown(Shutdown::Write);
                });
            }
            Err(e) => tracing::warn!(error = %e, "TCP accept error"),
        }
    }
}
