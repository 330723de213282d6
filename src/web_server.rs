use std::sync::atomic::{AtomicBool, Ordering};
use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    serve, Json, Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use minijinja::{path_loader, Environment};
use minijinja_autoreload::AutoReloader;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex, RwLock};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{debug, error, info, warn};

use crate::chat::{ChatEntry, ChatSession};
use crate::config::Settings;
use crate::constants;
use crate::error::{ParseError, RunError};
use crate::ollama::ChatClient;
use crate::records::{self, FieldSplitting, QaRecord, RecordParser, RecordPreview};
use crate::replay::{
    validate_inputs, CancelToken, ProgressSink, ReplayConfig, ReplayDriver, RunSummary,
};

/// Messages pushed to every connected WebSocket client.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BroadcastMessage {
    pub message_type: String,
    pub payload: serde_json::Value,
}

impl BroadcastMessage {
    fn new(message_type: &str, payload: serde_json::Value) -> Self {
        Self {
            message_type: message_type.to_string(),
            payload,
        }
    }
}

/// Forwards replay progress to WebSocket clients.
struct BroadcastSink(broadcast::Sender<BroadcastMessage>);

impl ProgressSink for BroadcastSink {
    fn progress(&self, percent: f64) {
        let msg = BroadcastMessage::new("ReplayProgress", serde_json::json!({ "percent": percent }));
        if self.0.send(msg).is_err() {
            debug!("No WebSocket clients listening for replay progress");
        }
    }

    fn finished(&self, summary: &RunSummary) {
        let payload = serde_json::to_value(summary).unwrap_or_default();
        if self.0.send(BroadcastMessage::new("ReplayFinished", payload)).is_err() {
            debug!("No WebSocket clients listening for replay summary");
        }
    }
}

// Shared application state
#[derive(Clone)]
pub struct AppState {
    templates: Arc<AutoReloader>,
    // Channel for broadcasting messages to all connected WebSocket clients
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
    settings: Arc<Settings>,
    client: Arc<dyn ChatClient>,
    // Held only between awaits; history reads never wait on Ollama.
    chat: Arc<Mutex<ChatSession>>,
    // Held for a whole chat turn
    chat_turn: Arc<Mutex<()>>,
    // Records from the last successful upload
    dataset: Arc<RwLock<Option<Vec<QaRecord>>>>,
    replay_active: Arc<AtomicBool>,
    replay_cancel: Arc<std::sync::Mutex<Option<CancelToken>>>,
}

impl AppState {
    pub fn new(settings: Settings, client: Arc<dyn ChatClient>) -> Result<Self> {
        let templates = create_minijinja_env().context("Failed to initialize template engine")?;
        // Capacity of 100 messages
        let (broadcast_tx, _) = broadcast::channel::<BroadcastMessage>(100);
        let chat = ChatSession::new(settings.model.clone());

        Ok(Self {
            templates: Arc::new(templates),
            broadcast_tx,
            settings: Arc::new(settings),
            client,
            chat: Arc::new(Mutex::new(chat)),
            chat_turn: Arc::new(Mutex::new(())),
            dataset: Arc::new(RwLock::new(None)),
            replay_active: Arc::new(AtomicBool::new(false)),
            replay_cancel: Arc::new(std::sync::Mutex::new(None)),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastMessage> {
        self.broadcast_tx.subscribe()
    }
}

// Marks a replay as running until the task that owns it ends.
struct ActiveRun {
    active: Arc<AtomicBool>,
    cancel: Arc<std::sync::Mutex<Option<CancelToken>>>,
}

impl ActiveRun {
    fn acquire(state: &AppState, token: CancelToken) -> Option<Self> {
        state
            .replay_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        if let Ok(mut slot) = state.replay_cancel.lock() {
            *slot = Some(token);
        }
        Some(Self {
            active: state.replay_active.clone(),
            cancel: state.replay_cancel.clone(),
        })
    }
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.cancel.lock() {
            *slot = None;
        }
        self.active.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Conflict(&'static str),
    Unprocessable(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, m.to_string()),
            ApiError::Unprocessable(m) => (StatusCode::UNPROCESSABLE_ENTITY, m),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<ParseError> for ApiError {
    fn from(e: ParseError) -> Self {
        ApiError::Unprocessable(e.to_string())
    }
}

impl From<RunError> for ApiError {
    fn from(e: RunError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

// Minijinja Environment setup
fn create_minijinja_env() -> Result<AutoReloader> {
    // Use AutoReloader for development convenience
    let reloader = AutoReloader::new(|notifier| {
        let loader = path_loader("templates");
        let mut env = Environment::new();
        env.set_loader(loader);
        // Watch the templates directory for changes
        notifier.watch_path("templates", true);
        Ok(env)
    });
    Ok(reloader)
}

#[derive(Serialize)]
struct ModelOption {
    id: &'static str,
    label: &'static str,
}

fn model_options() -> Vec<ModelOption> {
    constants::MODEL_OPTIONS
        .iter()
        .map(|&(id, label)| ModelOption { id, label })
        .collect()
}

async fn index_handler(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    state
        .templates
        .acquire_env()
        .and_then(|env| {
            env.get_template("index.html").and_then(|tmpl| {
                let context = minijinja::context! {
                    title => "Jarvis AI Agent",
                    models => model_options(),
                    default_model => state.settings.model.as_str(),
                    ollama_url => state.settings.ollama_url.as_str(),
                    preview_limit => constants::PREVIEW_LIMIT,
                };
                tmpl.render(context)
            })
        })
        .map(Html)
        .map_err(|e| {
            error!("Failed to get or render template: {}", e);
            ApiError::Internal(format!("Internal Server Error: {}", e))
        })
}

async fn models_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "default": state.settings.model,
        "options": model_options(),
    }))
}

async fn chat_history_handler(State(state): State<AppState>) -> Json<Vec<ChatEntry>> {
    let entries = state.chat.lock().await.entries().to_vec();
    Json(entries)
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    model: Option<String>,
}

async fn chat_handler(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatEntry>, ApiError> {
    if req.message.trim().is_empty() {
        return Err(ApiError::BadRequest("message must not be blank".to_string()));
    }
    // One request in flight at a time, like the disabled send button.
    let _turn = state
        .chat_turn
        .try_lock()
        .map_err(|_| ApiError::Conflict("a chat request is already in progress"))?;

    let (model, message) = {
        let mut session = state.chat.lock().await;
        if let Some(model) = req.model.filter(|m| !m.trim().is_empty()) {
            session.set_model(model);
        }
        let message = session
            .push_user(&req.message)
            .ok_or_else(|| ApiError::BadRequest("message must not be blank".to_string()))?;
        (session.model().to_string(), message)
    };

    let result = state.client.chat(&model, &[message]).await;

    let mut session = state.chat.lock().await;
    let reply = session.push_reply(&model, result).clone();
    Ok(Json(reply))
}

#[derive(Debug, Default, Deserialize)]
struct RecordsQuery {
    #[serde(default)]
    splitting: FieldSplitting,
}

async fn upload_records_handler(
    State(state): State<AppState>,
    Query(query): Query<RecordsQuery>,
    body: String,
) -> Result<Json<RecordPreview>, ApiError> {
    let records = RecordParser::new(query.splitting).parse(&body)?;
    let preview = records::preview(&records, constants::PREVIEW_LIMIT);
    info!(records = records.len(), "Loaded replay dataset");
    *state.dataset.write().await = Some(records);
    Ok(Json(preview))
}

async fn template_handler() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", records::TEMPLATE_FILE_NAME),
            ),
        ],
        records::TEMPLATE_CSV,
    )
}

#[derive(Debug, Default, Deserialize)]
struct ReplayRequest {
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Serialize)]
struct ReplayStarted {
    model: String,
    records: usize,
}

/// Starts a run in the background and answers 202 at once. Progress and the
/// summary reach clients over `/ws`, so the run finishes (and resets progress
/// to 0) even if this request is dropped.
async fn replay_handler(
    State(state): State<AppState>,
    Json(req): Json<ReplayRequest>,
) -> Result<(StatusCode, Json<ReplayStarted>), ApiError> {
    let model = req.model.unwrap_or_else(|| state.settings.model.clone());
    let records = state.dataset.read().await.clone().unwrap_or_default();
    validate_inputs(&records, &model)?;

    let mut driver = ReplayDriver::new(ReplayConfig {
        pacing: state.settings.replay_delay,
    });
    let active = ActiveRun::acquire(&state, driver.cancel_token())
        .ok_or(ApiError::Conflict("a replay run is already in progress"))?;

    let started = ReplayStarted {
        model: model.clone(),
        records: records.len(),
    };
    let client = state.client.clone();
    let sink = BroadcastSink(state.broadcast_tx.clone());
    tokio::spawn(async move {
        let _active = active;
        if let Err(e) = driver.run(&records, client.as_ref(), &model, &sink).await {
            error!(error = %e, "Replay run rejected");
        }
    });

    Ok((StatusCode::ACCEPTED, Json(started)))
}

async fn cancel_replay_handler(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    let slot = state
        .replay_cancel
        .lock()
        .map_err(|_| ApiError::Internal("replay state poisoned".to_string()))?;
    match slot.as_ref() {
        Some(token) => {
            info!("Cancelling active replay run");
            token.cancel();
            Ok(StatusCode::ACCEPTED)
        }
        None => Err(ApiError::Conflict("no replay run is active")),
    }
}

// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    info!("WebSocket connection upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

// Handle individual WebSocket connections
async fn handle_socket(socket: WebSocket, state: AppState) {
    info!("New WebSocket connection established");
    let mut broadcast_rx = state.broadcast_tx.subscribe();
    let (mut sender, mut receiver) = socket.split();

    let welcome_msg = BroadcastMessage::new(
        "Info",
        serde_json::json!({"message": "Connected to Jarvis WebSocket"}),
    );
    if let Ok(json_msg) = serde_json::to_string(&welcome_msg) {
        if sender.send(Message::Text(json_msg)).await.is_err() {
            warn!("Failed to send welcome message to new WebSocket client");
            return;
        }
    }

    loop {
        tokio::select! {
            msg = broadcast_rx.recv() => {
                match msg {
                    Ok(msg) => {
                        let Ok(json_msg) = serde_json::to_string(&msg) else {
                            error!("Failed to serialize broadcast message");
                            continue;
                        };
                        if sender.send(Message::Text(json_msg)).await.is_err() {
                            warn!("WebSocket client disconnected or send error. Closing connection.");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "WebSocket client lagging behind broadcasts");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Client closed WebSocket");
                        break;
                    }
                    Some(Ok(Message::Text(text))) => {
                        debug!("Ignoring text message from client: {}", text);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("WebSocket receive error: {}", e);
                        break;
                    }
                }
            }
        }
    }
    info!("WebSocket connection closed");
}

pub fn router(state: AppState) -> Router {
    // Serve static files from the `static` directory
    let static_files_service = ServeDir::new("static").not_found_service(tower::service_fn(
        |_: axum::extract::Request| async {
            Ok::<_, std::convert::Infallible>((StatusCode::NOT_FOUND, "Not Found").into_response())
        },
    ));

    Router::new()
        .route("/", get(index_handler))
        .route("/ws", get(ws_handler))
        .route("/api/models", get(models_handler))
        .route("/api/chat", get(chat_history_handler).post(chat_handler))
        .route("/api/records", post(upload_records_handler))
        .route("/api/records/template", get(template_handler))
        .route("/api/replay", post(replay_handler))
        .route("/api/replay/cancel", post(cancel_replay_handler))
        .nest_service("/static", static_files_service)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn start_web_server(settings: Settings, client: Arc<dyn ChatClient>) -> Result<()> {
    let port = settings.port;
    let state = AppState::new(settings, client)?;
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Web server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to address {}", addr))?;

    serve(listener, app.into_make_service())
        .await
        .context("Web server failed")?;

    Ok(())
}
