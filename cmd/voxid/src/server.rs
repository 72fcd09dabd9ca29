//! HTTP serving layer over the speaker registry.
//!
//! API endpoints:
//! - GET    /health            - liveness, uptime, request/speaker counts
//! - POST   /speakers/register - enroll one base64 WAV sample
//! - POST   /speakers/identify - nearest-speaker lookup
//! - GET    /speakers          - all speakers with embedding counts
//! - GET    /speakers/{id}     - one speaker, 404 if unknown
//! - DELETE /speakers/{id}     - remove a speaker and its side data
//! - POST   /batch             - per-item register/identify/delete
//! - GET    /stats             - request statistics
//!
//! Everything except /health requires `X-API-Key` when keys are
//! configured. The registry sits behind one RwLock; embedding extraction
//! runs on the blocking pool before the lock is taken, so identify and
//! list only hold a read lock. Metadata, encounter counts, and
//! enrollment timestamps are serving-layer state kept beside the
//! registry, never inside it.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use anyhow::Result;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde_json::Value;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;

use voxid_embed::{ExtractError, Extractor};
use voxid_registry::{Registry, RegistryError, SpeakerInfo};

use crate::api::*;
use crate::wav;

const API_KEY_HEADER: &str = "x-api-key";

type ApiError = (StatusCode, Json<ErrorBody>);
type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// Options for [`serve`], assembled by the CLI.
pub struct ServeOptions {
    pub addr: String,
    pub threshold: f32,
    pub api_keys: Vec<String>,
    pub snapshot_path: String,
    pub sample_rate: usize,
}

/// Mutable service core: the registry plus per-speaker side data the
/// registry itself does not track.
struct Service {
    registry: Registry,
    side: HashMap<String, SideRecord>,
}

#[derive(Default)]
struct SideRecord {
    metadata: Option<Value>,
    /// Stamped on first enrollment through this server; absent for
    /// speakers that arrived via the snapshot.
    registered_at: Option<String>,
    encounters: AtomicU64,
}

/// Shared server state.
struct AppState {
    service: RwLock<Service>,
    extractor: Arc<dyn Extractor>,
    sample_rate: usize,
    threshold: f32,
    api_keys: Vec<String>,
    snapshot_path: String,
    started: Instant,
    requests: AtomicU64,
}

/// Runs the HTTP API until the process is stopped.
pub async fn serve(registry: Registry, opts: ServeOptions) -> Result<()> {
    let extractor = Arc::clone(registry.extractor());
    let mut side = HashMap::new();
    for info in registry.list() {
        side.insert(info.id, SideRecord::default());
    }
    let loaded = side.len();

    let state = Arc::new(AppState {
        service: RwLock::new(Service { registry, side }),
        extractor,
        sample_rate: opts.sample_rate,
        threshold: opts.threshold,
        api_keys: opts.api_keys,
        snapshot_path: opts.snapshot_path,
        started: Instant::now(),
        requests: AtomicU64::new(0),
    });
    let addr = parse_addr(&opts.addr)?;
    println!("Speaker registry at http://{}", addr);
    println!(
        "  {} speaker(s) loaded from {}",
        loaded, state.snapshot_path
    );
    println!(
        "  API key check {}",
        if state.api_keys.is_empty() { "disabled" } else { "enabled" }
    );
    println!("  - GET    /health");
    println!("  - POST   /speakers/register");
    println!("  - POST   /speakers/identify");
    println!("  - GET    /speakers");
    println!("  - GET    /speakers/{{id}}");
    println!("  - DELETE /speakers/{{id}}");
    println!("  - POST   /batch");
    println!("  - GET    /stats");
    println!();

    let app = Router::new()
        .route("/health", get(health))
        .route("/speakers", get(list_speakers))
        .route("/speakers/register", post(register))
        .route("/speakers/identify", post(identify))
        .route("/speakers/{id}", get(get_speaker).delete(delete_speaker))
        .route("/batch", post(batch))
        .route("/stats", get(stats))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Parse address string to SocketAddr; a bare ":8000" binds all
/// interfaces.
fn parse_addr(addr: &str) -> Result<SocketAddr> {
    let addr = if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    };
    Ok(addr.parse()?)
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn error_response(code: StatusCode, msg: impl Into<String>) -> ApiError {
    (code, Json(ErrorBody { error: msg.into() }))
}

/// Gate for every endpoint except /health. No configured keys means
/// open access.
fn require_api_key(keys: &[String], headers: &HeaderMap) -> std::result::Result<(), ApiError> {
    if keys.is_empty() {
        return Ok(());
    }
    match headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) {
        Some(got) if keys.iter().any(|k| k == got) => Ok(()),
        Some(_) => Err(error_response(StatusCode::FORBIDDEN, "invalid API key")),
        None => Err(error_response(
            StatusCode::UNAUTHORIZED,
            "missing X-API-Key header",
        )),
    }
}

fn extract_error(err: ExtractError) -> ApiError {
    let code = match err {
        ExtractError::AudioTooShort { .. } | ExtractError::InvalidAudio(_) => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(code, err.to_string())
}

fn registry_error(err: RegistryError) -> ApiError {
    let code = match &err {
        RegistryError::SpeakerNotFound(_) => StatusCode::NOT_FOUND,
        RegistryError::Extraction(
            ExtractError::AudioTooShort { .. } | ExtractError::InvalidAudio(_),
        ) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(code, err.to_string())
}

/// Decodes `audioData`, checks the sample rate, and extracts the
/// embedding on the blocking pool. No lock is held through this.
async fn extract_embedding(
    state: &Arc<AppState>,
    audio_b64: &str,
) -> std::result::Result<Vec<f32>, ApiError> {
    let bytes = BASE64.decode(audio_b64).map_err(|e| {
        error_response(StatusCode::BAD_REQUEST, format!("invalid base64 audio: {}", e))
    })?;
    let wav = wav::decode(&bytes).map_err(|e| {
        error_response(StatusCode::BAD_REQUEST, format!("invalid WAV payload: {:#}", e))
    })?;
    if wav.sample_rate as usize != state.sample_rate {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            format!(
                "sample rate {} Hz not supported (want {})",
                wav.sample_rate, state.sample_rate
            ),
        ));
    }

    let extractor = Arc::clone(&state.extractor);
    let samples = wav.samples;
    match tokio::task::spawn_blocking(move || extractor.extract(&samples)).await {
        Ok(Ok(embedding)) => Ok(embedding),
        Ok(Err(err)) => Err(extract_error(err)),
        Err(err) => Err(error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("extraction task failed: {}", err),
        )),
    }
}

/// Creates or refreshes the side record for a freshly enrolled speaker.
fn touch_side(side: &mut HashMap<String, SideRecord>, id: &str, metadata: Option<Value>) {
    let rec = side.entry(id.to_string()).or_default();
    if rec.registered_at.is_none() {
        rec.registered_at = Some(now_rfc3339());
    }
    if metadata.is_some() {
        rec.metadata = metadata;
    }
}

fn summarize(side: &HashMap<String, SideRecord>, info: SpeakerInfo) -> SpeakerSummary {
    let rec = side.get(&info.id);
    SpeakerSummary {
        embedding_count: info.count,
        encounters: rec
            .map(|r| r.encounters.load(Ordering::Relaxed))
            .unwrap_or(0),
        registered_at: rec.and_then(|r| r.registered_at.clone()),
        metadata: rec.and_then(|r| r.metadata.clone()),
        anonymous_id: info.id,
    }
}

// Handlers

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    state.requests.fetch_add(1, Ordering::Relaxed);
    let speaker_count = state.service.read().await.registry.speaker_count();
    Json(HealthResponse {
        status: "ok",
        uptime_seconds: state.started.elapsed().as_secs(),
        request_count: state.requests.load(Ordering::Relaxed),
        speaker_count,
        timestamp: now_rfc3339(),
    })
}

async fn register(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<RegisterResponse> {
    state.requests.fetch_add(1, Ordering::Relaxed);
    require_api_key(&state.api_keys, &headers)?;
    let started = Instant::now();

    let embedding = extract_embedding(&state, &req.audio_data).await?;

    let mut svc = state.service.write().await;
    svc.registry
        .register_embedding(&req.anonymous_id, embedding, true)
        .map_err(registry_error)?;
    touch_side(&mut svc.side, &req.anonymous_id, req.metadata);
    drop(svc);

    tracing::info!("registered speaker {}", req.anonymous_id);
    Ok(Json(RegisterResponse {
        status: "registered",
        message: format!("speaker {} enrolled", req.anonymous_id),
        anonymous_id: req.anonymous_id,
        processing_ms: started.elapsed().as_millis() as u64,
        timestamp: now_rfc3339(),
    }))
}

async fn identify(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<IdentifyRequest>,
) -> ApiResult<IdentifyResponse> {
    state.requests.fetch_add(1, Ordering::Relaxed);
    require_api_key(&state.api_keys, &headers)?;
    let started = Instant::now();

    let threshold = req.threshold.unwrap_or(state.threshold);
    if !(0.0..=1.0).contains(&threshold) {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            format!("threshold {} out of range [0, 1]", threshold),
        ));
    }
    if let Some(ctx) = &req.context {
        tracing::debug!("identify context: {}", ctx);
    }

    let embedding = extract_embedding(&state, &req.audio_data).await?;

    let svc = state.service.read().await;
    let hit = svc.registry.identify_embedding(&embedding, threshold);
    let (encounters, metadata) = match &hit.speaker {
        Some(id) => {
            let rec = svc.side.get(id);
            (
                rec.map(|r| r.encounters.fetch_add(1, Ordering::Relaxed) + 1),
                rec.and_then(|r| r.metadata.clone()),
            )
        }
        None => (None, None),
    };
    drop(svc);

    tracing::debug!(
        "identify: {} (score {:.3})",
        hit.speaker.as_deref().unwrap_or("unknown"),
        hit.score
    );
    Ok(Json(IdentifyResponse {
        is_known_speaker: hit.speaker.is_some(),
        anonymous_id: hit.speaker,
        confidence: hit.score,
        encounters,
        metadata,
        processing_ms: started.elapsed().as_millis() as u64,
        timestamp: now_rfc3339(),
    }))
}

async fn list_speakers(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<ListResponse> {
    state.requests.fetch_add(1, Ordering::Relaxed);
    require_api_key(&state.api_keys, &headers)?;

    let svc = state.service.read().await;
    let speakers: Vec<SpeakerSummary> = svc
        .registry
        .list()
        .into_iter()
        .map(|info| summarize(&svc.side, info))
        .collect();
    drop(svc);

    Ok(Json(ListResponse {
        total: speakers.len(),
        speakers,
    }))
}

async fn get_speaker(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<SpeakerSummary> {
    state.requests.fetch_add(1, Ordering::Relaxed);
    require_api_key(&state.api_keys, &headers)?;

    let svc = state.service.read().await;
    match svc.registry.speaker(&id) {
        Some(info) => Ok(Json(summarize(&svc.side, info))),
        None => Err(error_response(
            StatusCode::NOT_FOUND,
            format!("unknown speaker {}", id),
        )),
    }
}

async fn delete_speaker(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<DeleteResponse> {
    state.requests.fetch_add(1, Ordering::Relaxed);
    require_api_key(&state.api_keys, &headers)?;

    let mut svc = state.service.write().await;
    svc.registry.delete(&id).map_err(registry_error)?;
    svc.side.remove(&id);
    drop(svc);

    tracing::info!("deleted speaker {}", id);
    Ok(Json(DeleteResponse {
        status: "deleted",
        message: format!("speaker {} removed", id),
        timestamp: now_rfc3339(),
    }))
}

async fn stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<StatsResponse> {
    state.requests.fetch_add(1, Ordering::Relaxed);
    require_api_key(&state.api_keys, &headers)?;

    let uptime = state.started.elapsed();
    let total = state.requests.load(Ordering::Relaxed);
    let minutes = uptime.as_secs_f64() / 60.0;
    let per_minute = if minutes > 0.0 {
        total as f64 / minutes
    } else {
        0.0
    };
    let registered = state.service.read().await.registry.speaker_count();

    Ok(Json(StatsResponse {
        status: "ok",
        statistics: Statistics {
            uptime_seconds: uptime.as_secs(),
            total_requests: total,
            requests_per_minute: per_minute,
            registered_speakers: registered,
            snapshot_path: state.snapshot_path.clone(),
        },
        timestamp: now_rfc3339(),
    }))
}

/// Each batch item succeeds or fails on its own; a bad item never stops
/// the ones after it. Register and delete items persist as they go.
async fn batch(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<BatchRequest>,
) -> ApiResult<BatchResponse> {
    state.requests.fetch_add(1, Ordering::Relaxed);
    require_api_key(&state.api_keys, &headers)?;
    let started = Instant::now();

    let mut results = Vec::with_capacity(req.items.len());
    for (index, item) in req.items.into_iter().enumerate() {
        let outcome = match req.operation {
            BatchOperation::Register => batch_register(&state, item).await,
            BatchOperation::Identify => batch_identify(&state, item).await,
            BatchOperation::Delete => batch_delete(&state, item).await,
        };
        results.push(match outcome {
            Ok(value) => BatchItemResult {
                index,
                status: "ok",
                result: Some(value),
                error: None,
            },
            Err(msg) => {
                tracing::warn!("batch item {} failed: {}", index, msg);
                BatchItemResult {
                    index,
                    status: "error",
                    result: None,
                    error: Some(msg),
                }
            }
        });
    }

    let success_count = results.iter().filter(|r| r.error.is_none()).count();
    Ok(Json(BatchResponse {
        operation: req.operation,
        total_items: results.len(),
        success_count,
        error_count: results.len() - success_count,
        processing_ms: started.elapsed().as_millis() as u64,
        results,
        timestamp: now_rfc3339(),
    }))
}

async fn batch_register(
    state: &Arc<AppState>,
    item: Value,
) -> std::result::Result<Value, String> {
    let req: RegisterRequest =
        serde_json::from_value(item).map_err(|e| format!("bad register item: {}", e))?;
    let embedding = extract_embedding(state, &req.audio_data)
        .await
        .map_err(|(_, Json(body))| body.error)?;

    let mut svc = state.service.write().await;
    svc.registry
        .register_embedding(&req.anonymous_id, embedding, true)
        .map_err(|e| e.to_string())?;
    touch_side(&mut svc.side, &req.anonymous_id, req.metadata);

    Ok(serde_json::json!({
        "anonymousId": req.anonymous_id,
        "status": "registered",
    }))
}

async fn batch_identify(
    state: &Arc<AppState>,
    item: Value,
) -> std::result::Result<Value, String> {
    let req: IdentifyRequest =
        serde_json::from_value(item).map_err(|e| format!("bad identify item: {}", e))?;
    let threshold = req.threshold.unwrap_or(state.threshold);
    let embedding = extract_embedding(state, &req.audio_data)
        .await
        .map_err(|(_, Json(body))| body.error)?;

    let svc = state.service.read().await;
    let hit = svc.registry.identify_embedding(&embedding, threshold);
    if let Some(id) = &hit.speaker {
        if let Some(rec) = svc.side.get(id) {
            rec.encounters.fetch_add(1, Ordering::Relaxed);
        }
    }
    drop(svc);

    let known = hit.speaker.is_some();
    Ok(serde_json::json!({
        "anonymousId": hit.speaker,
        "confidence": hit.score,
        "isKnownSpeaker": known,
    }))
}

async fn batch_delete(
    state: &Arc<AppState>,
    item: Value,
) -> std::result::Result<Value, String> {
    let req: DeleteItem =
        serde_json::from_value(item).map_err(|e| format!("bad delete item: {}", e))?;

    let mut svc = state.service.write().await;
    svc.registry
        .delete(&req.anonymous_id)
        .map_err(|e| e.to_string())?;
    svc.side.remove(&req.anonymous_id);

    Ok(serde_json::json!({
        "anonymousId": req.anonymous_id,
        "status": "deleted",
    }))
}
