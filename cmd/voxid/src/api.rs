//! Wire types for the HTTP API.
//!
//! Field names are camelCase on the wire, matching the service's existing
//! clients. Audio travels as base64-encoded WAV in `audioData`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request body for `POST /speakers/register`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub anonymous_id: String,
    pub audio_data: String,
    /// Free-form caller data kept alongside the speaker.
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub status: &'static str,
    pub anonymous_id: String,
    pub message: String,
    pub processing_ms: u64,
    pub timestamp: String,
}

/// Request body for `POST /speakers/identify`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyRequest {
    pub audio_data: String,
    /// Falls back to the server's configured threshold when absent.
    #[serde(default)]
    pub threshold: Option<f32>,
    /// Opaque caller context, surfaced in debug logs only.
    #[serde(default)]
    pub context: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyResponse {
    /// `null` when no speaker cleared the threshold.
    pub anonymous_id: Option<String>,
    pub confidence: f32,
    pub is_known_speaker: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encounters: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub processing_ms: u64,
    pub timestamp: String,
}

/// One speaker in `GET /speakers` and `GET /speakers/{id}`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeakerSummary {
    pub anonymous_id: String,
    pub embedding_count: usize,
    pub encounters: u64,
    /// Absent for speakers enrolled outside this server process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registered_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub total: usize,
    pub speakers: Vec<SpeakerSummary>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub status: &'static str,
    pub message: String,
    pub timestamp: String,
}

/// Request body for `POST /batch`.
#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub operation: BatchOperation,
    /// Items are decoded per operation: register items look like
    /// [`RegisterRequest`], identify items like [`IdentifyRequest`],
    /// delete items like [`DeleteItem`].
    pub items: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchOperation {
    Register,
    Identify,
    Delete,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteItem {
    pub anonymous_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemResult {
    pub index: usize,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub operation: BatchOperation,
    pub total_items: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub processing_ms: u64,
    pub results: Vec<BatchItemResult>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_seconds: u64,
    pub request_count: u64,
    pub speaker_count: usize,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub status: &'static str,
    pub statistics: Statistics,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub uptime_seconds: u64,
    pub total_requests: u64,
    pub requests_per_minute: f64,
    pub registered_speakers: usize,
    pub snapshot_path: String,
}

/// Body of every non-2xx response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}
