//! Request and response types for mpl-daemon HTTP endpoints.
//!
//! `Serialize + Deserialize` so they can be JSON-encoded by Axum and decoded
//! by tests. No business logic lives here.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
}

// ---------------------------------------------------------------------------
// /v1/seasons/:season_id/sync failures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncErrorResponse {
    /// SEASON_NOT_FOUND | SYNC_IN_FLIGHT | UPSTREAM_FAILED | UNPARSEABLE_LABEL
    /// | CANCELLED | STORE_FAILED
    pub error: String,
    pub season_id: Uuid,
    pub detail: Option<String>,
}
