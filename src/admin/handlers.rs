use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::events::{EventStats, LogEntry};
use crate::security::OperatingMode;

const DEFAULT_RECENT: usize = 50;

#[derive(Serialize)]
pub struct SystemStatus {
    pub service: &'static str,
    pub version: &'static str,
    pub mode: OperatingMode,
    pub uptime_secs: u64,
    pub upstream: String,
    pub rate_backend: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracked_clients: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModeStatus {
    pub mode: OperatingMode,
    pub restricted: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub previous: Option<OperatingMode>,
}

impl ModeStatus {
    fn of(mode: OperatingMode) -> Self {
        Self {
            mode,
            restricted: mode.is_restricted(),
            previous: None,
        }
    }
}

/// Either `{"mode": "restricted"}` or `{"restricted": true}`.
#[derive(Debug, Default, Deserialize)]
pub struct ModeChange {
    pub mode: Option<OperatingMode>,
    pub restricted: Option<bool>,
}

impl ModeChange {
    fn target(&self) -> Option<OperatingMode> {
        self.mode.or(self.restricted.map(OperatingMode::from))
    }
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct StatsReport {
    #[serde(flatten)]
    pub stats: EventStats,
    pub recent: Vec<LogEntry>,
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok", "service": "shield" }))
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        service: "shield",
        version: env!("CARGO_PKG_VERSION"),
        mode: state.mode.get(),
        uptime_secs: state.started.elapsed().as_secs(),
        upstream: state.upstream.to_string(),
        rate_backend: state.rate_backend,
        tracked_clients: state.limiter.tracked_clients(),
    })
}

pub async fn get_mode(State(state): State<AdminState>) -> Json<ModeStatus> {
    Json(ModeStatus::of(state.mode.get()))
}

pub async fn set_mode(State(state): State<AdminState>, Json(change): Json<ModeChange>) -> Response {
    let Some(target) = change.target() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "expected \"mode\" or \"restricted\"" })),
        )
            .into_response();
    };

    let previous = state.mode.set(target);
    Json(ModeStatus {
        previous: Some(previous),
        ..ModeStatus::of(target)
    })
    .into_response()
}

pub async fn get_stats(
    State(state): State<AdminState>,
    Query(query): Query<StatsQuery>,
) -> Json<StatsReport> {
    let limit = query.limit.unwrap_or(DEFAULT_RECENT);
    Json(StatsReport {
        stats: state.events.stats(),
        recent: state.events.recent(limit),
    })
}
