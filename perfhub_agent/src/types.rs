//! Data types sent to subscribers over HTTP, WebSocket and long polling.
//! Keep this module minimal and stable: it defines the wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One immutable reading of the tracked host metrics.
///
/// Every field is rounded on construction (one decimal for percentages and
/// uptime, two for gigabytes) so an unchanged snapshot always serializes to
/// the same bytes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub available_memory_gb: f64,
    pub total_processes: u32,
    pub system_uptime_sec: f64,
}

impl MetricsSnapshot {
    pub fn new(
        cpu_usage: f64,
        memory_usage: f64,
        available_memory_gb: f64,
        total_processes: u32,
        system_uptime_sec: f64,
    ) -> Self {
        Self {
            cpu_usage: round_to(cpu_usage.clamp(0.0, 100.0), 1),
            memory_usage: round_to(memory_usage.clamp(0.0, 100.0), 1),
            available_memory_gb: round_to(available_memory_gb.max(0.0), 2),
            total_processes,
            system_uptime_sec: round_to(system_uptime_sec.max(0.0), 1),
        }
    }
}

pub(crate) fn round_to(v: f64, decimals: i32) -> f64 {
    if !v.is_finite() {
        return 0.0;
    }
    let scale = 10f64.powi(decimals);
    (v * scale).round() / scale
}

/// Frames on the `/performanceHub` push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum HubMessage {
    #[serde(rename_all = "camelCase")]
    Connected { connection_id: String },
    ReceivePerformanceData(MetricsSnapshot),
}

/// Opaque identifier of one push connection instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Aggregate counters; `active_connections` is derived from the registry size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total_messages_sent: u64,
    pub failed_deliveries: u64,
    pub active_connections: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStat {
    pub connection_id: ConnectionId,
    pub connected_at: DateTime<Utc>,
    pub connected_for_sec: i64,
}

/// Body of `GET /api/performance/stats`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsReport {
    #[serde(flatten)]
    pub totals: Statistics,
    pub connections: Vec<ConnectionStat>,
}

/// Body of `POST /performanceHub/negotiate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiateResponse {
    pub connection_id: ConnectionId,
    pub transport: String,
}
