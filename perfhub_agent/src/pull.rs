//! Pull endpoints: serve what is already in memory, never trigger a sample.

use axum::{extract::State, Json};

use crate::state::AppState;
use crate::types::{MetricsSnapshot, StatsReport};

pub async fn get_metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.store.current())
}

pub async fn get_stats(State(state): State<AppState>) -> Json<StatsReport> {
    Json(StatsReport {
        totals: state.registry.statistics(),
        connections: state.registry.connection_stats(),
    })
}
