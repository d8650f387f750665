//! Operator alert listing.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use twopc::OperatorAlert;

use super::transactions::AppState;

/// GET /alerts: the most recent operator alerts, newest first.
pub async fn list(State(state): State<Arc<AppState>>) -> Json<Vec<OperatorAlert>> {
    let mut alerts = state.alerts.alerts();
    alerts.reverse();
    Json(alerts)
}
