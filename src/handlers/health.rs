use crate::{
    models::HealthStatus,
    services::{ChainRegistry, KeyValueStore},
};
use axum::{extract::State, Json};
use chrono::Utc;
use std::sync::Arc;

#[derive(Clone)]
pub struct HealthState {
    pub store: Arc<dyn KeyValueStore>,
    pub chains: ChainRegistry,
}

pub async fn health_check(State(state): State<HealthState>) -> Json<HealthStatus> {
    let store_ok = state.store.ping().await;
    let networks = state.chains.names();

    let status = if !store_ok {
        "unhealthy"
    } else if state.store.backend() == "memory" {
        "degraded"
    } else {
        "healthy"
    };

    Json(HealthStatus {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: state.store.backend().to_string(),
        store_ok,
        networks,
        timestamp: Utc::now(),
    })
}
