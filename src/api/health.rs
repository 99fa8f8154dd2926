//! Liveness endpoint.

use axum::extract::State;
use serde::Serialize;

use crate::http::response::Envelope;
use crate::http::server::AppState;

#[derive(Debug, Serialize)]
pub struct SystemInfo {
    pub environment: String,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub system_info: SystemInfo,
}

pub async fn healthcheck(State(state): State<AppState>) -> Envelope<Health> {
    Envelope(Health {
        status: "available",
        system_info: SystemInfo {
            environment: state.config.environment.clone(),
            version: env!("CARGO_PKG_VERSION"),
        },
    })
}
