//! Vitals API Routes
//!
//! Latest reading, an on-demand anomaly verdict for it, version and health.

use std::collections::BTreeMap;

use anomaly_detector::{DetectionMethod, ScorerHealth};
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use vitals_core::{Reading, VitalSign};

use crate::{AppError, AppState};

#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct VitalsResponse {
    pub ts: DateTime<Utc>,
    pub heart_rate: i64,
    pub oxygen_saturation: i64,
    pub breathing_rate: i64,
    pub systolic_bp: i64,
    pub diastolic_bp: i64,
    /// Rounded to one decimal place.
    pub body_temperature: f64,
}

#[derive(Debug, Serialize)]
pub struct AnomalyResponse {
    pub ts: DateTime<Utc>,
    pub is_anomaly: bool,
    pub anomaly_score: f64,
    pub method: DetectionMethod,
    pub vitals: BTreeMap<String, f64>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub scorer: ScorerHealth,
    pub model_loaded: bool,
}

pub fn vitals_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/version", get(version))
        .route("/api/v1/vitals", get(get_vitals))
        .route("/api/v1/anomaly", get(get_anomaly))
        .route("/health", get(health))
}

async fn version() -> Json<VersionResponse> {
    Json(VersionResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

fn required(reading: &Reading, sign: VitalSign) -> Result<f64, AppError> {
    reading.vital(sign).ok_or_else(|| {
        AppError::with_status(
            StatusCode::INTERNAL_SERVER_ERROR,
            anyhow::anyhow!("Failed to generate health vitals: missing parameter '{}'", sign),
        )
    })
}

/// Halves round to the even neighbour.
fn whole(value: f64) -> i64 {
    value.round_ties_even() as i64
}

impl VitalsResponse {
    fn from_reading(reading: &Reading) -> Result<Self, AppError> {
        Ok(Self {
            ts: Utc::now(),
            heart_rate: whole(required(reading, VitalSign::HeartRate)?),
            oxygen_saturation: whole(required(reading, VitalSign::OxygenSaturation)?),
            breathing_rate: whole(required(reading, VitalSign::BreathingRate)?),
            systolic_bp: whole(required(reading, VitalSign::BloodPressureSystolic)?),
            diastolic_bp: whole(required(reading, VitalSign::BloodPressureDiastolic)?),
            body_temperature: (required(reading, VitalSign::BodyTemperature)? * 10.0).round_ties_even() / 10.0,
        })
    }
}

async fn get_vitals(State(state): State<AppState>) -> Result<Json<VitalsResponse>, AppError> {
    let reading = state.store.load();
    Ok(Json(VitalsResponse::from_reading(&reading)?))
}

async fn get_anomaly(State(state): State<AppState>) -> Json<AnomalyResponse> {
    let reading = state.store.load();
    let verdict = state.scorer.score(&reading, &state.settings.detection());
    Json(AnomalyResponse {
        ts: Utc::now(),
        is_anomaly: verdict.is_anomaly,
        anomaly_score: verdict.score,
        method: verdict.method,
        vitals: reading.into_values(),
    })
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let scorer = state.scorer.health();
    let status = match scorer {
        ScorerHealth::Healthy => "ok",
        ScorerHealth::Degraded { .. } => "degraded",
    };
    Json(HealthResponse {
        status,
        scorer,
        model_loaded: state.scorer.is_model_loaded(),
    })
}
