use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{VitalsError, VitalsResult};
use crate::vital_signs::{PhysiologicalState, VitalSign};

pub const DEFAULT_DISPERSION: f64 = 0.1;
pub const DEFAULT_DISTANCE_THRESHOLD: f64 = 3.8;
pub const DEFAULT_MODEL_THRESHOLD: f64 = 0.4;
pub const SHARED_STATE_FILE_NAME: &str = "health_sensor_vitals.json";

/// Runtime settings shared by the simulator and the query API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub project_name: String,
    pub log_level: String,

    // Simulation
    pub dispersion_default: f64,                 // 0.1
    pub data_generation_interval_secs: u64,      // 5
    pub simulation_state: PhysiologicalState,    // rest
    pub vitals_overrides: BTreeMap<String, f64>, // canonical name -> value
    pub metrics_log_interval_ticks: u64,         // 12

    // Anomaly detection
    pub anomaly_method: String,   // "DISTANCE" | "MODEL" | "EIF"
    pub distance_threshold: f64,  // 3.8
    pub model_threshold: f64,     // 0.4
    pub model_artifact_path: PathBuf,

    // Alarm webhook
    pub alarm_endpoint_url: Option<String>,

    // Shared state
    pub shared_state_path: PathBuf,

    // Query API
    pub api_host: String,
    pub api_port: u16,
}

/// The subset of settings the anomaly scorer reads on every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub method: String,
    pub distance_threshold: f64,
    pub model_threshold: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            method: "DISTANCE".to_string(),
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
            model_threshold: DEFAULT_MODEL_THRESHOLD,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            project_name: "Health Sensor Simulator".to_string(),
            log_level: "INFO".to_string(),
            dispersion_default: DEFAULT_DISPERSION,
            data_generation_interval_secs: 5,
            simulation_state: PhysiologicalState::Rest,
            vitals_overrides: BTreeMap::new(),
            metrics_log_interval_ticks: 12,
            anomaly_method: "DISTANCE".to_string(),
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
            model_threshold: DEFAULT_MODEL_THRESHOLD,
            model_artifact_path: PathBuf::from("models/eif_model.json"),
            alarm_endpoint_url: None,
            shared_state_path: default_shared_state_path(),
            api_host: "0.0.0.0".to_string(),
            api_port: 8000,
        }
    }
}

/// `<system temp dir>/health_sensor_vitals.json`
pub fn default_shared_state_path() -> PathBuf {
    std::env::temp_dir().join(SHARED_STATE_FILE_NAME)
}

impl Settings {
    /// Load from environment variables. Call `dotenvy::dotenv()` first to
    /// pick up a `.env` file.
    pub fn from_env() -> VitalsResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> VitalsResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Settings::default();

        let log_level = get("LOG_LEVEL")
            .map(|v| v.to_ascii_uppercase())
            .unwrap_or(defaults.log_level);
        if !matches!(log_level.as_str(), "DEBUG" | "INFO" | "WARNING" | "WARN" | "ERROR") {
            return Err(VitalsError::Config(format!(
                "LOG_LEVEL: unsupported level '{log_level}'"
            )));
        }

        let simulation_state = match get("SIMULATION_STATE") {
            Some(raw) => raw.parse()?,
            None => defaults.simulation_state,
        };

        let vitals_overrides = match get("VITALS_OVERRIDES") {
            Some(raw) => parse_overrides(&raw)?,
            None => BTreeMap::new(),
        };

        let model_threshold = parse_or(&get, "EIF_THRESHOLD", defaults.model_threshold)?;
        if !valid_model_threshold(model_threshold) {
            return Err(VitalsError::Config(format!(
                "EIF_THRESHOLD: must be a finite value in [0, 1], got '{model_threshold}'"
            )));
        }

        Ok(Self {
            project_name: get("PROJECT_NAME").unwrap_or(defaults.project_name),
            log_level,
            dispersion_default: parse_or(&get, "DEFAULT_DISPERSION", defaults.dispersion_default)?,
            data_generation_interval_secs: parse_or(
                &get,
                "DATA_GENERATION_INTERVAL_SECONDS",
                defaults.data_generation_interval_secs,
            )?,
            simulation_state,
            vitals_overrides,
            metrics_log_interval_ticks: parse_or(
                &get,
                "METRICS_LOG_INTERVAL_TICKS",
                defaults.metrics_log_interval_ticks,
            )?,
            anomaly_method: get("ANOMALY_DETECTION_METHOD").unwrap_or(defaults.anomaly_method),
            distance_threshold: parse_or(&get, "DISTANCE_THRESHOLD", defaults.distance_threshold)?,
            model_threshold,
            model_artifact_path: get("EIF_MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_artifact_path),
            alarm_endpoint_url: get("ALARM_ENDPOINT_URL"),
            shared_state_path: get("SHARED_STATE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.shared_state_path),
            api_host: get("API_HOST").unwrap_or(defaults.api_host),
            api_port: parse_or(&get, "API_PORT", defaults.api_port)?,
        })
    }

    pub fn detection(&self) -> DetectionConfig {
        DetectionConfig {
            method: self.anomaly_method.clone(),
            distance_threshold: self.distance_threshold,
            model_threshold: self.model_threshold,
        }
    }

    /// Base values the simulator centers each reading on: the selected
    /// state's means with any explicit overrides applied.
    pub fn base_values(&self) -> BTreeMap<String, f64> {
        let mut base = self.simulation_state.base_values();
        base.extend(self.vitals_overrides.iter().map(|(k, v)| (k.clone(), *v)));
        base
    }

    /// `tracing` filter directive equivalent to `log_level`.
    pub fn tracing_directive(&self) -> &'static str {
        match self.log_level.as_str() {
            "DEBUG" => "debug",
            "WARNING" | "WARN" => "warn",
            "ERROR" => "error",
            _ => "info",
        }
    }
}

/// Raw model scores live in [0, 1], so a usable threshold does too.
pub fn valid_model_threshold(threshold: f64) -> bool {
    threshold.is_finite() && (0.0..=1.0).contains(&threshold)
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> VitalsResult<T>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| VitalsError::Config(format!("{key}: invalid value '{raw}'"))),
        None => Ok(default),
    }
}

/// Parse `name=value,name=value` into canonical names. Each value must be
/// inside the parameter's absolute physiological range.
pub fn parse_overrides(raw: &str) -> VitalsResult<BTreeMap<String, f64>> {
    let mut overrides = BTreeMap::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (name, value) = pair.split_once('=').ok_or_else(|| {
            VitalsError::Config(format!("VITALS_OVERRIDES: expected name=value, got '{pair}'"))
        })?;
        let sign: VitalSign = name.trim().parse()?;
        let value: f64 = value.trim().parse().map_err(|_| {
            VitalsError::Config(format!("VITALS_OVERRIDES: invalid number for {sign}: '{value}'"))
        })?;
        let spec = sign.spec();
        if !spec.in_absolute_range(value) {
            return Err(VitalsError::OutOfRange {
                name: sign.name().to_string(),
                value,
                min: spec.abs_min,
                max: spec.abs_max,
            });
        }
        overrides.insert(sign.name().to_string(), value);
    }
    Ok(overrides)
}
