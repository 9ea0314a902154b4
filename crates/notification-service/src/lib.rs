//! Alarm delivery to an external HTTP endpoint.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vitals_core::{Reading, Settings};

/// Default bound on a single alarm POST.
pub const DEFAULT_ALARM_TIMEOUT: Duration = Duration::from_secs(10);

/// JSON body posted to the alarm endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmPayload {
    pub ts: DateTime<Utc>,
    pub anomaly_score: f64,
    pub vitals: BTreeMap<String, f64>,
}

impl AlarmPayload {
    pub fn new(reading: &Reading, anomaly_score: f64) -> Self {
        Self {
            ts: Utc::now(),
            anomaly_score,
            vitals: reading.values().clone(),
        }
    }
}

/// Errors from alarm delivery. `notify` logs these and reports `false`.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("{0}")]
    Transport(String),
    #[error("Timeout sending alarm to {0}")]
    Timeout(String),
    #[error("Alarm endpoint {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Anything the simulator can hand an anomalous reading to.
#[async_trait]
pub trait AlarmNotifier: Send + Sync {
    /// True iff the alarm was delivered and acknowledged.
    async fn notify(&self, reading: &Reading, score: f64) -> bool;
    fn name(&self) -> &str;
}

/// Posts alarms to `ALARM_ENDPOINT_URL`. Disabled when no URL is set.
#[derive(Debug, Clone)]
pub struct AlarmDispatcher {
    endpoint: Option<String>,
    client: reqwest::Client,
    timeout: Duration,
}

impl AlarmDispatcher {
    pub fn new(endpoint: Option<String>) -> Self {
        let endpoint = endpoint
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());
        match &endpoint {
            Some(url) => tracing::info!("Alarm notifications enabled (POST {})", url),
            None => tracing::info!("No alarm endpoint configured (set ALARM_ENDPOINT_URL)"),
        }
        Self {
            endpoint,
            client: reqwest::Client::new(),
            timeout: DEFAULT_ALARM_TIMEOUT,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.alarm_endpoint_url.clone())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.endpoint.is_some()
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// One POST attempt; no retries.
    pub async fn deliver(&self, payload: &AlarmPayload) -> Result<(), NotificationError> {
        let url = self
            .endpoint
            .as_deref()
            .ok_or_else(|| NotificationError::Config("no alarm endpoint configured".into()))?;

        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await
            .map_err(|e| classify(url, e))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(NotificationError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            })
        }
    }
}

fn classify(url: &str, err: reqwest::Error) -> NotificationError {
    if err.is_timeout() {
        NotificationError::Timeout(url.to_string())
    } else if err.is_connect() {
        NotificationError::Transport(format!("No alarm server listening at {url}"))
    } else {
        NotificationError::Transport(format!("Failed to send alarm to {url}: {err}"))
    }
}

#[async_trait]
impl AlarmNotifier for AlarmDispatcher {
    async fn notify(&self, reading: &Reading, score: f64) -> bool {
        if !self.is_enabled() {
            tracing::debug!("Anomaly detected (score {:.3}) but no alarm endpoint configured", score);
            return false;
        }
        let payload = AlarmPayload::new(reading, score);
        match self.deliver(&payload).await {
            Ok(()) => {
                tracing::info!("Alarm delivered (score {:.3})", score);
                true
            }
            Err(e) => {
                tracing::warn!("{}", e);
                false
            }
        }
    }

    fn name(&self) -> &str {
        "alarm-webhook"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};

    async fn spawn_server(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/alarm")
    }

    fn recording_app(received: Arc<Mutex<Vec<serde_json::Value>>>) -> Router {
        Router::new().route(
            "/alarm",
            post(move |Json(body): Json<serde_json::Value>| {
                let received = Arc::clone(&received);
                async move {
                    received.lock().unwrap().push(body);
                    StatusCode::OK
                }
            }),
        )
    }

    fn reading() -> Reading {
        [("heart_rate", 150.0), ("oxygen_saturation", 85.0)].into_iter().collect()
    }

    #[tokio::test]
    async fn test_no_endpoint_returns_false() {
        let dispatcher = AlarmDispatcher::new(None);
        assert!(!dispatcher.is_enabled());
        assert!(!dispatcher.notify(&reading(), 0.9).await);

        let blank = AlarmDispatcher::new(Some("   ".into()));
        assert!(!blank.is_enabled());
        assert!(matches!(
            blank.deliver(&AlarmPayload::new(&reading(), 0.9)).await,
            Err(NotificationError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_delivers_payload_on_2xx() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let url = spawn_server(recording_app(Arc::clone(&received))).await;

        let dispatcher = AlarmDispatcher::new(Some(url));
        assert!(dispatcher.notify(&reading(), 0.87).await);

        let bodies = received.lock().unwrap();
        assert_eq!(bodies.len(), 1);
        let body = &bodies[0];
        assert_eq!(body["anomaly_score"], serde_json::json!(0.87));
        assert_eq!(body["vitals"]["heart_rate"], serde_json::json!(150.0));
        let ts = body["ts"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(ts).is_ok(), "ts {ts}");
    }

    #[tokio::test]
    async fn test_non_2xx_is_failure() {
        let app = Router::new().route("/alarm", post(|| async { StatusCode::INTERNAL_SERVER_ERROR }));
        let url = spawn_server(app).await;
        let dispatcher = AlarmDispatcher::new(Some(url));

        assert!(!dispatcher.notify(&reading(), 0.8).await);
        let err = dispatcher
            .deliver(&AlarmPayload::new(&reading(), 0.8))
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_connection_refused_is_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = format!("http://{addr}/alarm");
        let dispatcher = AlarmDispatcher::new(Some(url.clone()));
        assert!(!dispatcher.notify(&reading(), 0.8).await);

        let err = dispatcher
            .deliver(&AlarmPayload::new(&reading(), 0.8))
            .await
            .unwrap_err();
        assert!(matches!(&err, NotificationError::Transport(msg) if msg.contains(&url)));
    }

    #[tokio::test]
    async fn test_slow_endpoint_times_out() {
        let app = Router::new().route(
            "/alarm",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                StatusCode::OK
            }),
        );
        let url = spawn_server(app).await;
        let dispatcher = AlarmDispatcher::new(Some(url)).with_timeout(Duration::from_millis(100));

        let err = dispatcher
            .deliver(&AlarmPayload::new(&reading(), 0.8))
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::Timeout(_)));
        assert!(!dispatcher.notify(&reading(), 0.8).await);
    }
}
