use std::collections::BTreeMap;
use std::future::Future;
use std::time::{Duration, Instant};

use anomaly_detector::{AnomalyScorer, AnomalyVerdict};
use notification_service::{AlarmDispatcher, AlarmNotifier};
use reading_store::SharedReadingStore;
use tokio::time;
use vitals_core::math::validate_ranges;
use vitals_core::{DetectionConfig, Reading, Settings};

use crate::metrics::TickMetrics;
use crate::variance;

/// What one tick produced.
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub reading: Reading,
    pub verdict: AnomalyVerdict,
    /// Parameters outside their normal resting range.
    pub out_of_range: Vec<String>,
    pub stored: bool,
    /// `Some(delivered)` when an alarm was attempted.
    pub alarm: Option<bool>,
}

/// Drives the generate, store, score, notify cycle.
pub struct Orchestrator {
    base_values: BTreeMap<String, f64>,
    dispersion: f64,
    detection: DetectionConfig,
    store: SharedReadingStore,
    scorer: AnomalyScorer,
    notifier: Box<dyn AlarmNotifier>,
    metrics: TickMetrics,
}

impl Orchestrator {
    pub fn new(
        settings: &Settings,
        store: SharedReadingStore,
        scorer: AnomalyScorer,
        notifier: Box<dyn AlarmNotifier>,
    ) -> Self {
        Self {
            base_values: settings.base_values(),
            dispersion: settings.dispersion_default,
            detection: settings.detection(),
            store,
            scorer,
            notifier,
            metrics: TickMetrics::new(settings.metrics_log_interval_ticks),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings,
            SharedReadingStore::from_settings(settings),
            AnomalyScorer::from_settings(settings),
            Box::new(AlarmDispatcher::from_settings(settings)),
        )
    }

    pub fn metrics(&self) -> &TickMetrics {
        &self.metrics
    }

    pub fn scorer(&self) -> &AnomalyScorer {
        &self.scorer
    }

    pub async fn tick(&mut self) -> TickOutcome {
        let start = Instant::now();

        let reading = variance::generate(&self.base_values, self.dispersion);

        let stored = match self.store.store(&reading) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to publish reading to {}: {}", self.store.path().display(), e);
                self.metrics.record_store_failure();
                false
            }
        };

        let out_of_range: Vec<String> = validate_ranges(&reading)
            .into_iter()
            .filter_map(|(name, ok)| (!ok).then_some(name))
            .collect();
        if !out_of_range.is_empty() {
            tracing::debug!("Outside resting range: {}", out_of_range.join(", "));
        }

        let verdict = self.scorer.score(&reading, &self.detection);
        tracing::debug!(
            "Tick {}: score {:.3} via {} (anomaly: {})",
            self.metrics.ticks + 1,
            verdict.score,
            verdict.method,
            verdict.is_anomaly
        );

        let alarm = if verdict.is_anomaly {
            self.metrics.record_anomaly();
            tracing::info!("Anomaly detected: score {:.3} via {}", verdict.score, verdict.method);
            let delivered = self.notifier.notify(&reading, verdict.score).await;
            if !delivered {
                tracing::warn!("Alarm via {} not delivered", self.notifier.name());
            }
            self.metrics.record_alarm(delivered);
            Some(delivered)
        } else {
            None
        };

        self.metrics.finish_tick(start);
        TickOutcome {
            reading,
            verdict,
            out_of_range,
            stored,
            alarm,
        }
    }

    /// Tick every `period` until `shutdown` resolves. The first tick fires
    /// immediately.
    pub async fn run<F>(mut self, period: Duration, shutdown: F) -> TickMetrics
    where
        F: Future<Output = ()>,
    {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                _ = &mut shutdown => {
                    tracing::info!("Shutdown signal received, stopping simulation");
                    self.metrics.log_metrics();
                    break;
                }
            }
        }
        self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anomaly_detector::{DetectionMethod, FileArtifactLoader};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    struct RecordingNotifier {
        scores: Arc<Mutex<Vec<f64>>>,
        deliver: bool,
    }

    #[async_trait]
    impl AlarmNotifier for RecordingNotifier {
        async fn notify(&self, _reading: &Reading, score: f64) -> bool {
            self.scores.lock().unwrap().push(score);
            self.deliver
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    fn settings_in(dir: &std::path::Path, overrides: &str) -> Settings {
        Settings {
            dispersion_default: 0.0,
            vitals_overrides: vitals_core::config::parse_overrides(overrides).unwrap(),
            shared_state_path: dir.join("vitals.json"),
            model_artifact_path: dir.join("missing-model.json"),
            ..Settings::default()
        }
    }

    fn orchestrator(settings: &Settings, deliver: bool) -> (Orchestrator, Arc<Mutex<Vec<f64>>>) {
        let scores = Arc::new(Mutex::new(Vec::new()));
        let orchestrator = Orchestrator::new(
            settings,
            SharedReadingStore::from_settings(settings),
            AnomalyScorer::new(FileArtifactLoader::new(settings.model_artifact_path.clone())),
            Box::new(RecordingNotifier {
                scores: Arc::clone(&scores),
                deliver,
            }),
        );
        (orchestrator, scores)
    }

    const EXTREME: &str = "heart_rate=150,oxygen_saturation=85,breathing_rate=35,\
                           systolic_bp=180,diastolic_bp=110,body_temperature=40";

    #[tokio::test]
    async fn test_resting_tick_stores_without_alarm() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path(), "");
        let (mut orch, scores) = orchestrator(&settings, true);

        let outcome = orch.tick().await;
        assert!(outcome.stored);
        assert!(!outcome.verdict.is_anomaly);
        assert!(outcome.alarm.is_none());
        assert!(outcome.out_of_range.is_empty());
        assert!(scores.lock().unwrap().is_empty());

        let other = SharedReadingStore::new(&settings.shared_state_path);
        assert!(other.load().same_values(&outcome.reading));
        assert_eq!(orch.metrics().ticks, 1);
    }

    #[tokio::test]
    async fn test_anomalous_tick_raises_alarm() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path(), EXTREME);
        let (mut orch, scores) = orchestrator(&settings, true);

        let outcome = orch.tick().await;
        assert!(outcome.verdict.is_anomaly);
        assert!((0.75..=1.0).contains(&outcome.verdict.score));
        assert_eq!(outcome.alarm, Some(true));
        assert_eq!(scores.lock().unwrap().as_slice(), [outcome.verdict.score]);
        assert_eq!(
            outcome.out_of_range,
            [
                "blood_pressure_diastolic",
                "blood_pressure_systolic",
                "body_temperature",
                "breathing_rate",
                "heart_rate",
                "oxygen_saturation",
            ]
        );

        let m = orch.metrics();
        assert_eq!((m.anomalies, m.alarms_delivered, m.alarms_failed), (1, 1, 0));
    }

    #[tokio::test]
    async fn test_failed_alarm_is_counted() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path(), EXTREME);
        let (mut orch, _) = orchestrator(&settings, false);

        assert_eq!(orch.tick().await.alarm, Some(false));
        assert_eq!(orch.metrics().alarms_failed, 1);
    }

    #[tokio::test]
    async fn test_store_failure_does_not_stop_tick() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();
        let mut settings = settings_in(dir.path(), EXTREME);
        settings.shared_state_path = blocker.join("vitals.json");
        let (mut orch, scores) = orchestrator(&settings, true);

        let outcome = orch.tick().await;
        assert!(!outcome.stored);
        assert!(outcome.verdict.is_anomaly);
        assert_eq!(scores.lock().unwrap().len(), 1);
        assert_eq!(orch.metrics().store_failures, 1);
    }

    #[tokio::test]
    async fn test_model_method_without_artifact_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings_in(dir.path(), EXTREME);
        settings.anomaly_method = "EIF".into();
        let (mut orch, _) = orchestrator(&settings, true);

        let outcome = orch.tick().await;
        assert_eq!(outcome.verdict.method, DetectionMethod::Distance);
        assert!(outcome.verdict.is_anomaly);
        assert_eq!(orch.scorer().total_fallbacks(), 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path(), "");
        let (orch, _) = orchestrator(&settings, true);

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(orch.run(Duration::from_millis(10), async move {
            rx.await.ok();
        }));
        time::sleep(Duration::from_millis(60)).await;
        tx.send(()).unwrap();

        let metrics = handle.await.unwrap();
        assert!(metrics.ticks >= 1);
        assert!(settings.shared_state_path.exists());
    }
}
