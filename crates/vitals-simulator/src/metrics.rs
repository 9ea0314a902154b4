use std::time::Instant;

/// Counters for the simulation loop, summarized through `tracing` every
/// `log_interval_ticks` ticks.
#[derive(Debug, Default)]
pub struct TickMetrics {
    pub ticks: u64,
    pub anomalies: u64,
    pub alarms_delivered: u64,
    pub alarms_failed: u64,
    pub store_failures: u64,
    pub last_tick_ms: u64,
    log_interval_ticks: u64,
}

impl TickMetrics {
    pub fn new(log_interval_ticks: u64) -> Self {
        Self {
            log_interval_ticks,
            ..Self::default()
        }
    }

    pub fn record_store_failure(&mut self) {
        self.store_failures += 1;
    }

    pub fn record_anomaly(&mut self) {
        self.anomalies += 1;
    }

    pub fn record_alarm(&mut self, delivered: bool) {
        if delivered {
            self.alarms_delivered += 1;
        } else {
            self.alarms_failed += 1;
        }
    }

    pub fn finish_tick(&mut self, tick_start: Instant) {
        self.last_tick_ms = tick_start.elapsed().as_millis() as u64;
        self.ticks += 1;

        if self.log_interval_ticks > 0 && self.ticks % self.log_interval_ticks == 0 {
            self.log_metrics();
        }
    }

    /// Share of ticks flagged anomalous (0-100%).
    pub fn anomaly_rate(&self) -> f64 {
        if self.ticks == 0 {
            return 0.0;
        }
        self.anomalies as f64 / self.ticks as f64 * 100.0
    }

    pub fn log_metrics(&self) {
        tracing::info!(
            ticks = self.ticks,
            anomalies = self.anomalies,
            anomaly_rate = format!("{:.1}%", self.anomaly_rate()),
            alarms_delivered = self.alarms_delivered,
            alarms_failed = self.alarms_failed,
            store_failures = self.store_failures,
            last_tick_ms = self.last_tick_ms,
            "Simulator metrics summary"
        );
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "ticks": self.ticks,
            "anomalies": self.anomalies,
            "alarms_delivered": self.alarms_delivered,
            "alarms_failed": self.alarms_failed,
            "store_failures": self.store_failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let mut m = TickMetrics::new(2);
        m.record_anomaly();
        m.record_alarm(true);
        m.record_alarm(false);
        m.record_store_failure();
        m.finish_tick(Instant::now());
        m.finish_tick(Instant::now());

        assert_eq!(m.ticks, 2);
        assert_eq!(m.anomaly_rate(), 50.0);
        assert_eq!(
            m.to_json(),
            serde_json::json!({
                "ticks": 2,
                "anomalies": 1,
                "alarms_delivered": 1,
                "alarms_failed": 1,
                "store_failures": 1,
            })
        );
    }

    #[test]
    fn test_anomaly_rate_without_ticks() {
        assert_eq!(TickMetrics::new(0).anomaly_rate(), 0.0);
    }
}
