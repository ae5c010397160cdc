use crate::metrics::MetricsServiceTrait;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedMetric {
    pub name: String,
    pub value: MetricValue,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Latency(Duration),
    Count(i64),
}

/// Keeps every recorded metric in memory so tests can assert on them
#[derive(Default)]
pub struct CapturingMetricsService {
    pub metrics: std::sync::Mutex<Vec<RecordedMetric>>,
}

impl CapturingMetricsService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_metrics(&self) -> Vec<RecordedMetric> {
        self.metrics.lock().unwrap().clone()
    }

    /// Sum of all counts recorded under `name`
    pub fn count_total(&self, name: &str) -> i64 {
        self.get_metrics()
            .iter()
            .filter(|m| m.name == name)
            .filter_map(|m| match m.value {
                MetricValue::Count(v) => Some(v),
                MetricValue::Latency(_) => None,
            })
            .sum()
    }
}

impl MetricsServiceTrait for CapturingMetricsService {
    fn record_latency(&self, name: &str, duration: Duration, tags: &[&str]) {
        let mut metrics = self.metrics.lock().unwrap();
        metrics.push(RecordedMetric {
            name: name.to_string(),
            value: MetricValue::Latency(duration),
            tags: tags.iter().map(|s| s.to_string()).collect(),
        });
    }

    fn record_count(&self, name: &str, value: i64, tags: &[&str]) {
        let mut metrics = self.metrics.lock().unwrap();
        metrics.push(RecordedMetric {
            name: name.to_string(),
            value: MetricValue::Count(value),
            tags: tags.iter().map(|s| s.to_string()).collect(),
        });
    }
}
