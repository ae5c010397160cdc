pub mod capturing;
pub mod consts;

use opentelemetry::{
    metrics::{Counter, Histogram, Meter, MeterProvider},
    KeyValue,
};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

pub trait MetricsServiceTrait: Send + Sync {
    fn record_latency(&self, name: &str, duration: Duration, tags: &[&str]);
    fn record_count(&self, name: &str, value: i64, tags: &[&str]);
}

pub struct OtlpMetricsService {
    meter: Meter,
    // Cache instruments to avoid recreating them
    latency_histograms: Mutex<HashMap<String, Histogram<u64>>>,
    counters: Mutex<HashMap<String, Counter<u64>>>,
}

impl OtlpMetricsService {
    pub fn new(meter_provider: &impl MeterProvider) -> Self {
        let meter = meter_provider.meter("mail-admin");
        Self {
            meter,
            latency_histograms: Mutex::new(HashMap::new()),
            counters: Mutex::new(HashMap::new()),
        }
    }

    fn parse_tags(tags: &[&str]) -> Vec<KeyValue> {
        tags.iter()
            .filter_map(|tag| {
                let (key, value) = tag.split_once(':')?;
                Some(KeyValue::new(key.to_string(), value.to_string()))
            })
            .collect()
    }
}

impl MetricsServiceTrait for OtlpMetricsService {
    fn record_latency(&self, name: &str, duration: Duration, tags: &[&str]) {
        let Ok(mut histograms) = self.latency_histograms.lock() else {
            return;
        };
        let histogram = histograms.entry(name.to_string()).or_insert_with(|| {
            let description = match name {
                consts::METRIC_LIMIT_CHECK_DURATION => "Time to evaluate a limit check",
                _ => "Latency measurement",
            };

            self.meter
                .u64_histogram(name.to_string())
                .with_description(description)
                .with_unit("ms")
                .build()
        });

        let kv_tags = Self::parse_tags(tags);
        histogram.record(duration.as_millis() as u64, &kv_tags);
    }

    fn record_count(&self, name: &str, value: i64, tags: &[&str]) {
        let Ok(mut counters) = self.counters.lock() else {
            return;
        };
        let counter = counters.entry(name.to_string()).or_insert_with(|| {
            let description = match name {
                consts::METRIC_LIMIT_CHECKS => "Limit checks evaluated against a stored record",
                consts::METRIC_LIMIT_EXCEEDED => "Requests refused because a limit was reached",
                consts::METRIC_LIMIT_RECORDS_CREATED => "Limit records materialized",
                consts::METRIC_LIMIT_SYNC_ERRORS => "Limit synchronization failures by error type",
                _ => "Count",
            };

            self.meter
                .u64_counter(name.to_string())
                .with_description(description)
                .build()
        });

        let kv_tags = Self::parse_tags(tags);
        counter.add(value.max(0) as u64, &kv_tags);
    }
}

// Helper functions for creating properly formatted tags
/// Create a tag in the "key:value" format
pub fn tag(key: &str, value: impl std::fmt::Display) -> String {
    format!("{key}:{value}")
}

/// Create multiple tags from key-value pairs
pub fn tags(pairs: &[(&str, &str)]) -> Vec<String> {
    pairs.iter().map(|(k, v)| tag(k, v)).collect()
}

// Discards every measurement, for tools that run without an exporter
pub struct NoopMetricsService;

impl MetricsServiceTrait for NoopMetricsService {
    fn record_latency(&self, _name: &str, _duration: Duration, _tags: &[&str]) {}
    fn record_count(&self, _name: &str, _value: i64, _tags: &[&str]) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry_sdk::metrics::SdkMeterProvider;

    #[test]
    fn test_tags_are_formatted_as_key_value() {
        assert_eq!(
            tags(&[("principal_kind", "user"), ("resource_type", "mailboxes")]),
            vec!["principal_kind:user", "resource_type:mailboxes"]
        );
    }

    #[test]
    fn test_parse_tags_skips_malformed_entries() {
        let parsed = OtlpMetricsService::parse_tags(&["principal_kind:user", "garbage"]);
        assert_eq!(parsed, vec![KeyValue::new("principal_kind", "user")]);
    }

    #[test]
    fn test_otlp_service_reuses_instruments() {
        let provider = SdkMeterProvider::builder().build();
        let service = OtlpMetricsService::new(&provider);

        service.record_count(consts::METRIC_LIMIT_CHECKS, 1, &["principal_kind:user"]);
        service.record_count(consts::METRIC_LIMIT_CHECKS, 1, &["principal_kind:domain"]);
        service.record_latency(
            consts::METRIC_LIMIT_CHECK_DURATION,
            Duration::from_millis(3),
            &[],
        );

        assert_eq!(service.counters.lock().unwrap().len(), 1);
        assert_eq!(service.latency_histograms.lock().unwrap().len(), 1);
    }
}
