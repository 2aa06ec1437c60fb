//! Prometheus view of the engine supervisor.
//!
//! Each [`EngineMetrics`] owns its registry so several services (and tests)
//! can run in one process without clashing on metric names.

use chrono::{DateTime, Utc};
use prometheus::core::Collector;
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};

pub struct EngineMetrics {
    registry: Registry,
    up: IntGauge,
    restarts: IntCounter,
    last_restart_ts: Gauge,
}

impl EngineMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let up = IntGauge::new("vigil_engine_up", "Whether the browser engine is healthy")?;
        let restarts = IntCounter::new(
            "vigil_engine_restarts_total",
            "Engine restarts triggered by failed health probes",
        )?;
        let last_restart_ts = Gauge::new(
            "vigil_engine_last_restart_timestamp_seconds",
            "Unix time of the most recent engine restart",
        )?;

        register(&registry, up.clone())?;
        register(&registry, restarts.clone())?;
        register(&registry, last_restart_ts.clone())?;

        Ok(Self {
            registry,
            up,
            restarts,
            last_restart_ts,
        })
    }

    pub fn set_up(&self, up: bool) {
        self.up.set(i64::from(up));
    }

    pub fn record_restart(&self, at: DateTime<Utc>) {
        self.restarts.inc();
        self.last_restart_ts.set(at.timestamp_millis() as f64 / 1000.0);
    }

    pub fn restarts(&self) -> u64 {
        self.restarts.get()
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Text exposition format, as served on a `/metrics` endpoint.
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn register<C>(registry: &Registry, collector: C) -> Result<(), prometheus::Error>
where
    C: Collector + 'static,
{
    registry.register(Box::new(collector))
}
