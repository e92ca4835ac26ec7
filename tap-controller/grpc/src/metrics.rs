use prometheus_client::{
    metrics::{counter::Counter, gauge::Gauge},
    registry::Registry,
};

/// Instruments the tap data path.
#[derive(Clone, Debug, Default)]
pub struct TapMetrics {
    taps: Counter,
    active_taps: Gauge,
    observe_rpcs: Counter,
    events_forwarded: Counter,
    translate_failures: Counter,
}

// === impl TapMetrics ===

impl TapMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let metrics = Self::default();

        reg.register(
            "requests",
            "Total number of tap requests that began streaming",
            metrics.taps.clone(),
        );
        reg.register(
            "open_streams",
            "Number of tap request streams currently open",
            metrics.active_taps.clone(),
        );
        reg.register(
            "observe_rpcs",
            "Total number of Observe RPCs issued to proxies",
            metrics.observe_rpcs.clone(),
        );
        reg.register(
            "events_forwarded",
            "Total number of proxy events forwarded to clients",
            metrics.events_forwarded.clone(),
        );
        reg.register(
            "translate_failures",
            "Total number of proxy events that could not be translated",
            metrics.translate_failures.clone(),
        );

        metrics
    }

    pub(crate) fn tap_started(&self) -> ActiveTap {
        self.taps.inc();
        self.active_taps.inc();
        ActiveTap {
            active_taps: self.active_taps.clone(),
        }
    }

    pub(crate) fn observe_rpc(&self) {
        self.observe_rpcs.inc();
    }

    pub(crate) fn event_forwarded(&self) {
        self.events_forwarded.inc();
    }

    pub(crate) fn translate_failure(&self) {
        self.translate_failures.inc();
    }
}

/// Decrements the open-stream gauge when the client stream is dropped.
#[derive(Debug)]
pub(crate) struct ActiveTap {
    active_taps: Gauge,
}

impl Drop for ActiveTap {
    fn drop(&mut self) {
        self.active_taps.dec();
    }
}
