//! Prometheus metrics for the launchpad detector.
//!
//! Covers:
//! - Feed session state and reconnects
//! - Routing outcomes per feed event
//! - Published annotations per category
//! - Cache write failures
//! - Bridge clients and page interest
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A failure means duplicate metric
//! names, which is a programming error that should crash at startup. These
//! panics only occur during static initialization.

use crate::error::TelemetryResult;
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_int_counter,
    register_int_gauge, CounterVec, Encoder, Gauge, GaugeVec, IntCounter, IntGauge, TextEncoder,
};

/// Session states exported on `lpd_ws_state`.
const WS_STATES: &[&str] = &["idle", "connecting", "open", "reconnect_wait"];

/// Feed connection state (1 = connected, 0 = disconnected).
pub static WS_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("lpd_ws_connected", "Feed connection state (1=connected)").unwrap()
});

/// Session state machine current state.
/// Labels: state (idle/connecting/open/reconnect_wait)
pub static WS_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "lpd_ws_state",
        "Feed session current state (1=active, 0=inactive)",
        &["state"]
    )
    .unwrap()
});

/// Labels: reason (connect_failed/error/close/heartbeat)
pub static WS_RECONNECT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "lpd_ws_reconnect_total",
        "Total feed reconnection attempts",
        &["reason"]
    )
    .unwrap()
});

/// Labels: outcome (malformed/duplicate/unclassified/suppressed/published)
pub static FEED_EVENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "lpd_feed_events_total",
        "Feed events by routing outcome",
        &["outcome"]
    )
    .unwrap()
});

pub static FACTS_PUBLISHED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "lpd_facts_published_total",
        "Annotation facts published to pages",
        &["category"]
    )
    .unwrap()
});

pub static CACHE_WRITE_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "lpd_cache_write_failures_total",
        "Failed writes to the persisted token cache"
    )
    .unwrap()
});

pub static BRIDGE_CLIENTS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("lpd_bridge_clients", "Connected page push-stream clients").unwrap()
});

pub static PAGE_INTEREST: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "lpd_page_interest",
        "Whether a supported page is open (1=interested)"
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    pub fn ws_connected() {
        WS_CONNECTED.set(1.0);
    }

    pub fn ws_disconnected() {
        WS_CONNECTED.set(0.0);
    }

    /// Set the session state. Only the active state is 1.
    pub fn ws_state_set(state: &str) {
        for s in WS_STATES {
            WS_STATE.with_label_values(&[s]).set(0.0);
        }
        WS_STATE.with_label_values(&[state]).set(1.0);
    }

    pub fn ws_reconnect(reason: &str) {
        WS_RECONNECT_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn feed_event(outcome: &str) {
        FEED_EVENTS_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn fact_published(category: &str) {
        FACTS_PUBLISHED_TOTAL.with_label_values(&[category]).inc();
    }

    pub fn cache_write_failed() {
        CACHE_WRITE_FAILURES.inc();
    }

    pub fn bridge_clients(count: usize) {
        BRIDGE_CLIENTS.set(count as i64);
    }

    pub fn interest_set(interested: bool) {
        PAGE_INTEREST.set(if interested { 1.0 } else { 0.0 });
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let families = prometheus::gather();
        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
