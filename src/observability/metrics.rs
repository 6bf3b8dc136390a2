//! Metrics collection and exposition.
//!
//! # Metrics
//! - `overlay_topology_refreshes_total` (counter): refreshes by result
//! - `overlay_topology_entries` (gauge): classified addresses by kind
//! - `overlay_reloads_total` (counter): reloads by trigger and result
//! - `overlay_arp_replies_total` (counter): proxy ARP replies sent
//! - `overlay_sa_ticks_total` (counter): reconciliation ticks by outcome
//! - `overlay_sa_initiations_total` (counter): CHILD_SA initiations by result
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

fn result_label(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "error"
    }
}

pub fn record_refresh(ok: bool) {
    ::metrics::counter!("overlay_topology_refreshes_total", "result" => result_label(ok)).increment(1);
}

pub fn record_topology(local: usize, remote: usize, peers: usize) {
    ::metrics::gauge!("overlay_topology_entries", "kind" => "local").set(local as f64);
    ::metrics::gauge!("overlay_topology_entries", "kind" => "remote").set(remote as f64);
    ::metrics::gauge!("overlay_topology_entries", "kind" => "peer").set(peers as f64);
}

pub fn record_reload(trigger: &'static str, ok: bool) {
    ::metrics::counter!("overlay_reloads_total", "trigger" => trigger, "result" => result_label(ok)).increment(1);
}

pub fn record_arp_reply() {
    ::metrics::counter!("overlay_arp_replies_total").increment(1);
}

pub fn record_tick(outcome: &'static str) {
    ::metrics::counter!("overlay_sa_ticks_total", "outcome" => outcome).increment(1);
}

pub fn record_sa_initiate(ok: bool) {
    ::metrics::counter!("overlay_sa_initiations_total", "result" => result_label(ok)).increment(1);
}
