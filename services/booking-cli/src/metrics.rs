//! Prometheus metrics exposition
//!
//! The session layer records through the `metrics` facade:
//!
//! - `session_refresh_total` (counter): label `outcome` (`success` | `failure` | `abandoned`)
//! - `session_retries_total` (counter): replays issued with a newer credential
//! - `session_ended_total` (counter): sessions cleared by refresh failure or logout

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")?;
    describe();
    Ok(handle)
}

/// Register help text for the session counters.
pub fn describe() {
    metrics::describe_counter!(
        "session_refresh_total",
        "Credential refresh cycles by outcome"
    );
    metrics::describe_counter!(
        "session_retries_total",
        "Requests replayed with a newer credential"
    );
    metrics::describe_counter!(
        "session_ended_total",
        "Sessions ended by refresh failure or logout"
    );
}
