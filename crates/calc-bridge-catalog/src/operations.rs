//! Typed host operations over the bundled modules.
//!
//! Each function here is one host call site. Host code should go through these
//! rather than invoking exposed names directly, so that registry coverage can
//! be checked against this file.

use serde::Serialize;

use calc_bridge_common::BridgeError;
use calc_bridge_core::RuntimeBridge;

/// Result of [`cluster_analysis`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Clusters {
    /// The two centroids, lower first.
    pub centroids: [f64; 2],
    /// Cluster index of each input value.
    pub labels: Vec<usize>,
}

/// Arithmetic mean.
pub async fn mean(bridge: &RuntimeBridge, values: &[f64]) -> Result<f64, BridgeError> {
    bridge.invoke("mean", values).await
}

/// Population variance.
pub async fn variance(bridge: &RuntimeBridge, values: &[f64]) -> Result<f64, BridgeError> {
    bridge.invoke("variance", values).await
}

/// Change from `old` to `new` in percent. `old` must be non-zero.
pub async fn percent_change(
    bridge: &RuntimeBridge,
    old: f64,
    new: f64,
) -> Result<f64, BridgeError> {
    bridge.invoke("percent_change", &[old, new]).await
}

/// Population standard deviation.
pub async fn stddev(bridge: &RuntimeBridge, values: &[f64]) -> Result<f64, BridgeError> {
    bridge.invoke("stddev", values).await
}

/// Standard score of every value.
pub async fn zscores(bridge: &RuntimeBridge, values: &[f64]) -> Result<Vec<f64>, BridgeError> {
    bridge.invoke("zscores", values).await
}

/// Split values into two clusters.
pub async fn cluster_analysis(
    bridge: &RuntimeBridge,
    values: &[f64],
) -> Result<Clusters, BridgeError> {
    let raw: Vec<f64> = bridge.invoke("cluster_analysis", values).await?;

    let [c0, c1, labels @ ..] = raw.as_slice() else {
        return Err(BridgeError::marshal(
            "heavy-stats::cluster_analysis",
            format!("expected at least 2 values, got {}", raw.len()),
        ));
    };
    if labels.len() != values.len() {
        return Err(BridgeError::marshal(
            "heavy-stats::cluster_analysis",
            format!("expected {} labels, got {}", values.len(), labels.len()),
        ));
    }

    Ok(Clusters {
        centroids: [*c0, *c1],
        labels: labels.iter().map(|&l| usize::from(l > 0.5)).collect(),
    })
}
