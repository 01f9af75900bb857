//! The bundled method registry.

use calc_bridge_common::BridgeError;
use calc_bridge_core::{CallAbi, CallContract, MethodRegistry};

/// Every operation the bundled modules expose.
pub static CONTRACTS: &[CallContract] = &[
    CallContract::new("mean", "descriptive", "mean", CallAbi::Vector),
    CallContract::new("variance", "descriptive", "variance", CallAbi::Vector),
    CallContract::new("percent_change", "descriptive", "percent_change", CallAbi::Scalar),
    CallContract::new("stddev", "heavy-stats", "standard_deviation", CallAbi::Vector),
    CallContract::new("zscores", "heavy-stats", "zscores", CallAbi::Vector),
    CallContract::new("cluster_analysis", "heavy-stats", "cluster_analysis", CallAbi::Vector),
];

/// A registry holding [`CONTRACTS`].
///
/// # Errors
///
/// Returns an error if the table names an operation or target twice.
pub fn bundled_registry() -> Result<MethodRegistry, BridgeError> {
    MethodRegistry::new(CONTRACTS.iter().cloned())
}
