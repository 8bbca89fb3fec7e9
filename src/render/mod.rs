//! Vendor-facing document generation.
//!
//! A finished traffic map is handed here exactly once per request; vendors
//! are selected by name from the resolved options.

pub mod cytoscape;

use serde::Serialize;

use crate::error::GraphError;
use crate::graph::TrafficMap;
use crate::options::Options;

/// The serialized visualization payload, by vendor.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum VendorDocument {
    Cytoscape(cytoscape::Config),
}

/// Serialize a finished traffic map with the vendor the options selected.
/// An unsupported vendor name is a request error.
pub fn render(traffic_map: &TrafficMap, options: &Options) -> Result<VendorDocument, GraphError> {
    match options.vendor.as_str() {
        "cytoscape" => Ok(VendorDocument::Cytoscape(cytoscape::new_config(
            traffic_map,
            &options.vendor_options,
        ))),
        other => Err(GraphError::bad_request(format!(
            "unsupported vendor [{other}]"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{GraphRequest, build_options};
    use crate::telemetry::test_support::namespace_meta;

    #[test]
    fn unsupported_vendor_is_reported() {
        let options = build_options(
            &GraphRequest {
                namespace: Some("testns".to_string()),
                vendor: Some("graphviz".to_string()),
                ..Default::default()
            },
            &namespace_meta(&["testns"]),
        )
        .unwrap();
        let err = render(&TrafficMap::new(), &options).unwrap_err();
        assert!(matches!(err, GraphError::BadRequest(_)));
    }
}
