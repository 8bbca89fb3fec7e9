//! Error classes of the graph core.
//!
//! Two classes matter at the request boundary: `BadRequest` is a caller
//! mistake and is reported back without retry; `InvariantViolation` means
//! upstream telemetry or cluster data broke an identity invariant, so the
//! whole request fails as an internal error. A violation carries the full
//! identity tuple so the boundary can log it with context.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(
        "failed ID generation: namespace=[{namespace}] workload=[{workload}] app=[{app}] version=[{version}] service=[{service}] graphType=[{graph_type}]"
    )]
    InvariantViolation {
        namespace: String,
        workload: String,
        app: String,
        version: String,
        service: String,
        graph_type: String,
    },
}

impl GraphError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        GraphError::BadRequest(msg.into())
    }
}
