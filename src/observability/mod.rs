//! Prometheus metrics for requests and access-gate decisions

pub mod endpoints;
pub mod metrics;
pub mod middleware;

pub use endpoints::*;
pub use metrics::*;
pub use middleware::*;
