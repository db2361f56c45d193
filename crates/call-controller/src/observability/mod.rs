//! Observability: Prometheus metrics helpers.

pub mod metrics;
