//! In-process metrics.
//!
//! Stored as atomics behind `DashMap` label sets and rendered as Prometheus
//! text by the `/metrics` handler.

pub mod metrics;
