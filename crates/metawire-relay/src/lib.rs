//! metawire relay library entry.
//!
//! Wires the UDP transport, container framing, envelope dispatcher and
//! output handlers into a relay that receives schema-driven messages and
//! renders them. Consumed by the binary (`main.rs`) and by integration tests.

pub mod app_state;
pub mod config;
pub mod dispatch;
pub mod handlers;
pub mod obs;
pub mod ops;
pub mod relay;
pub mod router;
pub mod transport;
