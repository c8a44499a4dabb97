//! Dispatcher module exports.

pub mod dispatcher;

pub use dispatcher::{DispatchOutcome, Dispatcher, EnvelopeCtx, EnvelopeHandler};
