//! Top-level facade crate for metawire.
//!
//! Re-exports the message core and the UDP relay so users can depend on a single crate.

pub mod core {
    pub use metawire_core::*;
}

pub mod relay {
    pub use metawire_relay::*;
}
