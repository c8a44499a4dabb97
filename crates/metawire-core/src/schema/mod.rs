//! Message-definition language and the compiled type model.
//!
//! ```text
//! package geo : 100 {
//!     message Point { double x = 1; double y = 2; }
//!     message Path : 7 {
//!         repeated Point points = 1;
//!         string label = 2 [default = "unnamed"];
//!     }
//! }
//! ```
//!
//! [`parse`] runs the two passes ([`parser::collect`] then
//! [`resolve::resolve`]) and never fails: problems come back as diagnostics
//! next to whatever could be compiled.

pub mod lexer;
pub mod meta;
pub mod parser;
pub mod resolve;

pub use meta::{FieldKind, FieldType, MetaField, MetaMessage, ScalarType, Schema};

use crate::error::Decoded;

/// Compiled schema plus parse diagnostics.
pub type ParseOutput = Decoded<Schema>;

/// Compile message-definition text.
pub fn parse(source: &str) -> ParseOutput {
    let (collected, mut diagnostics) = parser::collect(source);
    let schema = resolve::resolve(collected, &mut diagnostics);
    for d in &diagnostics {
        tracing::debug!(kind = d.kind.as_str(), position = %d.position, "{}", d.message);
    }
    Decoded::new(schema, diagnostics)
}

impl Schema {
    /// Same as [`parse`].
    pub fn parse(source: &str) -> ParseOutput {
        parse(source)
    }
}
