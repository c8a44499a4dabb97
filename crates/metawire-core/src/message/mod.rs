//! Runtime messages and the visitation protocol.

mod generic;
mod value;
mod visitor;

pub use generic::{visit_scalar, GenericMessage};
pub use value::Value;
pub use visitor::{FieldInfo, Visitable, Visitor};

pub use crate::codec::WireValue;
