//! Type introspection layer
//!
//! Describes entity classes (fields, properties, constructors) and provides dynamic instances
//! of them. Accessors and member mappings are computed from these descriptors.

pub mod class;
pub mod object;
pub mod types;

pub use class::*;
pub use object::*;
pub use types::*;
