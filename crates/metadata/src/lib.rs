//! # elif-metadata: Entity Metadata for elif.rs
//!
//! The metadata layer of the elif.rs ORM: an in-memory model of entity types, properties,
//! keys, foreign keys and navigations, with string and typed annotations on every element.
//!
//! On top of the model sit the pieces the change tracker and materializer use at runtime:
//! cached property getters and collection accessors for navigations, the mapping of
//! properties to the class members that store them, and the relationship conventions that
//! turn a navigation declaration into foreign keys, keys and shadow properties.

pub mod accessors;
pub mod annotations;
pub mod builder;
pub mod clr;
pub mod config;
pub mod error;
pub mod mapping;
pub mod model;
pub mod relationships;

// Re-export the public surface
pub use accessors::*;
pub use annotations::*;
pub use builder::*;
pub use clr::*;
pub use config::*;
pub use error::*;
pub use mapping::*;
pub use model::*;
pub use relationships::*;
