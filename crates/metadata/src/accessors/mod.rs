//! Accessor sources
//!
//! Accessors are synthesized once per (class, member) from the registered class descriptors and
//! cached, so consumers such as change tracking can read properties and mutate collection
//! navigations of [`ClrObject`] instances without looking up members each time.

pub mod collection;
pub mod collection_type;
pub mod getter;

pub use collection::*;
pub use collection_type::*;
pub use getter::*;

use std::fmt;

use crate::clr::{ClrObject, ClrValue, CollectionRef, ObjectRef};
use crate::error::MetadataResult;

/// Reads the value of one property from an entity instance
pub trait ClrPropertyGetter: fmt::Debug + Send + Sync {
    fn get_clr_value(&self, entity: &ClrObject) -> MetadataResult<ClrValue>;
}

/// Mutates the collection behind a to-many navigation
///
/// `add`, `contains` and `remove` create and assign the collection when the entity does not
/// hold one yet; `items` treats a missing collection as empty.
pub trait ClrCollectionAccessor: fmt::Debug + Send + Sync {
    fn navigation_name(&self) -> &str;

    fn add(&self, entity: &mut ClrObject, value: ObjectRef) -> MetadataResult<()>;

    fn contains(&self, entity: &mut ClrObject, value: &ObjectRef) -> MetadataResult<bool>;

    fn remove(&self, entity: &mut ClrObject, value: &ObjectRef) -> MetadataResult<bool>;

    /// The collection held by the entity, created first if absent
    fn get_or_create(&self, entity: &mut ClrObject) -> MetadataResult<CollectionRef>;

    fn items(&self, entity: &ClrObject) -> MetadataResult<Vec<ObjectRef>>;
}
