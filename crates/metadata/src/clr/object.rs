//! Dynamic instances of registered classes

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use super::class::{ClrClass, ClrProperty};
use super::types::{ClrType, CollectionType};
use crate::annotations::TypedValue;
use crate::error::{MetadataError, MetadataResult};

/// Shared handle to an entity instance
pub type ObjectRef = Rc<RefCell<ClrObject>>;

/// Shared handle to a collection instance
pub type CollectionRef = Rc<RefCell<ClrCollection>>;

/// A value held by a field slot
#[derive(Debug, Clone, Default)]
pub enum ClrValue {
    #[default]
    Null,
    Scalar(TypedValue),
    Object(ObjectRef),
    Collection(CollectionRef),
}

impl ClrValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_scalar(&self) -> Option<&TypedValue> {
        match self {
            Self::Scalar(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&CollectionRef> {
        match self {
            Self::Collection(collection) => Some(collection),
            _ => None,
        }
    }
}

impl PartialEq for ClrValue {
    /// Scalars compare by value, objects and collections by identity
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Scalar(left), Self::Scalar(right)) => left == right,
            (Self::Object(left), Self::Object(right)) => Rc::ptr_eq(left, right),
            (Self::Collection(left), Self::Collection(right)) => Rc::ptr_eq(left, right),
            _ => false,
        }
    }
}

impl From<TypedValue> for ClrValue {
    fn from(value: TypedValue) -> Self {
        Self::Scalar(value)
    }
}

/// An instance of a [`ClrClass`]: one slot per field and per unbacked property
#[derive(Debug, Clone)]
pub struct ClrObject {
    class: Arc<ClrClass>,
    slots: HashMap<String, ClrValue>,
}

impl ClrObject {
    /// Create an instance with every slot holding its type's default
    pub fn new(class: Arc<ClrClass>) -> Self {
        let mut slots = HashMap::new();
        for field in class.fields() {
            slots
                .entry(field.name.clone())
                .or_insert_with(|| default_slot(&field.ty));
        }
        for property in class.properties() {
            slots
                .entry(property.storage_key())
                .or_insert_with(|| default_slot(&property.ty));
        }

        Self { class, slots }
    }

    /// Wrap the instance in a shared handle
    pub fn into_ref(self) -> ObjectRef {
        Rc::new(RefCell::new(self))
    }

    pub fn class(&self) -> &Arc<ClrClass> {
        &self.class
    }

    /// Read a field slot
    pub fn field(&self, name: &str) -> MetadataResult<&ClrValue> {
        self.slots
            .get(name)
            .ok_or_else(|| MetadataError::not_found("Field", format!("{}.{}", self.class.name(), name)))
    }

    /// Write a field slot
    pub fn set_field(&mut self, name: &str, value: ClrValue) -> MetadataResult<()> {
        match self.slots.get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(MetadataError::not_found(
                "Field",
                format!("{}.{}", self.class.name(), name),
            )),
        }
    }

    /// Read a property through its getter
    pub fn get_property(&self, name: &str) -> MetadataResult<ClrValue> {
        let property = self.class.find_property(name).ok_or_else(|| MetadataError::NoClrProperty {
            class: self.class.name().to_string(),
            property: name.to_string(),
        })?;
        if !property.has_getter() {
            return Err(MetadataError::NoGetter {
                class: self.class.name().to_string(),
                property: name.to_string(),
            });
        }
        self.read_storage(property)
    }

    /// Write a property through the most derived declaration that has a setter
    pub fn set_property(&mut self, name: &str, value: ClrValue) -> MetadataResult<()> {
        let storage = match self.class.find_setter(name) {
            Some(property) => property.storage_key(),
            None => {
                return Err(MetadataError::NoSetter {
                    class: self.class.name().to_string(),
                    property: name.to_string(),
                })
            }
        };
        self.set_field(&storage, value)
    }

    /// Read the slot behind a property declaration, bypassing accessibility
    pub fn read_storage(&self, property: &ClrProperty) -> MetadataResult<ClrValue> {
        self.field(&property.storage_key()).cloned()
    }

    /// Write the slot behind a property declaration, bypassing accessibility
    pub fn write_storage(&mut self, property: &ClrProperty, value: ClrValue) -> MetadataResult<()> {
        self.set_field(&property.storage_key(), value)
    }
}

fn default_slot(ty: &ClrType) -> ClrValue {
    match ty.default_value() {
        Some(value) => ClrValue::Scalar(value),
        None => ClrValue::Null,
    }
}

/// A collection instance holding entity references
#[derive(Debug, Clone)]
pub struct ClrCollection {
    collection_type: CollectionType,
    items: Vec<ObjectRef>,
}

impl ClrCollection {
    pub fn new(collection_type: CollectionType) -> Self {
        Self {
            collection_type,
            items: Vec::new(),
        }
    }

    pub fn into_ref(self) -> CollectionRef {
        Rc::new(RefCell::new(self))
    }

    pub fn collection_type(&self) -> &CollectionType {
        &self.collection_type
    }

    /// Add an item; sets ignore an item that is already present
    pub fn add(&mut self, item: ObjectRef) -> bool {
        if self.collection_type.shape.has_set_semantics() && self.contains(&item) {
            return false;
        }
        self.items.push(item);
        true
    }

    /// Remove the first occurrence of an item
    pub fn remove(&mut self, item: &ObjectRef) -> bool {
        match self.items.iter().position(|existing| Rc::ptr_eq(existing, item)) {
            Some(index) => {
                self.items.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, item: &ObjectRef) -> bool {
        self.items.iter().any(|existing| Rc::ptr_eq(existing, item))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObjectRef> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
