//! Annotation store attached to every metadata element

pub mod typed;

pub use typed::*;

use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::{MetadataError, MetadataResult};

/// Annotation naming the field that backs a property
pub const BACKING_FIELD: &str = "BackingField";

/// A single name/value pair; typed annotations also carry the codec tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Annotation {
    pub name: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
}

/// Name-ordered annotations of one metadata element
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotations {
    entries: BTreeMap<String, Annotation>,
}

impl Annotations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a string value, replacing any previous value under the same name
    pub fn set<V: Into<String>>(&mut self, name: &str, value: Option<V>) -> MetadataResult<()> {
        let value = value.ok_or_else(|| MetadataError::argument("value", "annotation value must be provided"))?;
        self.insert(name, value.into(), None)
    }

    /// Read a stored value
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|annotation| annotation.value.as_str())
    }

    pub fn find(&self, name: &str) -> Option<&Annotation> {
        self.entries.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Annotation> {
        self.entries.remove(name)
    }

    /// Store a primitive value so it decodes back exactly
    pub fn set_typed(&mut self, name: &str, value: &TypedValue) -> MetadataResult<()> {
        let encoded = value.encode();
        self.insert(name, encoded.value, Some(encoded.type_tag))
    }

    /// Read a typed value; plain annotations are returned as strings
    pub fn get_typed(&self, name: &str) -> MetadataResult<Option<TypedValue>> {
        match self.entries.get(name) {
            None => Ok(None),
            Some(Annotation {
                value,
                type_tag: Some(tag),
                ..
            }) => TypedAnnotation::new(tag.clone(), value.clone()).decode().map(Some),
            Some(annotation) => Ok(Some(TypedValue::String(annotation.value.clone()))),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Annotation> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, name: &str, value: String, type_tag: Option<String>) -> MetadataResult<()> {
        if name.is_empty() {
            return Err(MetadataError::argument("name", "annotation name must not be empty"));
        }

        self.entries.insert(
            name.to_string(),
            Annotation {
                name: name.to_string(),
                value,
                type_tag,
            },
        );
        Ok(())
    }
}

/// Implemented by every metadata element that carries annotations
pub trait Annotatable {
    fn annotations(&self) -> &Annotations;

    fn annotations_mut(&mut self) -> &mut Annotations;

    fn annotation(&self, name: &str) -> Option<&str> {
        self.annotations().get(name)
    }

    fn set_annotation(&mut self, name: &str, value: impl Into<String>) -> MetadataResult<()>
    where
        Self: Sized,
    {
        self.annotations_mut().set(name, Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let mut annotations = Annotations::new();
        annotations.set("Relational:TableName", Some("Customers")).unwrap();
        assert_eq!(annotations.get("Relational:TableName"), Some("Customers"));
        assert_eq!(annotations.get("Missing"), None);

        annotations.set("Relational:TableName", Some("Clients")).unwrap();
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations.get("Relational:TableName"), Some("Clients"));
    }

    #[test]
    fn test_empty_name_or_absent_value_is_rejected() {
        let mut annotations = Annotations::new();
        assert!(matches!(
            annotations.set("", Some("value")),
            Err(MetadataError::ArgumentInvalid { .. })
        ));
        assert!(matches!(
            annotations.set::<String>("Name", None),
            Err(MetadataError::ArgumentInvalid { .. })
        ));
        assert!(annotations.is_empty());
    }

    #[test]
    fn test_typed_values() {
        let mut annotations = Annotations::new();
        annotations.set_typed("MaxLength", &TypedValue::I32(-256)).unwrap();
        annotations.set("Comment", Some("plain")).unwrap();

        assert_eq!(annotations.find("MaxLength").unwrap().type_tag.as_deref(), Some("i32"));
        assert_eq!(annotations.get_typed("MaxLength").unwrap(), Some(TypedValue::I32(-256)));
        assert_eq!(
            annotations.get_typed("Comment").unwrap(),
            Some(TypedValue::String("plain".into()))
        );
        assert_eq!(annotations.get_typed("Missing").unwrap(), None);
    }

    #[test]
    fn test_iteration_is_ordered_by_name() {
        let mut annotations = Annotations::new();
        annotations.set("b", Some("2")).unwrap();
        annotations.set("a", Some("1")).unwrap();
        let names: Vec<&str> = annotations.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
