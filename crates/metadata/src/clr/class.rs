//! Class descriptors registered by application code
//!
//! A [`ClrClass`] describes the member layout of an entity class: its fields, its properties
//! and how each property is stored. The metadata layer never inspects Rust types at runtime;
//! everything it binds to comes from these descriptors.

use std::sync::Arc;

use super::types::{Accessibility, ClrType};

/// A field declared on a class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClrField {
    pub name: String,
    pub ty: ClrType,
    pub declaring_class: String,
}

/// A property declared on a class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClrProperty {
    pub name: String,
    pub ty: ClrType,
    pub getter: Option<Accessibility>,
    pub setter: Option<Accessibility>,
    /// Field read by the getter and written by the setter
    pub backing_field: Option<String>,
    pub declaring_class: String,
}

impl ClrProperty {
    /// A property with a public getter and no setter
    pub fn new(name: impl Into<String>, ty: ClrType) -> Self {
        Self {
            name: name.into(),
            ty,
            getter: Some(Accessibility::Public),
            setter: None,
            backing_field: None,
            declaring_class: String::new(),
        }
    }

    pub fn with_getter(mut self, getter: Option<Accessibility>) -> Self {
        self.getter = getter;
        self
    }

    pub fn with_setter(mut self, setter: Option<Accessibility>) -> Self {
        self.setter = setter;
        self
    }

    pub fn backed_by(mut self, field: impl Into<String>) -> Self {
        self.backing_field = Some(field.into());
        self
    }

    pub fn has_getter(&self) -> bool {
        self.getter.is_some()
    }

    pub fn has_setter(&self) -> bool {
        self.setter.is_some()
    }

    /// Name of the instance slot holding this property's value
    pub fn storage_key(&self) -> String {
        match &self.backing_field {
            Some(field) => field.clone(),
            None => format!("<{}>p__Storage", self.name),
        }
    }
}

/// Member layout of an entity class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClrClass {
    name: String,
    base: Option<Arc<ClrClass>>,
    fields: Vec<ClrField>,
    properties: Vec<ClrProperty>,
    constructor: Option<Accessibility>,
    is_abstract: bool,
}

impl ClrClass {
    /// A concrete class with a public parameterless constructor and no members
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base: None,
            fields: Vec::new(),
            properties: Vec::new(),
            constructor: Some(Accessibility::Public),
            is_abstract: false,
        }
    }

    pub fn with_base(mut self, base: Arc<ClrClass>) -> Self {
        self.base = Some(base);
        self
    }

    pub fn with_constructor(mut self, constructor: Option<Accessibility>) -> Self {
        self.constructor = constructor;
        self
    }

    pub fn with_abstract(mut self, is_abstract: bool) -> Self {
        self.is_abstract = is_abstract;
        self
    }

    /// Declare a field
    pub fn with_field(mut self, name: impl Into<String>, ty: ClrType) -> Self {
        self.fields.push(ClrField {
            name: name.into(),
            ty,
            declaring_class: self.name.clone(),
        });
        self
    }

    /// Declare a property; its declaring class is set to this class
    pub fn with_property(mut self, mut property: ClrProperty) -> Self {
        property.declaring_class = self.name.clone();
        self.properties.push(property);
        self
    }

    /// Declare an auto-property with a public getter and setter, stored in the
    /// compiler-style `<Name>k__BackingField` field
    pub fn with_auto_property(self, name: impl Into<String>, ty: ClrType) -> Self {
        let name = name.into();
        let field = format!("<{}>k__BackingField", name);
        self.with_field(field.clone(), ty.clone()).with_property(
            ClrProperty::new(name, ty)
                .with_setter(Some(Accessibility::Public))
                .backed_by(field),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name without namespace qualification
    pub fn short_name(&self) -> &str {
        short_name(&self.name)
    }

    pub fn base(&self) -> Option<&Arc<ClrClass>> {
        self.base.as_ref()
    }

    pub fn constructor(&self) -> Option<Accessibility> {
        self.constructor
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn declared_fields(&self) -> &[ClrField] {
        &self.fields
    }

    pub fn declared_properties(&self) -> &[ClrProperty] {
        &self.properties
    }

    /// This class followed by its base classes, most derived first
    pub fn hierarchy(&self) -> impl Iterator<Item = &ClrClass> {
        std::iter::successors(Some(self), |class| class.base.as_deref())
    }

    /// Whether this class is `name` or derives from it
    pub fn is_or_derives_from(&self, name: &str) -> bool {
        self.hierarchy().any(|class| class.name == name)
    }

    /// Find a field on this class or any base class
    pub fn find_field(&self, name: &str) -> Option<&ClrField> {
        self.hierarchy()
            .flat_map(|class| class.fields.iter())
            .find(|field| field.name == name)
    }

    /// Find the most derived declaration of a property
    pub fn find_property(&self, name: &str) -> Option<&ClrProperty> {
        self.hierarchy()
            .flat_map(|class| class.properties.iter())
            .find(|property| property.name == name)
    }

    /// All declarations of a property, most derived first (overrides before the base)
    pub fn property_chain(&self, name: &str) -> Vec<&ClrProperty> {
        self.hierarchy()
            .flat_map(|class| class.properties.iter())
            .filter(|property| property.name == name)
            .collect()
    }

    /// The most derived declaration of a property that has a setter
    pub fn find_setter(&self, name: &str) -> Option<&ClrProperty> {
        self.property_chain(name)
            .into_iter()
            .find(|property| property.has_setter())
    }

    /// Every property visible on this class, base declarations first, overrides collapsed
    pub fn properties(&self) -> Vec<&ClrProperty> {
        let classes: Vec<&ClrClass> = self.hierarchy().collect();
        let mut result: Vec<&ClrProperty> = Vec::new();
        for class in classes.into_iter().rev() {
            for property in &class.properties {
                match result.iter().position(|existing| existing.name == property.name) {
                    Some(index) => result[index] = property,
                    None => result.push(property),
                }
            }
        }
        result
    }

    /// Every field visible on this class
    pub fn fields(&self) -> impl Iterator<Item = &ClrField> {
        self.hierarchy().flat_map(|class| class.fields.iter())
    }
}

/// Strip namespace qualification (`Sales.Customer`, `sales::Customer`) from a type name
pub fn short_name(name: &str) -> &str {
    let after_path = name.rsplit("::").next().unwrap_or(name);
    after_path.rsplit('.').next().unwrap_or(after_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clr::ScalarType;

    fn base_class() -> Arc<ClrClass> {
        Arc::new(
            ClrClass::new("Sales.Party")
                .with_field("_name", ClrType::Scalar(ScalarType::String))
                .with_property(
                    ClrProperty::new("Name", ClrType::Scalar(ScalarType::String))
                        .with_setter(Some(Accessibility::Private))
                        .backed_by("_name"),
                ),
        )
    }

    #[test]
    fn test_auto_property_declares_backing_field() {
        let class = ClrClass::new("Customer").with_auto_property("Id", ScalarType::I32.into());
        let field = class.find_field("<Id>k__BackingField").unwrap();
        assert_eq!(field.declaring_class, "Customer");
        assert_eq!(class.find_property("Id").unwrap().storage_key(), "<Id>k__BackingField");
    }

    #[test]
    fn test_hierarchy_lookups() {
        let derived = ClrClass::new("Sales.Customer")
            .with_base(base_class())
            .with_property(ClrProperty::new("Name", ClrType::Scalar(ScalarType::String)).backed_by("_name"));

        assert!(derived.is_or_derives_from("Sales.Party"));
        assert_eq!(derived.find_field("_name").unwrap().declaring_class, "Sales.Party");
        assert_eq!(derived.find_property("Name").unwrap().declaring_class, "Sales.Customer");
        assert_eq!(derived.find_setter("Name").unwrap().declaring_class, "Sales.Party");
        assert_eq!(derived.properties().len(), 1);
    }

    #[test]
    fn test_short_name() {
        assert_eq!(short_name("Sales.Customer"), "Customer");
        assert_eq!(short_name("sales::Customer"), "Customer");
        assert_eq!(short_name("Customer"), "Customer");
    }
}
