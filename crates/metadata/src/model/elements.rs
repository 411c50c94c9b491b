//! Metadata records stored in the model arena

use serde::Serialize;
use std::sync::Arc;

use super::ids::{EntityTypeId, ForeignKeyId, KeyId, NavigationId, PropertyId};
use crate::accessors::{ClrCollectionAccessor, ClrPropertyGetter};
use crate::annotations::{Annotatable, Annotations, TypedValue};
use crate::clr::{short_name, ClrClass, ClrType};
use crate::error::{MetadataError, MetadataResult};

/// Who created an element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigurationSource {
    /// Requested by application code
    Explicit,
    /// Created by a convention; removed again when no longer used
    Convention,
}

/// An entity type: a CLR class or a name known only to the model
#[derive(Debug, Clone)]
pub struct EntityType {
    pub(crate) name: String,
    pub(crate) clr_class: Option<Arc<ClrClass>>,
    pub(crate) base_type: Option<EntityTypeId>,
    pub(crate) properties: Vec<PropertyId>,
    pub(crate) keys: Vec<KeyId>,
    pub(crate) primary_key: Option<KeyId>,
    pub(crate) foreign_keys: Vec<ForeignKeyId>,
    pub(crate) navigations: Vec<NavigationId>,
    pub(crate) annotations: Annotations,
}

impl EntityType {
    pub(crate) fn new(name: String, clr_class: Option<Arc<ClrClass>>) -> Self {
        Self {
            name,
            clr_class,
            base_type: None,
            properties: Vec::new(),
            keys: Vec::new(),
            primary_key: None,
            foreign_keys: Vec::new(),
            navigations: Vec::new(),
            annotations: Annotations::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name without namespace qualification
    pub fn display_name(&self) -> &str {
        short_name(&self.name)
    }

    pub fn clr_class(&self) -> Option<&Arc<ClrClass>> {
        self.clr_class.as_ref()
    }

    /// Shadow entity types exist only in metadata
    pub fn is_shadow(&self) -> bool {
        self.clr_class.is_none()
    }

    pub fn base_type(&self) -> Option<EntityTypeId> {
        self.base_type
    }

    pub fn declared_properties(&self) -> &[PropertyId] {
        &self.properties
    }

    pub fn declared_keys(&self) -> &[KeyId] {
        &self.keys
    }

    pub fn declared_primary_key(&self) -> Option<KeyId> {
        self.primary_key
    }

    pub fn declared_foreign_keys(&self) -> &[ForeignKeyId] {
        &self.foreign_keys
    }

    pub fn declared_navigations(&self) -> &[NavigationId] {
        &self.navigations
    }
}

/// A scalar property of an entity type
#[derive(Debug, Clone)]
pub struct Property {
    pub(crate) name: String,
    pub(crate) declaring_entity_type: EntityTypeId,
    pub(crate) clr_type: ClrType,
    pub(crate) is_nullable: Option<bool>,
    pub(crate) is_shadow: bool,
    pub(crate) is_concurrency_token: bool,
    pub(crate) is_read_only: bool,
    pub(crate) has_store_default: bool,
    pub(crate) sentinel: Option<TypedValue>,
    pub(crate) configuration_source: ConfigurationSource,
    pub(crate) getter: Option<Arc<dyn ClrPropertyGetter>>,
    pub(crate) annotations: Annotations,
}

impl Property {
    pub(crate) fn new(
        name: String,
        declaring_entity_type: EntityTypeId,
        clr_type: ClrType,
        is_shadow: bool,
        configuration_source: ConfigurationSource,
    ) -> Self {
        Self {
            name,
            declaring_entity_type,
            clr_type,
            is_nullable: None,
            is_shadow,
            is_concurrency_token: false,
            is_read_only: false,
            has_store_default: false,
            sentinel: None,
            configuration_source,
            getter: None,
            annotations: Annotations::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declaring_entity_type(&self) -> EntityTypeId {
        self.declaring_entity_type
    }

    pub fn clr_type(&self) -> &ClrType {
        &self.clr_type
    }

    /// Explicit nullability, falling back to what the CLR type can represent
    pub fn is_nullable(&self) -> bool {
        self.is_nullable.unwrap_or_else(|| self.clr_type.is_nullable())
    }

    /// The configured tri-state value
    pub fn configured_nullability(&self) -> Option<bool> {
        self.is_nullable
    }

    /// Configure nullability; `None` restores the CLR default
    pub fn set_nullable(&mut self, nullable: Option<bool>) -> MetadataResult<()> {
        if nullable == Some(true) && !self.clr_type.is_nullable() {
            return Err(MetadataError::CannotBeNullable {
                property: self.name.clone(),
                clr_type: self.clr_type.to_string(),
            });
        }
        self.is_nullable = nullable;
        Ok(())
    }

    pub fn is_shadow(&self) -> bool {
        self.is_shadow
    }

    pub fn is_concurrency_token(&self) -> bool {
        self.is_concurrency_token
    }

    pub fn set_concurrency_token(&mut self, value: bool) {
        self.is_concurrency_token = value;
    }

    pub fn is_read_only(&self) -> bool {
        self.is_read_only
    }

    pub fn set_read_only(&mut self, value: bool) {
        self.is_read_only = value;
    }

    /// The store supplies a value when none is given
    pub fn has_store_default(&self) -> bool {
        self.has_store_default
    }

    pub fn set_store_default(&mut self, value: bool) {
        self.has_store_default = value;
    }

    /// The value treated as "unset"
    pub fn sentinel(&self) -> Option<TypedValue> {
        match &self.sentinel {
            Some(value) => Some(value.clone()),
            None => self.clr_type.default_value(),
        }
    }

    pub fn set_sentinel(&mut self, sentinel: Option<TypedValue>) {
        self.sentinel = sentinel;
    }

    pub fn configuration_source(&self) -> ConfigurationSource {
        self.configuration_source
    }

    /// A getter supplied for this property, used instead of a synthesized one
    pub fn getter(&self) -> Option<&Arc<dyn ClrPropertyGetter>> {
        self.getter.as_ref()
    }

    pub fn set_getter(&mut self, getter: Option<Arc<dyn ClrPropertyGetter>>) {
        self.getter = getter;
    }
}

/// An ordered list of properties that uniquely identifies an entity
#[derive(Debug, Clone)]
pub struct Key {
    pub(crate) declaring_entity_type: EntityTypeId,
    pub(crate) properties: Vec<PropertyId>,
    pub(crate) annotations: Annotations,
}

impl Key {
    pub fn declaring_entity_type(&self) -> EntityTypeId {
        self.declaring_entity_type
    }

    pub fn properties(&self) -> &[PropertyId] {
        &self.properties
    }
}

/// Dependent properties referencing a principal key
#[derive(Debug, Clone)]
pub struct ForeignKey {
    pub(crate) declaring_entity_type: EntityTypeId,
    pub(crate) properties: Vec<PropertyId>,
    pub(crate) principal_key: KeyId,
    pub(crate) principal_entity_type: EntityTypeId,
    pub(crate) is_unique: bool,
    pub(crate) is_required: Option<bool>,
    pub(crate) dependent_to_principal: Option<NavigationId>,
    pub(crate) principal_to_dependent: Option<NavigationId>,
    pub(crate) configuration_source: ConfigurationSource,
    pub(crate) annotations: Annotations,
}

impl ForeignKey {
    /// The dependent entity type
    pub fn declaring_entity_type(&self) -> EntityTypeId {
        self.declaring_entity_type
    }

    pub fn properties(&self) -> &[PropertyId] {
        &self.properties
    }

    pub fn principal_key(&self) -> KeyId {
        self.principal_key
    }

    pub fn principal_entity_type(&self) -> EntityTypeId {
        self.principal_entity_type
    }

    pub fn is_unique(&self) -> bool {
        self.is_unique
    }

    /// The explicit requiredness, if one was configured
    pub fn configured_requiredness(&self) -> Option<bool> {
        self.is_required
    }

    pub fn dependent_to_principal(&self) -> Option<NavigationId> {
        self.dependent_to_principal
    }

    pub fn principal_to_dependent(&self) -> Option<NavigationId> {
        self.principal_to_dependent
    }

    pub fn configuration_source(&self) -> ConfigurationSource {
        self.configuration_source
    }
}

/// One direction of a relationship, exposed as a member of an entity type
#[derive(Debug, Clone)]
pub struct Navigation {
    pub(crate) name: String,
    pub(crate) declaring_entity_type: EntityTypeId,
    pub(crate) foreign_key: ForeignKeyId,
    pub(crate) points_to_principal: bool,
    pub(crate) collection_accessor: Option<Arc<dyn ClrCollectionAccessor>>,
    pub(crate) annotations: Annotations,
}

impl Navigation {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declaring_entity_type(&self) -> EntityTypeId {
        self.declaring_entity_type
    }

    pub fn foreign_key(&self) -> ForeignKeyId {
        self.foreign_key
    }

    pub fn points_to_principal(&self) -> bool {
        self.points_to_principal
    }

    /// An accessor supplied for this navigation, used instead of a synthesized one
    pub fn collection_accessor(&self) -> Option<&Arc<dyn ClrCollectionAccessor>> {
        self.collection_accessor.as_ref()
    }

    pub fn set_collection_accessor(&mut self, accessor: Option<Arc<dyn ClrCollectionAccessor>>) {
        self.collection_accessor = accessor;
    }
}

macro_rules! impl_annotatable {
    ($($element:ty),+ $(,)?) => {
        $(
            impl Annotatable for $element {
                fn annotations(&self) -> &Annotations {
                    &self.annotations
                }

                fn annotations_mut(&mut self) -> &mut Annotations {
                    &mut self.annotations
                }
            }
        )+
    };
}

impl_annotatable!(EntityType, Property, Key, ForeignKey, Navigation);
