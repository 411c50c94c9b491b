//! Fluent model building
//!
//! ```ignore
//! let mut builder = ModelBuilder::new();
//! let customer = builder.entity_for(customer_class)?.id();
//! builder
//!     .entity_for(order_class)?
//!     .many_to_one(customer, Some("Customer"), Some("Orders"))
//!     .required(true)
//!     .resolve()?;
//! let model = builder.finish();
//! ```

use std::sync::Arc;

use tracing::{debug, warn};

use crate::annotations::Annotatable;
use crate::clr::{ClrClass, ClrType};
use crate::config::MetadataConfig;
use crate::error::{MetadataError, MetadataResult};
use crate::model::{ConfigurationSource, EntityTypeId, ForeignKeyId, KeyId, Model, PropertyId};
use crate::relationships::{RelationshipPlan, RelationshipRequest, RelationshipResolver};

/// Owns a model under construction and the configuration its conventions use
#[derive(Debug, Clone, Default)]
pub struct ModelBuilder {
    model: Model,
    config: MetadataConfig,
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: MetadataConfig) -> MetadataResult<Self> {
        config.validate()?;
        Ok(Self {
            model: Model::new(),
            config,
        })
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut Model {
        &mut self.model
    }

    pub fn config(&self) -> &MetadataConfig {
        &self.config
    }

    /// Find or add an entity type known only by name
    pub fn entity(&mut self, name: &str) -> MetadataResult<EntityTypeBuilder<'_>> {
        let id = match self.model.find_entity_type(name) {
            Some(id) => id,
            None => self.model.add_entity_type(name)?,
        };
        Ok(self.builder_for(id))
    }

    /// Find or add the entity type for a class
    ///
    /// A new entity type derives from the entity type of its base class when that is already
    /// registered. With member discovery enabled, readable scalar properties of the class become
    /// properties of the entity type and a root type is keyed on `Id` or `<Class>Id`. If any step
    /// fails the model is left as it was.
    pub fn entity_for(&mut self, class: Arc<ClrClass>) -> MetadataResult<EntityTypeBuilder<'_>> {
        if let Some(id) = self.model.find_clr_entity_type(&class) {
            return Ok(self.builder_for(id));
        }

        let checkpoint = self.model.clone();
        match self.register_class(&class) {
            Ok(id) => Ok(self.builder_for(id)),
            Err(error) => {
                warn!("Registering '{}' rolled back: {}", class.name(), error);
                self.model = checkpoint;
                Err(error)
            }
        }
    }

    /// Builder for an entity type already in the model
    pub fn entity_type(&mut self, id: EntityTypeId) -> MetadataResult<EntityTypeBuilder<'_>> {
        self.model.lookup_entity_type(id)?;
        Ok(self.builder_for(id))
    }

    pub fn resolver(&self) -> RelationshipResolver<'_> {
        RelationshipResolver::new(&self.config)
    }

    /// Resolve a relationship request built by hand
    pub fn relationship(&mut self, request: &RelationshipRequest) -> MetadataResult<ForeignKeyId> {
        RelationshipResolver::new(&self.config).resolve(&mut self.model, request)
    }

    /// Swap the ends of a one-to-one relationship
    pub fn invert(&mut self, foreign_key: ForeignKeyId) -> MetadataResult<ForeignKeyId> {
        RelationshipResolver::new(&self.config).invert(&mut self.model, foreign_key)
    }

    pub fn finish(self) -> Model {
        self.model
    }

    fn builder_for(&mut self, id: EntityTypeId) -> EntityTypeBuilder<'_> {
        EntityTypeBuilder {
            model: &mut self.model,
            config: &self.config,
            id,
        }
    }

    fn register_class(&mut self, class: &Arc<ClrClass>) -> MetadataResult<EntityTypeId> {
        let id = self.model.add_clr_entity_type(Arc::clone(class))?;
        if let Some(base) = class.base().and_then(|base| self.model.find_clr_entity_type(base)) {
            self.model.set_base_type(id, Some(base))?;
        }
        if self.config.discover_clr_members {
            self.discover_members(id, class)?;
        }
        Ok(id)
    }

    fn discover_members(&mut self, id: EntityTypeId, class: &ClrClass) -> MetadataResult<()> {
        for property in class.properties() {
            let mappable = property.has_getter() && property.ty.scalar().is_some();
            if mappable && self.model.find_property(id, &property.name).is_none() {
                self.model
                    .add_property(id, &property.name, property.ty.clone(), ConfigurationSource::Convention)?;
            }
        }

        if self.model[id].base_type().is_some() || self.model.primary_key(id).is_some() {
            return Ok(());
        }

        let suffix = &self.config.key_suffix;
        let candidates = [suffix.clone(), format!("{}{}", class.short_name(), suffix)];
        if let Some(key) = candidates.iter().find_map(|name| self.model.find_property(id, name)) {
            self.model.set_primary_key(id, &[key])?;
            if self.config.log_conventions {
                debug!("Keyed '{}' on '{}'", class.name(), self.model[key].name());
            }
        }
        Ok(())
    }
}

/// Configures one entity type
#[derive(Debug)]
pub struct EntityTypeBuilder<'a> {
    model: &'a mut Model,
    config: &'a MetadataConfig,
    id: EntityTypeId,
}

impl<'a> EntityTypeBuilder<'a> {
    pub fn id(&self) -> EntityTypeId {
        self.id
    }

    /// Add a property; shadow unless the class declares a member with this name
    pub fn property(&mut self, name: &str, clr_type: impl Into<ClrType>) -> MetadataResult<PropertyId> {
        let clr_type = clr_type.into();
        match self.model.find_property(self.id, name) {
            Some(existing) if self.model[existing].clr_type() == &clr_type => Ok(existing),
            Some(_) => Err(MetadataError::DuplicateProperty {
                entity_type: self.model[self.id].name().to_string(),
                property: name.to_string(),
            }),
            None => self.model.add_property(self.id, name, clr_type, ConfigurationSource::Explicit),
        }
    }

    /// Add a property typed after the class property of the same name
    pub fn clr_property(&mut self, name: &str) -> MetadataResult<PropertyId> {
        match self.model.find_property(self.id, name) {
            Some(existing) => Ok(existing),
            None => self.model.add_clr_property(self.id, name),
        }
    }

    /// Find or add a key over the named properties
    pub fn key(&mut self, properties: &[&str]) -> MetadataResult<KeyId> {
        let properties = self.resolve_properties(properties)?;
        match self.model.find_key(self.id, &properties) {
            Some(key) => Ok(key),
            None => self.model.add_key(self.id, &properties),
        }
    }

    pub fn primary_key(&mut self, properties: &[&str]) -> MetadataResult<KeyId> {
        let properties = self.resolve_properties(properties)?;
        self.model.set_primary_key(self.id, &properties)
    }

    pub fn base_type(&mut self, base: Option<EntityTypeId>) -> MetadataResult<&mut Self> {
        self.model.set_base_type(self.id, base)?;
        Ok(self)
    }

    /// Set or, with `None`, remove an annotation on the entity type
    pub fn annotation(&mut self, name: &str, value: Option<&str>) -> MetadataResult<&mut Self> {
        let entity_type = &mut self.model[self.id];
        match value {
            Some(value) => entity_type.set_annotation(name, value)?,
            None => {
                entity_type.annotations_mut().remove(name);
            }
        }
        Ok(self)
    }

    /// This entity type is the principal of a one-to-many relationship to `dependent`
    pub fn one_to_many(
        self,
        dependent: EntityTypeId,
        collection: Option<&str>,
        reference: Option<&str>,
    ) -> RelationshipBuilder<'a> {
        let request = RelationshipRequest::one_to_many(self.id, dependent, collection, reference);
        self.relationship(request)
    }

    /// This entity type is the dependent of a relationship to `principal`
    pub fn many_to_one(
        self,
        principal: EntityTypeId,
        reference: Option<&str>,
        collection: Option<&str>,
    ) -> RelationshipBuilder<'a> {
        let request = RelationshipRequest::many_to_one(self.id, principal, reference, collection);
        self.relationship(request)
    }

    /// This entity type is the principal of a one-to-one relationship to `dependent`
    pub fn one_to_one(
        self,
        dependent: EntityTypeId,
        navigation_to_dependent: Option<&str>,
        navigation_to_principal: Option<&str>,
    ) -> RelationshipBuilder<'a> {
        let request =
            RelationshipRequest::one_to_one(self.id, dependent, navigation_to_dependent, navigation_to_principal);
        self.relationship(request)
    }

    fn relationship(self, request: RelationshipRequest) -> RelationshipBuilder<'a> {
        RelationshipBuilder {
            model: self.model,
            config: self.config,
            request,
        }
    }

    fn resolve_properties(&self, names: &[&str]) -> MetadataResult<Vec<PropertyId>> {
        names
            .iter()
            .map(|name| {
                self.model.find_property(self.id, name).ok_or_else(|| {
                    MetadataError::not_found("Property", format!("{}.{}", self.model[self.id].name(), name))
                })
            })
            .collect()
    }
}

/// Collects the optional parts of a relationship before resolving it
#[derive(Debug)]
pub struct RelationshipBuilder<'a> {
    model: &'a mut Model,
    config: &'a MetadataConfig,
    request: RelationshipRequest,
}

impl RelationshipBuilder<'_> {
    pub fn foreign_key(mut self, properties: &[&str]) -> Self {
        self.request = self.request.with_foreign_key(properties);
        self
    }

    pub fn principal_key(mut self, properties: &[&str]) -> Self {
        self.request = self.request.with_principal_key(properties);
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.request = self.request.with_required(required);
        self
    }

    pub fn request(&self) -> &RelationshipRequest {
        &self.request
    }

    /// What resolving would change, without changing it
    pub fn plan(&self) -> MetadataResult<RelationshipPlan> {
        RelationshipResolver::new(self.config).plan(&*self.model, &self.request)
    }

    pub fn resolve(self) -> MetadataResult<ForeignKeyId> {
        RelationshipResolver::new(self.config).resolve(self.model, &self.request)
    }
}
