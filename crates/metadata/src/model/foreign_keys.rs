//! Foreign keys and navigations

use tracing::debug;

use super::{
    ConfigurationSource, EntityTypeId, ForeignKey, ForeignKeyId, KeyId, Model, Navigation, NavigationId,
    PropertyId,
};
use crate::annotations::Annotations;
use crate::error::{MetadataError, MetadataResult};

impl Model {
    /// Add a non-unique foreign key from `properties` on `dependent` to `principal_key` on `principal`
    pub fn add_foreign_key(
        &mut self,
        dependent: EntityTypeId,
        properties: &[PropertyId],
        principal_key: KeyId,
        principal: EntityTypeId,
        source: ConfigurationSource,
    ) -> MetadataResult<ForeignKeyId> {
        self.add_foreign_key_with_uniqueness(dependent, properties, principal_key, principal, false, source)
    }

    /// Add a foreign key with the given uniqueness
    ///
    /// A second foreign key over the same properties and key is accepted only when its uniqueness
    /// differs from the first.
    pub fn add_foreign_key_with_uniqueness(
        &mut self,
        dependent: EntityTypeId,
        properties: &[PropertyId],
        principal_key: KeyId,
        principal: EntityTypeId,
        unique: bool,
        source: ConfigurationSource,
    ) -> MetadataResult<ForeignKeyId> {
        self.lookup_entity_type(dependent)?;
        self.lookup_entity_type(principal)?;
        self.ensure_owned_properties(dependent, properties)?;
        self.validate_foreign_key(dependent, properties, principal_key, principal, unique)?;

        let foreign_key = ForeignKey {
            declaring_entity_type: dependent,
            properties: properties.to_vec(),
            principal_key,
            principal_entity_type: principal,
            is_unique: unique,
            is_required: None,
            dependent_to_principal: None,
            principal_to_dependent: None,
            configuration_source: source,
            annotations: Annotations::new(),
        };
        let id = ForeignKeyId(self.foreign_keys.insert(foreign_key));
        self[dependent].foreign_keys.push(id);

        debug!(
            "Added foreign key {} on '{}' referencing '{}'",
            self.describe_properties(properties),
            self[dependent].name,
            self[principal].name
        );
        Ok(id)
    }

    /// Shape checks shared by [`Model::add_foreign_key`] and relationship planning
    pub(crate) fn validate_foreign_key(
        &self,
        dependent: EntityTypeId,
        properties: &[PropertyId],
        principal_key: KeyId,
        principal: EntityTypeId,
        unique: bool,
    ) -> MetadataResult<()> {
        let key = self
            .get_key(principal_key)
            .ok_or_else(|| MetadataError::not_found("Key", format!("#{}", principal_key.0)))?;

        if !self.is_same_or_derived(principal, key.declaring_entity_type) {
            return Err(MetadataError::argument(
                "principal_key",
                format!(
                    "the key {} is not declared on '{}'",
                    self.describe_properties(&key.properties),
                    self[principal].name
                ),
            ));
        }

        if properties.len() != key.properties.len() {
            return Err(MetadataError::ForeignKeyCountMismatch {
                foreign_key: self.describe_properties(properties),
                principal: self[principal].name.clone(),
                dependent_count: properties.len(),
                principal_count: key.properties.len(),
            });
        }

        for (dependent_property, principal_property) in properties.iter().zip(&key.properties) {
            let dependent_type = &self.lookup_property(*dependent_property)?.clr_type;
            let principal_type = &self[*principal_property].clr_type;
            if !dependent_type.is_compatible_with(principal_type) {
                return Err(MetadataError::IncompatibleForeignKey {
                    foreign_key: self.describe_properties(properties),
                    principal_key: self.describe_properties(&key.properties),
                    reason: format!(
                        "'{}' is '{}' but '{}' is '{}'",
                        self[*dependent_property].name, dependent_type, self[*principal_property].name, principal_type
                    ),
                });
            }
        }

        if self
            .find_foreign_key_with_uniqueness(dependent, properties, principal_key, unique)
            .is_some()
        {
            return Err(MetadataError::DuplicateForeignKey {
                foreign_key: self.describe_properties(properties),
                principal_key: self.describe_properties(&key.properties),
            });
        }
        Ok(())
    }

    /// Remove a foreign key, its navigations and any convention shadow properties it leaves unused
    pub fn remove_foreign_key(&mut self, foreign_key: ForeignKeyId) -> MetadataResult<ForeignKey> {
        self.lookup_foreign_key(foreign_key)?;
        let removed = self.detach_foreign_key(foreign_key)?;
        self.remove_unused_convention_properties(&removed.properties)?;
        Ok(removed)
    }

    /// Remove convention-created shadow properties that no key or foreign key uses any more
    pub(crate) fn remove_unused_convention_properties(&mut self, properties: &[PropertyId]) -> MetadataResult<()> {
        for property in properties {
            let unused_shadow = self.get_property(*property).is_some_and(|p| {
                p.is_shadow && p.configuration_source == ConfigurationSource::Convention
            }) && !self.is_property_in_use(*property);

            if unused_shadow {
                self.remove_property(*property)?;
            }
        }
        Ok(())
    }

    /// Remove a foreign key and its navigations, leaving its properties in place
    pub(crate) fn detach_foreign_key(&mut self, foreign_key: ForeignKeyId) -> MetadataResult<ForeignKey> {
        let fk = self.lookup_foreign_key(foreign_key)?;
        let navigations: Vec<NavigationId> = fk
            .dependent_to_principal
            .into_iter()
            .chain(fk.principal_to_dependent)
            .collect();
        let dependent = fk.declaring_entity_type;

        for navigation in navigations {
            self.remove_navigation(navigation)?;
        }

        self[dependent].foreign_keys.retain(|fk| *fk != foreign_key);
        let removed = self
            .foreign_keys
            .remove(foreign_key.0)
            .ok_or_else(|| MetadataError::not_found("Foreign key", format!("#{}", foreign_key.0)))?;

        debug!(
            "Removed foreign key {} from '{}'",
            self.describe_properties(&removed.properties),
            self[dependent].name
        );
        Ok(removed)
    }

    pub(crate) fn lookup_foreign_key(&self, id: ForeignKeyId) -> MetadataResult<&ForeignKey> {
        self.get_foreign_key(id)
            .ok_or_else(|| MetadataError::not_found("Foreign key", format!("#{}", id.0)))
    }

    fn is_property_in_use(&self, property: PropertyId) -> bool {
        self.keys.iter().any(|(_, key)| key.properties.contains(&property))
            || self.foreign_keys.iter().any(|(_, fk)| fk.properties.contains(&property))
    }

    /// All foreign keys declared on the entity type or its base types, base type keys first
    pub fn foreign_keys(&self, entity_type: EntityTypeId) -> Vec<ForeignKeyId> {
        self.hierarchy(entity_type)
            .into_iter()
            .rev()
            .flat_map(|et| self[et].foreign_keys.clone())
            .collect()
    }

    /// Foreign keys over exactly these properties
    pub fn find_foreign_keys(&self, entity_type: EntityTypeId, properties: &[PropertyId]) -> Vec<ForeignKeyId> {
        self.foreign_keys(entity_type)
            .into_iter()
            .filter(|fk| self[*fk].properties == properties)
            .collect()
    }

    pub fn find_foreign_key(
        &self,
        entity_type: EntityTypeId,
        properties: &[PropertyId],
        principal_key: KeyId,
    ) -> Option<ForeignKeyId> {
        self.find_foreign_keys(entity_type, properties)
            .into_iter()
            .find(|fk| self[*fk].principal_key == principal_key)
    }

    pub fn find_foreign_key_with_uniqueness(
        &self,
        entity_type: EntityTypeId,
        properties: &[PropertyId],
        principal_key: KeyId,
        unique: bool,
    ) -> Option<ForeignKeyId> {
        self.find_foreign_keys(entity_type, properties)
            .into_iter()
            .find(|fk| self[*fk].principal_key == principal_key && self[*fk].is_unique == unique)
    }

    /// Foreign keys anywhere in the model whose referenced key belongs to `entity_type`
    pub fn find_referencing_foreign_keys(&self, entity_type: EntityTypeId) -> Vec<ForeignKeyId> {
        self.foreign_keys
            .iter()
            .filter(|(_, fk)| {
                fk.principal_entity_type == entity_type
                    || self
                        .get_key(fk.principal_key)
                        .is_some_and(|key| key.declaring_entity_type == entity_type)
            })
            .map(|(index, _)| ForeignKeyId(index))
            .collect()
    }

    /// Fails if another foreign key over the same properties and key already has this uniqueness
    pub fn set_foreign_key_unique(&mut self, foreign_key: ForeignKeyId, unique: bool) -> MetadataResult<()> {
        let fk = self.lookup_foreign_key(foreign_key)?;
        if fk.is_unique == unique {
            return Ok(());
        }

        let sibling =
            self.find_foreign_key_with_uniqueness(fk.declaring_entity_type, &fk.properties, fk.principal_key, unique);
        if sibling.is_some() {
            return Err(MetadataError::DuplicateForeignKey {
                foreign_key: self.describe_properties(&fk.properties),
                principal_key: self.describe_properties(&self[fk.principal_key].properties),
            });
        }

        self[foreign_key].is_unique = unique;
        Ok(())
    }

    /// Configure requiredness; the foreign key properties follow. `None` restores the computed value.
    pub fn set_foreign_key_required(&mut self, foreign_key: ForeignKeyId, required: Option<bool>) -> MetadataResult<()> {
        let properties = self.lookup_foreign_key(foreign_key)?.properties.clone();

        if required == Some(false) {
            if let Some(property) = properties.iter().map(|p| &self[*p]).find(|p| !p.clr_type.is_nullable()) {
                return Err(MetadataError::CannotBeNullable {
                    property: property.name.clone(),
                    clr_type: property.clr_type.to_string(),
                });
            }
        }

        if let Some(required) = required {
            for property in &properties {
                self[*property].set_nullable(Some(!required))?;
            }
        }
        self[foreign_key].is_required = required;
        Ok(())
    }

    /// Required unless configured otherwise or any property is nullable
    pub fn is_required(&self, foreign_key: ForeignKeyId) -> bool {
        let fk = &self[foreign_key];
        fk.is_required
            .unwrap_or_else(|| fk.properties.iter().all(|p| !self[*p].is_nullable()))
    }

    /// Expose one side of a foreign key as a navigation
    pub fn add_navigation(
        &mut self,
        foreign_key: ForeignKeyId,
        name: &str,
        points_to_principal: bool,
    ) -> MetadataResult<NavigationId> {
        if name.is_empty() {
            return Err(MetadataError::argument("name", "navigation name must not be empty"));
        }
        self.validate_navigation(foreign_key, name, points_to_principal)?;

        let fk = &self[foreign_key];
        let declaring = if points_to_principal {
            fk.declaring_entity_type
        } else {
            fk.principal_entity_type
        };

        let navigation = Navigation {
            name: name.to_string(),
            declaring_entity_type: declaring,
            foreign_key,
            points_to_principal,
            collection_accessor: None,
            annotations: Annotations::new(),
        };
        let id = NavigationId(self.navigations.insert(navigation));
        self[declaring].navigations.push(id);

        let fk = &mut self[foreign_key];
        if points_to_principal {
            fk.dependent_to_principal = Some(id);
        } else {
            fk.principal_to_dependent = Some(id);
        }

        debug!("Added navigation '{}.{}'", self[declaring].name, name);
        Ok(id)
    }

    pub(crate) fn validate_navigation(
        &self,
        foreign_key: ForeignKeyId,
        name: &str,
        points_to_principal: bool,
    ) -> MetadataResult<()> {
        let fk = self.lookup_foreign_key(foreign_key)?;
        let (declaring, existing) = if points_to_principal {
            (fk.declaring_entity_type, fk.dependent_to_principal)
        } else {
            (fk.principal_entity_type, fk.principal_to_dependent)
        };

        let conflict = |reason: String| MetadataError::NavigationConflict {
            entity_type: self[declaring].name.clone(),
            navigation: name.to_string(),
            reason,
        };

        if let Some(existing) = existing {
            return Err(conflict(format!(
                "the foreign key already has the navigation '{}' on this side",
                self[existing].name
            )));
        }
        if self.find_property(declaring, name).is_some() {
            return Err(conflict("a property with the same name exists".to_string()));
        }
        if self.find_navigation(declaring, name).is_some() {
            return Err(conflict("a navigation with the same name exists".to_string()));
        }
        Ok(())
    }

    pub fn remove_navigation(&mut self, navigation: NavigationId) -> MetadataResult<Navigation> {
        let removed = self
            .navigations
            .remove(navigation.0)
            .ok_or_else(|| MetadataError::not_found("Navigation", format!("#{}", navigation.0)))?;

        self[removed.declaring_entity_type]
            .navigations
            .retain(|n| *n != navigation);
        if let Some(fk) = self.foreign_keys.get_mut(removed.foreign_key.0) {
            if fk.dependent_to_principal == Some(navigation) {
                fk.dependent_to_principal = None;
            }
            if fk.principal_to_dependent == Some(navigation) {
                fk.principal_to_dependent = None;
            }
        }

        debug!(
            "Removed navigation '{}.{}'",
            self[removed.declaring_entity_type].name, removed.name
        );
        Ok(removed)
    }

    /// Find a navigation on the entity type or one of its base types
    pub fn find_navigation(&self, entity_type: EntityTypeId, name: &str) -> Option<NavigationId> {
        self.hierarchy(entity_type).into_iter().find_map(|et| {
            self[et]
                .navigations
                .iter()
                .copied()
                .find(|navigation| self[*navigation].name == name)
        })
    }

    /// All navigations including inherited ones, base type navigations first
    pub fn navigations(&self, entity_type: EntityTypeId) -> Vec<NavigationId> {
        self.hierarchy(entity_type)
            .into_iter()
            .rev()
            .flat_map(|et| self[et].navigations.clone())
            .collect()
    }

    /// The navigation on the other side of the same foreign key
    pub fn inverse(&self, navigation: NavigationId) -> Option<NavigationId> {
        let nav = self.get_navigation(navigation)?;
        let fk = &self[nav.foreign_key];
        if nav.points_to_principal {
            fk.principal_to_dependent
        } else {
            fk.dependent_to_principal
        }
    }

    /// The entity type a navigation leads to
    pub fn navigation_target(&self, navigation: NavigationId) -> EntityTypeId {
        let nav = &self[navigation];
        let fk = &self[nav.foreign_key];
        if nav.points_to_principal {
            fk.principal_entity_type
        } else {
            fk.declaring_entity_type
        }
    }

    /// Whether the navigation holds many entities
    pub fn is_collection(&self, navigation: NavigationId) -> bool {
        let nav = &self[navigation];
        !nav.points_to_principal && !self[nav.foreign_key].is_unique
    }

    /// `{'CustomerId'} -> Customer`
    pub fn describe_foreign_key(&self, foreign_key: ForeignKeyId) -> String {
        match self.get_foreign_key(foreign_key) {
            Some(fk) => format!(
                "{} -> {}",
                self.describe_properties(&fk.properties),
                self[fk.principal_entity_type].name
            ),
            None => format!("#{}", foreign_key.0),
        }
    }
}
