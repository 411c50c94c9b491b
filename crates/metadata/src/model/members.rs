//! Properties and keys of entity types

use tracing::debug;

use super::{ConfigurationSource, EntityTypeId, Key, KeyId, Model, Property, PropertyId};
use crate::annotations::Annotations;
use crate::clr::ClrType;
use crate::error::{MetadataError, MetadataResult};

impl Model {
    /// Add a property; it is a shadow property unless the CLR class declares a member with that name
    pub fn add_property(
        &mut self,
        entity_type: EntityTypeId,
        name: &str,
        clr_type: ClrType,
        source: ConfigurationSource,
    ) -> MetadataResult<PropertyId> {
        if name.is_empty() {
            return Err(MetadataError::argument("name", "property name must not be empty"));
        }
        self.lookup_entity_type(entity_type)?;
        self.ensure_member_name_free(entity_type, name)?;

        let is_shadow = match &self[entity_type].clr_class {
            Some(class) => class.find_property(name).is_none() && class.find_field(name).is_none(),
            None => true,
        };

        let property = Property::new(name.to_string(), entity_type, clr_type, is_shadow, source);
        let id = PropertyId(self.properties.insert(property));
        self[entity_type].properties.push(id);

        debug!(
            "Added {}property '{}.{}'",
            if is_shadow { "shadow " } else { "" },
            self[entity_type].name,
            name
        );
        Ok(id)
    }

    /// Add a property typed after the CLR property of the same name
    pub fn add_clr_property(&mut self, entity_type: EntityTypeId, name: &str) -> MetadataResult<PropertyId> {
        let et = self.lookup_entity_type(entity_type)?;
        let class = et.clr_class.as_ref().ok_or_else(|| MetadataError::NoClrType {
            entity_type: et.name.clone(),
        })?;
        let clr_type = class
            .find_property(name)
            .map(|property| property.ty.clone())
            .ok_or_else(|| MetadataError::NoClrProperty {
                class: class.name().to_string(),
                property: name.to_string(),
            })?;

        self.add_property(entity_type, name, clr_type, ConfigurationSource::Explicit)
    }

    /// Fails when `name` is already a property or navigation anywhere in the hierarchy of `entity_type`
    pub(crate) fn ensure_member_name_free(&self, entity_type: EntityTypeId, name: &str) -> MetadataResult<()> {
        let mut related = self.hierarchy(entity_type);
        related.extend(self.all_derived_types(entity_type));

        let taken = related.iter().any(|et| {
            self.find_declared_property(*et, name).is_some()
                || self[*et]
                    .navigations
                    .iter()
                    .any(|navigation| self[*navigation].name == name)
        });

        if taken {
            return Err(MetadataError::DuplicateProperty {
                entity_type: self[entity_type].name.clone(),
                property: name.to_string(),
            });
        }
        Ok(())
    }

    /// `base`, or `base1`, `base2`, ... when a property, navigation or CLR member already uses the name
    pub(crate) fn unique_property_name(&self, entity_type: EntityTypeId, base: &str, reserved: &[String]) -> String {
        let class = self.get_entity_type(entity_type).and_then(|et| et.clr_class.clone());
        (0..)
            .map(|index: usize| {
                if index == 0 {
                    base.to_string()
                } else {
                    format!("{}{}", base, index)
                }
            })
            .find(|name| {
                !reserved.contains(name)
                    && self.ensure_member_name_free(entity_type, name).is_ok()
                    && class
                        .as_ref()
                        .map_or(true, |class| class.find_property(name).is_none() && class.find_field(name).is_none())
            })
            .unwrap_or_else(|| base.to_string())
    }

    /// Derived types at any depth
    pub(crate) fn all_derived_types(&self, entity_type: EntityTypeId) -> Vec<EntityTypeId> {
        let mut result = Vec::new();
        let mut pending = self.derived_types(entity_type);
        while let Some(derived) = pending.pop() {
            if !result.contains(&derived) {
                pending.extend(self.derived_types(derived));
                result.push(derived);
            }
        }
        result
    }

    pub fn find_declared_property(&self, entity_type: EntityTypeId, name: &str) -> Option<PropertyId> {
        self.get_entity_type(entity_type)?
            .properties
            .iter()
            .copied()
            .find(|property| self[*property].name == name)
    }

    /// Find a property on the entity type or one of its base types
    pub fn find_property(&self, entity_type: EntityTypeId, name: &str) -> Option<PropertyId> {
        self.hierarchy(entity_type)
            .into_iter()
            .find_map(|et| self.find_declared_property(et, name))
    }

    pub(crate) fn lookup_property(&self, id: PropertyId) -> MetadataResult<&Property> {
        self.get_property(id)
            .ok_or_else(|| MetadataError::not_found("Property", format!("#{}", id.0)))
    }

    /// All properties including inherited ones, base type properties first
    pub fn properties(&self, entity_type: EntityTypeId) -> Vec<PropertyId> {
        self.hierarchy(entity_type)
            .into_iter()
            .rev()
            .flat_map(|et| self[et].properties.clone())
            .collect()
    }

    /// Position of the property among all properties of its declaring type
    pub fn property_index(&self, property: PropertyId) -> Option<usize> {
        let declaring = self.get_property(property)?.declaring_entity_type;
        self.properties(declaring).iter().position(|p| *p == property)
    }

    /// Position among the shadow properties of the declaring type; `None` for CLR-backed properties
    pub fn shadow_index(&self, property: PropertyId) -> Option<usize> {
        let declaring = self.get_property(property)?;
        if !declaring.is_shadow {
            return None;
        }

        self.properties(declaring.declaring_entity_type)
            .into_iter()
            .filter(|p| self[*p].is_shadow)
            .position(|p| p == property)
    }

    /// Configure nullability of a property
    pub fn set_property_nullable(&mut self, property: PropertyId, nullable: Option<bool>) -> MetadataResult<()> {
        self.lookup_property(property)?;
        self[property].set_nullable(nullable)
    }

    /// Remove a property that is not part of any key or foreign key
    pub fn remove_property(&mut self, property: PropertyId) -> MetadataResult<Property> {
        let removed = self.lookup_property(property)?;

        let usage = if let Some((_, key)) = self.keys.iter().find(|(_, key)| key.properties.contains(&property)) {
            Some(format!("the key {}", self.describe_properties(&key.properties)))
        } else {
            self.foreign_keys
                .iter()
                .find(|(_, fk)| fk.properties.contains(&property))
                .map(|(_, fk)| format!("the foreign key {}", self.describe_properties(&fk.properties)))
        };

        if let Some(usage) = usage {
            return Err(MetadataError::PropertyInUse {
                entity_type: self[removed.declaring_entity_type].name.clone(),
                property: removed.name.clone(),
                usage,
            });
        }

        let declaring = removed.declaring_entity_type;
        self[declaring].properties.retain(|p| *p != property);
        let removed = self
            .properties
            .remove(property.0)
            .ok_or_else(|| MetadataError::not_found("Property", format!("#{}", property.0)))?;

        debug!("Removed property '{}.{}'", self[declaring].name, removed.name);
        Ok(removed)
    }

    /// Add a key over properties of the entity type or its base types
    pub fn add_key(&mut self, entity_type: EntityTypeId, properties: &[PropertyId]) -> MetadataResult<KeyId> {
        self.lookup_entity_type(entity_type)?;
        self.ensure_owned_properties(entity_type, properties)?;

        if self.find_key(entity_type, properties).is_some() {
            return Err(MetadataError::DuplicateKey {
                entity_type: self[entity_type].name.clone(),
                properties: self.describe_properties(properties),
            });
        }

        let key = Key {
            declaring_entity_type: entity_type,
            properties: properties.to_vec(),
            annotations: Annotations::new(),
        };
        let id = KeyId(self.keys.insert(key));
        self[entity_type].keys.push(id);

        debug!(
            "Added key {} to '{}'",
            self.describe_properties(properties),
            self[entity_type].name
        );
        Ok(id)
    }

    pub(crate) fn ensure_owned_properties(&self, entity_type: EntityTypeId, properties: &[PropertyId]) -> MetadataResult<()> {
        if properties.is_empty() {
            return Err(MetadataError::argument("properties", "at least one property is required"));
        }

        let hierarchy = self.hierarchy(entity_type);
        for property in properties {
            let declaring = self.lookup_property(*property)?.declaring_entity_type;
            if !hierarchy.contains(&declaring) {
                return Err(MetadataError::argument(
                    "properties",
                    format!(
                        "property '{}' does not belong to '{}'",
                        self[*property].name, self[entity_type].name
                    ),
                ));
            }
        }

        let mut seen = properties.to_vec();
        seen.sort();
        seen.dedup();
        if seen.len() != properties.len() {
            return Err(MetadataError::argument("properties", "a property may only appear once"));
        }
        Ok(())
    }

    /// Find a key with exactly these properties, in order, on the entity type or its base types
    pub fn find_key(&self, entity_type: EntityTypeId, properties: &[PropertyId]) -> Option<KeyId> {
        self.hierarchy(entity_type).into_iter().find_map(|et| {
            self[et]
                .keys
                .iter()
                .copied()
                .find(|key| self[*key].properties == properties)
        })
    }

    /// All keys including inherited ones, base type keys first
    pub fn keys(&self, entity_type: EntityTypeId) -> Vec<KeyId> {
        self.hierarchy(entity_type)
            .into_iter()
            .rev()
            .flat_map(|et| self[et].keys.clone())
            .collect()
    }

    /// Make a key over these properties the primary key; the properties become non-nullable
    pub fn set_primary_key(&mut self, entity_type: EntityTypeId, properties: &[PropertyId]) -> MetadataResult<KeyId> {
        let et = self.lookup_entity_type(entity_type)?;
        if et.base_type.is_some() {
            return Err(MetadataError::argument(
                "entity_type",
                format!("the primary key of '{}' must be declared on its root type", et.name),
            ));
        }

        let key = match self.find_key(entity_type, properties) {
            Some(key) => key,
            None => self.add_key(entity_type, properties)?,
        };

        for property in properties {
            self[*property].set_nullable(Some(false))?;
        }
        self[entity_type].primary_key = Some(key);

        debug!(
            "Primary key of '{}' is {}",
            self[entity_type].name,
            self.describe_properties(properties)
        );
        Ok(key)
    }

    /// The primary key, inherited from the root type
    pub fn primary_key(&self, entity_type: EntityTypeId) -> Option<KeyId> {
        self.get_entity_type(self.root_type(entity_type))?.primary_key
    }

    /// Remove a key no foreign key references
    pub fn remove_key(&mut self, key: KeyId) -> MetadataResult<Key> {
        let declaring = self
            .get_key(key)
            .ok_or_else(|| MetadataError::not_found("Key", format!("#{}", key.0)))?
            .declaring_entity_type;

        if self.foreign_keys.iter().any(|(_, fk)| fk.principal_key == key) {
            return Err(MetadataError::KeyInUse {
                entity_type: self[declaring].name.clone(),
                key: self.describe_properties(&self[key].properties),
            });
        }

        let et = &mut self[declaring];
        et.keys.retain(|k| *k != key);
        if et.primary_key == Some(key) {
            et.primary_key = None;
        }

        self.keys
            .remove(key.0)
            .ok_or_else(|| MetadataError::not_found("Key", format!("#{}", key.0)))
    }

    /// `{'Id', 'Name'}`
    pub fn describe_properties(&self, properties: &[PropertyId]) -> String {
        let names: Vec<String> = properties
            .iter()
            .map(|property| match self.get_property(*property) {
                Some(property) => format!("'{}'", property.name),
                None => format!("#{}", property.0),
            })
            .collect();
        format!("{{{}}}", names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clr::{ClrClass, ScalarType};
    use std::sync::Arc;

    fn model_with_customer() -> (Model, EntityTypeId, PropertyId) {
        let mut model = Model::new();
        let customer = model.add_entity_type("Customer").unwrap();
        let id = model
            .add_property(customer, "Id", ScalarType::I32.into(), ConfigurationSource::Explicit)
            .unwrap();
        (model, customer, id)
    }

    #[test]
    fn test_duplicate_property_is_rejected() {
        let (mut model, customer, _) = model_with_customer();
        assert!(matches!(
            model.add_property(customer, "Id", ScalarType::I64.into(), ConfigurationSource::Explicit),
            Err(MetadataError::DuplicateProperty { .. })
        ));
        assert_eq!(model.properties(customer).len(), 1);
    }

    #[test]
    fn test_shadow_flag_follows_clr_members() {
        let mut model = Model::new();
        let class = Arc::new(ClrClass::new("Order").with_auto_property("Total", ScalarType::Decimal.into()));
        let order = model.add_clr_entity_type(class).unwrap();

        let total = model.add_clr_property(order, "Total").unwrap();
        let shadow = model
            .add_property(order, "CustomerId", ScalarType::I32.into(), ConfigurationSource::Convention)
            .unwrap();

        assert!(!model[total].is_shadow());
        assert_eq!(model[total].clr_type(), &ClrType::Scalar(ScalarType::Decimal));
        assert!(model[shadow].is_shadow());
        assert_eq!(model.shadow_index(total), None);
        assert_eq!(model.shadow_index(shadow), Some(0));
        assert_eq!(model.property_index(shadow), Some(1));

        assert!(matches!(
            model.add_clr_property(order, "Missing"),
            Err(MetadataError::NoClrProperty { .. })
        ));
    }

    #[test]
    fn test_inherited_properties_come_first() {
        let mut model = Model::new();
        let animal = model.add_entity_type("Animal").unwrap();
        let cat = model.add_entity_type("Cat").unwrap();
        model.set_base_type(cat, Some(animal)).unwrap();

        let lives = model
            .add_property(cat, "Lives", ScalarType::I32.into(), ConfigurationSource::Explicit)
            .unwrap();
        let id = model
            .add_property(animal, "Id", ScalarType::I32.into(), ConfigurationSource::Explicit)
            .unwrap();

        assert_eq!(model.properties(cat), vec![id, lives]);
        assert_eq!(model.find_property(cat, "Id"), Some(id));
        assert_eq!(model.find_property(animal, "Lives"), None);
        assert!(model
            .add_property(animal, "Lives", ScalarType::I32.into(), ConfigurationSource::Explicit)
            .is_err());
    }

    #[test]
    fn test_primary_key_makes_properties_required() {
        let mut model = Model::new();
        let tag = model.add_entity_type("Tag").unwrap();
        let name = model
            .add_property(tag, "Name", ScalarType::String.into(), ConfigurationSource::Explicit)
            .unwrap();
        assert!(model[name].is_nullable());

        let key = model.set_primary_key(tag, &[name]).unwrap();
        assert_eq!(model.primary_key(tag), Some(key));
        assert!(!model[name].is_nullable());
        assert_eq!(model.set_primary_key(tag, &[name]).unwrap(), key);
    }

    #[test]
    fn test_key_properties_cannot_be_removed() {
        let (mut model, customer, id) = model_with_customer();
        let key = model.set_primary_key(customer, &[id]).unwrap();

        assert!(matches!(
            model.remove_property(id),
            Err(MetadataError::PropertyInUse { .. })
        ));

        model.remove_key(key).unwrap();
        assert_eq!(model.primary_key(customer), None);
        model.remove_property(id).unwrap();
        assert!(model.properties(customer).is_empty());
    }

    #[test]
    fn test_duplicate_key_is_rejected() {
        let (mut model, customer, id) = model_with_customer();
        model.add_key(customer, &[id]).unwrap();
        assert!(matches!(
            model.add_key(customer, &[id]),
            Err(MetadataError::DuplicateKey { .. })
        ));
        assert!(model.add_key(customer, &[]).is_err());
        assert!(model.add_key(customer, &[id, id]).is_err());
    }

    #[test]
    fn test_unique_property_names_skip_taken_members() {
        let mut model = Model::new();
        let class = Arc::new(ClrClass::new("Pickle").with_auto_property("BigMakId1", ScalarType::I32.into()));
        let pickle = model.add_clr_entity_type(class).unwrap();
        model
            .add_property(pickle, "BigMakId", ScalarType::I32.into(), ConfigurationSource::Explicit)
            .unwrap();

        assert_eq!(model.unique_property_name(pickle, "BigMakId", &[]), "BigMakId2");
        assert_eq!(
            model.unique_property_name(pickle, "BigMakId", &["BigMakId2".to_string()]),
            "BigMakId3"
        );
        assert_eq!(model.unique_property_name(pickle, "TempId", &[]), "TempId");
    }

    #[test]
    fn test_derived_type_uses_root_primary_key() {
        let (mut model, customer, id) = model_with_customer();
        let key = model.set_primary_key(customer, &[id]).unwrap();
        let vip = model.add_entity_type("VipCustomer").unwrap();
        model.set_base_type(vip, Some(customer)).unwrap();

        assert_eq!(model.primary_key(vip), Some(key));
        assert!(model.set_primary_key(vip, &[id]).is_err());
        assert_eq!(model.describe_properties(&[id]), "{'Id'}");
    }
}
