//! Entity type / model graph
//!
//! The [`Model`] owns every entity type, property, key, foreign key and navigation in arena
//! storage. Elements refer to each other through copyable ids, so the bidirectional
//! navigation/foreign-key links never form ownership cycles.
//!
//! Indexing a model with a stale id (one whose element has been removed) panics, the same way
//! indexing a `Vec` out of bounds does; the `get_*` methods return `None` instead.

pub mod elements;
pub mod foreign_keys;
pub mod ids;
pub mod members;
pub mod snapshot;

pub use elements::*;
pub use ids::{EntityTypeId, ForeignKeyId, KeyId, NavigationId, PropertyId};
pub use snapshot::*;

use std::collections::BTreeMap;
use std::ops::{Index, IndexMut};
use std::sync::Arc;
use tracing::debug;

use crate::annotations::{Annotatable, Annotations};
use crate::clr::ClrClass;
use crate::error::{MetadataError, MetadataResult};
use ids::Arena;

/// Registry of entity types and everything they own
#[derive(Debug, Clone, Default)]
pub struct Model {
    pub(crate) entity_types: Arena<EntityType>,
    pub(crate) properties: Arena<Property>,
    pub(crate) keys: Arena<Key>,
    pub(crate) foreign_keys: Arena<ForeignKey>,
    pub(crate) navigations: Arena<Navigation>,
    names: BTreeMap<String, EntityTypeId>,
    annotations: Annotations,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a shadow entity type known only by name
    pub fn add_entity_type(&mut self, name: &str) -> MetadataResult<EntityTypeId> {
        self.insert_entity_type(name.to_string(), None)
    }

    /// Add an entity type backed by a CLR class; its name is the class name
    pub fn add_clr_entity_type(&mut self, class: Arc<ClrClass>) -> MetadataResult<EntityTypeId> {
        self.insert_entity_type(class.name().to_string(), Some(class))
    }

    fn insert_entity_type(&mut self, name: String, class: Option<Arc<ClrClass>>) -> MetadataResult<EntityTypeId> {
        if name.is_empty() {
            return Err(MetadataError::argument("name", "entity type name must not be empty"));
        }
        if self.names.contains_key(&name) {
            return Err(MetadataError::DuplicateEntityType { name });
        }

        let id = EntityTypeId(self.entity_types.insert(EntityType::new(name.clone(), class)));
        debug!("Added entity type '{}'", name);
        self.names.insert(name, id);
        Ok(id)
    }

    pub fn find_entity_type(&self, name: &str) -> Option<EntityTypeId> {
        self.names.get(name).copied()
    }

    /// Find the entity type bound to a CLR class
    pub fn find_clr_entity_type(&self, class: &ClrClass) -> Option<EntityTypeId> {
        self.find_entity_type(class.name()).filter(|id| {
            self[*id]
                .clr_class
                .as_ref()
                .is_some_and(|bound| bound.name() == class.name())
        })
    }

    /// All entity types ordered by name
    pub fn entity_types(&self) -> Vec<EntityTypeId> {
        self.names.values().copied().collect()
    }

    pub fn get_entity_type(&self, id: EntityTypeId) -> Option<&EntityType> {
        self.entity_types.get(id.0)
    }

    pub fn get_property(&self, id: PropertyId) -> Option<&Property> {
        self.properties.get(id.0)
    }

    pub fn get_key(&self, id: KeyId) -> Option<&Key> {
        self.keys.get(id.0)
    }

    pub fn get_foreign_key(&self, id: ForeignKeyId) -> Option<&ForeignKey> {
        self.foreign_keys.get(id.0)
    }

    pub fn get_navigation(&self, id: NavigationId) -> Option<&Navigation> {
        self.navigations.get(id.0)
    }

    pub(crate) fn lookup_entity_type(&self, id: EntityTypeId) -> MetadataResult<&EntityType> {
        self.get_entity_type(id)
            .ok_or_else(|| MetadataError::not_found("Entity type", format!("#{}", id.0)))
    }

    /// Remove an entity type together with its members and its own foreign keys
    pub fn remove_entity_type(&mut self, id: EntityTypeId) -> MetadataResult<EntityType> {
        let entity_type = self.lookup_entity_type(id)?;

        if let Some(derived) = self.derived_types(id).first() {
            return Err(MetadataError::EntityTypeInUseByDerived {
                entity_type: entity_type.name.clone(),
                derived: self[*derived].name.clone(),
            });
        }

        if let Some(foreign_key) = self
            .find_referencing_foreign_keys(id)
            .into_iter()
            .find(|fk| self[*fk].declaring_entity_type != id)
        {
            return Err(MetadataError::EntityTypeInUseByForeignKey {
                entity_type: entity_type.name.clone(),
                foreign_key: self.describe_foreign_key(foreign_key),
                dependent: self[self[foreign_key].declaring_entity_type].name.clone(),
            });
        }

        for foreign_key in self[id].foreign_keys.clone() {
            self.detach_foreign_key(foreign_key)?;
        }
        for key in self[id].keys.clone() {
            self.keys.remove(key.0);
        }
        for property in self[id].properties.clone() {
            self.properties.remove(property.0);
        }

        let removed = self
            .entity_types
            .remove(id.0)
            .ok_or_else(|| MetadataError::not_found("Entity type", format!("#{}", id.0)))?;
        self.names.remove(&removed.name);
        debug!("Removed entity type '{}'", removed.name);
        Ok(removed)
    }

    /// Set or clear the base type
    pub fn set_base_type(&mut self, id: EntityTypeId, base: Option<EntityTypeId>) -> MetadataResult<()> {
        self.lookup_entity_type(id)?;

        if let Some(base) = base {
            self.lookup_entity_type(base)?;
            if self.hierarchy(base).contains(&id) {
                return Err(MetadataError::CircularInheritance {
                    entity_type: self[id].name.clone(),
                    base_type: self[base].name.clone(),
                });
            }

            let base_chain = self.hierarchy(base);
            let mut subtree = vec![id];
            subtree.extend(self.all_derived_types(id));

            for entity_type in subtree {
                let clash = self
                    .declared_member_names(entity_type)
                    .find(|name| base_chain.iter().any(|b| self.declared_member_names(*b).any(|n| n == *name)));
                if let Some(name) = clash {
                    return Err(MetadataError::DuplicateProperty {
                        entity_type: self[entity_type].name.clone(),
                        property: name.to_string(),
                    });
                }
            }

            debug!("Entity type '{}' now derives from '{}'", self[id].name, self[base].name);
        }

        self[id].base_type = base;
        Ok(())
    }

    /// Names of the properties and navigations declared on the entity type itself
    fn declared_member_names(&self, id: EntityTypeId) -> impl Iterator<Item = &str> {
        let entity_type = &self[id];
        entity_type
            .properties
            .iter()
            .map(|p| self[*p].name.as_str())
            .chain(entity_type.navigations.iter().map(|n| self[*n].name.as_str()))
    }

    /// The entity type followed by its base types, most derived first
    pub fn hierarchy(&self, id: EntityTypeId) -> Vec<EntityTypeId> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(entity_type) = current {
            if chain.contains(&entity_type) {
                break;
            }
            chain.push(entity_type);
            current = self.get_entity_type(entity_type).and_then(|et| et.base_type);
        }
        chain
    }

    /// The topmost base type
    pub fn root_type(&self, id: EntityTypeId) -> EntityTypeId {
        self.hierarchy(id).last().copied().unwrap_or(id)
    }

    /// Entity types deriving directly from `id`
    pub fn derived_types(&self, id: EntityTypeId) -> Vec<EntityTypeId> {
        self.names
            .values()
            .copied()
            .filter(|candidate| self[*candidate].base_type == Some(id))
            .collect()
    }

    /// Whether `id` is `ancestor` or derives from it
    pub fn is_same_or_derived(&self, id: EntityTypeId, ancestor: EntityTypeId) -> bool {
        self.hierarchy(id).contains(&ancestor)
    }

    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    pub fn annotations_mut(&mut self) -> &mut Annotations {
        &mut self.annotations
    }
}

impl Annotatable for Model {
    fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    fn annotations_mut(&mut self) -> &mut Annotations {
        &mut self.annotations
    }
}

macro_rules! impl_model_index {
    ($id:ty, $output:ty, $arena:ident, $kind:literal) => {
        impl Index<$id> for Model {
            type Output = $output;

            fn index(&self, id: $id) -> &$output {
                match self.$arena.get(id.0) {
                    Some(element) => element,
                    None => panic!("{} #{} is not part of this model", $kind, id.0),
                }
            }
        }

        impl IndexMut<$id> for Model {
            fn index_mut(&mut self, id: $id) -> &mut $output {
                match self.$arena.get_mut(id.0) {
                    Some(element) => element,
                    None => panic!("{} #{} is not part of this model", $kind, id.0),
                }
            }
        }
    };
}

impl_model_index!(EntityTypeId, EntityType, entity_types, "entity type");
impl_model_index!(PropertyId, Property, properties, "property");
impl_model_index!(KeyId, Key, keys, "key");
impl_model_index!(ForeignKeyId, ForeignKey, foreign_keys, "foreign key");
impl_model_index!(NavigationId, Navigation, navigations, "navigation");

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clr::ScalarType;

    #[test]
    fn test_entity_types_are_ordered_by_name() {
        let mut model = Model::new();
        model.add_entity_type("Order").unwrap();
        model.add_entity_type("Customer").unwrap();
        model.add_entity_type("Address").unwrap();

        let names: Vec<&str> = model
            .entity_types()
            .into_iter()
            .map(|id| model[id].name())
            .collect();
        assert_eq!(names, vec!["Address", "Customer", "Order"]);
    }

    #[test]
    fn test_duplicate_entity_type_does_not_mutate() {
        let mut model = Model::new();
        let customer = model.add_entity_type("Customer").unwrap();

        let err = model.add_entity_type("Customer").unwrap_err();
        assert!(matches!(err, MetadataError::DuplicateEntityType { .. }));
        assert_eq!(model.entity_types(), vec![customer]);
    }

    #[test]
    fn test_clr_entity_type_lookup() {
        let mut model = Model::new();
        let class = Arc::new(ClrClass::new("Sales.Customer"));
        let id = model.add_clr_entity_type(class.clone()).unwrap();

        assert_eq!(model.find_clr_entity_type(&class), Some(id));
        assert_eq!(model.find_entity_type("Sales.Customer"), Some(id));
        assert_eq!(model[id].display_name(), "Customer");
        assert!(!model[id].is_shadow());
    }

    #[test]
    fn test_remove_base_type_fails_while_derived_exists() {
        let mut model = Model::new();
        let animal = model.add_entity_type("Animal").unwrap();
        let cat = model.add_entity_type("Cat").unwrap();
        model.set_base_type(cat, Some(animal)).unwrap();

        assert!(matches!(
            model.remove_entity_type(animal),
            Err(MetadataError::EntityTypeInUseByDerived { .. })
        ));

        model.remove_entity_type(cat).unwrap();
        model.remove_entity_type(animal).unwrap();
        assert_eq!(model.find_entity_type("Animal"), None);
        assert!(model.get_entity_type(cat).is_none());
    }

    #[test]
    fn test_inheritance_cycle_is_rejected() {
        let mut model = Model::new();
        let a = model.add_entity_type("A").unwrap();
        let b = model.add_entity_type("B").unwrap();
        model.set_base_type(b, Some(a)).unwrap();

        assert!(matches!(
            model.set_base_type(a, Some(b)),
            Err(MetadataError::CircularInheritance { .. })
        ));
        assert!(model.set_base_type(a, Some(a)).is_err());
    }

    #[test]
    fn test_base_type_with_clashing_property_is_rejected() {
        let mut model = Model::new();
        let animal = model.add_entity_type("Animal").unwrap();
        let cat = model.add_entity_type("Cat").unwrap();
        model
            .add_property(animal, "Name", ScalarType::String.into(), ConfigurationSource::Explicit)
            .unwrap();
        model
            .add_property(cat, "Name", ScalarType::String.into(), ConfigurationSource::Explicit)
            .unwrap();

        assert!(matches!(
            model.set_base_type(cat, Some(animal)),
            Err(MetadataError::DuplicateProperty { .. })
        ));
        assert_eq!(model[cat].base_type(), None);
    }

    #[test]
    fn test_base_type_clashing_with_derived_property_is_rejected() {
        let mut model = Model::new();
        let animal = model.add_entity_type("Animal").unwrap();
        let cat = model.add_entity_type("Cat").unwrap();
        let lion = model.add_entity_type("Lion").unwrap();
        model.set_base_type(lion, Some(cat)).unwrap();
        model
            .add_property(animal, "Mane", ScalarType::Bool.into(), ConfigurationSource::Explicit)
            .unwrap();
        model
            .add_property(lion, "Mane", ScalarType::Bool.into(), ConfigurationSource::Explicit)
            .unwrap();

        let err = model.set_base_type(cat, Some(animal)).unwrap_err();
        assert!(matches!(
            err,
            MetadataError::DuplicateProperty { ref entity_type, ref property } if entity_type == "Lion" && property == "Mane"
        ));
        assert_eq!(model[cat].base_type(), None);
        assert_eq!(model.find_property(lion, "Mane").map(|p| model[p].declaring_entity_type()), Some(lion));
    }
}
