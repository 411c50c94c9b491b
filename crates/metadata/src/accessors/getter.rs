//! Property getter source

use dashmap::DashMap;
use std::sync::Arc;
use tracing::trace;

use super::ClrPropertyGetter;
use crate::clr::{ClrClass, ClrObject, ClrProperty, ClrValue};
use crate::error::{MetadataError, MetadataResult};
use crate::model::{Model, PropertyId};

/// Getter bound to one property declaration
#[derive(Debug, Clone)]
pub struct ClrPropertyGetterImpl {
    class: String,
    property: ClrProperty,
}

impl ClrPropertyGetterImpl {
    pub fn class_name(&self) -> &str {
        &self.class
    }

    pub fn property(&self) -> &ClrProperty {
        &self.property
    }
}

impl ClrPropertyGetter for ClrPropertyGetterImpl {
    fn get_clr_value(&self, entity: &ClrObject) -> MetadataResult<ClrValue> {
        if !entity.class().is_or_derives_from(&self.class) {
            return Err(MetadataError::argument(
                "entity",
                format!(
                    "an instance of '{}' cannot be read by a getter for '{}'",
                    entity.class().name(),
                    self.class
                ),
            ));
        }
        entity.read_storage(&self.property)
    }
}

/// Creates and caches property getters keyed by (class name, property name)
#[derive(Debug, Clone, Default)]
pub struct ClrPropertyGetterSource {
    getters: Arc<DashMap<(String, String), Arc<dyn ClrPropertyGetter>>>,
}

impl ClrPropertyGetterSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Getter for a named property of a class
    pub fn get_accessor(&self, class: &ClrClass, property: &str) -> MetadataResult<Arc<dyn ClrPropertyGetter>> {
        let key = (class.name().to_string(), property.to_string());
        if let Some(getter) = self.getters.get(&key) {
            trace!("Getter cache hit for '{}.{}'", key.0, key.1);
            return Ok(getter.clone());
        }

        let declaration = class
            .property_chain(property)
            .into_iter()
            .find(|declaration| declaration.has_getter());

        let declaration = match declaration {
            Some(declaration) => declaration.clone(),
            None if class.find_property(property).is_some() => {
                return Err(MetadataError::NoGetter {
                    class: class.name().to_string(),
                    property: property.to_string(),
                })
            }
            None => {
                return Err(MetadataError::NoClrProperty {
                    class: class.name().to_string(),
                    property: property.to_string(),
                })
            }
        };

        trace!("Getter cache miss for '{}.{}'", key.0, key.1);
        let getter: Arc<dyn ClrPropertyGetter> = Arc::new(ClrPropertyGetterImpl {
            class: class.name().to_string(),
            property: declaration,
        });
        Ok(self.getters.entry(key).or_insert(getter).clone())
    }

    /// Getter for a metadata property; a getter configured on the property is returned as is
    pub fn get_for_property(&self, model: &Model, property: PropertyId) -> MetadataResult<Arc<dyn ClrPropertyGetter>> {
        let p = model
            .get_property(property)
            .ok_or_else(|| MetadataError::not_found("Property", format!("#{}", property.index())))?;
        if let Some(getter) = p.getter() {
            return Ok(getter.clone());
        }

        let entity_type = &model[p.declaring_entity_type()];
        let class = entity_type.clr_class().ok_or_else(|| MetadataError::NoClrType {
            entity_type: entity_type.name().to_string(),
        })?;
        self.get_accessor(class, p.name())
    }

    /// Number of cached getters
    pub fn len(&self) -> usize {
        self.getters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.getters.is_empty()
    }
}
