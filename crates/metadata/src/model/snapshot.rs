//! Serializable view of a model

use serde::Serialize;

use super::{ConfigurationSource, EntityTypeId, Model, PropertyId};
use crate::annotations::{Annotation, Annotations};
use crate::error::{MetadataError, MetadataResult};

/// Read-only, deterministic rendering of a [`Model`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSnapshot {
    pub entity_types: Vec<EntityTypeSnapshot>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityTypeSnapshot {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_type: Option<String>,
    pub shadow: bool,
    pub properties: Vec<PropertySnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<Vec<String>>,
    pub keys: Vec<Vec<String>>,
    pub foreign_keys: Vec<ForeignKeySnapshot>,
    pub navigations: Vec<NavigationSnapshot>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertySnapshot {
    pub name: String,
    pub clr_type: String,
    pub nullable: bool,
    pub shadow: bool,
    pub concurrency_token: bool,
    pub read_only: bool,
    pub source: ConfigurationSource,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForeignKeySnapshot {
    pub properties: Vec<String>,
    pub principal: String,
    pub principal_key: Vec<String>,
    pub unique: bool,
    pub required: bool,
    pub source: ConfigurationSource,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NavigationSnapshot {
    pub name: String,
    pub target: String,
    pub points_to_principal: bool,
    pub collection: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inverse: Option<String>,
}

impl Model {
    /// Capture the declared members of every entity type, in name order
    pub fn snapshot(&self) -> ModelSnapshot {
        ModelSnapshot {
            entity_types: self
                .entity_types()
                .into_iter()
                .map(|id| self.entity_type_snapshot(id))
                .collect(),
            annotations: annotation_list(&self.annotations),
        }
    }

    /// Render the snapshot as pretty-printed JSON
    pub fn to_json(&self) -> MetadataResult<String> {
        serde_json::to_string_pretty(&self.snapshot())
            .map_err(|e| MetadataError::configuration(format!("Failed to serialize model: {}", e)))
    }

    fn entity_type_snapshot(&self, id: EntityTypeId) -> EntityTypeSnapshot {
        let et = &self[id];

        EntityTypeSnapshot {
            name: et.name.clone(),
            base_type: et.base_type.map(|base| self[base].name.clone()),
            shadow: et.is_shadow(),
            properties: et
                .properties
                .iter()
                .map(|property| {
                    let p = &self[*property];
                    PropertySnapshot {
                        name: p.name.clone(),
                        clr_type: p.clr_type.to_string(),
                        nullable: p.is_nullable(),
                        shadow: p.is_shadow,
                        concurrency_token: p.is_concurrency_token,
                        read_only: p.is_read_only,
                        source: p.configuration_source,
                        annotations: annotation_list(&p.annotations),
                    }
                })
                .collect(),
            primary_key: et.primary_key.map(|key| self.property_names(&self[key].properties)),
            keys: et
                .keys
                .iter()
                .map(|key| self.property_names(&self[*key].properties))
                .collect(),
            foreign_keys: et
                .foreign_keys
                .iter()
                .map(|foreign_key| {
                    let fk = &self[*foreign_key];
                    ForeignKeySnapshot {
                        properties: self.property_names(&fk.properties),
                        principal: self[fk.principal_entity_type].name.clone(),
                        principal_key: self.property_names(&self[fk.principal_key].properties),
                        unique: fk.is_unique,
                        required: self.is_required(*foreign_key),
                        source: fk.configuration_source,
                        annotations: annotation_list(&fk.annotations),
                    }
                })
                .collect(),
            navigations: et
                .navigations
                .iter()
                .map(|navigation| NavigationSnapshot {
                    name: self[*navigation].name.clone(),
                    target: self[self.navigation_target(*navigation)].name.clone(),
                    points_to_principal: self[*navigation].points_to_principal,
                    collection: self.is_collection(*navigation),
                    inverse: self.inverse(*navigation).map(|inverse| self[inverse].name.clone()),
                })
                .collect(),
            annotations: annotation_list(&et.annotations),
        }
    }

    fn property_names(&self, properties: &[PropertyId]) -> Vec<String> {
        properties.iter().map(|p| self[*p].name.clone()).collect()
    }
}

fn annotation_list(annotations: &Annotations) -> Vec<Annotation> {
    annotations.iter().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clr::ScalarType;

    fn build(order_first: bool) -> Model {
        let mut model = Model::new();
        let names = if order_first {
            ["Order", "Customer"]
        } else {
            ["Customer", "Order"]
        };
        for name in names {
            let et = model.add_entity_type(name).unwrap();
            let id = model
                .add_property(et, "Id", ScalarType::I32.into(), ConfigurationSource::Explicit)
                .unwrap();
            model.set_primary_key(et, &[id]).unwrap();
        }
        model.annotations_mut().set("Schema", Some("sales")).unwrap();
        model
    }

    #[test]
    fn test_snapshot_is_deterministic() {
        let first = build(true).to_json().unwrap();
        let second = build(false).to_json().unwrap();
        assert_eq!(first, second);

        let snapshot = build(true).snapshot();
        assert_eq!(snapshot.entity_types[0].name, "Customer");
        assert_eq!(snapshot.entity_types[0].primary_key, Some(vec!["Id".to_string()]));
        assert_eq!(snapshot.annotations[0].value, "sales");
    }

    #[test]
    fn test_snapshot_json_shape() {
        let json: serde_json::Value = serde_json::from_str(&build(false).to_json().unwrap()).unwrap();
        assert_eq!(json["entity_types"][1]["name"], "Order");
        assert_eq!(json["entity_types"][1]["properties"][0]["clr_type"], "i32");
        assert_eq!(json["entity_types"][1]["properties"][0]["source"], "explicit");
        assert!(json["entity_types"][1].get("base_type").is_none());
    }
}
