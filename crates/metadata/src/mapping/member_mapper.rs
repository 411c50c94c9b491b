//! Binding metadata properties to the fields or setters that store them

use tracing::debug;

use crate::annotations::{Annotatable, BACKING_FIELD};
use crate::clr::{ClrClass, ClrField, ClrObject, ClrProperty, ClrValue};
use crate::config::{BackingFieldConvention, MetadataConfig};
use crate::error::{MetadataError, MetadataResult};
use crate::model::{EntityTypeId, Model, Property, PropertyId};

/// The CLR member used to read and write a property
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberInfo {
    Field(ClrField),
    Property(ClrProperty),
}

impl MemberInfo {
    pub fn name(&self) -> &str {
        match self {
            Self::Field(field) => &field.name,
            Self::Property(property) => &property.name,
        }
    }

    pub fn read(&self, entity: &ClrObject) -> MetadataResult<ClrValue> {
        match self {
            Self::Field(field) => entity.field(&field.name).cloned(),
            Self::Property(property) => entity.read_storage(property),
        }
    }

    pub fn write(&self, entity: &mut ClrObject, value: ClrValue) -> MetadataResult<()> {
        match self {
            Self::Field(field) => entity.set_field(&field.name, value),
            Self::Property(property) => entity.write_storage(property, value),
        }
    }
}

/// A metadata property together with its member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberMapping {
    pub property: PropertyId,
    pub member: MemberInfo,
}

/// Resolves the member of each property: explicit backing field, conventional field, then setter
#[derive(Debug, Clone)]
pub struct MemberMapper {
    conventions: Vec<BackingFieldConvention>,
}

impl Default for MemberMapper {
    fn default() -> Self {
        Self {
            conventions: BackingFieldConvention::ALL.to_vec(),
        }
    }
}

impl MemberMapper {
    pub fn new(config: &MetadataConfig) -> Self {
        Self {
            conventions: config.backing_field_conventions.clone(),
        }
    }

    /// Map every non-shadow property of the entity type, inherited ones included
    pub fn map_properties_to_members(&self, model: &Model, entity_type: EntityTypeId) -> MetadataResult<Vec<MemberMapping>> {
        let et = model
            .get_entity_type(entity_type)
            .ok_or_else(|| MetadataError::not_found("Entity type", format!("#{}", entity_type.index())))?;
        let class = et.clr_class().ok_or_else(|| MetadataError::NoClrType {
            entity_type: et.name().to_string(),
        })?;

        model
            .properties(entity_type)
            .into_iter()
            .filter(|property| !model[*property].is_shadow())
            .map(|property| {
                let member = self.find_member(et.name(), class, &model[property])?;
                debug!("Mapped '{}.{}' to member '{}'", et.name(), model[property].name(), member.name());
                Ok(MemberMapping { property, member })
            })
            .collect()
    }

    fn find_member(&self, entity_type: &str, class: &ClrClass, property: &Property) -> MetadataResult<MemberInfo> {
        if let Some(field_name) = property.annotation(BACKING_FIELD) {
            let field = class.find_field(field_name).ok_or_else(|| MetadataError::MissingBackingField {
                entity_type: entity_type.to_string(),
                property: property.name().to_string(),
                field: field_name.to_string(),
            })?;

            if !field.ty.is_compatible_with(property.clr_type()) {
                return Err(MetadataError::BadBackingFieldType {
                    entity_type: entity_type.to_string(),
                    property: property.name().to_string(),
                    field: field.name.clone(),
                    field_type: field.ty.to_string(),
                    property_type: property.clr_type().to_string(),
                });
            }
            return Ok(MemberInfo::Field(field.clone()));
        }

        let conventional = self
            .conventions
            .iter()
            .filter_map(|convention| class.find_field(&convention.field_name(property.name())))
            .find(|field| field.ty.is_compatible_with(property.clr_type()));
        if let Some(field) = conventional {
            return Ok(MemberInfo::Field(field.clone()));
        }

        match class.find_setter(property.name()) {
            Some(setter) => Ok(MemberInfo::Property(setter.clone())),
            None => Err(MetadataError::NoFieldOrSetter {
                entity_type: entity_type.to_string(),
                property: property.name().to_string(),
            }),
        }
    }
}
