//! Relationship planning
//!
//! Planning only reads the model. The decision about the foreign key is taken from this table,
//! evaluated top to bottom:
//!
//! | requested navigation exists | uniqueness matches | explicit names differ | action            |
//! |-----------------------------|--------------------|-----------------------|-------------------|
//! | yes                         | no                 | -                     | `CreateAlongside` |
//! | yes                         | yes                | yes                   | `Replace`         |
//! | yes                         | yes                | no                    | `Reuse`           |
//! | no, same properties and key | yes                | -                     | `Reuse`           |
//! | no, same properties and key | no                 | -                     | `CreateAlongside` |
//! | no                          | -                  | -                     | `Create`          |
//!
//! Foreign keys over the same properties and key may coexist when their uniqueness differs. A
//! foreign key created alongside another takes over the requested navigations from it.

use tracing::{debug, warn};

use super::RelationshipRequest;
use crate::clr::{ClrType, ScalarType};
use crate::config::MetadataConfig;
use crate::error::{MetadataError, MetadataResult};
use crate::model::{ConfigurationSource, EntityTypeId, ForeignKeyId, KeyId, Model, NavigationId, PropertyId};

const TEMPORARY_KEY_NAME: &str = "TempId";

/// What happens to the foreign key of the relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForeignKeyAction {
    /// Keep an existing foreign key as it is
    Reuse(ForeignKeyId),
    /// Remove the foreign key found through the navigations and create one with the requested properties
    Replace(ForeignKeyId),
    /// Create a new foreign key next to an existing one whose uniqueness differs; the existing one is left as it is
    CreateAlongside(ForeignKeyId),
    Create,
}

impl ForeignKeyAction {
    pub fn creates_foreign_key(&self) -> bool {
        matches!(self, Self::Replace(_) | Self::CreateAlongside(_) | Self::Create)
    }
}

/// A property the plan will add
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedProperty {
    pub name: String,
    pub clr_type: ClrType,
    pub source: ConfigurationSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyAction {
    Existing(PropertyId),
    Create(PlannedProperty),
}

/// Where the referenced key comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrincipalKeyAction {
    Existing(KeyId),
    /// Add a key over existing principal properties
    Add(Vec<PropertyId>),
    /// Create key properties on the root of the principal hierarchy and key them
    Create {
        entity_type: EntityTypeId,
        properties: Vec<PlannedProperty>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationAction {
    Keep(NavigationId),
    Add(String),
    /// Take the navigation over from the foreign key this one is created alongside
    Move(NavigationId),
}

/// The full set of changes for one relationship request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipPlan {
    pub principal: EntityTypeId,
    pub dependent: EntityTypeId,
    pub foreign_key: ForeignKeyAction,
    /// `None` when an existing foreign key is kept
    pub principal_key: Option<PrincipalKeyAction>,
    /// Empty when an existing foreign key is kept
    pub dependent_properties: Vec<PropertyAction>,
    pub navigation_to_principal: Option<NavigationAction>,
    pub navigation_to_dependent: Option<NavigationAction>,
    pub unique: bool,
    pub required: Option<bool>,
}

impl RelationshipPlan {
    /// Decide how `request` maps onto the model
    pub fn compute(model: &Model, config: &MetadataConfig, request: &RelationshipRequest) -> MetadataResult<Self> {
        Planner {
            model,
            config,
            request,
        }
        .plan()
    }

    /// Names of the properties the plan adds to the dependent
    pub fn created_properties(&self) -> Vec<&str> {
        self.dependent_properties
            .iter()
            .filter_map(|action| match action {
                PropertyAction::Create(property) => Some(property.name.as_str()),
                PropertyAction::Existing(_) => None,
            })
            .collect()
    }
}

/// Name and type of each referenced key property, in key order
type KeyShape = Vec<(String, ClrType)>;

struct Planner<'a> {
    model: &'a Model,
    config: &'a MetadataConfig,
    request: &'a RelationshipRequest,
}

impl Planner<'_> {
    fn plan(&self) -> MetadataResult<RelationshipPlan> {
        self.model.lookup_entity_type(self.request.principal)?;
        self.model.lookup_entity_type(self.request.dependent)?;
        let unique = self.request.kind.is_unique();

        let action = match self.navigation_candidate()? {
            Some(fk) if self.model[fk].is_unique() != unique => ForeignKeyAction::CreateAlongside(fk),
            Some(fk) if self.explicit_names_differ(fk) => ForeignKeyAction::Replace(fk),
            Some(fk) => ForeignKeyAction::Reuse(fk),
            None => ForeignKeyAction::Create,
        };

        let plan = match action {
            ForeignKeyAction::Reuse(fk) => self.keep(fk)?,
            _ => self.create(action)?,
        };

        if self.config.log_conventions {
            debug!(
                "Planned {} relationship '{}' -> '{}': {:?}, new properties {:?}",
                self.request.kind,
                self.model[plan.dependent].name(),
                self.model[plan.principal].name(),
                plan.foreign_key,
                plan.created_properties()
            );
        }
        Ok(plan)
    }

    fn navigation_name(&self, points_to_principal: bool) -> Option<&str> {
        if points_to_principal {
            self.request.navigation_to_principal.as_deref()
        } else {
            self.request.navigation_to_dependent.as_deref()
        }
    }

    fn declaring(&self, points_to_principal: bool) -> EntityTypeId {
        if points_to_principal {
            self.request.dependent
        } else {
            self.request.principal
        }
    }

    fn conflict(&self, entity_type: EntityTypeId, navigation: &str, reason: impl Into<String>) -> MetadataError {
        MetadataError::NavigationConflict {
            entity_type: self.model[entity_type].name().to_string(),
            navigation: navigation.to_string(),
            reason: reason.into(),
        }
    }

    /// The foreign key already behind the requested navigations, if any
    fn navigation_candidate(&self) -> MetadataResult<Option<ForeignKeyId>> {
        let model = self.model;
        let mut candidate: Option<(ForeignKeyId, &str)> = None;

        for points_to_principal in [true, false] {
            let Some(name) = self.navigation_name(points_to_principal) else {
                continue;
            };
            let declaring = self.declaring(points_to_principal);
            let Some(navigation) = model.find_navigation(declaring, name) else {
                continue;
            };

            let nav = &model[navigation];
            let fk = &model[nav.foreign_key()];
            let same_relationship = nav.points_to_principal() == points_to_principal
                && fk.declaring_entity_type() == self.request.dependent
                && fk.principal_entity_type() == self.request.principal;
            if !same_relationship {
                return Err(self.conflict(declaring, name, "it belongs to another relationship"));
            }

            match candidate {
                Some((other, other_name)) if other != nav.foreign_key() => {
                    return Err(self.conflict(
                        declaring,
                        name,
                        format!("it belongs to a different relationship than '{}'", other_name),
                    ));
                }
                _ => candidate = Some((nav.foreign_key(), name)),
            }
        }

        Ok(candidate.map(|(fk, _)| fk))
    }

    fn property_names(&self, properties: &[PropertyId]) -> Vec<String> {
        properties
            .iter()
            .map(|p| self.model[*p].name().to_string())
            .collect()
    }

    fn explicit_names_differ(&self, fk: ForeignKeyId) -> bool {
        let fk = &self.model[fk];
        let foreign_key_differs = self
            .request
            .foreign_key_properties
            .as_ref()
            .is_some_and(|names| *names != self.property_names(fk.properties()));
        let principal_key_differs = self
            .request
            .principal_key_properties
            .as_ref()
            .is_some_and(|names| *names != self.property_names(self.model[fk.principal_key()].properties()));

        foreign_key_differs || principal_key_differs
    }

    /// Whether the requested navigation names can be attached to an existing foreign key
    fn navigations_fit(&self, fk: ForeignKeyId) -> bool {
        let fk = &self.model[fk];
        [
            (true, fk.dependent_to_principal()),
            (false, fk.principal_to_dependent()),
        ]
        .into_iter()
        .all(|(points_to_principal, current)| match (self.navigation_name(points_to_principal), current) {
            (Some(name), Some(current)) => self.model[current].name() == name,
            _ => true,
        })
    }

    fn keep(&self, fk: ForeignKeyId) -> MetadataResult<RelationshipPlan> {
        if self.request.required == Some(false) {
            let properties = self.model[fk].properties();
            self.ensure_optional_allowed(properties.iter().map(|p| {
                let property = &self.model[*p];
                (property.name(), property.clr_type())
            }))?;
        }

        Ok(RelationshipPlan {
            principal: self.request.principal,
            dependent: self.request.dependent,
            foreign_key: ForeignKeyAction::Reuse(fk),
            principal_key: None,
            dependent_properties: Vec::new(),
            navigation_to_principal: self.navigation_for_existing(fk, true)?,
            navigation_to_dependent: self.navigation_for_existing(fk, false)?,
            unique: self.request.kind.is_unique(),
            required: self.request.required,
        })
    }

    fn navigation_for_existing(&self, fk: ForeignKeyId, points_to_principal: bool) -> MetadataResult<Option<NavigationAction>> {
        let Some(name) = self.navigation_name(points_to_principal) else {
            return Ok(None);
        };
        let declaring = self.declaring(points_to_principal);
        let current = if points_to_principal {
            self.model[fk].dependent_to_principal()
        } else {
            self.model[fk].principal_to_dependent()
        };

        match current {
            Some(navigation) if self.model[navigation].name() == name => Ok(Some(NavigationAction::Keep(navigation))),
            Some(navigation) => Err(self.conflict(
                declaring,
                name,
                format!(
                    "the relationship is already exposed through '{}'",
                    self.model[navigation].name()
                ),
            )),
            None => {
                self.ensure_navigation_name_free(declaring, name, None)?;
                Ok(Some(NavigationAction::Add(name.to_string())))
            }
        }
    }

    fn navigation_for_new(&self, action: ForeignKeyAction, points_to_principal: bool) -> MetadataResult<Option<NavigationAction>> {
        let Some(name) = self.navigation_name(points_to_principal) else {
            return Ok(None);
        };
        let declaring = self.declaring(points_to_principal);

        match action {
            ForeignKeyAction::CreateAlongside(existing) => {
                let held = self.model.find_navigation(declaring, name).filter(|navigation| {
                    let navigation = &self.model[*navigation];
                    navigation.foreign_key() == existing && navigation.points_to_principal() == points_to_principal
                });
                if let Some(navigation) = held {
                    return Ok(Some(NavigationAction::Move(navigation)));
                }
                self.ensure_navigation_name_free(declaring, name, None)?;
            }
            ForeignKeyAction::Replace(existing) => self.ensure_navigation_name_free(declaring, name, Some(existing))?,
            _ => self.ensure_navigation_name_free(declaring, name, None)?,
        }

        Ok(Some(NavigationAction::Add(name.to_string())))
    }

    fn ensure_navigation_name_free(&self, entity_type: EntityTypeId, name: &str, ignore: Option<ForeignKeyId>) -> MetadataResult<()> {
        if self.model.find_property(entity_type, name).is_some() {
            return Err(self.conflict(entity_type, name, "a property with the same name exists"));
        }

        let taken = self
            .model
            .find_navigation(entity_type, name)
            .is_some_and(|navigation| Some(self.model[navigation].foreign_key()) != ignore);
        if taken {
            return Err(self.conflict(entity_type, name, "a navigation with the same name exists"));
        }
        Ok(())
    }

    fn ensure_optional_allowed<'p>(&self, properties: impl Iterator<Item = (&'p str, &'p ClrType)>) -> MetadataResult<()> {
        for (name, clr_type) in properties {
            if !clr_type.is_nullable() {
                return Err(MetadataError::CannotBeNullable {
                    property: name.to_string(),
                    clr_type: clr_type.to_string(),
                });
            }
        }
        Ok(())
    }

    fn create(&self, mut action: ForeignKeyAction) -> MetadataResult<RelationshipPlan> {
        let model = self.model;
        let unique = self.request.kind.is_unique();
        let request = self.request;
        let replaced = match action {
            ForeignKeyAction::Replace(fk) => Some(fk),
            _ => None,
        };
        let mut reserved: Vec<(EntityTypeId, String)> = Vec::new();

        let explicit: Option<Vec<Option<PropertyId>>> = match &request.foreign_key_properties {
            Some(names) if names.is_empty() => {
                return Err(MetadataError::argument(
                    "foreign_key_properties",
                    "at least one property name is required",
                ))
            }
            Some(names) => Some(
                names
                    .iter()
                    .map(|name| model.find_property(request.dependent, name))
                    .collect(),
            ),
            None => None,
        };

        let (principal_key, shape) = self.principal_key(explicit.as_deref(), &mut reserved)?;
        let key = match &principal_key {
            PrincipalKeyAction::Existing(key) => Some(*key),
            _ => None,
        };

        let dependent_properties = match (&request.foreign_key_properties, &explicit) {
            (Some(names), Some(existing)) => self.explicit_properties(names, existing, &shape)?,
            _ => {
                let skip_used = !matches!(action, ForeignKeyAction::Create);
                let mut discovered = self.discover(&shape, key, skip_used, replaced);

                let taken = match (&discovered, key) {
                    (Some(properties), Some(key)) => model
                        .find_foreign_key(request.dependent, properties, key)
                        .is_some_and(|fk| !self.navigations_fit(fk)),
                    _ => false,
                };
                if taken {
                    discovered = self.discover(&shape, key, true, replaced);
                }

                match discovered {
                    Some(properties) => properties.into_iter().map(PropertyAction::Existing).collect(),
                    None => self.synthesize(&shape, &mut reserved)?,
                }
            }
        };

        let existing: Option<Vec<PropertyId>> = dependent_properties
            .iter()
            .map(|action| match action {
                PropertyAction::Existing(property) => Some(*property),
                PropertyAction::Create(_) => None,
            })
            .collect();

        if let (Some(properties), Some(key)) = (&existing, key) {
            if let ForeignKeyAction::Create = action {
                let matched: Vec<ForeignKeyId> = model
                    .find_foreign_keys(request.dependent, properties)
                    .into_iter()
                    .filter(|fk| model[*fk].principal_key() == key)
                    .collect();
                let same = matched.iter().copied().find(|fk| model[*fk].is_unique() == unique);
                let other = matched.iter().copied().find(|fk| model[*fk].is_unique() != unique);

                match (same, other) {
                    (Some(fk), _) if self.navigations_fit(fk) => return self.keep(fk),
                    (None, Some(fk)) => action = ForeignKeyAction::CreateAlongside(fk),
                    _ => {}
                }
            }
            model.validate_foreign_key(request.dependent, properties, key, request.principal, unique)?;
        }

        if request.required == Some(false) {
            self.ensure_optional_allowed(dependent_properties.iter().map(|action| match action {
                PropertyAction::Existing(property) => (model[*property].name(), model[*property].clr_type()),
                PropertyAction::Create(planned) => (planned.name.as_str(), &planned.clr_type),
            }))?;
        }

        if let ForeignKeyAction::CreateAlongside(existing) = action {
            warn!(
                "Navigation on '{}' matched foreign key {} with different uniqueness; creating a second foreign key alongside it",
                model[request.dependent].name(),
                model.describe_foreign_key(existing)
            );
        }

        Ok(RelationshipPlan {
            principal: request.principal,
            dependent: request.dependent,
            foreign_key: action,
            principal_key: Some(principal_key),
            dependent_properties,
            navigation_to_principal: self.navigation_for_new(action, true)?,
            navigation_to_dependent: self.navigation_for_new(action, false)?,
            unique,
            required: request.required,
        })
    }

    fn reserve(&self, entity_type: EntityTypeId, base: &str, reserved: &mut Vec<(EntityTypeId, String)>) -> String {
        let taken: Vec<String> = reserved
            .iter()
            .filter(|(et, _)| *et == entity_type)
            .map(|(_, name)| name.clone())
            .collect();
        let name = self.model.unique_property_name(entity_type, base, &taken);
        reserved.push((entity_type, name.clone()));
        name
    }

    fn shape_of(&self, properties: &[PropertyId]) -> KeyShape {
        properties
            .iter()
            .map(|p| (self.model[*p].name().to_string(), self.model[*p].clr_type().clone()))
            .collect()
    }

    /// Explicit principal key, then the primary key, then a key created for the relationship
    fn principal_key(
        &self,
        explicit: Option<&[Option<PropertyId>]>,
        reserved: &mut Vec<(EntityTypeId, String)>,
    ) -> MetadataResult<(PrincipalKeyAction, KeyShape)> {
        let model = self.model;
        let principal = self.request.principal;

        if let Some(names) = &self.request.principal_key_properties {
            if names.is_empty() {
                return Err(MetadataError::argument(
                    "principal_key_properties",
                    "at least one property name is required",
                ));
            }

            let properties = names
                .iter()
                .map(|name| {
                    model.find_property(principal, name).ok_or_else(|| {
                        MetadataError::not_found("Property", format!("{}.{}", model[principal].name(), name))
                    })
                })
                .collect::<MetadataResult<Vec<_>>>()?;
            let shape = self.shape_of(&properties);

            return Ok(match model.find_key(principal, &properties) {
                Some(key) => (PrincipalKeyAction::Existing(key), shape),
                None => (PrincipalKeyAction::Add(properties), shape),
            });
        }

        let existing_dependents: Option<Vec<PropertyId>> = explicit.and_then(|found| found.iter().copied().collect());

        if let Some(primary_key) = model.primary_key(principal) {
            let key_properties = model[primary_key].properties();
            let fits = existing_dependents.as_ref().map_or(true, |dependents| {
                dependents.len() == key_properties.len()
                    && dependents
                        .iter()
                        .zip(key_properties)
                        .all(|(d, k)| model[*d].clr_type().is_compatible_with(model[*k].clr_type()))
            });
            if fits {
                return Ok((PrincipalKeyAction::Existing(primary_key), self.shape_of(key_properties)));
            }
        }

        let root = model.root_type(principal);
        let properties: Vec<PlannedProperty> = match existing_dependents {
            Some(dependents) => dependents
                .iter()
                .map(|d| PlannedProperty {
                    name: self.reserve(root, model[*d].name(), reserved),
                    clr_type: model[*d].clr_type().underlying(),
                    source: ConfigurationSource::Convention,
                })
                .collect(),
            None => vec![PlannedProperty {
                name: self.reserve(root, TEMPORARY_KEY_NAME, reserved),
                clr_type: ScalarType::I32.into(),
                source: ConfigurationSource::Convention,
            }],
        };

        if self.config.log_conventions {
            debug!(
                "'{}' has no usable key; creating {:?}",
                model[principal].name(),
                properties.iter().map(|p| p.name.as_str()).collect::<Vec<_>>()
            );
        }

        let shape = properties
            .iter()
            .map(|p| (p.name.clone(), p.clr_type.clone()))
            .collect();
        Ok((
            PrincipalKeyAction::Create {
                entity_type: root,
                properties,
            },
            shape,
        ))
    }

    fn dependent_type(&self, name: &str, key_type: &ClrType) -> ClrType {
        let declared = self.model[self.request.dependent]
            .clr_class()
            .and_then(|class| class.find_property(name))
            .map(|property| property.ty.clone());

        match declared {
            Some(clr_type) => clr_type,
            None if self.request.required == Some(true) => key_type.underlying(),
            None => key_type.make_nullable(),
        }
    }

    fn explicit_properties(
        &self,
        names: &[String],
        existing: &[Option<PropertyId>],
        shape: &KeyShape,
    ) -> MetadataResult<Vec<PropertyAction>> {
        if names.len() != shape.len() {
            return Err(MetadataError::ForeignKeyCountMismatch {
                foreign_key: describe_names(names),
                principal: self.model[self.request.principal].name().to_string(),
                dependent_count: names.len(),
                principal_count: shape.len(),
            });
        }

        Ok(names
            .iter()
            .zip(existing)
            .zip(shape)
            .map(|((name, existing), (_, key_type))| match existing {
                Some(property) => PropertyAction::Existing(*property),
                None => PropertyAction::Create(PlannedProperty {
                    name: name.clone(),
                    clr_type: self.dependent_type(name, key_type),
                    source: ConfigurationSource::Explicit,
                }),
            })
            .collect())
    }

    /// Find existing dependent properties named after the navigation or the principal type
    fn discover(
        &self,
        shape: &KeyShape,
        key: Option<KeyId>,
        skip_used: bool,
        replaced: Option<ForeignKeyId>,
    ) -> Option<Vec<PropertyId>> {
        let model = self.model;
        let dependent = self.request.dependent;
        let bases: Vec<&str> = self
            .request
            .navigation_to_principal
            .as_deref()
            .into_iter()
            .chain(Some(model[self.request.principal].display_name()))
            .collect();

        let mut candidates: Vec<Vec<String>> = bases
            .iter()
            .map(|base| shape.iter().map(|(key_name, _)| format!("{}{}", base, key_name)).collect())
            .collect();
        if shape.len() == 1 {
            candidates.extend(
                bases
                    .iter()
                    .map(|base| vec![format!("{}{}", base, self.config.key_suffix)]),
            );
        }

        let used_by_other = |property: PropertyId| {
            model.foreign_keys(dependent).into_iter().any(|fk| {
                Some(fk) != replaced
                    && Some(model[fk].principal_key()) == key
                    && model[fk].properties().contains(&property)
            })
        };

        candidates.into_iter().find_map(|names| {
            let properties = names
                .iter()
                .map(|name| model.find_property(dependent, name))
                .collect::<Option<Vec<_>>>()?;
            let compatible = properties
                .iter()
                .zip(shape)
                .all(|(p, (_, key_type))| model[*p].clr_type().is_compatible_with(key_type));
            let used = skip_used && properties.iter().any(|p| used_by_other(*p));

            if !compatible || used {
                return None;
            }
            if self.config.log_conventions {
                debug!(
                    "Discovered foreign key {} on '{}'",
                    describe_names(&names),
                    model[dependent].name()
                );
            }
            Some(properties)
        })
    }

    /// Shadow properties `<navigation or principal><key property>`, nullable unless required
    fn synthesize(&self, shape: &KeyShape, reserved: &mut Vec<(EntityTypeId, String)>) -> MetadataResult<Vec<PropertyAction>> {
        let model = self.model;
        let dependent = self.request.dependent;

        if !self.config.synthesize_shadow_foreign_keys {
            return Err(MetadataError::configuration(format!(
                "no foreign key properties were found on '{}' for the relationship to '{}' and shadow foreign keys are disabled",
                model[dependent].name(),
                model[self.request.principal].name()
            )));
        }

        let base = match &self.request.navigation_to_principal {
            Some(navigation) => navigation.clone(),
            None => model[self.request.principal].display_name().to_string(),
        };

        let mut properties = Vec::with_capacity(shape.len());
        for (key_name, key_type) in shape {
            let name = self.reserve(dependent, &format!("{}{}", base, key_name), reserved);
            let clr_type = if self.request.required == Some(true) {
                key_type.underlying()
            } else {
                key_type.make_nullable()
            };

            if self.config.log_conventions {
                debug!("Creating shadow foreign key property '{}.{}' ({})", model[dependent].name(), name, clr_type);
            }
            properties.push(PropertyAction::Create(PlannedProperty {
                name,
                clr_type,
                source: ConfigurationSource::Convention,
            }));
        }
        Ok(properties)
    }
}

fn describe_names(names: &[String]) -> String {
    let quoted: Vec<String> = names.iter().map(|name| format!("'{}'", name)).collect();
    format!("{{{}}}", quoted.join(", "))
}
