//! Applying relationship plans to a model

use tracing::{debug, warn};

use super::{
    ForeignKeyAction, NavigationAction, PrincipalKeyAction, PropertyAction, RelationshipPlan, RelationshipRequest,
};
use crate::config::MetadataConfig;
use crate::error::{MetadataError, MetadataResult};
use crate::model::{ConfigurationSource, ForeignKeyId, KeyId, Model, NavigationId, PropertyId};

/// Resolves relationship requests against a model
///
/// Every mutating operation is atomic: the model is checkpointed before the first change and
/// restored if any later step fails.
#[derive(Debug, Clone, Copy)]
pub struct RelationshipResolver<'a> {
    config: &'a MetadataConfig,
}

impl<'a> RelationshipResolver<'a> {
    pub fn new(config: &'a MetadataConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MetadataConfig {
        self.config
    }

    /// Work out what `request` would change without touching the model
    pub fn plan(&self, model: &Model, request: &RelationshipRequest) -> MetadataResult<RelationshipPlan> {
        RelationshipPlan::compute(model, self.config, request)
    }

    /// Apply a plan computed against the current state of `model`
    pub fn apply(&self, model: &mut Model, plan: &RelationshipPlan) -> MetadataResult<ForeignKeyId> {
        self.with_checkpoint(model, |model| self.apply_plan(model, plan))
    }

    /// Plan and apply in one step, returning the foreign key behind the relationship
    pub fn resolve(&self, model: &mut Model, request: &RelationshipRequest) -> MetadataResult<ForeignKeyId> {
        let plan = self.plan(model, request)?;
        self.apply(model, &plan)
    }

    /// Swap the principal and dependent ends of a one-to-one relationship
    ///
    /// The foreign key is removed together with any shadow properties created for it, and the
    /// relationship is resolved again in the opposite direction with the same navigation names.
    pub fn invert(&self, model: &mut Model, foreign_key: ForeignKeyId) -> MetadataResult<ForeignKeyId> {
        let fk = model.lookup_foreign_key(foreign_key)?;
        if !fk.is_unique() {
            return Err(MetadataError::argument(
                "foreign_key",
                format!(
                    "only one-to-one relationships can be inverted, {} is not unique",
                    model.describe_foreign_key(foreign_key)
                ),
            ));
        }

        let navigation_name = |navigation: Option<NavigationId>| navigation.map(|n| model[n].name().to_string());
        let to_principal = navigation_name(fk.dependent_to_principal());
        let to_dependent = navigation_name(fk.principal_to_dependent());
        let principal = fk.principal_entity_type();
        let dependent = fk.declaring_entity_type();

        self.with_checkpoint(model, |model| {
            model.remove_foreign_key(foreign_key)?;

            let request = RelationshipRequest::one_to_one(
                dependent,
                principal,
                to_principal.as_deref(),
                to_dependent.as_deref(),
            );
            let plan = self.plan(model, &request)?;
            let inverted = self.apply_plan(model, &plan)?;

            if self.config.log_conventions {
                debug!(
                    "Inverted relationship: {} now references '{}'",
                    model.describe_foreign_key(inverted),
                    model[dependent].name()
                );
            }
            Ok(inverted)
        })
    }

    fn with_checkpoint<T>(
        &self,
        model: &mut Model,
        change: impl FnOnce(&mut Model) -> MetadataResult<T>,
    ) -> MetadataResult<T> {
        let checkpoint = model.clone();
        match change(model) {
            Ok(value) => Ok(value),
            Err(error) => {
                warn!("Relationship change rolled back: {}", error);
                *model = checkpoint;
                Err(error)
            }
        }
    }

    fn apply_plan(&self, model: &mut Model, plan: &RelationshipPlan) -> MetadataResult<ForeignKeyId> {
        let foreign_key = match plan.foreign_key {
            ForeignKeyAction::Reuse(fk) => fk,
            action => {
                let replaced = match action {
                    ForeignKeyAction::Replace(old) => Some(model.detach_foreign_key(old)?),
                    _ => None,
                };

                let key = self.apply_principal_key(model, plan)?;
                let properties = self.apply_dependent_properties(model, plan)?;
                let fk = model.add_foreign_key_with_uniqueness(
                    plan.dependent,
                    &properties,
                    key,
                    plan.principal,
                    plan.unique,
                    ConfigurationSource::Explicit,
                )?;

                if let Some(old) = replaced {
                    model.remove_unused_convention_properties(old.properties())?;
                }
                fk
            }
        };

        if let Some(required) = plan.required {
            model.set_foreign_key_required(foreign_key, Some(required))?;
        }

        for (action, points_to_principal) in [
            (&plan.navigation_to_principal, true),
            (&plan.navigation_to_dependent, false),
        ] {
            match action {
                Some(NavigationAction::Add(name)) => {
                    model.add_navigation(foreign_key, name, points_to_principal)?;
                }
                Some(NavigationAction::Move(navigation)) => {
                    let name = model[*navigation].name().to_string();
                    model.remove_navigation(*navigation)?;
                    model.add_navigation(foreign_key, &name, points_to_principal)?;
                }
                _ => {}
            }
        }

        if self.config.log_conventions {
            debug!("Resolved relationship {}", model.describe_foreign_key(foreign_key));
        }
        Ok(foreign_key)
    }

    fn apply_principal_key(&self, model: &mut Model, plan: &RelationshipPlan) -> MetadataResult<KeyId> {
        match &plan.principal_key {
            Some(PrincipalKeyAction::Existing(key)) => Ok(*key),
            Some(PrincipalKeyAction::Add(properties)) => model.add_key(plan.principal, properties),
            Some(PrincipalKeyAction::Create {
                entity_type,
                properties,
            }) => {
                let created = properties
                    .iter()
                    .map(|p| model.add_property(*entity_type, &p.name, p.clr_type.clone(), p.source))
                    .collect::<MetadataResult<Vec<_>>>()?;
                model.add_key(*entity_type, &created)
            }
            None => Err(MetadataError::configuration(
                "a plan that creates a foreign key must say which principal key it references",
            )),
        }
    }

    fn apply_dependent_properties(&self, model: &mut Model, plan: &RelationshipPlan) -> MetadataResult<Vec<PropertyId>> {
        plan.dependent_properties
            .iter()
            .map(|action| match action {
                PropertyAction::Existing(property) => Ok(*property),
                PropertyAction::Create(p) => model.add_property(plan.dependent, &p.name, p.clr_type.clone(), p.source),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clr::{ClrType, ScalarType};
    use crate::model::EntityTypeId;

    struct Fixture {
        model: Model,
        customer: EntityTypeId,
        order: EntityTypeId,
    }

    fn fixture() -> Fixture {
        let mut model = Model::new();
        let customer = model.add_entity_type("Customer").unwrap();
        let order = model.add_entity_type("Order").unwrap();
        let id = model
            .add_property(customer, "Id", ScalarType::I32.into(), ConfigurationSource::Explicit)
            .unwrap();
        model.set_primary_key(customer, &[id]).unwrap();
        Fixture { model, customer, order }
    }

    fn config() -> MetadataConfig {
        MetadataConfig::default().with_convention_logging(false)
    }

    #[test]
    fn test_resolve_adds_shadow_foreign_key_and_navigations() {
        let Fixture { mut model, customer, order } = fixture();
        let config = config();
        let resolver = RelationshipResolver::new(&config);

        let request = RelationshipRequest::one_to_many(customer, order, Some("Orders"), Some("Customer"));
        let fk = resolver.resolve(&mut model, &request).unwrap();

        let property = model.find_property(order, "CustomerId").unwrap();
        assert!(model[property].is_shadow());
        assert_eq!(model[property].clr_type(), &ClrType::Nullable(ScalarType::I32));
        assert_eq!(model[fk].properties(), &[property]);
        assert!(!model[fk].is_unique());
        assert!(!model.is_required(fk));
        assert!(model.find_navigation(customer, "Orders").is_some());
        assert!(model.find_navigation(order, "Customer").is_some());
    }

    #[test]
    fn test_redeclaring_reuses_foreign_key() {
        let Fixture { mut model, customer, order } = fixture();
        let config = config();
        let resolver = RelationshipResolver::new(&config);

        let first = resolver
            .resolve(&mut model, &RelationshipRequest::many_to_one(order, customer, Some("Customer"), None))
            .unwrap();
        let second = resolver
            .resolve(
                &mut model,
                &RelationshipRequest::one_to_many(customer, order, Some("Orders"), Some("Customer")),
            )
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(model.foreign_keys(order).len(), 1);
        assert_eq!(model.properties(order).len(), 1);
        assert_eq!(model[first].principal_to_dependent(), model.find_navigation(customer, "Orders"));
    }

    #[test]
    fn test_uniqueness_mismatch_creates_second_foreign_key() {
        let Fixture { mut model, customer, order } = fixture();
        let config = config();
        let resolver = RelationshipResolver::new(&config);

        let many = resolver
            .resolve(
                &mut model,
                &RelationshipRequest::one_to_many(customer, order, Some("Orders"), Some("Customer")),
            )
            .unwrap();
        let one = resolver
            .resolve(
                &mut model,
                &RelationshipRequest::one_to_one(customer, order, Some("Orders"), Some("Customer")),
            )
            .unwrap();

        assert_ne!(many, one);
        assert_eq!(model.foreign_keys(order).len(), 2);
        assert!(model[one].is_unique());
        assert!(!model[many].is_unique());
        assert_eq!(model[one].dependent_to_principal(), model.find_navigation(order, "Customer"));
        assert_eq!(model[one].principal_to_dependent(), model.find_navigation(customer, "Orders"));
        assert_eq!(model[many].dependent_to_principal(), None);
        assert_eq!(model[many].principal_to_dependent(), None);
        assert_ne!(model[one].properties(), model[many].properties());
    }

    #[test]
    fn test_explicit_foreign_key_replaces_discovered_one() {
        let Fixture { mut model, customer, order } = fixture();
        let config = config();
        let resolver = RelationshipResolver::new(&config);
        let discovered = model
            .add_property(order, "CustomerId", ScalarType::I32.into(), ConfigurationSource::Explicit)
            .unwrap();
        let alternate = model
            .add_property(order, "BuyerId", ScalarType::I32.into(), ConfigurationSource::Explicit)
            .unwrap();

        let request = RelationshipRequest::one_to_many(customer, order, Some("Orders"), Some("Customer"));
        let first = resolver.resolve(&mut model, &request).unwrap();
        assert_eq!(model[first].properties(), &[discovered]);

        let replaced = resolver
            .resolve(&mut model, &request.clone().with_foreign_key(&["BuyerId"]))
            .unwrap();

        assert_eq!(model.foreign_keys(order), vec![replaced]);
        assert_eq!(model[replaced].properties(), &[alternate]);
        assert!(model.get_foreign_key(first).is_none());
        assert!(model.find_property(order, "CustomerId").is_some());
        assert_eq!(model[replaced].dependent_to_principal(), model.find_navigation(order, "Customer"));
    }

    #[test]
    fn test_failed_apply_restores_model() {
        let Fixture { mut model, customer, order } = fixture();
        let config = config();
        let resolver = RelationshipResolver::new(&config);

        let request = RelationshipRequest::one_to_many(customer, order, Some("Orders"), Some("Customer"));
        let plan = resolver.plan(&model, &request).unwrap();
        model
            .add_property(customer, "Orders", ScalarType::String.into(), ConfigurationSource::Explicit)
            .unwrap();
        let before = model.snapshot();

        let result = resolver.apply(&mut model, &plan);
        assert!(matches!(result, Err(MetadataError::NavigationConflict { .. })));
        assert_eq!(model.snapshot(), before);
        assert!(model.find_property(order, "CustomerId").is_none());
        assert!(model.foreign_keys(order).is_empty());
    }

    #[test]
    fn test_invert_swaps_ends() {
        let Fixture { mut model, customer, .. } = fixture();
        let config = config();
        let resolver = RelationshipResolver::new(&config);
        let profile = model.add_entity_type("Profile").unwrap();
        let id = model
            .add_property(profile, "Id", ScalarType::I32.into(), ConfigurationSource::Explicit)
            .unwrap();
        model.set_primary_key(profile, &[id]).unwrap();

        let fk = resolver
            .resolve(
                &mut model,
                &RelationshipRequest::one_to_one(customer, profile, Some("Profile"), Some("Customer")),
            )
            .unwrap();
        assert!(model.find_property(profile, "CustomerId").is_some());

        let inverted = resolver.invert(&mut model, fk).unwrap();

        assert!(model.find_property(profile, "CustomerId").is_none());
        assert_eq!(model[inverted].declaring_entity_type(), customer);
        assert_eq!(model[inverted].principal_entity_type(), profile);
        assert!(model[inverted].is_unique());
        let navigation = model.find_navigation(customer, "Profile").unwrap();
        assert!(model[navigation].points_to_principal());
        assert_eq!(model[model[inverted].properties()[0]].name(), "ProfileId");
    }

    #[test]
    fn test_invert_rejects_collection_relationship() {
        let Fixture { mut model, customer, order } = fixture();
        let config = config();
        let resolver = RelationshipResolver::new(&config);
        let fk = resolver
            .resolve(&mut model, &RelationshipRequest::one_to_many(customer, order, None, None))
            .unwrap();

        assert!(matches!(
            resolver.invert(&mut model, fk),
            Err(MetadataError::ArgumentInvalid { .. })
        ));
        assert!(model.get_foreign_key(fk).is_some());
    }
}
