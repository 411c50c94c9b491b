//! Collection accessor source for to-many navigations

use dashmap::DashMap;
use std::sync::Arc;
use tracing::trace;

use super::{select_collection_type, ClrCollectionAccessor};
use crate::clr::{
    ClrCollection, ClrObject, ClrProperty, ClrType, ClrValue, CollectionRef, CollectionShape, CollectionType,
    ObjectRef,
};
use crate::error::{MetadataError, MetadataResult};
use crate::model::{Model, NavigationId};

/// Accessor bound to the CLR property behind a collection navigation
#[derive(Debug, Clone)]
pub struct ClrICollectionAccessor {
    class: String,
    navigation: String,
    getter: ClrProperty,
    setter: Option<ClrProperty>,
    declared_type: CollectionType,
    materialized_type: Option<CollectionType>,
}

impl ClrICollectionAccessor {
    /// The declared type of the navigation property
    pub fn declared_type(&self) -> &CollectionType {
        &self.declared_type
    }

    /// The type created when the entity holds no collection yet
    pub fn materialized_type(&self) -> Option<&CollectionType> {
        self.materialized_type.as_ref()
    }

    fn get(&self, entity: &ClrObject) -> MetadataResult<Option<CollectionRef>> {
        match entity.read_storage(&self.getter)? {
            ClrValue::Collection(collection) => Ok(Some(collection)),
            ClrValue::Null => Ok(None),
            other => Err(MetadataError::argument(
                "entity",
                format!("'{}.{}' holds {:?} instead of a collection", self.class, self.navigation, other),
            )),
        }
    }

    fn create_and_set(&self, entity: &mut ClrObject) -> MetadataResult<CollectionRef> {
        let setter = self.setter.as_ref().ok_or_else(|| MetadataError::NoSetter {
            class: self.class.clone(),
            property: self.navigation.clone(),
        })?;
        let collection_type = self
            .materialized_type
            .clone()
            .ok_or_else(|| MetadataError::CannotCreateType {
                class: self.class.clone(),
                navigation: self.navigation.clone(),
                clr_type: self.declared_type.to_string(),
            })?;

        let collection = ClrCollection::new(collection_type).into_ref();
        entity.write_storage(setter, ClrValue::Collection(collection.clone()))?;
        Ok(collection)
    }
}

impl ClrCollectionAccessor for ClrICollectionAccessor {
    fn navigation_name(&self) -> &str {
        &self.navigation
    }

    fn add(&self, entity: &mut ClrObject, value: ObjectRef) -> MetadataResult<()> {
        self.get_or_create(entity)?.borrow_mut().add(value);
        Ok(())
    }

    fn contains(&self, entity: &mut ClrObject, value: &ObjectRef) -> MetadataResult<bool> {
        Ok(self.get_or_create(entity)?.borrow().contains(value))
    }

    fn remove(&self, entity: &mut ClrObject, value: &ObjectRef) -> MetadataResult<bool> {
        Ok(self.get_or_create(entity)?.borrow_mut().remove(value))
    }

    fn get_or_create(&self, entity: &mut ClrObject) -> MetadataResult<CollectionRef> {
        match self.get(entity)? {
            Some(collection) => Ok(collection),
            None => self.create_and_set(entity),
        }
    }

    fn items(&self, entity: &ClrObject) -> MetadataResult<Vec<ObjectRef>> {
        let Some(collection) = self.get(entity)? else {
            return Ok(Vec::new());
        };
        let items = collection.borrow().iter().cloned().collect();
        Ok(items)
    }
}

/// Creates and caches collection accessors keyed by (class name, navigation name)
#[derive(Debug, Clone, Default)]
pub struct ClrCollectionAccessorSource {
    accessors: Arc<DashMap<(String, String), Arc<dyn ClrCollectionAccessor>>>,
}

impl ClrCollectionAccessorSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accessor for a collection navigation
    ///
    /// Creating the accessor never instantiates a collection; a missing setter or an
    /// unconstructible type is reported by the first mutation instead.
    pub fn get_accessor(&self, model: &Model, navigation: NavigationId) -> MetadataResult<Arc<dyn ClrCollectionAccessor>> {
        let nav = model
            .get_navigation(navigation)
            .ok_or_else(|| MetadataError::not_found("Navigation", format!("#{}", navigation.index())))?;
        if let Some(accessor) = nav.collection_accessor() {
            return Ok(accessor.clone());
        }

        let entity_type = &model[nav.declaring_entity_type()];
        let class = entity_type.clr_class().ok_or_else(|| MetadataError::NoClrType {
            entity_type: entity_type.name().to_string(),
        })?;

        let key = (class.name().to_string(), nav.name().to_string());
        if let Some(accessor) = self.accessors.get(&key) {
            trace!("Collection accessor cache hit for '{}.{}'", key.0, key.1);
            return Ok(accessor.clone());
        }

        let not_supported = |clr_type: String, array: bool| {
            let (class, navigation) = (class.name().to_string(), nav.name().to_string());
            if array {
                MetadataError::ArrayNotSupported {
                    class,
                    navigation,
                    clr_type,
                }
            } else {
                MetadataError::BadType {
                    class,
                    navigation,
                    clr_type,
                }
            }
        };

        let chain = class.property_chain(nav.name());
        let declared = chain.first().ok_or_else(|| MetadataError::NoClrProperty {
            class: class.name().to_string(),
            property: nav.name().to_string(),
        })?;

        let declared_type = match &declared.ty {
            ClrType::Collection(collection) => collection.clone(),
            other => return Err(not_supported(other.to_string(), false)),
        };

        if let Some(target) = model[model.navigation_target(navigation)].clr_class() {
            if !target.is_or_derives_from(&declared_type.element) {
                return Err(not_supported(declared_type.to_string(), false));
            }
        }

        let getter = chain
            .iter()
            .find(|property| property.has_getter())
            .ok_or_else(|| MetadataError::NoGetter {
                class: class.name().to_string(),
                property: nav.name().to_string(),
            })?;

        match &declared_type.shape {
            CollectionShape::Array => return Err(not_supported(declared_type.to_string(), true)),
            CollectionShape::Enumerable => return Err(not_supported(declared_type.to_string(), false)),
            CollectionShape::Custom(custom) if !custom.is_mutable_collection => {
                return Err(not_supported(declared_type.to_string(), false))
            }
            _ => {}
        }

        trace!("Collection accessor cache miss for '{}.{}'", key.0, key.1);
        let accessor: Arc<dyn ClrCollectionAccessor> = Arc::new(ClrICollectionAccessor {
            class: class.name().to_string(),
            navigation: nav.name().to_string(),
            getter: (*getter).clone(),
            setter: class.find_setter(nav.name()).cloned(),
            materialized_type: select_collection_type(&declared_type),
            declared_type,
        });
        Ok(self.accessors.entry(key).or_insert(accessor).clone())
    }

    /// Number of cached accessors
    pub fn len(&self) -> usize {
        self.accessors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accessors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clr::{Accessibility, ClrClass, CustomCollection, ScalarType};
    use crate::model::{ConfigurationSource, EntityTypeId};

    struct Fixture {
        model: Model,
        customer_class: Arc<ClrClass>,
        order_class: Arc<ClrClass>,
        orders: NavigationId,
    }

    fn fixture(orders: ClrProperty) -> Fixture {
        let order_class = Arc::new(ClrClass::new("Order").with_auto_property("Id", ScalarType::I32.into()));
        let customer_class = Arc::new(
            ClrClass::new("Customer")
                .with_auto_property("Id", ScalarType::I32.into())
                .with_property(orders),
        );

        let mut model = Model::new();
        let customer = model.add_clr_entity_type(customer_class.clone()).unwrap();
        let order = model.add_clr_entity_type(order_class.clone()).unwrap();
        let id = model.add_clr_property(customer, "Id").unwrap();
        let key = model.set_primary_key(customer, &[id]).unwrap();
        let fk_property = model
            .add_property(order, "CustomerId", ScalarType::I32.into(), ConfigurationSource::Explicit)
            .unwrap();
        let fk = model
            .add_foreign_key(order, &[fk_property], key, customer, ConfigurationSource::Explicit)
            .unwrap();
        let orders = model.add_navigation(fk, "Orders", false).unwrap();

        Fixture {
            model,
            customer_class,
            order_class,
            orders,
        }
    }

    fn orders_property(shape: CollectionShape) -> ClrProperty {
        ClrProperty::new("Orders", ClrType::Collection(CollectionType::new(shape, "Order")))
    }

    fn auto_orders(class: ClrClass, shape: CollectionShape) -> ClrClass {
        class.with_auto_property("Orders", ClrType::Collection(CollectionType::new(shape, "Order")))
    }

    fn error_for(property: ClrProperty) -> MetadataError {
        let Fixture { model, orders, .. } = fixture(property);
        ClrCollectionAccessorSource::new()
            .get_accessor(&model, orders)
            .unwrap_err()
    }

    #[test]
    fn test_add_creates_collection_lazily() {
        let Fixture {
            model,
            customer_class,
            order_class,
            orders,
        } = fixture(
            orders_property(CollectionShape::Collection)
                .with_setter(Some(Accessibility::Private))
                .backed_by("_orders"),
        );
        let mut customer = ClrObject::new(customer_class);
        let order = ClrObject::new(order_class).into_ref();

        let accessor = ClrCollectionAccessorSource::new().get_accessor(&model, orders).unwrap();
        assert!(accessor.items(&customer).unwrap().is_empty());
        assert!(customer.field("_orders").unwrap().is_null());

        accessor.add(&mut customer, order.clone()).unwrap();
        accessor.add(&mut customer, order.clone()).unwrap();
        assert_eq!(accessor.items(&customer).unwrap().len(), 1);
        assert!(accessor.contains(&mut customer, &order).unwrap());

        let collection = customer.field("_orders").unwrap().as_collection().unwrap().clone();
        assert_eq!(collection.borrow().collection_type(), &CollectionType::hash_set("Order"));

        assert!(accessor.remove(&mut customer, &order).unwrap());
        assert!(!accessor.contains(&mut customer, &order).unwrap());
    }

    #[test]
    fn test_contains_on_absent_collection_instantiates_it() {
        let Fixture {
            model,
            customer_class,
            order_class,
            orders,
        } = fixture(orders_property(CollectionShape::List).with_setter(Some(Accessibility::Public)));
        let mut customer = ClrObject::new(customer_class);
        let order = ClrObject::new(order_class).into_ref();

        let accessor = ClrCollectionAccessorSource::new().get_accessor(&model, orders).unwrap();
        assert!(!accessor.contains(&mut customer, &order).unwrap());

        let collection = customer.get_property("Orders").unwrap();
        assert_eq!(
            collection.as_collection().unwrap().borrow().collection_type(),
            &CollectionType::vec("Order")
        );
    }

    #[test]
    fn test_existing_collection_is_used() {
        let Fixture {
            model,
            customer_class,
            order_class,
            orders,
        } = fixture(orders_property(CollectionShape::Collection));
        let mut customer = ClrObject::new(customer_class);
        let existing = ClrCollection::new(CollectionType::vec("Order")).into_ref();
        customer
            .set_field("<Orders>p__Storage", ClrValue::Collection(existing.clone()))
            .unwrap();

        let accessor = ClrCollectionAccessorSource::new().get_accessor(&model, orders).unwrap();
        accessor.add(&mut customer, ClrObject::new(order_class).into_ref()).unwrap();
        assert_eq!(existing.borrow().len(), 1);
    }

    #[test]
    fn test_read_only_navigation_fails_on_first_add() {
        let Fixture {
            model,
            customer_class,
            order_class,
            orders,
        } = fixture(orders_property(CollectionShape::Collection));
        let mut customer = ClrObject::new(customer_class);

        let accessor = ClrCollectionAccessorSource::new().get_accessor(&model, orders).unwrap();
        let err = accessor
            .add(&mut customer, ClrObject::new(order_class).into_ref())
            .unwrap_err();
        assert!(matches!(err, MetadataError::NoSetter { .. }));
        assert!(err.is_deferred());
    }

    #[test]
    fn test_unconstructible_type_fails_on_first_add() {
        let hidden = CustomCollection::new("OrderCollection").with_constructor(Some(Accessibility::Private));
        let Fixture {
            model,
            customer_class,
            order_class,
            orders,
        } = fixture(orders_property(CollectionShape::Custom(hidden)).with_setter(Some(Accessibility::Public)));
        let mut customer = ClrObject::new(customer_class);

        let accessor = ClrCollectionAccessorSource::new().get_accessor(&model, orders).unwrap();
        assert!(matches!(
            accessor.add(&mut customer, ClrObject::new(order_class).into_ref()),
            Err(MetadataError::CannotCreateType { .. })
        ));
    }

    #[test]
    fn test_unsupported_navigation_types() {
        assert!(matches!(
            error_for(orders_property(CollectionShape::Array)),
            MetadataError::ArrayNotSupported { .. }
        ));
        assert!(matches!(
            error_for(orders_property(CollectionShape::Enumerable)),
            MetadataError::BadType { .. }
        ));
        assert!(matches!(
            error_for(ClrProperty::new("Orders", ClrType::Entity("Order".into()))),
            MetadataError::BadType { .. }
        ));
        assert!(matches!(
            error_for(ClrProperty::new("Orders", ClrType::Collection(CollectionType::vec("Invoice")))),
            MetadataError::BadType { .. }
        ));
        assert!(matches!(
            error_for(orders_property(CollectionShape::Collection).with_getter(None)),
            MetadataError::NoGetter { .. }
        ));
        assert!(matches!(
            error_for(ClrProperty::new("Lines", ClrType::Collection(CollectionType::vec("Order")))),
            MetadataError::NoClrProperty { .. }
        ));
    }

    #[test]
    fn test_accessors_are_cached_per_navigation() {
        let Fixture { model, orders, .. } = fixture(orders_property(CollectionShape::Collection));
        let source = ClrCollectionAccessorSource::new();
        let first = source.get_accessor(&model, orders).unwrap();
        let second = source.get_accessor(&model, orders).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.navigation_name(), "Orders");
        assert_eq!(source.len(), 1);
    }

    #[test]
    fn test_shadow_entity_type_has_no_clr_type() {
        let mut model = Model::new();
        let blog = model.add_entity_type("Blog").unwrap();
        let post = model.add_entity_type("Post").unwrap();
        let posts = shadow_navigation(&mut model, blog, post);

        assert!(matches!(
            ClrCollectionAccessorSource::new().get_accessor(&model, posts),
            Err(MetadataError::NoClrType { .. })
        ));
    }

    #[test]
    fn test_auto_property_collection() {
        let mut model = Model::new();
        let blog_class = Arc::new(auto_orders(ClrClass::new("Blog"), CollectionShape::Set));
        let blog = model.add_clr_entity_type(blog_class.clone()).unwrap();
        let order = model.add_entity_type("Order").unwrap();
        let orders = shadow_navigation_named(&mut model, blog, order, "Orders");

        let accessor = ClrCollectionAccessorSource::new().get_accessor(&model, orders).unwrap();
        let mut instance = ClrObject::new(blog_class);
        let item = ClrObject::new(Arc::new(ClrClass::new("Order"))).into_ref();
        accessor.add(&mut instance, item).unwrap();
        assert_eq!(accessor.items(&instance).unwrap().len(), 1);
    }

    fn shadow_navigation(model: &mut Model, principal: EntityTypeId, dependent: EntityTypeId) -> NavigationId {
        shadow_navigation_named(model, principal, dependent, "Posts")
    }

    fn shadow_navigation_named(
        model: &mut Model,
        principal: EntityTypeId,
        dependent: EntityTypeId,
        name: &str,
    ) -> NavigationId {
        let id = model
            .add_property(principal, "Id", ScalarType::I32.into(), ConfigurationSource::Explicit)
            .unwrap();
        let key = model.set_primary_key(principal, &[id]).unwrap();
        let fk_property = model
            .add_property(dependent, "ParentId", ClrType::Nullable(ScalarType::I32), ConfigurationSource::Explicit)
            .unwrap();
        let fk = model
            .add_foreign_key(dependent, &[fk_property], key, principal, ConfigurationSource::Explicit)
            .unwrap();
        model.add_navigation(fk, name, false).unwrap()
    }
}
