//! Choosing the concrete collection to instantiate for a navigation

use crate::clr::CollectionType;

/// Pick the type to create when a navigation's collection is first needed
///
/// A concrete, publicly constructible collection is used as declared. Otherwise `HashSet<E>` is
/// preferred when it can be assigned to the declared type, then `List<E>`. `None` means nothing
/// can be created; the failure is reported only when a collection is actually required.
pub fn select_collection_type(declared: &CollectionType) -> Option<CollectionType> {
    if declared.shape.has_public_default_constructor() {
        return Some(declared.clone());
    }

    let hash_set = CollectionType::hash_set(declared.element.clone());
    if declared.is_assignable_from(&hash_set) {
        return Some(hash_set);
    }

    let list = CollectionType::vec(declared.element.clone());
    if declared.is_assignable_from(&list) {
        return Some(list);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clr::{Accessibility, CollectionShape, CustomCollection};

    fn declared(shape: CollectionShape) -> CollectionType {
        CollectionType::new(shape, "Order")
    }

    fn custom(constructor: Option<Accessibility>) -> CustomCollection {
        CustomCollection::new("OrderCollection")
            .with_constructor(constructor)
            .with_mutable_collection(true)
    }

    #[test]
    fn test_constructible_types_are_used_as_is() {
        for shape in [
            CollectionShape::HashSet,
            CollectionShape::Vec,
            CollectionShape::Custom(custom(Some(Accessibility::Public))),
        ] {
            let declared = declared(shape);
            assert_eq!(select_collection_type(&declared), Some(declared.clone()));
        }
    }

    #[test]
    fn test_interfaces_get_a_concrete_type() {
        assert_eq!(
            select_collection_type(&declared(CollectionShape::Collection)),
            Some(CollectionType::hash_set("Order"))
        );
        assert_eq!(
            select_collection_type(&declared(CollectionShape::Set)),
            Some(CollectionType::hash_set("Order"))
        );
        assert_eq!(
            select_collection_type(&declared(CollectionShape::List)),
            Some(CollectionType::vec("Order"))
        );
        assert_eq!(
            select_collection_type(&declared(CollectionShape::Enumerable)),
            Some(CollectionType::hash_set("Order"))
        );
    }

    #[test]
    fn test_unconstructible_types_have_no_selection() {
        for constructor in [
            Some(Accessibility::Private),
            Some(Accessibility::Internal),
            Some(Accessibility::Protected),
            None,
        ] {
            assert_eq!(
                select_collection_type(&declared(CollectionShape::Custom(custom(constructor)))),
                None
            );
        }

        let abstract_collection = custom(Some(Accessibility::Public)).with_abstract(true);
        assert_eq!(
            select_collection_type(&declared(CollectionShape::Custom(abstract_collection))),
            None
        );

        let not_a_collection = CustomCollection::new("OrderLookup").with_mutable_collection(false);
        assert_eq!(
            select_collection_type(&declared(CollectionShape::Custom(not_a_collection))),
            None
        );
        assert_eq!(select_collection_type(&declared(CollectionShape::Array)), None);
    }
}
