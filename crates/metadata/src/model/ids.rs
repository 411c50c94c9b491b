//! Handles into the model arena

use serde::Serialize;

macro_rules! metadata_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        pub struct $name(pub(crate) usize);

        impl $name {
            /// Position of the element in the model's storage
            pub fn index(self) -> usize {
                self.0
            }
        }
    };
}

metadata_id!(
    /// Handle to an [`EntityType`](super::EntityType)
    EntityTypeId
);
metadata_id!(
    /// Handle to a [`Property`](super::Property)
    PropertyId
);
metadata_id!(
    /// Handle to a [`Key`](super::Key)
    KeyId
);
metadata_id!(
    /// Handle to a [`ForeignKey`](super::ForeignKey)
    ForeignKeyId
);
metadata_id!(
    /// Handle to a [`Navigation`](super::Navigation)
    NavigationId
);

/// Append-only slot storage; removed elements leave an empty slot so stale ids never alias
#[derive(Debug, Clone)]
pub(crate) struct Arena<T> {
    slots: Vec<Option<T>>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<T> Arena<T> {
    pub(crate) fn insert(&mut self, value: T) -> usize {
        self.slots.push(Some(value));
        self.slots.len() - 1
    }

    pub(crate) fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index).and_then(Option::as_mut)
    }

    pub(crate) fn remove(&mut self, index: usize) -> Option<T> {
        self.slots.get_mut(index).and_then(Option::take)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|value| (index, value)))
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removed_slots_are_not_reused() {
        let mut arena = Arena::default();
        let first = arena.insert("a");
        assert_eq!(arena.remove(first), Some("a"));
        let second = arena.insert("b");

        assert_ne!(first, second);
        assert_eq!(arena.get(first), None);
        assert_eq!(arena.get(second), Some(&"b"));
        assert_eq!(arena.len(), 1);
    }
}
