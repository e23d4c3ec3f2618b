use replica_common::EntityId;
use std::collections::BTreeMap;

/// Ordered storage for one component type.
///
/// Keyed by `EntityId`, so iteration follows index order and is identical
/// across runs for the same sequence of operations.
#[derive(Debug, Clone)]
pub struct ComponentStorage<T> {
    items: BTreeMap<EntityId, T>,
}

impl<T> Default for ComponentStorage<T> {
    fn default() -> Self {
        Self {
            items: BTreeMap::new(),
        }
    }
}

impl<T> ComponentStorage<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach or replace. Returns the previous value.
    pub fn insert(&mut self, entity: EntityId, value: T) -> Option<T> {
        self.items.insert(entity, value)
    }

    pub fn remove(&mut self, entity: EntityId) -> Option<T> {
        self.items.remove(&entity)
    }

    pub fn get(&self, entity: EntityId) -> Option<&T> {
        self.items.get(&entity)
    }

    pub fn get_mut(&mut self, entity: EntityId) -> Option<&mut T> {
        self.items.get_mut(&entity)
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.items.contains_key(&entity)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &T)> {
        self.items.iter().map(|(id, value)| (*id, value))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (EntityId, &mut T)> {
        self.items.iter_mut().map(|(id, value)| (*id, value))
    }

    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.items.keys().copied()
    }
}
