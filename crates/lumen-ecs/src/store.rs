use serde_json::Value;

use crate::components::ComponentKind;
use crate::entity::Entity;
use crate::error::EcsError;
use crate::inspect::Inspector;
use crate::persist::{self, DecodeWarning};

/// Dense storage for one component kind, indexed by `entity.id - 1`.
///
/// A `None` slot is a tombstone. The store never compacts or shrinks, so a
/// component stays at the same slot for as long as it lives. The store does
/// not know about generations or masks; the [`World`](crate::World) validates
/// the entity and keeps the mask in step before calling in.
pub struct DenseStore<T> {
    slots: Vec<Option<T>>,
    len: usize,
}

impl<T: ComponentKind> DenseStore<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::new();
        slots.resize_with(capacity, || None);
        Self { slots, len: 0 }
    }

    fn slot(&self, entity: Entity) -> Result<usize, EcsError> {
        let slot = entity.slot().ok_or(EcsError::InvalidEntity)?;
        if slot >= self.slots.len() {
            return Err(EcsError::OutOfRange {
                entity,
                capacity: self.slots.len(),
            });
        }
        Ok(slot)
    }

    /// Construct a default-valued component at the entity's slot.
    pub fn create(&mut self, entity: Entity) -> Result<&mut T, EcsError> {
        self.add(entity, T::default())
    }

    /// Write a caller-supplied value into the entity's slot, replacing any
    /// previous value.
    pub fn add(&mut self, entity: Entity, value: T) -> Result<&mut T, EcsError> {
        let slot = self.slot(entity)?;
        let cell = &mut self.slots[slot];
        if cell.is_none() {
            self.len += 1;
        }
        Ok(cell.insert(value))
    }

    pub fn get(&self, entity: Entity) -> Option<&T> {
        debug_assert!(entity.is_valid(), "store lookup with entity 0");
        self.slots.get(entity.slot()?)?.as_ref()
    }

    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        debug_assert!(entity.is_valid(), "store lookup with entity 0");
        self.slots.get_mut(entity.slot()?)?.as_mut()
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.get(entity).is_some()
    }

    /// Tombstone the entity's slot. Returns `false` if there was nothing to
    /// destroy, so a second call is a no-op.
    pub fn destroy(&mut self, entity: Entity) -> bool {
        let Some(cell) = entity.slot().and_then(|slot| self.slots.get_mut(slot)) else {
            return false;
        };
        if cell.take().is_some() {
            self.len -= 1;
            true
        } else {
            false
        }
    }

    /// Grow to at least `capacity` slots. Never shrinks.
    pub fn resize(&mut self, capacity: usize) {
        if capacity > self.slots.len() {
            self.slots.resize_with(capacity, || None);
        }
    }

    /// Occupied slots as `(slot index, component)`.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, cell)| cell.as_ref().map(|c| (slot, c)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(slot, cell)| cell.as_mut().map(|c| (slot, c)))
    }

    /// Number of live components.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Field object for the entity's component, `None` if absent.
    pub fn encode(&self, entity: Entity) -> Option<Value> {
        self.get(entity).map(persist::encode)
    }

    /// Decode `fields` into the entity's slot. Bad fields fall back to their
    /// defaults and come back as warnings tagged with this store's kind.
    pub fn decode(
        &mut self,
        fields: &Value,
        entity: Entity,
    ) -> Result<Vec<DecodeWarning>, EcsError> {
        let (value, warnings) = persist::decode_lenient::<T>(fields);
        self.add(entity, value)?;
        Ok(warnings
            .into_iter()
            .map(|w| w.with_kind(T::KIND))
            .collect())
    }

    /// Present the entity's component to an editor. Returns `true` if any field
    /// changed; `false` also when the entity has no such component.
    pub fn draw_inspector(&mut self, entity: Entity, ui: &mut dyn Inspector) -> bool {
        self.get_mut(entity)
            .map(|component| component.inspect(ui))
            .unwrap_or(false)
    }
}
