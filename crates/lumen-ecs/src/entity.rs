use std::fmt;

use crate::error::EcsError;
use crate::kind::{ComponentMask, ComponentType};

/// A generational entity handle.
///
/// Ids are 1-based; id 0 is reserved as "no entity". The generation is bumped
/// every time a slot is recycled so stale handles are rejected.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity {
    id: u32,
    generation: u32,
}

impl Entity {
    /// The reserved invalid entity.
    pub const INVALID: Entity = Entity {
        id: 0,
        generation: 0,
    };

    /// Create an entity from raw parts (mainly for testing).
    pub const fn from_raw(id: u32, generation: u32) -> Self {
        Self { id, generation }
    }

    pub const fn id(&self) -> u32 {
        self.id
    }

    pub const fn generation(&self) -> u32 {
        self.generation
    }

    pub const fn is_valid(&self) -> bool {
        self.id != 0
    }

    /// Slot index into dense stores (`id - 1`), `None` for the invalid entity.
    pub const fn slot(&self) -> Option<usize> {
        match self.id {
            0 => None,
            id => Some(id as usize - 1),
        }
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}v{})", self.id, self.generation)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.id, self.generation)
    }
}

/// Allocates entity ids and owns each entity's component signature.
///
/// The registry only tracks *presence*; component payloads live in the
/// per-kind stores of the [`ComponentManager`](crate::ComponentManager).
pub struct EntityRegistry {
    masks: Vec<ComponentMask>,
    generations: Vec<u32>,
    alive: Vec<bool>,
    free_list: Vec<u32>,
    /// Highest id ever handed out.
    high_water: u32,
    len: usize,
}

impl EntityRegistry {
    pub const DEFAULT_CAPACITY: usize = 64;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let mut registry = Self {
            masks: Vec::new(),
            generations: Vec::new(),
            alive: Vec::new(),
            free_list: Vec::new(),
            high_water: 0,
            len: 0,
        };
        registry.resize(capacity.max(1));
        registry
    }

    /// Allocate an entity, reusing a freed slot if one is available.
    ///
    /// Grows the backing arrays (doubling) when the next id would exceed the
    /// current capacity; callers must resize their dependent stores to
    /// [`capacity`](Self::capacity) afterwards.
    pub fn create_entity(&mut self) -> Entity {
        self.len += 1;
        if let Some(id) = self.free_list.pop() {
            let slot = id as usize - 1;
            self.alive[slot] = true;
            return Entity {
                id,
                generation: self.generations[slot],
            };
        }

        let id = self
            .high_water
            .checked_add(1)
            .expect("entity id space exhausted");
        let slot = id as usize - 1;
        if slot >= self.capacity() {
            self.resize(self.capacity() * 2);
        }
        self.high_water = id;
        self.alive[slot] = true;
        Entity {
            id,
            generation: self.generations[slot],
        }
    }

    /// Release an entity's slot. Its mask must already be cleared by the caller
    /// (the world destroys components before freeing).
    pub fn free(&mut self, entity: Entity) -> Result<(), EcsError> {
        let slot = self.validate(entity)?;
        debug_assert!(
            self.masks[slot].is_empty(),
            "freeing {entity} with live components {:?}",
            self.masks[slot]
        );
        self.masks[slot] = ComponentMask::EMPTY;
        self.alive[slot] = false;
        self.generations[slot] = self.generations[slot].wrapping_add(1);
        self.free_list.push(entity.id);
        self.len -= 1;
        Ok(())
    }

    /// Set the bit for `kind`. Returns the mask as it was before.
    pub fn add_component(
        &mut self,
        entity: Entity,
        kind: ComponentType,
    ) -> Result<ComponentMask, EcsError> {
        let slot = self.validate(entity)?;
        let old = self.masks[slot];
        self.masks[slot] = old.with(kind);
        Ok(old)
    }

    /// Clear the bit for `kind`. Returns the mask as it was before.
    pub fn destroy_component(
        &mut self,
        entity: Entity,
        kind: ComponentType,
    ) -> Result<ComponentMask, EcsError> {
        let slot = self.validate(entity)?;
        let old = self.masks[slot];
        self.masks[slot] = old.without(kind);
        Ok(old)
    }

    /// Clear every bit. Returns the mask as it was before.
    pub fn clear_mask(&mut self, entity: Entity) -> Result<ComponentMask, EcsError> {
        let slot = self.validate(entity)?;
        Ok(std::mem::take(&mut self.masks[slot]))
    }

    /// O(1) presence test. Dead or invalid entities have no components.
    pub fn has_component(&self, entity: Entity, kind: ComponentType) -> bool {
        self.entity_mask(entity)
            .map(|mask| mask.contains(kind))
            .unwrap_or(false)
    }

    pub fn entity_mask(&self, entity: Entity) -> Result<ComponentMask, EcsError> {
        let slot = self.validate(entity)?;
        Ok(self.masks[slot])
    }

    /// Grow the backing arrays to `new_size` slots. Never shrinks.
    pub fn resize(&mut self, new_size: usize) {
        if new_size <= self.masks.len() {
            return;
        }
        self.masks.resize(new_size, ComponentMask::EMPTY);
        self.generations.resize(new_size, 0);
        self.alive.resize(new_size, false);
    }

    /// Check that `entity` refers to a live slot with a matching generation.
    /// Returns its slot index.
    pub fn validate(&self, entity: Entity) -> Result<usize, EcsError> {
        let slot = entity.slot().ok_or(EcsError::InvalidEntity)?;
        if slot >= self.alive.len() {
            return Err(EcsError::OutOfRange {
                entity,
                capacity: self.alive.len(),
            });
        }
        if !self.alive[slot] || self.generations[slot] != entity.generation {
            return Err(EcsError::StaleEntity(entity));
        }
        Ok(slot)
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.validate(entity).is_ok()
    }

    /// The live handle currently occupying `slot`, if any.
    pub fn entity_at(&self, slot: usize) -> Option<Entity> {
        (*self.alive.get(slot)?).then(|| Entity {
            id: slot as u32 + 1,
            generation: self.generations[slot],
        })
    }

    /// Live entities with their masks, in id order.
    pub fn iter(&self) -> impl Iterator<Item = (Entity, ComponentMask)> + '_ {
        (0..self.high_water as usize).filter_map(move |slot| {
            self.entity_at(slot).map(|entity| (entity, self.masks[slot]))
        })
    }

    pub fn capacity(&self) -> usize {
        self.masks.len()
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_one_based() {
        let mut registry = EntityRegistry::new();
        let e1 = registry.create_entity();
        let e2 = registry.create_entity();
        assert_eq!(e1.id(), 1);
        assert_eq!(e2.id(), 2);
        assert_eq!(e1.slot(), Some(0));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn entity_zero_is_rejected() {
        let registry = EntityRegistry::new();
        assert_eq!(
            registry.validate(Entity::INVALID),
            Err(EcsError::InvalidEntity)
        );
        assert!(!registry.has_component(Entity::INVALID, ComponentType::Tag));
    }

    #[test]
    fn out_of_range_is_reported() {
        let registry = EntityRegistry::with_capacity(4);
        let far = Entity::from_raw(100, 0);
        assert!(matches!(
            registry.validate(far),
            Err(EcsError::OutOfRange { capacity: 4, .. })
        ));
    }

    #[test]
    fn capacity_doubles_and_never_shrinks() {
        let mut registry = EntityRegistry::with_capacity(2);
        for _ in 0..3 {
            registry.create_entity();
        }
        assert_eq!(registry.capacity(), 4);
        registry.resize(1);
        assert_eq!(registry.capacity(), 4);
    }

    #[test]
    fn freed_slot_is_reused_with_new_generation() {
        let mut registry = EntityRegistry::new();
        let e = registry.create_entity();
        registry.free(e).unwrap();
        assert_eq!(registry.validate(e), Err(EcsError::StaleEntity(e)));

        let reused = registry.create_entity();
        assert_eq!(reused.id(), e.id());
        assert_eq!(reused.generation(), e.generation() + 1);
        assert!(!registry.has_component(e, ComponentType::Tag));
    }

    #[test]
    fn mask_bits_toggle() {
        let mut registry = EntityRegistry::new();
        let e = registry.create_entity();
        let old = registry.add_component(e, ComponentType::Camera).unwrap();
        assert!(old.is_empty());
        assert!(registry.has_component(e, ComponentType::Camera));

        let old = registry.destroy_component(e, ComponentType::Camera).unwrap();
        assert!(old.contains(ComponentType::Camera));
        assert!(registry.entity_mask(e).unwrap().is_empty());

        // Clearing an absent bit leaves the mask untouched.
        registry.destroy_component(e, ComponentType::Camera).unwrap();
        assert!(registry.entity_mask(e).unwrap().is_empty());
    }

    #[test]
    fn iter_skips_freed() {
        let mut registry = EntityRegistry::new();
        let a = registry.create_entity();
        let b = registry.create_entity();
        registry.free(a).unwrap();
        let live: Vec<_> = registry.iter().map(|(e, _)| e).collect();
        assert_eq!(live, vec![b]);
    }
}
