use std::any::Any;

use serde_json::Value;
use tracing::{debug, warn};

use crate::commands::{Command, Commands};
use crate::components::{Component, ComponentKind};
use crate::entity::{Entity, EntityRegistry};
use crate::error::EcsError;
use crate::inspect::Inspector;
use crate::kind::{ComponentMask, ComponentType};
use crate::manager::ComponentManager;
use crate::persist::DecodeWarning;
use crate::registry::{SignatureRegistry, SubscriberId};
use crate::resource::Resources;

/// The central ECS container. Owns all entities, components, and resources.
///
/// Every structural change goes through here so the three views of an entity
/// stay in agreement: the mask bit in the [`EntityRegistry`], the slot in the
/// kind's store, and membership in every subscriber list of the
/// [`SignatureRegistry`].
pub struct World {
    entities: EntityRegistry,
    components: ComponentManager,
    signatures: SignatureRegistry,
    resources: Resources,
    commands: Commands,
}

impl World {
    pub fn new() -> Self {
        Self::with_capacity(EntityRegistry::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let entities = EntityRegistry::with_capacity(capacity);
        let components = ComponentManager::with_capacity(entities.capacity());
        Self {
            entities,
            components,
            signatures: SignatureRegistry::new(),
            resources: Resources::new(),
            commands: Commands::new(),
        }
    }

    // ---- Entity management ----

    /// Allocate an entity with no components.
    pub fn create_entity(&mut self) -> Entity {
        let entity = self.entities.create_entity();
        if self.entities.capacity() > self.components.capacity() {
            debug!(
                "growing component stores to {} slots",
                self.entities.capacity()
            );
            self.components.resize(self.entities.capacity());
        }
        self.signatures.on_entity_created(entity);
        entity
    }

    /// Allocate an entity and attach `components` to it.
    pub fn spawn(
        &mut self,
        components: impl IntoIterator<Item = Component>,
    ) -> Result<Entity, EcsError> {
        self.spawn_with(|world, entity| {
            for component in components {
                world.add_component(entity, component)?;
            }
            Ok(())
        })
    }

    /// Allocate an entity and let `build` attach its components. If `build`
    /// fails the entity is destroyed again, so no half-built entity stays
    /// alive.
    pub fn spawn_with(
        &mut self,
        build: impl FnOnce(&mut World, Entity) -> Result<(), EcsError>,
    ) -> Result<Entity, EcsError> {
        let entity = self.create_entity();
        if let Err(e) = build(self, entity) {
            if self.is_alive(entity) {
                if let Err(cleanup) = self.destroy_entity(entity) {
                    warn!("failed to destroy half-built {entity}: {cleanup}");
                }
            }
            return Err(e);
        }
        Ok(entity)
    }

    /// Destroy every component of `entity`, unregister it from every
    /// subscriber and release its id for reuse.
    pub fn destroy_entity(&mut self, entity: Entity) -> Result<(), EcsError> {
        let mask = self.entities.entity_mask(entity)?;
        for kind in mask.iter() {
            self.components.destroy(kind, entity);
        }
        let old = self.entities.clear_mask(entity)?;
        self.signatures
            .on_mask_changed(entity, old, ComponentMask::EMPTY);
        self.signatures.on_entity_destroyed(entity);
        self.entities.free(entity)?;
        debug!("destroyed entity {entity} ({} components)", mask.len());
        Ok(())
    }

    /// Destroy every live entity. Subscriptions and resources are kept.
    pub fn clear(&mut self) {
        let live: Vec<Entity> = self.entities().collect();
        for entity in live {
            if let Err(e) = self.destroy_entity(entity) {
                warn!("failed to destroy {entity} while clearing world: {e}");
            }
        }
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    /// Number of alive entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Live entities in id order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities.iter().map(|(entity, _)| entity)
    }

    // ---- Component management ----

    /// Attach a default-valued component of `kind`.
    pub fn create_component(&mut self, entity: Entity, kind: ComponentType) -> Result<(), EcsError> {
        self.entities.validate(entity)?;
        self.components.create(kind, entity)?;
        self.mark_added(entity, kind)
    }

    /// Attach an externally built component, replacing any previous value of
    /// the same kind.
    pub fn add_component(&mut self, entity: Entity, component: Component) -> Result<(), EcsError> {
        self.entities.validate(entity)?;
        let kind = component.kind();
        self.components.add(entity, component)?;
        self.mark_added(entity, kind)
    }

    /// Remove the component of `kind`. Returns `Ok(false)` if there was none,
    /// so destroying twice is harmless.
    pub fn destroy_component(
        &mut self,
        entity: Entity,
        kind: ComponentType,
    ) -> Result<bool, EcsError> {
        self.entities.validate(entity)?;
        let removed = self.components.destroy(kind, entity);
        let old = self.entities.destroy_component(entity, kind)?;
        self.signatures
            .on_mask_changed(entity, old, old.without(kind));
        Ok(removed)
    }

    fn mark_added(&mut self, entity: Entity, kind: ComponentType) -> Result<(), EcsError> {
        let old = self.entities.add_component(entity, kind)?;
        self.signatures.on_mask_changed(entity, old, old.with(kind));
        Ok(())
    }

    /// Attach a default `K` and return it for initialization.
    pub fn create<K: ComponentKind>(&mut self, entity: Entity) -> Result<&mut K, EcsError> {
        self.create_component(entity, K::KIND)?;
        K::store_mut(&mut self.components)
            .get_mut(entity)
            .ok_or(EcsError::StaleEntity(entity))
    }

    /// Typed [`add_component`](Self::add_component).
    pub fn insert<K: ComponentKind>(&mut self, entity: Entity, value: K) -> Result<&mut K, EcsError> {
        self.add_component(entity, value.into_component())?;
        K::store_mut(&mut self.components)
            .get_mut(entity)
            .ok_or(EcsError::StaleEntity(entity))
    }

    /// Typed [`destroy_component`](Self::destroy_component).
    pub fn remove<K: ComponentKind>(&mut self, entity: Entity) -> Result<bool, EcsError> {
        self.destroy_component(entity, K::KIND)
    }

    pub fn get<K: ComponentKind>(&self, entity: Entity) -> Option<&K> {
        if !self.entities.has_component(entity, K::KIND) {
            return None;
        }
        K::store(&self.components).get(entity)
    }

    pub fn get_mut<K: ComponentKind>(&mut self, entity: Entity) -> Option<&mut K> {
        if !self.entities.has_component(entity, K::KIND) {
            return None;
        }
        K::store_mut(&mut self.components).get_mut(entity)
    }

    pub fn has_component(&self, entity: Entity, kind: ComponentType) -> bool {
        self.entities.has_component(entity, kind)
    }

    pub fn has<K: ComponentKind>(&self, entity: Entity) -> bool {
        self.has_component(entity, K::KIND)
    }

    pub fn entity_mask(&self, entity: Entity) -> Result<ComponentMask, EcsError> {
        self.entities.entity_mask(entity)
    }

    /// Every live `K` with its owning entity, in id order.
    pub fn iter<K: ComponentKind>(&self) -> impl Iterator<Item = (Entity, &K)> + '_ {
        let entities = &self.entities;
        K::store(&self.components)
            .iter()
            .filter_map(move |(slot, c)| entities.entity_at(slot).map(|e| (e, c)))
    }

    pub fn iter_mut<K: ComponentKind>(&mut self) -> impl Iterator<Item = (Entity, &mut K)> + '_ {
        let entities = &self.entities;
        K::store_mut(&mut self.components)
            .iter_mut()
            .filter_map(move |(slot, c)| entities.entity_at(slot).map(|e| (e, c)))
    }

    pub fn components(&self) -> &ComponentManager {
        &self.components
    }

    /// Snapshot of one component as a tagged value.
    pub fn component(&self, entity: Entity, kind: ComponentType) -> Option<Component> {
        if !self.has_component(entity, kind) {
            return None;
        }
        self.components.component(kind, entity)
    }

    // ---- Subscriptions ----

    /// Register a subscriber and seed it with every entity that already
    /// matches `signature`.
    pub fn subscribe(&mut self, label: impl Into<String>, signature: ComponentMask) -> SubscriberId {
        self.signatures
            .subscribe(label, signature, self.entities.iter())
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        self.signatures.unsubscribe(id)
    }

    /// Entities registered with a subscriber, in registration order.
    pub fn members(&self, id: SubscriberId) -> &[Entity] {
        self.signatures.members(id)
    }

    pub fn signatures(&self) -> &SignatureRegistry {
        &self.signatures
    }

    // ---- Resources ----

    /// Insert a singleton resource, returning the one it replaced.
    pub fn insert_resource<T: Any + Send>(&mut self, value: T) -> Option<T> {
        self.resources.insert(value)
    }

    pub fn resource<T: Any + Send>(&self) -> Option<&T> {
        self.resources.get::<T>()
    }

    pub fn resource_mut<T: Any + Send>(&mut self) -> Option<&mut T> {
        self.resources.get_mut::<T>()
    }

    pub fn remove_resource<T: Any + Send>(&mut self) -> Option<T> {
        self.resources.remove::<T>()
    }

    pub fn resources_mut(&mut self) -> &mut Resources {
        &mut self.resources
    }

    // ---- Deferred commands ----

    /// Queue for structural changes requested while systems iterate.
    pub fn commands(&mut self) -> &mut Commands {
        &mut self.commands
    }

    /// Apply every queued command in order. A command whose target is no
    /// longer alive is skipped with a warning. Returns how many were applied.
    pub fn apply_commands(&mut self) -> usize {
        let queued = self.commands.take();
        let total = queued.len();
        let mut applied = 0;
        for command in queued {
            let result = match command {
                Command::Spawn(components) => self.spawn(components).map(|_| ()),
                Command::Despawn(entity) => self.destroy_entity(entity),
                Command::Insert(entity, component) => self.add_component(entity, component),
                Command::Remove(entity, kind) => self.destroy_component(entity, kind).map(|_| ()),
            };
            match result {
                Ok(()) => applied += 1,
                Err(e) => warn!("skipping queued command: {e}"),
            }
        }
        if total > 0 {
            debug!("applied {applied}/{total} queued commands");
        }
        applied
    }

    // ---- Persistence and editing ----

    /// Field object of one component, `None` if the entity lacks it.
    pub fn encode_component(&self, entity: Entity, kind: ComponentType) -> Option<Value> {
        if !self.has_component(entity, kind) {
            return None;
        }
        self.components.encode(kind, entity)
    }

    /// Decode `fields` into a component of `kind` and attach it. Malformed
    /// fields keep their defaults and come back as warnings.
    pub fn decode_component(
        &mut self,
        entity: Entity,
        kind: ComponentType,
        fields: &Value,
    ) -> Result<Vec<DecodeWarning>, EcsError> {
        self.entities.validate(entity)?;
        let warnings = self.components.decode(kind, fields, entity)?;
        self.mark_added(entity, kind)?;
        Ok(warnings)
    }

    /// Let an editor modify the fields of one component. Returns `true` if
    /// anything changed.
    pub fn draw_inspector(
        &mut self,
        entity: Entity,
        kind: ComponentType,
        ui: &mut dyn Inspector,
    ) -> bool {
        if !self.has_component(entity, kind) {
            return false;
        }
        self.components.draw_inspector(kind, entity, ui)
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}
