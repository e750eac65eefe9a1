use serde_json::Value;

use crate::components::{
    AmbientLight, BoxCollider, Camera, Component, ComponentKind, DirectionalLight, Material,
    MeshRenderer, PointLight, RigidBody, Skybox, Spin, SpotLight, Tag, Transform,
};
use crate::entity::Entity;
use crate::error::EcsError;
use crate::inspect::Inspector;
use crate::kind::ComponentType;
use crate::persist::DecodeWarning;
use crate::store::DenseStore;

/// Expands `$body` once per kind with `$store` bound to that kind's store.
/// The match is exhaustive over [`ComponentType`], so a new kind without a
/// store fails to compile.
macro_rules! with_store {
    ($manager:expr, $kind:expr, |$store:ident| $body:expr) => {
        match $kind {
            ComponentType::Tag => { let $store = &$manager.tags; $body }
            ComponentType::Transform => { let $store = &$manager.transforms; $body }
            ComponentType::Camera => { let $store = &$manager.cameras; $body }
            ComponentType::MeshRenderer => { let $store = &$manager.mesh_renderers; $body }
            ComponentType::Material => { let $store = &$manager.materials; $body }
            ComponentType::DirectionalLight => { let $store = &$manager.directional_lights; $body }
            ComponentType::PointLight => { let $store = &$manager.point_lights; $body }
            ComponentType::SpotLight => { let $store = &$manager.spot_lights; $body }
            ComponentType::AmbientLight => { let $store = &$manager.ambient_lights; $body }
            ComponentType::Skybox => { let $store = &$manager.skyboxes; $body }
            ComponentType::RigidBody => { let $store = &$manager.rigid_bodies; $body }
            ComponentType::BoxCollider => { let $store = &$manager.box_colliders; $body }
            ComponentType::Spin => { let $store = &$manager.spins; $body }
        }
    };
}

macro_rules! with_store_mut {
    ($manager:expr, $kind:expr, |$store:ident| $body:expr) => {
        match $kind {
            ComponentType::Tag => { let $store = &mut $manager.tags; $body }
            ComponentType::Transform => { let $store = &mut $manager.transforms; $body }
            ComponentType::Camera => { let $store = &mut $manager.cameras; $body }
            ComponentType::MeshRenderer => { let $store = &mut $manager.mesh_renderers; $body }
            ComponentType::Material => { let $store = &mut $manager.materials; $body }
            ComponentType::DirectionalLight => { let $store = &mut $manager.directional_lights; $body }
            ComponentType::PointLight => { let $store = &mut $manager.point_lights; $body }
            ComponentType::SpotLight => { let $store = &mut $manager.spot_lights; $body }
            ComponentType::AmbientLight => { let $store = &mut $manager.ambient_lights; $body }
            ComponentType::Skybox => { let $store = &mut $manager.skyboxes; $body }
            ComponentType::RigidBody => { let $store = &mut $manager.rigid_bodies; $body }
            ComponentType::BoxCollider => { let $store = &mut $manager.box_colliders; $body }
            ComponentType::Spin => { let $store = &mut $manager.spins; $body }
        }
    };
}

/// Owns one [`DenseStore`] per component kind and routes kind-keyed calls to
/// the right one.
///
/// The manager only touches payloads. Mask bits and registry notifications are
/// the [`World`](crate::World)'s job, which is why the mutating entry points
/// are crate-private.
pub struct ComponentManager {
    pub(crate) tags: DenseStore<Tag>,
    pub(crate) transforms: DenseStore<Transform>,
    pub(crate) cameras: DenseStore<Camera>,
    pub(crate) mesh_renderers: DenseStore<MeshRenderer>,
    pub(crate) materials: DenseStore<Material>,
    pub(crate) directional_lights: DenseStore<DirectionalLight>,
    pub(crate) point_lights: DenseStore<PointLight>,
    pub(crate) spot_lights: DenseStore<SpotLight>,
    pub(crate) ambient_lights: DenseStore<AmbientLight>,
    pub(crate) skyboxes: DenseStore<Skybox>,
    pub(crate) rigid_bodies: DenseStore<RigidBody>,
    pub(crate) box_colliders: DenseStore<BoxCollider>,
    pub(crate) spins: DenseStore<Spin>,
    capacity: usize,
}

impl ComponentManager {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tags: DenseStore::with_capacity(capacity),
            transforms: DenseStore::with_capacity(capacity),
            cameras: DenseStore::with_capacity(capacity),
            mesh_renderers: DenseStore::with_capacity(capacity),
            materials: DenseStore::with_capacity(capacity),
            directional_lights: DenseStore::with_capacity(capacity),
            point_lights: DenseStore::with_capacity(capacity),
            spot_lights: DenseStore::with_capacity(capacity),
            ambient_lights: DenseStore::with_capacity(capacity),
            skyboxes: DenseStore::with_capacity(capacity),
            rigid_bodies: DenseStore::with_capacity(capacity),
            box_colliders: DenseStore::with_capacity(capacity),
            spins: DenseStore::with_capacity(capacity),
            capacity,
        }
    }

    /// Grow every store to `capacity` slots.
    pub(crate) fn resize(&mut self, capacity: usize) {
        if capacity <= self.capacity {
            return;
        }
        for kind in ComponentType::ALL {
            with_store_mut!(self, kind, |store| store.resize(capacity));
        }
        self.capacity = capacity;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Typed access to one kind's store.
    pub fn store<K: ComponentKind>(&self) -> &DenseStore<K> {
        K::store(self)
    }

    pub fn store_mut<K: ComponentKind>(&mut self) -> &mut DenseStore<K> {
        K::store_mut(self)
    }

    pub(crate) fn create(&mut self, kind: ComponentType, entity: Entity) -> Result<(), EcsError> {
        with_store_mut!(self, kind, |store| store.create(entity).map(|_| ()))
    }

    pub(crate) fn add(&mut self, entity: Entity, component: Component) -> Result<(), EcsError> {
        match component {
            Component::Tag(c) => self.tags.add(entity, c).map(|_| ()),
            Component::Transform(c) => self.transforms.add(entity, c).map(|_| ()),
            Component::Camera(c) => self.cameras.add(entity, c).map(|_| ()),
            Component::MeshRenderer(c) => self.mesh_renderers.add(entity, c).map(|_| ()),
            Component::Material(c) => self.materials.add(entity, c).map(|_| ()),
            Component::DirectionalLight(c) => self.directional_lights.add(entity, c).map(|_| ()),
            Component::PointLight(c) => self.point_lights.add(entity, c).map(|_| ()),
            Component::SpotLight(c) => self.spot_lights.add(entity, c).map(|_| ()),
            Component::AmbientLight(c) => self.ambient_lights.add(entity, c).map(|_| ()),
            Component::Skybox(c) => self.skyboxes.add(entity, c).map(|_| ()),
            Component::RigidBody(c) => self.rigid_bodies.add(entity, c).map(|_| ()),
            Component::BoxCollider(c) => self.box_colliders.add(entity, c).map(|_| ()),
            Component::Spin(c) => self.spins.add(entity, c).map(|_| ()),
        }
    }

    pub(crate) fn destroy(&mut self, kind: ComponentType, entity: Entity) -> bool {
        with_store_mut!(self, kind, |store| store.destroy(entity))
    }

    pub(crate) fn decode(
        &mut self,
        kind: ComponentType,
        fields: &Value,
        entity: Entity,
    ) -> Result<Vec<DecodeWarning>, EcsError> {
        with_store_mut!(self, kind, |store| store.decode(fields, entity))
    }

    pub fn contains(&self, kind: ComponentType, entity: Entity) -> bool {
        with_store!(self, kind, |store| store.contains(entity))
    }

    /// Snapshot of one component as a tagged value.
    pub fn component(&self, kind: ComponentType, entity: Entity) -> Option<Component> {
        with_store!(self, kind, |store| store
            .get(entity)
            .map(|c| c.clone().into_component()))
    }

    pub fn encode(&self, kind: ComponentType, entity: Entity) -> Option<Value> {
        with_store!(self, kind, |store| store.encode(entity))
    }

    /// Let an editor edit the fields of one component. Presence never changes.
    pub fn draw_inspector(
        &mut self,
        kind: ComponentType,
        entity: Entity,
        ui: &mut dyn Inspector,
    ) -> bool {
        with_store_mut!(self, kind, |store| store.draw_inspector(entity, ui))
    }

    /// Number of live components of `kind`.
    pub fn count(&self, kind: ComponentType) -> usize {
        with_store!(self, kind, |store| store.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_reaches_matching_store() {
        let mut manager = ComponentManager::with_capacity(4);
        let e = Entity::from_raw(3, 0);
        for kind in ComponentType::ALL {
            manager.create(kind, e).unwrap();
            assert!(manager.contains(kind, e));
            assert_eq!(manager.count(kind), 1);
            assert_eq!(manager.component(kind, e).map(|c| c.kind()), Some(kind));
        }
        assert_eq!(manager.store::<Camera>().get(e), Some(&Camera::default()));
    }

    #[test]
    fn add_routes_by_variant() {
        let mut manager = ComponentManager::with_capacity(2);
        let e = Entity::from_raw(1, 0);
        manager.add(e, Component::Tag(Tag::new("Player"))).unwrap();
        assert_eq!(manager.store::<Tag>().get(e).unwrap().name, "Player");
        assert!(!manager.contains(ComponentType::Camera, e));
    }

    #[test]
    fn resize_grows_every_store() {
        let mut manager = ComponentManager::with_capacity(1);
        manager.resize(8);
        for kind in ComponentType::ALL {
            assert!(manager.create(kind, Entity::from_raw(8, 0)).is_ok());
        }
        manager.resize(2);
        assert_eq!(manager.capacity(), 8);
    }
}
