use tracing::debug;

use crate::entity::Entity;
use crate::kind::ComponentMask;

/// Ordered list of entities registered with one system or pipeline.
///
/// Unregistering is a linear scan by value. That is fine for the entity counts
/// a scene carries; tracking each entity's position per list would make it
/// O(1) if it ever shows up in a profile.
#[derive(Debug, Clone, Default)]
pub struct EntityList {
    entities: Vec<Entity>,
}

impl EntityList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `entity`. Returns `false` if it was already registered.
    pub fn register(&mut self, entity: Entity) -> bool {
        if self.entities.contains(&entity) {
            return false;
        }
        self.entities.push(entity);
        true
    }

    /// Remove `entity`, keeping the order of the rest.
    pub fn unregister(&mut self, entity: Entity) -> bool {
        match self.entities.iter().position(|e| *e == entity) {
            Some(index) => {
                self.entities.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.entities.contains(&entity)
    }

    pub fn as_slice(&self) -> &[Entity] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Handle to one subscription in a [`SignatureRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u32);

struct Subscription {
    label: String,
    signature: ComponentMask,
    entities: EntityList,
}

/// Keeps, for every subscriber, the exact set of entities whose mask is a
/// superset of the subscriber's signature.
///
/// Updates are edge-triggered: each mask change is compared against every
/// signature once, so the cost is O(subscribers) per change rather than a
/// rescan of all entities.
#[derive(Default)]
pub struct SignatureRegistry {
    subscriptions: Vec<Option<Subscription>>,
}

impl SignatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an entity with `mask` belongs to a subscriber with `signature`.
    /// An empty signature matches every live entity.
    pub fn matches(signature: ComponentMask, mask: ComponentMask) -> bool {
        mask.contains_all(signature)
    }

    /// Add a subscriber and seed it with the currently matching entities.
    pub fn subscribe(
        &mut self,
        label: impl Into<String>,
        signature: ComponentMask,
        existing: impl IntoIterator<Item = (Entity, ComponentMask)>,
    ) -> SubscriberId {
        let mut entities = EntityList::new();
        for (entity, mask) in existing {
            if Self::matches(signature, mask) {
                entities.register(entity);
            }
        }
        let label = label.into();
        debug!(
            "subscribed '{}' with signature {:?} ({} initial entities)",
            label,
            signature,
            entities.len()
        );

        let subscription = Subscription {
            label,
            signature,
            entities,
        };
        let index = match self.subscriptions.iter().position(Option::is_none) {
            Some(free) => {
                self.subscriptions[free] = Some(subscription);
                free
            }
            None => {
                self.subscriptions.push(Some(subscription));
                self.subscriptions.len() - 1
            }
        };
        SubscriberId(index as u32)
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        self.subscriptions
            .get_mut(id.0 as usize)
            .and_then(Option::take)
            .is_some()
    }

    /// Propagate one mask change for `entity`.
    pub fn on_mask_changed(&mut self, entity: Entity, old: ComponentMask, new: ComponentMask) {
        if old == new {
            return;
        }
        for subscription in self.subscriptions.iter_mut().flatten() {
            let was = Self::matches(subscription.signature, old);
            let now = Self::matches(subscription.signature, new);
            match (was, now) {
                (false, true) => {
                    subscription.entities.register(entity);
                }
                (true, false) => {
                    subscription.entities.unregister(entity);
                }
                _ => {}
            }
        }
    }

    /// A new entity has an empty mask, which only empty signatures match.
    pub fn on_entity_created(&mut self, entity: Entity) {
        for subscription in self.subscriptions.iter_mut().flatten() {
            if subscription.signature.is_empty() {
                subscription.entities.register(entity);
            }
        }
    }

    /// Drop `entity` from every subscriber.
    pub fn on_entity_destroyed(&mut self, entity: Entity) {
        for subscription in self.subscriptions.iter_mut().flatten() {
            subscription.entities.unregister(entity);
        }
    }

    /// Registered entities of a subscriber, in registration order.
    pub fn members(&self, id: SubscriberId) -> &[Entity] {
        self.subscription(id)
            .map(|s| s.entities.as_slice())
            .unwrap_or(&[])
    }

    pub fn signature(&self, id: SubscriberId) -> Option<ComponentMask> {
        self.subscription(id).map(|s| s.signature)
    }

    pub fn label(&self, id: SubscriberId) -> Option<&str> {
        self.subscription(id).map(|s| s.label.as_str())
    }

    /// Number of active subscribers.
    pub fn len(&self) -> usize {
        self.subscriptions.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn subscription(&self, id: SubscriberId) -> Option<&Subscription> {
        self.subscriptions.get(id.0 as usize)?.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::ComponentType;

    const CAMERA_SIG: ComponentMask =
        ComponentMask::of(&[ComponentType::Transform, ComponentType::Camera]);

    fn entity(id: u32) -> Entity {
        Entity::from_raw(id, 0)
    }

    #[test]
    fn list_keeps_order_and_rejects_duplicates() {
        let mut list = EntityList::new();
        assert!(list.register(entity(1)));
        assert!(list.register(entity(2)));
        assert!(list.register(entity(3)));
        assert!(!list.register(entity(2)));
        assert!(list.unregister(entity(2)));
        assert!(!list.unregister(entity(2)));
        assert_eq!(list.as_slice(), &[entity(1), entity(3)]);
    }

    #[test]
    fn register_on_rising_edge_only() {
        let mut registry = SignatureRegistry::new();
        let id = registry.subscribe("camera", CAMERA_SIG, std::iter::empty());

        let transform = ComponentMask::of(&[ComponentType::Transform]);
        registry.on_mask_changed(entity(1), ComponentMask::EMPTY, transform);
        assert!(registry.members(id).is_empty());

        registry.on_mask_changed(entity(1), transform, CAMERA_SIG);
        assert_eq!(registry.members(id), &[entity(1)]);

        // Extra kinds keep the entity registered exactly once.
        let extra = CAMERA_SIG.with(ComponentType::Tag);
        registry.on_mask_changed(entity(1), CAMERA_SIG, extra);
        assert_eq!(registry.members(id), &[entity(1)]);
    }

    #[test]
    fn unregister_on_falling_edge() {
        let mut registry = SignatureRegistry::new();
        let id = registry.subscribe("camera", CAMERA_SIG, [(entity(1), CAMERA_SIG)]);
        assert_eq!(registry.members(id), &[entity(1)]);

        registry.on_mask_changed(
            entity(1),
            CAMERA_SIG,
            CAMERA_SIG.without(ComponentType::Camera),
        );
        assert!(registry.members(id).is_empty());
    }

    #[test]
    fn empty_signature_follows_entity_lifetime() {
        let mut registry = SignatureRegistry::new();
        let all = registry.subscribe("all", ComponentMask::EMPTY, [(entity(1), CAMERA_SIG)]);
        let cameras = registry.subscribe("camera", CAMERA_SIG, std::iter::empty());
        assert_eq!(registry.members(all), &[entity(1)]);

        registry.on_entity_created(entity(2));
        assert_eq!(registry.members(all), &[entity(1), entity(2)]);
        assert!(registry.members(cameras).is_empty());

        // Component changes never move an entity in or out of an empty signature.
        registry.on_mask_changed(entity(2), ComponentMask::EMPTY, CAMERA_SIG);
        registry.on_mask_changed(entity(2), CAMERA_SIG, ComponentMask::EMPTY);
        assert_eq!(registry.members(all), &[entity(1), entity(2)]);

        registry.on_mask_changed(entity(1), CAMERA_SIG, ComponentMask::EMPTY);
        registry.on_entity_destroyed(entity(1));
        assert_eq!(registry.members(all), &[entity(2)]);
    }

    #[test]
    fn unsubscribe_frees_slot_for_reuse() {
        let mut registry = SignatureRegistry::new();
        let a = registry.subscribe("a", CAMERA_SIG, std::iter::empty());
        let _b = registry.subscribe("b", CAMERA_SIG, std::iter::empty());
        assert!(registry.unsubscribe(a));
        assert!(!registry.unsubscribe(a));
        assert_eq!(registry.len(), 1);
        assert!(registry.members(a).is_empty());

        let c = registry.subscribe("c", CAMERA_SIG, std::iter::empty());
        assert_eq!(c, a);
        assert_eq!(registry.label(c), Some("c"));
    }
}
