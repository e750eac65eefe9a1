use crate::components::Component;
use crate::entity::Entity;
use crate::kind::ComponentType;

/// A structural change queued for the start of the next tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Spawn(Vec<Component>),
    Despawn(Entity),
    Insert(Entity, Component),
    Remove(Entity, ComponentType),
}

/// Queue of structural changes.
///
/// Systems record spawns and removals here while they iterate; the world
/// applies the queue in order before any system or pipeline runs, so no
/// membership list changes under a running system.
#[derive(Debug, Default)]
pub struct Commands {
    queue: Vec<Command>,
}

impl Commands {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self, components: impl IntoIterator<Item = Component>) {
        self.queue
            .push(Command::Spawn(components.into_iter().collect()));
    }

    pub fn despawn(&mut self, entity: Entity) {
        self.queue.push(Command::Despawn(entity));
    }

    pub fn insert(&mut self, entity: Entity, component: impl Into<Component>) {
        self.queue.push(Command::Insert(entity, component.into()));
    }

    pub fn remove(&mut self, entity: Entity, kind: ComponentType) {
        self.queue.push(Command::Remove(entity, kind));
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Take every queued command, oldest first.
    pub(crate) fn take(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.queue)
    }
}
