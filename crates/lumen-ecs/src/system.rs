use tracing::{debug, info};

use crate::entity::Entity;
use crate::error::EcsError;
use crate::kind::ComponentMask;
use crate::registry::SubscriberId;
use crate::world::World;

/// A logic system that runs once per tick over the entities matching its
/// signature.
///
/// An empty signature receives every live entity. A global system is not
/// subscribed at all: it gets no entities and reads what it needs straight
/// from the world.
pub trait System: Send {
    fn name(&self) -> &str;

    /// Component kinds an entity must carry to be passed to `update`.
    fn signature(&self) -> ComponentMask;

    fn is_global(&self) -> bool {
        false
    }

    /// Called once when the system is added to a schedule.
    fn init(&mut self, _world: &mut World) -> Result<(), EcsError> {
        Ok(())
    }

    fn update(&mut self, world: &mut World, entities: &[Entity], dt: f32);
}

/// Adapts a closure into a [`System`].
pub struct FnSystem<F> {
    name: String,
    signature: ComponentMask,
    global: bool,
    run: F,
}

impl<F> FnSystem<F>
where
    F: FnMut(&mut World, &[Entity], f32) + Send,
{
    pub fn new(name: impl Into<String>, signature: ComponentMask, run: F) -> Self {
        Self {
            name: name.into(),
            signature,
            global: false,
            run,
        }
    }

    /// A closure system that is not subscribed to any entities.
    pub fn global(name: impl Into<String>, run: F) -> Self {
        Self {
            global: true,
            ..Self::new(name, ComponentMask::EMPTY, run)
        }
    }
}

impl<F> System for FnSystem<F>
where
    F: FnMut(&mut World, &[Entity], f32) + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn signature(&self) -> ComponentMask {
        self.signature
    }

    fn is_global(&self) -> bool {
        self.global
    }

    fn update(&mut self, world: &mut World, entities: &[Entity], dt: f32) {
        (self.run)(world, entities, dt);
    }
}

struct Scheduled {
    system: Box<dyn System>,
    /// `None` for global systems
    subscriber: Option<SubscriberId>,
}

/// An ordered list of systems to run each frame.
#[derive(Default)]
pub struct SystemSchedule {
    systems: Vec<Scheduled>,
    /// Member snapshot handed to the running system, reused across updates.
    scratch: Vec<Entity>,
}

impl SystemSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize `system`, subscribe it with its signature unless it is
    /// global, and append it to the schedule.
    pub fn add_system<S: System + 'static>(
        &mut self,
        world: &mut World,
        mut system: S,
    ) -> Result<Option<SubscriberId>, EcsError> {
        system.init(world)?;
        let subscriber = if system.is_global() {
            info!("global system '{}' added", system.name());
            None
        } else {
            let id = world.subscribe(system.name(), system.signature());
            info!(
                "system '{}' added with {} initial entities",
                system.name(),
                world.members(id).len()
            );
            Some(id)
        };
        self.systems.push(Scheduled {
            system: Box::new(system),
            subscriber,
        });
        Ok(subscriber)
    }

    /// Remove the first system called `name` and drop its subscription.
    pub fn remove_system(&mut self, world: &mut World, name: &str) -> bool {
        let Some(index) = self.systems.iter().position(|s| s.system.name() == name) else {
            return false;
        };
        let scheduled = self.systems.remove(index);
        if let Some(subscriber) = scheduled.subscriber {
            world.unsubscribe(subscriber);
        }
        debug!("system '{name}' removed");
        true
    }

    /// Run all systems in insertion order.
    ///
    /// Each system sees its members as they were when it started; structural
    /// changes it makes directly show up for the systems after it.
    pub fn run_all(&mut self, world: &mut World, dt: f32) {
        let Self { systems, scratch } = self;
        for scheduled in systems.iter_mut() {
            scratch.clear();
            if let Some(subscriber) = scheduled.subscriber {
                scratch.extend_from_slice(world.members(subscriber));
            }
            scheduled.system.update(world, scratch, dt);
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.systems.iter().map(|s| s.system.name())
    }

    /// Number of systems in the schedule.
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Camera, Transform};
    use crate::kind::ComponentType;
    use std::sync::{Arc, Mutex};

    #[test]
    fn closure_system() {
        let mut world = World::new();
        world.insert_resource(0u32);
        let mut schedule = SystemSchedule::new();
        schedule
            .add_system(
                &mut world,
                FnSystem::new("count", ComponentMask::EMPTY, |w: &mut World, _: &[Entity], _| {
                    *w.resource_mut::<u32>().unwrap() += 1;
                }),
            )
            .unwrap();
        schedule.run_all(&mut world, 0.016);
        schedule.run_all(&mut world, 0.016);
        assert_eq!(world.resource::<u32>(), Some(&2));
    }

    #[test]
    fn schedule_ordering() {
        let mut world = World::new();
        let log = Arc::new(Mutex::new(Vec::<u32>::new()));

        let mut schedule = SystemSchedule::new();
        for n in 1..=3 {
            let log = log.clone();
            schedule
                .add_system(
                    &mut world,
                    FnSystem::new(format!("s{n}"), ComponentMask::EMPTY, move |_: &mut World, _: &[Entity], _| {
                        log.lock().unwrap().push(n)
                    }),
                )
                .unwrap();
        }

        schedule.run_all(&mut world, 0.0);
        assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(schedule.names().collect::<Vec<_>>(), vec!["s1", "s2", "s3"]);
    }

    #[test]
    fn update_receives_matching_entities() {
        let mut world = World::new();
        let cam = world
            .spawn([Transform::default().into(), Camera::default().into()])
            .unwrap();
        world.spawn([Transform::default().into()]).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let signature = ComponentMask::of(&[ComponentType::Transform, ComponentType::Camera]);
        let mut schedule = SystemSchedule::new();
        schedule
            .add_system(
                &mut world,
                FnSystem::new("cameras", signature, move |_: &mut World, entities: &[Entity], _| {
                    sink.lock().unwrap().extend_from_slice(entities)
                }),
            )
            .unwrap();
        schedule.run_all(&mut world, 0.0);
        assert_eq!(*seen.lock().unwrap(), vec![cam]);
    }

    #[test]
    fn empty_signature_sees_every_entity_and_global_sees_none() {
        let mut world = World::new();
        let a = world.spawn([Transform::default().into()]).unwrap();
        let b = world.create_entity();

        let all = Arc::new(Mutex::new(Vec::new()));
        let global = Arc::new(Mutex::new(Vec::new()));
        let (all_sink, global_sink) = (all.clone(), global.clone());
        let mut schedule = SystemSchedule::new();
        let subscriber = schedule
            .add_system(
                &mut world,
                FnSystem::new("all", ComponentMask::EMPTY, move |_: &mut World, entities: &[Entity], _| {
                    *all_sink.lock().unwrap() = entities.to_vec()
                }),
            )
            .unwrap();
        assert!(subscriber.is_some());
        let subscriber = schedule
            .add_system(
                &mut world,
                FnSystem::global("stats", move |_: &mut World, entities: &[Entity], _| {
                    *global_sink.lock().unwrap() = entities.to_vec()
                }),
            )
            .unwrap();
        assert!(subscriber.is_none());
        assert_eq!(world.signatures().len(), 1);

        schedule.run_all(&mut world, 0.0);
        assert_eq!(*all.lock().unwrap(), vec![a, b]);
        assert!(global.lock().unwrap().is_empty());

        world.destroy_entity(a).unwrap();
        schedule.run_all(&mut world, 0.0);
        assert_eq!(*all.lock().unwrap(), vec![b]);
        assert!(schedule.remove_system(&mut world, "stats"));
    }

    struct FailingInit;

    impl System for FailingInit {
        fn name(&self) -> &str {
            "failing"
        }

        fn signature(&self) -> ComponentMask {
            ComponentMask::EMPTY
        }

        fn init(&mut self, _world: &mut World) -> Result<(), EcsError> {
            Err(EcsError::SystemInit {
                name: self.name().to_string(),
                reason: "no device".to_string(),
            })
        }

        fn update(&mut self, _world: &mut World, _entities: &[Entity], _dt: f32) {}
    }

    #[test]
    fn failed_init_is_not_scheduled() {
        let mut world = World::new();
        let mut schedule = SystemSchedule::new();
        assert!(schedule.add_system(&mut world, FailingInit).is_err());
        assert!(schedule.is_empty());
        assert!(world.signatures().is_empty());
    }

    #[test]
    fn remove_system_unsubscribes() {
        let mut world = World::new();
        let mut schedule = SystemSchedule::new();
        schedule
            .add_system(
                &mut world,
                FnSystem::new("noop", ComponentMask::EMPTY, |_: &mut World, _: &[Entity], _| {}),
            )
            .unwrap();
        assert!(schedule.remove_system(&mut world, "noop"));
        assert!(!schedule.remove_system(&mut world, "noop"));
        assert!(world.signatures().is_empty());
    }
}
