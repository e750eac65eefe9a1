//! Lumen ECS - Entity Component System
//!
//! Entities are 1-based generational ids. Every component kind lives in a dense,
//! manager-owned store indexed by `id - 1`, and each entity carries a
//! [`ComponentMask`] recording which kinds it has. Systems and render pipelines
//! subscribe with a required signature and the [`SignatureRegistry`] keeps their
//! entity lists in step with every mask change.

mod commands;
pub mod components;
mod entity;
mod error;
pub mod inspect;
mod kind;
mod manager;
pub mod persist;
mod registry;
mod resource;
pub mod scene;
mod store;
mod system;
pub mod systems;
mod world;

pub use commands::{Command, Commands};
pub use components::{Component, ComponentKind};
pub use entity::{Entity, EntityRegistry};
pub use error::EcsError;
pub use inspect::{Inspect, Inspector};
pub use kind::{ComponentMask, ComponentType};
pub use manager::ComponentManager;
pub use persist::DecodeWarning;
pub use registry::{EntityList, SignatureRegistry, SubscriberId};
pub use resource::Resources;
pub use store::DenseStore;
pub use system::{FnSystem, System, SystemSchedule};
pub use world::World;
