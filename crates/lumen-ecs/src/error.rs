use crate::entity::Entity;

/// Errors raised by structural ECS operations.
///
/// Everything except [`EcsError::MalformedScene`] indicates a caller bug: the
/// operation is refused and no state is touched.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EcsError {
    #[error("entity id 0 is reserved and never refers to a live entity")]
    InvalidEntity,

    #[error("entity {entity} is outside the store capacity of {capacity}")]
    OutOfRange { entity: Entity, capacity: usize },

    #[error("entity {0} is not alive")]
    StaleEntity(Entity),

    #[error("component kind {0} is not registered")]
    UnregisteredKind(u32),

    #[error("component kind '{0}' is not registered")]
    UnknownKindName(String),

    #[error("malformed scene: {0}")]
    MalformedScene(String),

    #[error("system '{name}' failed to initialize: {reason}")]
    SystemInit { name: String, reason: String },
}
