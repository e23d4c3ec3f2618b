use replica_common::EntityId;
use replica_kernel::ComponentKind;

use crate::config::ConfigError;

/// Errors from the engine's entity API.
///
/// The periodic jobs never fail; they skip entities they cannot process.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("entity {0} is not alive")]
    EntityNotFound(EntityId),
    #[error("entity {entity} has no {component:?} component")]
    MissingComponent {
        entity: EntityId,
        component: ComponentKind,
    },
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}
