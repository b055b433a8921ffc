//! Identidad del actor
//!
//! Toda operación orquestada recibe el actor de forma explícita en lugar de
//! leer un global implícito: es requisito para una atribución de auditoría
//! correcta y para tests deterministas.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Quién ejecuta la operación: un usuario concreto o el propio sistema
/// (jobs de barrido, cascadas automáticas).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Actor {
    User(Uuid),
    System,
}

impl Actor {
    /// Id para la columna `actor_id` del registro de auditoría (NULL = sistema)
    pub fn id(&self) -> Option<Uuid> {
        match self {
            Actor::User(id) => Some(*id),
            Actor::System => None,
        }
    }

    pub fn is_system(&self) -> bool {
        matches!(self, Actor::System)
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Actor::User(id) => write!(f, "user:{}", id),
            Actor::System => write!(f, "system"),
        }
    }
}
