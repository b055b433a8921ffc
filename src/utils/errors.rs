//! Sistema de manejo de errores
//!
//! Este módulo define todos los tipos de errores del núcleo de orquestación.
//! Todo error producido dentro de la transacción de un workflow provoca
//! rollback completo; los fallos de colaboradores best-effort (notificaciones)
//! se registran con `tracing` y nunca se propagan como error de operación.

use thiserror::Error;

/// Errores principales de la aplicación
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid {entity} status transition from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// El generador de referencias agotó sus reintentos acotados.
    /// Señal interna: el generador la captura y usa la referencia de fallback.
    #[error("Reference generation exhausted {attempts} attempts for prefix {prefix}")]
    ReferenceExhausted { prefix: &'static str, attempts: u32 },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Resultado tipado para operaciones que pueden fallar
pub type AppResult<T> = Result<T, AppError>;

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

/// Función helper para crear errores de validación
pub fn validation_error(message: impl Into<String>) -> AppError {
    AppError::Validation(message.into())
}

/// Función helper para crear errores de recurso no encontrado
pub fn not_found_error(resource: &str, id: impl std::fmt::Display) -> AppError {
    AppError::NotFound(format!("{} with id '{}' not found", resource, id))
}

/// Función helper para crear errores de conflicto
pub fn conflict_error(message: impl Into<String>) -> AppError {
    AppError::Conflict(message.into())
}
