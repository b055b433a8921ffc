//! Modelo de ActivityLog (registro de auditoría)
//!
//! Cada acción mutante del orquestador escribe exactamente una entrada.
//! Las filas son inmutables: no existe API de actualización ni de borrado.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// Entrada de auditoría - mapea exactamente a la tabla activity_logs
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ActivityLog {
    pub id: Uuid,
    /// NULL cuando la acción la ejecutó el sistema
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub subject_type: String,
    pub subject_id: Uuid,
    pub changes: Json<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Filtros de la superficie de consulta de solo lectura
#[derive(Debug, Clone, Default)]
pub struct ActivityLogFilter {
    pub actor_id: Option<Uuid>,
    pub action: Option<String>,
    pub subject_type: Option<String>,
    pub subject_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}
