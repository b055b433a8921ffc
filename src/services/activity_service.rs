//! Auditoría de operaciones
//!
//! Cada mutación de negocio deja una entrada inmutable dentro de su misma
//! transacción: si el workflow aborta, la entrada desaparece con él.

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::models::{ActivityLog, ActivityLogFilter, Actor};
use crate::repositories::activity_log_repository::{ActivityLogRepository, NewActivityLog};
use crate::utils::errors::AppResult;

/// Registrar una acción dentro de la transacción en curso
pub(crate) async fn record(
    conn: &mut PgConnection,
    actor: &Actor,
    action: &str,
    subject_type: &'static str,
    subject_id: Uuid,
    changes: serde_json::Value,
) -> AppResult<ActivityLog> {
    ActivityLogRepository::record(
        conn,
        NewActivityLog {
            actor_id: actor.id(),
            action: action.to_string(),
            subject_type: subject_type.to_string(),
            subject_id,
            changes,
        },
    )
    .await
}

/// Consultas de solo lectura sobre el historial
pub struct ActivityService {
    pool: PgPool,
}

impl ActivityService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Historial completo de una entidad, en orden cronológico
    pub async fn history_for(
        &self,
        subject_type: &str,
        subject_id: Uuid,
    ) -> AppResult<Vec<ActivityLog>> {
        let mut conn = self.pool.acquire().await?;
        ActivityLogRepository::find_for_subject(&mut conn, subject_type, subject_id).await
    }

    pub async fn search(&self, filter: &ActivityLogFilter) -> AppResult<Vec<ActivityLog>> {
        let mut conn = self.pool.acquire().await?;
        ActivityLogRepository::find_filtered(&mut conn, filter).await
    }
}
