//! Repositorio del registro de actividad
//!
//! Tabla de solo inserción: no hay UPDATE ni DELETE aquí a propósito,
//! el historial es inmutable.

use sqlx::types::Json;
use sqlx::{PgConnection, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::models::{ActivityLog, ActivityLogFilter};
use crate::utils::errors::AppResult;

#[derive(Debug, Clone)]
pub struct NewActivityLog {
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub subject_type: String,
    pub subject_id: Uuid,
    pub changes: serde_json::Value,
}

pub struct ActivityLogRepository;

impl ActivityLogRepository {
    pub async fn record(conn: &mut PgConnection, entry: NewActivityLog) -> AppResult<ActivityLog> {
        let row = sqlx::query_as::<_, ActivityLog>(
            r#"
            INSERT INTO activity_logs (actor_id, action, subject_type, subject_id, changes)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(entry.actor_id)
        .bind(entry.action)
        .bind(entry.subject_type)
        .bind(entry.subject_id)
        .bind(Json(entry.changes))
        .fetch_one(&mut *conn)
        .await?;

        Ok(row)
    }

    pub async fn find_for_subject(
        conn: &mut PgConnection,
        subject_type: &str,
        subject_id: Uuid,
    ) -> AppResult<Vec<ActivityLog>> {
        let rows = sqlx::query_as::<_, ActivityLog>(
            r#"
            SELECT * FROM activity_logs
            WHERE subject_type = $1 AND subject_id = $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(subject_type)
        .bind(subject_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows)
    }

    pub async fn find_filtered(
        conn: &mut PgConnection,
        filter: &ActivityLogFilter,
    ) -> AppResult<Vec<ActivityLog>> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT * FROM activity_logs WHERE 1=1");

        if let Some(actor_id) = filter.actor_id {
            builder.push(" AND actor_id = ").push_bind(actor_id);
        }
        if let Some(action) = &filter.action {
            builder.push(" AND action = ").push_bind(action.clone());
        }
        if let Some(subject_type) = &filter.subject_type {
            builder
                .push(" AND subject_type = ")
                .push_bind(subject_type.clone());
        }
        if let Some(subject_id) = filter.subject_id {
            builder.push(" AND subject_id = ").push_bind(subject_id);
        }
        if let Some(from) = filter.from {
            builder.push(" AND created_at >= ").push_bind(from);
        }
        if let Some(until) = filter.until {
            builder.push(" AND created_at <= ").push_bind(until);
        }

        builder.push(" ORDER BY created_at DESC");

        if let Some(limit) = filter.limit {
            builder.push(" LIMIT ").push_bind(limit);
        }

        let rows = builder
            .build_query_as::<ActivityLog>()
            .fetch_all(&mut *conn)
            .await?;

        Ok(rows)
    }
}
