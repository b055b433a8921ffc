//! Generación concurrente de números de referencia
//!
//! Toma un candado `FOR UPDATE` sobre la última referencia del periodo para
//! serializar a los escritores concurrentes dentro de la misma transacción
//! del workflow. Si los reintentos acotados se agotan, emite una referencia
//! degradada derivada del reloj en lugar de abortar la operación.

use chrono::{DateTime, Utc};
use rand::Rng;
use sqlx::{PgConnection, Row};
use tracing::warn;

use crate::models::reference::{
    fallback_reference, format_reference, parse_sequence, period_prefix, EntityKind,
};
use crate::utils::errors::{AppError, AppResult};

const MAX_ATTEMPTS: u32 = 20;

pub struct ReferenceService;

impl ReferenceService {
    /// Siguiente referencia libre para la entidad, dentro de la transacción
    /// del llamador. El candado se libera junto con esa transacción.
    pub async fn next_reference(
        conn: &mut PgConnection,
        kind: EntityKind,
        now: DateTime<Utc>,
    ) -> AppResult<String> {
        // El candado de fila no cubre el primer número de un periodo (aún no
        // hay fila que bloquear); el advisory lock transaccional sobre el
        // prefijo del periodo serializa también a esos escritores.
        Self::lock_period(conn, kind, now).await?;
        let last = Self::lock_last_reference(conn, kind, now).await?;

        // Un sufijo no numérico (referencia de fallback, ancho distinto)
        // reinicia la lectura en cero en vez de envenenar la secuencia.
        let base = last
            .as_deref()
            .and_then(|reference| parse_sequence(kind, reference))
            .unwrap_or(0);

        for attempt in 0..MAX_ATTEMPTS {
            let candidate = format_reference(kind, now, base + 1 + attempt);
            if !Self::reference_exists(conn, kind, &candidate).await? {
                return Ok(candidate);
            }
        }

        warn!(
            prefix = kind.prefix(),
            attempts = MAX_ATTEMPTS,
            "reference sequence exhausted, falling back to clock-derived reference"
        );

        let jitter: u32 = rand::thread_rng().gen_range(0..1000);
        let fallback = fallback_reference(kind, now, jitter);
        if Self::reference_exists(conn, kind, &fallback).await? {
            return Err(AppError::ReferenceExhausted {
                prefix: kind.prefix(),
                attempts: MAX_ATTEMPTS,
            });
        }

        Ok(fallback)
    }

    async fn lock_period(
        conn: &mut PgConnection,
        kind: EntityKind,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(period_prefix(kind, now))
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn lock_last_reference(
        conn: &mut PgConnection,
        kind: EntityKind,
        now: DateTime<Utc>,
    ) -> AppResult<Option<String>> {
        // Tabla y columna salen del enum, nunca de entrada externa.
        let query = format!(
            "SELECT {col} FROM {table} WHERE {col} LIKE $1 ORDER BY {col} DESC LIMIT 1 FOR UPDATE",
            col = kind.reference_column(),
            table = kind.table(),
        );
        let pattern = format!("{}%", period_prefix(kind, now));

        let row = sqlx::query(&query)
            .bind(pattern)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(row.map(|r| r.get::<String, _>(0)))
    }

    async fn reference_exists(
        conn: &mut PgConnection,
        kind: EntityKind,
        reference: &str,
    ) -> AppResult<bool> {
        let query = format!(
            "SELECT 1 FROM {table} WHERE {col} = $1",
            table = kind.table(),
            col = kind.reference_column(),
        );

        let row = sqlx::query(&query)
            .bind(reference)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(row.is_some())
    }
}
