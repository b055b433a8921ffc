//! Repositorio de cotizaciones

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::models::{Quote, QuoteFee, QuoteStatus, VehicleDetails};
use crate::utils::errors::AppResult;

/// Campos ya resueltos para el INSERT de una cotización
#[derive(Debug, Clone)]
pub struct NewQuote {
    pub quote_reference: String,
    pub customer_id: Uuid,
    pub route_id: Option<Uuid>,
    pub vehicle_details: VehicleDetails,
    pub base_price: Decimal,
    pub additional_fees: Vec<QuoteFee>,
    pub total_amount: Decimal,
    pub currency: String,
    pub valid_until: NaiveDate,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
}

pub struct QuoteRepository;

impl QuoteRepository {
    pub async fn insert(conn: &mut PgConnection, quote: NewQuote) -> AppResult<Quote> {
        let row = sqlx::query_as::<_, Quote>(
            r#"
            INSERT INTO quotes (
                quote_reference, customer_id, route_id, vehicle_details,
                base_price, additional_fees, total_amount, currency,
                status, valid_until, notes, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(quote.quote_reference)
        .bind(quote.customer_id)
        .bind(quote.route_id)
        .bind(Json(quote.vehicle_details))
        .bind(quote.base_price)
        .bind(Json(quote.additional_fees))
        .bind(quote.total_amount)
        .bind(quote.currency)
        .bind(quote.valid_until)
        .bind(quote.notes)
        .bind(quote.created_by)
        .fetch_one(&mut *conn)
        .await?;

        Ok(row)
    }

    pub async fn find_by_id(conn: &mut PgConnection, id: Uuid) -> AppResult<Option<Quote>> {
        let quote = sqlx::query_as::<_, Quote>("SELECT * FROM quotes WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(quote)
    }

    /// Lock de fila para la conversión: la guarda de un solo uso depende de
    /// que dos conversiones concurrentes no lean ambas `approved`
    pub async fn find_by_id_for_update(
        conn: &mut PgConnection,
        id: Uuid,
    ) -> AppResult<Option<Quote>> {
        let quote = sqlx::query_as::<_, Quote>("SELECT * FROM quotes WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(quote)
    }

    pub async fn update_status(
        conn: &mut PgConnection,
        id: Uuid,
        status: QuoteStatus,
    ) -> AppResult<Quote> {
        let quote = sqlx::query_as::<_, Quote>(
            "UPDATE quotes SET status = $2, updated_at = $3 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status)
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await?;

        Ok(quote)
    }

    pub async fn mark_approved(
        conn: &mut PgConnection,
        id: Uuid,
        approved_by: Option<Uuid>,
        approved_at: DateTime<Utc>,
        notes: Option<String>,
    ) -> AppResult<Quote> {
        let quote = sqlx::query_as::<_, Quote>(
            r#"
            UPDATE quotes
            SET status = 'approved', approved_by = $2, approved_at = $3,
                notes = COALESCE($4, notes), updated_at = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(approved_by)
        .bind(approved_at)
        .bind(notes)
        .fetch_one(&mut *conn)
        .await?;

        Ok(quote)
    }

    pub async fn update_validity(
        conn: &mut PgConnection,
        id: Uuid,
        valid_until: NaiveDate,
        status: QuoteStatus,
    ) -> AppResult<Quote> {
        let quote = sqlx::query_as::<_, Quote>(
            r#"
            UPDATE quotes
            SET valid_until = $2, status = $3, updated_at = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(valid_until)
        .bind(status)
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await?;

        Ok(quote)
    }

    /// Cotizaciones vencidas que siguen en un estado expirable
    pub async fn find_due_for_expiry(
        conn: &mut PgConnection,
        today: NaiveDate,
    ) -> AppResult<Vec<Quote>> {
        let quotes = sqlx::query_as::<_, Quote>(
            r#"
            SELECT * FROM quotes
            WHERE valid_until < $1 AND status IN ('pending', 'approved')
            ORDER BY valid_until
            FOR UPDATE
            "#,
        )
        .bind(today)
        .fetch_all(&mut *conn)
        .await?;

        Ok(quotes)
    }
}
