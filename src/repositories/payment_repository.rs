//! Repositorio de pagos

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::models::{Payment, PaymentMethod, PaymentStatus};
use crate::utils::errors::AppResult;

/// Campos ya resueltos para el INSERT de un pago
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub payment_reference: String,
    pub booking_id: Uuid,
    pub customer_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub transaction_id: Option<String>,
    pub status: PaymentStatus,
    pub payment_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub metadata: serde_json::Value,
}

pub struct PaymentRepository;

impl PaymentRepository {
    pub async fn insert(conn: &mut PgConnection, payment: NewPayment) -> AppResult<Payment> {
        let row = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (
                payment_reference, booking_id, customer_id, amount, currency,
                payment_method, transaction_id, status, payment_date, notes, metadata
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(payment.payment_reference)
        .bind(payment.booking_id)
        .bind(payment.customer_id)
        .bind(payment.amount)
        .bind(payment.currency)
        .bind(payment.payment_method)
        .bind(payment.transaction_id)
        .bind(payment.status)
        .bind(payment.payment_date)
        .bind(payment.notes)
        .bind(Json(payment.metadata))
        .fetch_one(&mut *conn)
        .await?;

        Ok(row)
    }

    pub async fn find_by_id(conn: &mut PgConnection, id: Uuid) -> AppResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(payment)
    }

    /// Lock de fila: reembolso y re-completado concurrentes del mismo pago
    /// se serializan aquí
    pub async fn find_by_id_for_update(
        conn: &mut PgConnection,
        id: Uuid,
    ) -> AppResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(payment)
    }

    pub async fn find_by_booking(
        conn: &mut PgConnection,
        booking_id: Uuid,
    ) -> AppResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE booking_id = $1 ORDER BY created_at",
        )
        .bind(booking_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(payments)
    }

    /// Los campos opcionales se fusionan con COALESCE: `None` conserva el
    /// valor persistido, nunca lo vacía.
    pub async fn update_status(
        conn: &mut PgConnection,
        id: Uuid,
        status: PaymentStatus,
        payment_date: Option<DateTime<Utc>>,
        transaction_id: Option<String>,
        notes: Option<String>,
    ) -> AppResult<Payment> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET status = $2,
                payment_date = COALESCE($3, payment_date),
                transaction_id = COALESCE($4, transaction_id),
                notes = COALESCE($5, notes),
                updated_at = $6
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(payment_date)
        .bind(transaction_id)
        .bind(notes)
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await?;

        Ok(payment)
    }

    pub async fn merge_metadata(
        conn: &mut PgConnection,
        id: Uuid,
        metadata: serde_json::Value,
    ) -> AppResult<Payment> {
        let payment = sqlx::query_as::<_, Payment>(
            "UPDATE payments SET metadata = metadata || $2, updated_at = $3 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(Json(metadata))
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await?;

        Ok(payment)
    }
}
