//! Repositorio de reservas

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::models::{Booking, BookingStatus};
use crate::utils::errors::AppResult;

/// Campos ya resueltos para el INSERT de una reserva
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub booking_reference: String,
    pub customer_id: Uuid,
    pub quote_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
    pub route_id: Option<Uuid>,
    pub pickup_date: Option<NaiveDate>,
    pub delivery_date: Option<NaiveDate>,
    pub estimated_delivery: Option<NaiveDate>,
    pub total_amount: Decimal,
    pub currency: String,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
}

pub struct BookingRepository;

impl BookingRepository {
    pub async fn insert(conn: &mut PgConnection, booking: NewBooking) -> AppResult<Booking> {
        let row = sqlx::query_as::<_, Booking>(
            r#"
            INSERT INTO bookings (
                booking_reference, customer_id, quote_id, vehicle_id, route_id,
                status, pickup_date, delivery_date, estimated_delivery,
                total_amount, paid_amount, currency, notes, created_by
            )
            VALUES ($1, $2, $3, $4, $5, 'pending', $6, $7, $8, $9, 0, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(booking.booking_reference)
        .bind(booking.customer_id)
        .bind(booking.quote_id)
        .bind(booking.vehicle_id)
        .bind(booking.route_id)
        .bind(booking.pickup_date)
        .bind(booking.delivery_date)
        .bind(booking.estimated_delivery)
        .bind(booking.total_amount)
        .bind(booking.currency)
        .bind(booking.notes)
        .bind(booking.created_by)
        .fetch_one(&mut *conn)
        .await?;

        Ok(row)
    }

    pub async fn find_by_id(conn: &mut PgConnection, id: Uuid) -> AppResult<Option<Booking>> {
        let booking = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(booking)
    }

    /// Lectura con lock de fila: serializa operaciones concurrentes sobre la
    /// misma reserva dentro de la transacción del workflow
    pub async fn find_by_id_for_update(
        conn: &mut PgConnection,
        id: Uuid,
    ) -> AppResult<Option<Booking>> {
        let booking =
            sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?;

        Ok(booking)
    }

    pub async fn find_by_reference(
        conn: &mut PgConnection,
        reference: &str,
    ) -> AppResult<Option<Booking>> {
        let booking =
            sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE booking_reference = $1")
                .bind(reference)
                .fetch_optional(&mut *conn)
                .await?;

        Ok(booking)
    }

    pub async fn find_by_quote_id(
        conn: &mut PgConnection,
        quote_id: Uuid,
    ) -> AppResult<Option<Booking>> {
        let booking = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE quote_id = $1")
            .bind(quote_id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(booking)
    }

    pub async fn update_status(
        conn: &mut PgConnection,
        id: Uuid,
        status: BookingStatus,
        updated_by: Option<Uuid>,
    ) -> AppResult<Booking> {
        let booking = sqlx::query_as::<_, Booking>(
            r#"
            UPDATE bookings
            SET status = $2, updated_by = $3, updated_at = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(updated_by)
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await?;

        Ok(booking)
    }

    /// Suma (o resta, con delta negativo) al monto pagado. El CHECK de la
    /// tabla rechaza cualquier resultado fuera de 0 ≤ paid ≤ total.
    pub async fn add_to_paid_amount(
        conn: &mut PgConnection,
        id: Uuid,
        delta: Decimal,
    ) -> AppResult<Booking> {
        let booking = sqlx::query_as::<_, Booking>(
            r#"
            UPDATE bookings
            SET paid_amount = paid_amount + $2, updated_at = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(delta)
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await?;

        Ok(booking)
    }

    pub async fn update_fields(
        conn: &mut PgConnection,
        id: Uuid,
        pickup_date: Option<NaiveDate>,
        delivery_date: Option<NaiveDate>,
        estimated_delivery: Option<NaiveDate>,
        total_amount: Decimal,
        notes: Option<String>,
        updated_by: Option<Uuid>,
    ) -> AppResult<Booking> {
        let booking = sqlx::query_as::<_, Booking>(
            r#"
            UPDATE bookings
            SET pickup_date = $2, delivery_date = $3, estimated_delivery = $4,
                total_amount = $5, notes = $6, updated_by = $7, updated_at = $8
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(pickup_date)
        .bind(delivery_date)
        .bind(estimated_delivery)
        .bind(total_amount)
        .bind(notes)
        .bind(updated_by)
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await?;

        Ok(booking)
    }
}
