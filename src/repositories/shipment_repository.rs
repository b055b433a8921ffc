//! Repositorio de embarques

use chrono::{NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::models::{Shipment, ShipmentStatus, TrackingUpdate};
use crate::utils::errors::AppResult;

/// Campos ya resueltos para el INSERT de un embarque
#[derive(Debug, Clone)]
pub struct NewShipment {
    pub tracking_number: String,
    pub booking_id: Uuid,
    pub carrier_name: Option<String>,
    pub vessel_name: Option<String>,
    pub container_number: Option<String>,
    pub departure_port: Option<String>,
    pub arrival_port: Option<String>,
    pub departure_date: Option<NaiveDate>,
    pub estimated_arrival: Option<NaiveDate>,
}

pub struct ShipmentRepository;

impl ShipmentRepository {
    pub async fn insert(conn: &mut PgConnection, shipment: NewShipment) -> AppResult<Shipment> {
        let row = sqlx::query_as::<_, Shipment>(
            r#"
            INSERT INTO shipments (
                tracking_number, booking_id, status, carrier_name, vessel_name,
                container_number, departure_port, arrival_port,
                departure_date, estimated_arrival, tracking_updates
            )
            VALUES ($1, $2, 'preparing', $3, $4, $5, $6, $7, $8, $9, '[]'::jsonb)
            RETURNING *
            "#,
        )
        .bind(shipment.tracking_number)
        .bind(shipment.booking_id)
        .bind(shipment.carrier_name)
        .bind(shipment.vessel_name)
        .bind(shipment.container_number)
        .bind(shipment.departure_port)
        .bind(shipment.arrival_port)
        .bind(shipment.departure_date)
        .bind(shipment.estimated_arrival)
        .fetch_one(&mut *conn)
        .await?;

        Ok(row)
    }

    pub async fn find_by_id(conn: &mut PgConnection, id: Uuid) -> AppResult<Option<Shipment>> {
        let shipment = sqlx::query_as::<_, Shipment>("SELECT * FROM shipments WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(shipment)
    }

    pub async fn find_by_id_for_update(
        conn: &mut PgConnection,
        id: Uuid,
    ) -> AppResult<Option<Shipment>> {
        let shipment =
            sqlx::query_as::<_, Shipment>("SELECT * FROM shipments WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?;

        Ok(shipment)
    }

    pub async fn find_by_booking_id(
        conn: &mut PgConnection,
        booking_id: Uuid,
    ) -> AppResult<Option<Shipment>> {
        let shipment = sqlx::query_as::<_, Shipment>("SELECT * FROM shipments WHERE booking_id = $1")
            .bind(booking_id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(shipment)
    }

    pub async fn find_by_tracking_number(
        conn: &mut PgConnection,
        tracking_number: &str,
    ) -> AppResult<Option<Shipment>> {
        let shipment =
            sqlx::query_as::<_, Shipment>("SELECT * FROM shipments WHERE tracking_number = $1")
                .bind(tracking_number)
                .fetch_optional(&mut *conn)
                .await?;

        Ok(shipment)
    }

    /// Actualiza estado, ubicación y lista de seguimiento en una sola pasada.
    /// `tracking_updates` reemplaza la lista completa: el servicio ya añadió
    /// la nueva entrada al final, nunca edita las anteriores.
    pub async fn update_status(
        conn: &mut PgConnection,
        id: Uuid,
        status: ShipmentStatus,
        current_location: Option<String>,
        actual_arrival: Option<NaiveDate>,
        tracking_updates: Vec<TrackingUpdate>,
    ) -> AppResult<Shipment> {
        let shipment = sqlx::query_as::<_, Shipment>(
            r#"
            UPDATE shipments
            SET status = $2,
                current_location = COALESCE($3, current_location),
                actual_arrival = COALESCE($4, actual_arrival),
                tracking_updates = $5,
                updated_at = $6
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(current_location)
        .bind(actual_arrival)
        .bind(Json(tracking_updates))
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await?;

        Ok(shipment)
    }

    pub async fn update_estimated_arrival(
        conn: &mut PgConnection,
        id: Uuid,
        estimated_arrival: NaiveDate,
        tracking_updates: Vec<TrackingUpdate>,
    ) -> AppResult<Shipment> {
        let shipment = sqlx::query_as::<_, Shipment>(
            r#"
            UPDATE shipments
            SET estimated_arrival = $2, tracking_updates = $3, updated_at = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(estimated_arrival)
        .bind(Json(tracking_updates))
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await?;

        Ok(shipment)
    }
}
