//! Sincronización de entidades dependientes
//!
//! Reglas de arrastre entre agregados: se ejecutan dentro de la misma
//! transacción que la transición que las dispara, así el estado derivado
//! nunca queda a medias. La parte pura (qué transición derivar) vive en
//! funciones sin IO para poder probarla sin base de datos.

use chrono::Utc;
use serde_json::json;
use sqlx::PgConnection;
use tracing::warn;

use crate::models::{Actor, Booking, BookingStatus, Shipment, ShipmentStatus, TrackingUpdate};
use crate::repositories::{BookingRepository, CustomerRepository, ShipmentRepository};
use crate::services::activity_service;
use crate::services::notification_service::NotificationEvent;
use crate::utils::errors::{AppError, AppResult};

/// Transición derivada sobre la reserva cuando su embarque llega a destino
pub fn booking_status_after_shipment_delivered(current: BookingStatus) -> Option<BookingStatus> {
    if current.can_transition_to(BookingStatus::Delivered) {
        Some(BookingStatus::Delivered)
    } else {
        None
    }
}

/// Transición derivada sobre el embarque cuando la reserva se cancela.
/// El embarque no tiene estado cancelado: pasa a retrasado salvo que ya
/// haya sido entregado.
pub fn shipment_status_after_booking_cancelled(current: ShipmentStatus) -> Option<ShipmentStatus> {
    if current.can_transition_to(ShipmentStatus::Delayed) {
        Some(ShipmentStatus::Delayed)
    } else {
        None
    }
}

pub struct CascadeService;

impl CascadeService {
    /// Imputar un pago (o reembolso, con delta negativo) al saldo de la
    /// reserva ya bloqueada por el llamador.
    pub async fn apply_payment_to_booking(
        conn: &mut PgConnection,
        actor: &Actor,
        booking: &Booking,
        delta: rust_decimal::Decimal,
        payment_reference: &str,
    ) -> AppResult<(Booking, Vec<NotificationEvent>)> {
        let was_fully_paid = booking.is_fully_paid();
        let updated = BookingRepository::add_to_paid_amount(conn, booking.id, delta).await?;

        let mut events = Vec::new();
        if !was_fully_paid && updated.is_fully_paid() {
            activity_service::record(
                conn,
                actor,
                "booking.fully_paid",
                "booking",
                updated.id,
                json!({
                    "payment_reference": payment_reference,
                    "paid_amount": updated.paid_amount,
                    "total_amount": updated.total_amount,
                }),
            )
            .await?;
            events.push(NotificationEvent::new(
                "booking.fully_paid",
                "booking",
                updated.id,
                updated.booking_reference.clone(),
                json!({ "payment_reference": payment_reference }),
            ));
        }

        Ok((updated, events))
    }

    /// Acumular estadísticas del cliente al entregar la reserva
    pub async fn on_booking_delivered(
        conn: &mut PgConnection,
        actor: &Actor,
        booking: &Booking,
    ) -> AppResult<Vec<NotificationEvent>> {
        let customer =
            CustomerRepository::increment_delivered_stats(conn, booking.customer_id, booking.total_amount)
                .await?;

        activity_service::record(
            conn,
            actor,
            "customer.booking_delivered",
            "customer",
            customer.id,
            json!({
                "booking_reference": booking.booking_reference,
                "total_bookings": customer.total_bookings,
                "total_spent": customer.total_spent,
            }),
        )
        .await?;

        Ok(vec![NotificationEvent::new(
            "booking.delivered",
            "booking",
            booking.id,
            booking.booking_reference.clone(),
            json!({ "customer_id": customer.id }),
        )])
    }

    /// Al cancelar la reserva, el embarque pendiente pasa a retrasado
    pub async fn on_booking_cancelled(
        conn: &mut PgConnection,
        actor: &Actor,
        booking: &Booking,
    ) -> AppResult<Vec<NotificationEvent>> {
        let Some(shipment) = ShipmentRepository::find_by_booking_id(conn, booking.id).await? else {
            return Ok(Vec::new());
        };

        let Some(next) = shipment_status_after_booking_cancelled(shipment.status) else {
            return Ok(Vec::new());
        };

        let mut updates = shipment.tracking_updates.0.clone();
        updates.push(TrackingUpdate {
            timestamp: Utc::now(),
            status: next.as_str().to_string(),
            location: shipment.current_location.clone(),
            notes: Some(format!(
                "Booking {} cancelled, shipment put on hold",
                booking.booking_reference
            )),
            updated_by: actor.id(),
        });

        let updated =
            ShipmentRepository::update_status(conn, shipment.id, next, None, None, updates).await?;

        activity_service::record(
            conn,
            actor,
            "shipment.delayed",
            "shipment",
            updated.id,
            json!({
                "from": shipment.status.as_str(),
                "to": next.as_str(),
                "cause": "booking_cancelled",
            }),
        )
        .await?;

        Ok(vec![NotificationEvent::new(
            "shipment.delayed",
            "shipment",
            updated.id,
            updated.tracking_number.clone(),
            json!({ "cause": "booking_cancelled" }),
        )])
    }

    /// Al entregar el embarque, la reserva llega a entregada y arrastra las
    /// estadísticas del cliente.
    pub async fn on_shipment_delivered(
        conn: &mut PgConnection,
        actor: &Actor,
        shipment: &Shipment,
    ) -> AppResult<Vec<NotificationEvent>> {
        let Some(booking) =
            BookingRepository::find_by_id_for_update(conn, shipment.booking_id).await?
        else {
            warn!(
                tracking_number = %shipment.tracking_number,
                "delivered shipment references a missing booking"
            );
            return Ok(Vec::new());
        };

        // Reserva ya entregada: el arrastre es idempotente. Cualquier otro
        // estado que no admita la transición es un bug que debe aflorar.
        if booking.status == BookingStatus::Delivered {
            return Ok(Vec::new());
        }
        let Some(next) = booking_status_after_shipment_delivered(booking.status) else {
            return Err(AppError::InvalidTransition {
                entity: "booking",
                from: booking.status.as_str().to_string(),
                to: BookingStatus::Delivered.as_str().to_string(),
            });
        };

        let updated = BookingRepository::update_status(conn, booking.id, next, actor.id()).await?;

        activity_service::record(
            conn,
            actor,
            "booking.status_changed",
            "booking",
            updated.id,
            json!({
                "from": booking.status.as_str(),
                "to": next.as_str(),
                "cause": "shipment_delivered",
            }),
        )
        .await?;

        let mut events = Self::on_booking_delivered(conn, actor, &updated).await?;
        events.insert(
            0,
            NotificationEvent::new(
                "booking.status_changed",
                "booking",
                updated.id,
                updated.booking_reference.clone(),
                json!({ "from": booking.status.as_str(), "to": next.as_str() }),
            ),
        );

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shipment_delivery_only_cascades_to_eligible_bookings() {
        assert_eq!(
            booking_status_after_shipment_delivered(BookingStatus::InTransit),
            Some(BookingStatus::Delivered)
        );
        assert_eq!(
            booking_status_after_shipment_delivered(BookingStatus::Confirmed),
            None
        );
        assert_eq!(
            booking_status_after_shipment_delivered(BookingStatus::Cancelled),
            None
        );
        assert_eq!(
            booking_status_after_shipment_delivered(BookingStatus::Delivered),
            None
        );
    }

    #[test]
    fn cancelled_booking_delays_undelivered_shipments_only() {
        assert_eq!(
            shipment_status_after_booking_cancelled(ShipmentStatus::Preparing),
            Some(ShipmentStatus::Delayed)
        );
        assert_eq!(
            shipment_status_after_booking_cancelled(ShipmentStatus::InTransit),
            Some(ShipmentStatus::Delayed)
        );
        assert_eq!(
            shipment_status_after_booking_cancelled(ShipmentStatus::Customs),
            Some(ShipmentStatus::Delayed)
        );
        assert_eq!(
            shipment_status_after_booking_cancelled(ShipmentStatus::Delivered),
            None
        );
    }
}
