//! Servicio de embarques
//!
//! Seguimiento físico del vehículo: creación con número TRK, transiciones
//! con historial de tracking inmutable y el arrastre hacia la reserva
//! cuando el embarque llega a destino.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde_json::json;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::models::reference::EntityKind;
use crate::models::{
    Actor, BookingStatus, CreateShipmentRequest, Shipment, ShipmentStatus, TrackingUpdate,
};
use crate::repositories::shipment_repository::NewShipment;
use crate::repositories::{BookingRepository, ShipmentRepository};
use crate::services::activity_service;
use crate::services::cascade_service::CascadeService;
use crate::services::notification_service::{NotificationDispatcher, NotificationEvent};
use crate::services::reference_service::ReferenceService;
use crate::utils::errors::{conflict_error, not_found_error, validation_error, AppError, AppResult};

pub struct ShipmentService {
    pool: PgPool,
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl ShipmentService {
    pub fn new(pool: PgPool, dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        Self { pool, dispatcher }
    }

    /// Alta del embarque de una reserva confirmada. Relación uno a uno: la
    /// reserva no puede tener dos embarques vivos.
    pub async fn create_shipment(
        &self,
        request: CreateShipmentRequest,
        actor: &Actor,
    ) -> AppResult<Shipment> {
        request.validate()?;

        if let (Some(departure), Some(arrival)) = (request.departure_date, request.estimated_arrival)
        {
            if arrival < departure {
                return Err(validation_error(
                    "Estimated arrival cannot precede the departure date",
                ));
            }
        }

        let mut tx = self.pool.begin().await?;

        let booking = BookingRepository::find_by_id_for_update(&mut tx, request.booking_id)
            .await?
            .ok_or_else(|| not_found_error("Booking", request.booking_id))?;

        if !matches!(
            booking.status,
            BookingStatus::Confirmed | BookingStatus::InTransit
        ) {
            return Err(conflict_error(format!(
                "Booking {} is {} and cannot be shipped",
                booking.booking_reference,
                booking.status.as_str()
            )));
        }
        if let Some(existing) = ShipmentRepository::find_by_booking_id(&mut tx, booking.id).await? {
            return Err(conflict_error(format!(
                "Booking {} already has shipment {}",
                booking.booking_reference, existing.tracking_number
            )));
        }

        let reference =
            ReferenceService::next_reference(&mut tx, EntityKind::Shipment, Utc::now()).await?;

        let shipment = ShipmentRepository::insert(
            &mut tx,
            NewShipment {
                tracking_number: reference,
                booking_id: booking.id,
                carrier_name: request.carrier_name,
                vessel_name: request.vessel_name,
                container_number: request.container_number,
                departure_port: request.departure_port,
                arrival_port: request.arrival_port,
                departure_date: request.departure_date,
                estimated_arrival: request.estimated_arrival,
            },
        )
        .await?;

        activity_service::record(
            &mut tx,
            actor,
            "shipment.created",
            "shipment",
            shipment.id,
            json!({
                "tracking_number": shipment.tracking_number,
                "booking_reference": booking.booking_reference,
            }),
        )
        .await?;

        // La reserva confirmada pasa a en tránsito al nacer su embarque
        let mut booking_event = None;
        if booking.status == BookingStatus::Confirmed {
            let moved =
                BookingRepository::update_status(&mut tx, booking.id, BookingStatus::InTransit, actor.id())
                    .await?;
            activity_service::record(
                &mut tx,
                actor,
                "booking.status_changed",
                "booking",
                moved.id,
                json!({
                    "from": booking.status.as_str(),
                    "to": moved.status.as_str(),
                    "cause": "shipment_created",
                }),
            )
            .await?;
            booking_event = Some(NotificationEvent::new(
                "booking.status_changed",
                "booking",
                moved.id,
                moved.booking_reference.clone(),
                json!({ "from": booking.status.as_str(), "to": moved.status.as_str() }),
            ));
        }

        tx.commit().await?;

        self.dispatcher
            .dispatch(NotificationEvent::new(
                "shipment.created",
                "shipment",
                shipment.id,
                shipment.tracking_number.clone(),
                json!({ "booking_id": booking.id }),
            ))
            .await;
        if let Some(event) = booking_event {
            self.dispatcher.dispatch(event).await;
        }

        Ok(shipment)
    }

    /// Avance del embarque a lo largo de su ruta. La entrega dispara el
    /// arrastre sobre la reserva y el cliente.
    pub async fn update_shipment_status(
        &self,
        id: Uuid,
        target: ShipmentStatus,
        location: Option<String>,
        notes: Option<String>,
        actor: &Actor,
    ) -> AppResult<Shipment> {
        let mut tx = self.pool.begin().await?;

        let shipment = Self::locked_shipment(&mut tx, id).await?;

        if !shipment.status.can_transition_to(target) {
            return Err(AppError::InvalidTransition {
                entity: "shipment",
                from: shipment.status.as_str().to_string(),
                to: target.as_str().to_string(),
            });
        }

        let now = Utc::now();
        let mut updates = shipment.tracking_updates.0.clone();
        updates.push(TrackingUpdate {
            timestamp: now,
            status: target.as_str().to_string(),
            location: location.clone(),
            notes,
            updated_by: actor.id(),
        });

        let actual_arrival = match target {
            ShipmentStatus::Delivered => Some(now.date_naive()),
            _ => None,
        };

        let updated =
            ShipmentRepository::update_status(&mut tx, id, target, location, actual_arrival, updates)
                .await?;

        activity_service::record(
            &mut tx,
            actor,
            "shipment.status_changed",
            "shipment",
            updated.id,
            json!({
                "from": shipment.status.as_str(),
                "to": target.as_str(),
                "location": updated.current_location,
            }),
        )
        .await?;

        let mut cascade_events = Vec::new();
        if target == ShipmentStatus::Delivered {
            cascade_events = CascadeService::on_shipment_delivered(&mut tx, actor, &updated).await?;
        }

        tx.commit().await?;

        self.dispatcher
            .dispatch(NotificationEvent::new(
                "shipment.status_changed",
                "shipment",
                updated.id,
                updated.tracking_number.clone(),
                json!({ "from": shipment.status.as_str(), "to": target.as_str() }),
            ))
            .await;
        for event in cascade_events {
            self.dispatcher.dispatch(event).await;
        }

        Ok(updated)
    }

    /// Reprogramar la llegada estimada de un embarque todavía en curso
    pub async fn update_estimated_arrival(
        &self,
        id: Uuid,
        estimated_arrival: NaiveDate,
        actor: &Actor,
    ) -> AppResult<Shipment> {
        let mut tx = self.pool.begin().await?;

        let shipment = Self::locked_shipment(&mut tx, id).await?;
        if shipment.status.is_terminal() {
            return Err(conflict_error(format!(
                "Shipment {} was already delivered",
                shipment.tracking_number
            )));
        }

        let mut updates = shipment.tracking_updates.0.clone();
        updates.push(TrackingUpdate {
            timestamp: Utc::now(),
            status: "eta_updated".to_string(),
            location: shipment.current_location.clone(),
            notes: Some(format!("Estimated arrival rescheduled to {estimated_arrival}")),
            updated_by: actor.id(),
        });

        let updated =
            ShipmentRepository::update_estimated_arrival(&mut tx, id, estimated_arrival, updates)
                .await?;

        activity_service::record(
            &mut tx,
            actor,
            "shipment.eta_changed",
            "shipment",
            updated.id,
            json!({ "from": shipment.estimated_arrival, "to": estimated_arrival }),
        )
        .await?;

        tx.commit().await?;

        Ok(updated)
    }

    pub async fn get_shipment(&self, id: Uuid) -> AppResult<Shipment> {
        let mut conn = self.pool.acquire().await?;
        ShipmentRepository::find_by_id(&mut conn, id)
            .await?
            .ok_or_else(|| not_found_error("Shipment", id))
    }

    /// Consulta pública de seguimiento por número TRK
    pub async fn get_tracking(&self, tracking_number: &str) -> AppResult<Shipment> {
        let mut conn = self.pool.acquire().await?;
        ShipmentRepository::find_by_tracking_number(&mut conn, tracking_number)
            .await?
            .ok_or_else(|| not_found_error("Shipment", tracking_number))
    }

    async fn locked_shipment(tx: &mut PgConnection, id: Uuid) -> AppResult<Shipment> {
        ShipmentRepository::find_by_id_for_update(tx, id)
            .await?
            .ok_or_else(|| not_found_error("Shipment", id))
    }
}
