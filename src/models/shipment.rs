//! Modelo de Shipment (embarque)
//!
//! Relación 1:1 con la reserva. La lista `tracking_updates` es de solo
//! agregado: cada cambio de estado o de ETA añade una entrada, nunca edita.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Estado del ciclo de vida de un embarque
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    Preparing,
    InTransit,
    Customs,
    Delivered,
    Delayed,
}

impl ShipmentStatus {
    /// Tabla de transiciones autoritativa. `delayed` es un estado de espera:
    /// puede volver a la ruta o entregarse directamente.
    pub fn allowed_transitions(self) -> &'static [ShipmentStatus] {
        match self {
            ShipmentStatus::Preparing => &[ShipmentStatus::InTransit, ShipmentStatus::Delayed],
            ShipmentStatus::InTransit => &[
                ShipmentStatus::Customs,
                ShipmentStatus::Delivered,
                ShipmentStatus::Delayed,
            ],
            ShipmentStatus::Customs => &[ShipmentStatus::Delivered, ShipmentStatus::Delayed],
            ShipmentStatus::Delivered => &[],
            ShipmentStatus::Delayed => &[
                ShipmentStatus::InTransit,
                ShipmentStatus::Customs,
                ShipmentStatus::Delivered,
            ],
        }
    }

    pub fn can_transition_to(self, target: ShipmentStatus) -> bool {
        self.allowed_transitions().contains(&target)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ShipmentStatus::Preparing => "preparing",
            ShipmentStatus::InTransit => "in_transit",
            ShipmentStatus::Customs => "customs",
            ShipmentStatus::Delivered => "delivered",
            ShipmentStatus::Delayed => "delayed",
        }
    }
}

impl std::fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entrada de la lista de seguimiento de solo agregado
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingUpdate {
    pub timestamp: DateTime<Utc>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<Uuid>,
}

/// Embarque - mapea exactamente a la tabla shipments
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Shipment {
    pub id: Uuid,
    pub tracking_number: String,
    pub booking_id: Uuid,
    pub status: ShipmentStatus,
    pub carrier_name: Option<String>,
    pub vessel_name: Option<String>,
    pub container_number: Option<String>,
    pub current_location: Option<String>,
    pub departure_port: Option<String>,
    pub arrival_port: Option<String>,
    pub departure_date: Option<NaiveDate>,
    pub estimated_arrival: Option<NaiveDate>,
    pub actual_arrival: Option<NaiveDate>,
    pub tracking_updates: Json<Vec<TrackingUpdate>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Shipment {
    pub fn latest_tracking_update(&self) -> Option<&TrackingUpdate> {
        self.tracking_updates.0.last()
    }

    pub fn route_description(&self) -> String {
        match (&self.departure_port, &self.arrival_port) {
            (Some(from), Some(to)) => format!("{} → {}", from, to),
            _ => "Route not specified".to_string(),
        }
    }
}

/// Request para crear un nuevo embarque
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateShipmentRequest {
    pub booking_id: Uuid,

    #[validate(length(max = 100))]
    pub carrier_name: Option<String>,

    #[validate(length(max = 100))]
    pub vessel_name: Option<String>,

    #[validate(length(max = 50))]
    pub container_number: Option<String>,

    #[validate(length(max = 100))]
    pub departure_port: Option<String>,

    #[validate(length(max = 100))]
    pub arrival_port: Option<String>,

    pub departure_date: Option<NaiveDate>,
    pub estimated_arrival: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preparing_cannot_skip_to_delivered() {
        assert!(!ShipmentStatus::Preparing.can_transition_to(ShipmentStatus::Delivered));
        assert!(ShipmentStatus::Preparing.can_transition_to(ShipmentStatus::InTransit));
        assert!(ShipmentStatus::Preparing.can_transition_to(ShipmentStatus::Delayed));
    }

    #[test]
    fn delayed_is_a_recoverable_holding_state() {
        assert!(ShipmentStatus::Delayed.can_transition_to(ShipmentStatus::InTransit));
        assert!(ShipmentStatus::Delayed.can_transition_to(ShipmentStatus::Customs));
        assert!(ShipmentStatus::Delayed.can_transition_to(ShipmentStatus::Delivered));
        assert!(!ShipmentStatus::Delayed.is_terminal());
    }

    #[test]
    fn delivered_is_the_only_terminal_state() {
        assert!(ShipmentStatus::Delivered.is_terminal());
        for status in [
            ShipmentStatus::Preparing,
            ShipmentStatus::InTransit,
            ShipmentStatus::Customs,
            ShipmentStatus::Delayed,
        ] {
            assert!(!status.is_terminal());
        }
    }

    #[test]
    fn customs_can_only_deliver_or_delay() {
        assert_eq!(
            ShipmentStatus::Customs.allowed_transitions(),
            &[ShipmentStatus::Delivered, ShipmentStatus::Delayed]
        );
    }
}
