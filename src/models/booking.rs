//! Modelo de Booking (reserva)
//!
//! Mapea a la tabla `bookings`. La máquina de estados vive aquí como enum
//! cerrado con tabla de transiciones total: el chequeo de exhaustividad es
//! del compilador, no de una constante suelta.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Estado del ciclo de vida de una reserva
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    InTransit,
    Delivered,
    Cancelled,
}

impl BookingStatus {
    /// Tabla de transiciones autoritativa
    pub fn allowed_transitions(self) -> &'static [BookingStatus] {
        match self {
            BookingStatus::Pending => &[BookingStatus::Confirmed, BookingStatus::Cancelled],
            BookingStatus::Confirmed => &[BookingStatus::InTransit, BookingStatus::Cancelled],
            BookingStatus::InTransit => &[BookingStatus::Delivered, BookingStatus::Cancelled],
            BookingStatus::Delivered => &[],
            BookingStatus::Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, target: BookingStatus) -> bool {
        self.allowed_transitions().contains(&target)
    }

    /// Los estados terminales congelan cualquier transición posterior
    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::InTransit => "in_transit",
            BookingStatus::Delivered => "delivered",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Estado de pago derivado de los montos, no almacenado
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentProgress {
    Unpaid,
    Partial,
    Paid,
}

/// Reserva - mapea exactamente a la tabla bookings
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Booking {
    pub id: Uuid,
    pub booking_reference: String,
    pub customer_id: Uuid,
    pub quote_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
    pub route_id: Option<Uuid>,
    pub status: BookingStatus,
    pub pickup_date: Option<NaiveDate>,
    pub delivery_date: Option<NaiveDate>,
    pub estimated_delivery: Option<NaiveDate>,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub currency: String,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn balance_amount(&self) -> Decimal {
        self.total_amount - self.paid_amount
    }

    pub fn payment_progress(&self) -> PaymentProgress {
        if self.paid_amount >= self.total_amount {
            PaymentProgress::Paid
        } else if self.paid_amount > Decimal::ZERO {
            PaymentProgress::Partial
        } else {
            PaymentProgress::Unpaid
        }
    }

    pub fn is_fully_paid(&self) -> bool {
        self.payment_progress() == PaymentProgress::Paid
    }
}

/// Request para crear una nueva reserva
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateBookingRequest {
    pub customer_id: Uuid,
    pub quote_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
    pub route_id: Option<Uuid>,
    pub pickup_date: Option<NaiveDate>,
    pub delivery_date: Option<NaiveDate>,
    pub estimated_delivery: Option<NaiveDate>,
    pub total_amount: Decimal,

    #[validate(length(equal = 3))]
    pub currency: String,

    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

/// Request para actualizar campos de una reserva existente.
///
/// Semántica de fusión: `None` conserva el valor persistido, de modo que
/// un campo ya fijado (notas incluidas) no puede vaciarse desde aquí.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateBookingRequest {
    pub pickup_date: Option<NaiveDate>,
    pub delivery_date: Option<NaiveDate>,
    pub estimated_delivery: Option<NaiveDate>,
    pub total_amount: Option<Decimal>,

    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_can_reach_confirmed_and_cancelled_only() {
        assert!(BookingStatus::Pending.can_transition_to(BookingStatus::Confirmed));
        assert!(BookingStatus::Pending.can_transition_to(BookingStatus::Cancelled));
        assert!(!BookingStatus::Pending.can_transition_to(BookingStatus::InTransit));
        assert!(!BookingStatus::Pending.can_transition_to(BookingStatus::Delivered));
    }

    #[test]
    fn delivered_and_cancelled_are_terminal() {
        assert!(BookingStatus::Delivered.is_terminal());
        assert!(BookingStatus::Cancelled.is_terminal());
        assert!(!BookingStatus::Delivered.can_transition_to(BookingStatus::Pending));
    }

    #[test]
    fn no_status_can_skip_to_delivered_except_in_transit() {
        for status in [
            BookingStatus::Pending,
            BookingStatus::Confirmed,
            BookingStatus::Cancelled,
        ] {
            assert!(!status.can_transition_to(BookingStatus::Delivered));
        }
        assert!(BookingStatus::InTransit.can_transition_to(BookingStatus::Delivered));
    }

    #[test]
    fn payment_progress_tracks_amounts() {
        let mut booking = sample_booking();
        assert_eq!(booking.payment_progress(), PaymentProgress::Unpaid);

        booking.paid_amount = Decimal::new(50000, 2); // 500.00
        assert_eq!(booking.payment_progress(), PaymentProgress::Partial);
        assert_eq!(booking.balance_amount(), Decimal::new(50000, 2));

        booking.paid_amount = booking.total_amount;
        assert_eq!(booking.payment_progress(), PaymentProgress::Paid);
        assert!(booking.is_fully_paid());
    }

    fn sample_booking() -> Booking {
        Booking {
            id: Uuid::new_v4(),
            booking_reference: "BK2026080001".to_string(),
            customer_id: Uuid::new_v4(),
            quote_id: None,
            vehicle_id: None,
            route_id: None,
            status: BookingStatus::Pending,
            pickup_date: None,
            delivery_date: None,
            estimated_delivery: None,
            total_amount: Decimal::new(100000, 2), // 1000.00
            paid_amount: Decimal::ZERO,
            currency: "USD".to_string(),
            notes: None,
            created_by: None,
            updated_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
