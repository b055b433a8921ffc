//! Servicio de reservas
//!
//! Orquesta el ciclo de vida completo de la reserva: creación con
//! referencia BK, transiciones validadas, pagos directos y los arrastres
//! hacia embarque y cliente. Una transacción por operación.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::models::reference::EntityKind;
use crate::models::{
    Actor, Booking, BookingStatus, CreateBookingRequest, CreatePaymentRequest, Payment,
    PaymentStatus, QuoteStatus, UpdateBookingRequest,
};
use crate::repositories::booking_repository::NewBooking;
use crate::repositories::payment_repository::NewPayment;
use crate::repositories::{
    BookingRepository, CustomerRepository, PaymentRepository, QuoteRepository,
};
use crate::services::activity_service;
use crate::services::cascade_service::CascadeService;
use crate::services::notification_service::{NotificationDispatcher, NotificationEvent};
use crate::services::reference_service::ReferenceService;
use crate::utils::errors::{conflict_error, not_found_error, validation_error, AppError, AppResult};

pub struct BookingService {
    pool: PgPool,
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl BookingService {
    pub fn new(pool: PgPool, dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        Self { pool, dispatcher }
    }

    pub async fn create_booking(
        &self,
        request: CreateBookingRequest,
        actor: &Actor,
    ) -> AppResult<Booking> {
        request.validate()?;
        if request.total_amount <= Decimal::ZERO {
            return Err(validation_error("Total amount must be positive"));
        }
        if let (Some(pickup), Some(delivery)) = (request.pickup_date, request.delivery_date) {
            if delivery < pickup {
                return Err(validation_error(
                    "Delivery date cannot precede the pickup date",
                ));
            }
        }

        let mut tx = self.pool.begin().await?;

        let customer = CustomerRepository::find_by_id(&mut tx, request.customer_id)
            .await?
            .ok_or_else(|| not_found_error("Customer", request.customer_id))?;
        if !customer.is_active {
            return Err(conflict_error("Customer account is inactive"));
        }

        if let Some(quote_id) = request.quote_id {
            let quote = QuoteRepository::find_by_id(&mut tx, quote_id)
                .await?
                .ok_or_else(|| not_found_error("Quote", quote_id))?;
            if quote.status != QuoteStatus::Approved {
                return Err(conflict_error(format!(
                    "Quote {} is {} and cannot back a booking",
                    quote.quote_reference,
                    quote.status.as_str()
                )));
            }
            if quote.is_expired(Utc::now().date_naive()) {
                return Err(conflict_error(format!(
                    "Quote {} expired on {}",
                    quote.quote_reference, quote.valid_until
                )));
            }
        }

        let reference =
            ReferenceService::next_reference(&mut tx, EntityKind::Booking, Utc::now()).await?;

        let booking = BookingRepository::insert(
            &mut tx,
            NewBooking {
                booking_reference: reference,
                customer_id: request.customer_id,
                quote_id: request.quote_id,
                vehicle_id: request.vehicle_id,
                route_id: request.route_id,
                pickup_date: request.pickup_date,
                delivery_date: request.delivery_date,
                estimated_delivery: request.estimated_delivery,
                total_amount: request.total_amount,
                currency: request.currency,
                notes: request.notes,
                created_by: actor.id(),
            },
        )
        .await?;

        activity_service::record(
            &mut tx,
            actor,
            "booking.created",
            "booking",
            booking.id,
            json!({
                "booking_reference": booking.booking_reference,
                "customer_id": booking.customer_id,
                "total_amount": booking.total_amount,
            }),
        )
        .await?;

        tx.commit().await?;

        self.dispatcher
            .dispatch(NotificationEvent::new(
                "booking.created",
                "booking",
                booking.id,
                booking.booking_reference.clone(),
                json!({ "customer_id": booking.customer_id }),
            ))
            .await;

        Ok(booking)
    }

    /// Transición manual de estado, con los arrastres que correspondan
    pub async fn update_booking_status(
        &self,
        id: Uuid,
        target: BookingStatus,
        reason: Option<String>,
        actor: &Actor,
    ) -> AppResult<Booking> {
        let mut tx = self.pool.begin().await?;

        let booking = BookingRepository::find_by_id_for_update(&mut tx, id)
            .await?
            .ok_or_else(|| not_found_error("Booking", id))?;

        if !booking.status.can_transition_to(target) {
            return Err(AppError::InvalidTransition {
                entity: "booking",
                from: booking.status.as_str().to_string(),
                to: target.as_str().to_string(),
            });
        }

        let updated = BookingRepository::update_status(&mut tx, id, target, actor.id()).await?;

        activity_service::record(
            &mut tx,
            actor,
            "booking.status_changed",
            "booking",
            updated.id,
            json!({
                "from": booking.status.as_str(),
                "to": target.as_str(),
                "reason": reason,
            }),
        )
        .await?;

        let mut cascade_events = Vec::new();
        match target {
            BookingStatus::Delivered => {
                cascade_events = CascadeService::on_booking_delivered(&mut tx, actor, &updated).await?;
            }
            BookingStatus::Cancelled => {
                cascade_events = CascadeService::on_booking_cancelled(&mut tx, actor, &updated).await?;
            }
            _ => {}
        }

        tx.commit().await?;

        self.dispatcher
            .dispatch(NotificationEvent::new(
                "booking.status_changed",
                "booking",
                updated.id,
                updated.booking_reference.clone(),
                json!({ "from": booking.status.as_str(), "to": target.as_str() }),
            ))
            .await;
        for event in cascade_events {
            self.dispatcher.dispatch(event).await;
        }

        Ok(updated)
    }

    /// Edición de campos mutables; nunca sobre una reserva en estado terminal
    pub async fn update_booking(
        &self,
        id: Uuid,
        request: UpdateBookingRequest,
        actor: &Actor,
    ) -> AppResult<Booking> {
        request.validate()?;

        let mut tx = self.pool.begin().await?;

        let booking = BookingRepository::find_by_id_for_update(&mut tx, id)
            .await?
            .ok_or_else(|| not_found_error("Booking", id))?;

        if booking.status.is_terminal() {
            return Err(conflict_error(format!(
                "Booking {} is {} and can no longer be edited",
                booking.booking_reference,
                booking.status.as_str()
            )));
        }

        let total_amount = request.total_amount.unwrap_or(booking.total_amount);
        if total_amount < booking.paid_amount {
            return Err(validation_error(
                "Total amount cannot drop below the amount already paid",
            ));
        }

        // El orden de fechas se valida sobre los valores ya fusionados:
        // una fecha nueva contra una existente también debe ser coherente.
        let pickup_date = request.pickup_date.or(booking.pickup_date);
        let delivery_date = request.delivery_date.or(booking.delivery_date);
        if let (Some(pickup), Some(delivery)) = (pickup_date, delivery_date) {
            if delivery < pickup {
                return Err(validation_error(
                    "Delivery date cannot precede the pickup date",
                ));
            }
        }

        let updated = BookingRepository::update_fields(
            &mut tx,
            id,
            pickup_date,
            delivery_date,
            request.estimated_delivery.or(booking.estimated_delivery),
            total_amount,
            request.notes.or(booking.notes),
            actor.id(),
        )
        .await?;

        activity_service::record(
            &mut tx,
            actor,
            "booking.updated",
            "booking",
            updated.id,
            json!({
                "total_amount": { "from": booking.total_amount, "to": updated.total_amount },
            }),
        )
        .await?;

        tx.commit().await?;

        Ok(updated)
    }

    pub async fn get_booking(&self, id: Uuid) -> AppResult<Booking> {
        let mut conn = self.pool.acquire().await?;
        BookingRepository::find_by_id(&mut conn, id)
            .await?
            .ok_or_else(|| not_found_error("Booking", id))
    }

    pub async fn get_booking_by_reference(&self, reference: &str) -> AppResult<Booking> {
        let mut conn = self.pool.acquire().await?;
        BookingRepository::find_by_reference(&mut conn, reference)
            .await?
            .ok_or_else(|| not_found_error("Booking", reference))
    }

    /// Pago directo: registra un pago ya cobrado contra la reserva y lo
    /// imputa al saldo en la misma transacción.
    pub async fn process_payment(
        &self,
        booking_id: Uuid,
        request: CreatePaymentRequest,
        actor: &Actor,
    ) -> AppResult<Payment> {
        request.validate()?;
        if request.booking_id != booking_id {
            return Err(validation_error("Payment request targets a different booking"));
        }
        if request.amount <= Decimal::ZERO {
            return Err(validation_error("Payment amount must be positive"));
        }

        let mut tx = self.pool.begin().await?;

        let booking = BookingRepository::find_by_id_for_update(&mut tx, booking_id)
            .await?
            .ok_or_else(|| not_found_error("Booking", booking_id))?;

        if matches!(booking.status, BookingStatus::Cancelled) {
            return Err(conflict_error("Cannot take payments on a cancelled booking"));
        }
        if request.amount > booking.balance_amount() {
            return Err(validation_error(format!(
                "Payment of {} exceeds outstanding balance {}",
                request.amount,
                booking.balance_amount()
            )));
        }

        let now = Utc::now();
        let reference = ReferenceService::next_reference(&mut tx, EntityKind::Payment, now).await?;

        let payment = PaymentRepository::insert(
            &mut tx,
            NewPayment {
                payment_reference: reference,
                booking_id,
                customer_id: booking.customer_id,
                amount: request.amount,
                currency: request.currency,
                payment_method: request.payment_method,
                transaction_id: request.transaction_id,
                status: PaymentStatus::Completed,
                payment_date: Some(now),
                notes: request.notes,
                metadata: json!({}),
            },
        )
        .await?;

        activity_service::record(
            &mut tx,
            actor,
            "payment.completed",
            "payment",
            payment.id,
            json!({
                "payment_reference": payment.payment_reference,
                "booking_reference": booking.booking_reference,
                "amount": payment.amount,
            }),
        )
        .await?;

        let (_, cascade_events) = CascadeService::apply_payment_to_booking(
            &mut tx,
            actor,
            &booking,
            payment.amount,
            &payment.payment_reference,
        )
        .await?;

        tx.commit().await?;

        self.dispatcher
            .dispatch(NotificationEvent::new(
                "payment.completed",
                "payment",
                payment.id,
                payment.payment_reference.clone(),
                json!({ "booking_id": booking_id, "amount": payment.amount }),
            ))
            .await;
        for event in cascade_events {
            self.dispatcher.dispatch(event).await;
        }

        Ok(payment)
    }
}
