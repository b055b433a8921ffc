//! Servicio de pagos
//!
//! Ciclo de vida del pago (pendiente, completado, fallido, cancelado,
//! reembolsado) y su imputación al saldo de la reserva. Los reembolsos se
//! registran como pagos completados de importe negativo que apuntan al
//! pago original en sus metadatos.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use uuid::Uuid;
use validator::Validate;

use crate::models::reference::EntityKind;
use crate::models::{Actor, BookingStatus, CreatePaymentRequest, Payment, PaymentStatus};
use crate::repositories::payment_repository::NewPayment;
use crate::repositories::{BookingRepository, PaymentRepository};
use crate::services::activity_service;
use crate::services::cascade_service::CascadeService;
use crate::services::notification_service::{NotificationDispatcher, NotificationEvent};
use crate::services::reference_service::ReferenceService;
use crate::utils::errors::{conflict_error, not_found_error, validation_error, AppError, AppResult};

pub struct PaymentService {
    pool: PgPool,
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl PaymentService {
    pub fn new(pool: PgPool, dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        Self { pool, dispatcher }
    }

    /// Alta de un pago pendiente de confirmación
    pub async fn create_payment(
        &self,
        request: CreatePaymentRequest,
        actor: &Actor,
    ) -> AppResult<Payment> {
        request.validate()?;
        if request.amount <= Decimal::ZERO {
            return Err(validation_error("Payment amount must be positive"));
        }

        let mut tx = self.pool.begin().await?;

        let booking = BookingRepository::find_by_id_for_update(&mut tx, request.booking_id)
            .await?
            .ok_or_else(|| not_found_error("Booking", request.booking_id))?;
        if matches!(booking.status, BookingStatus::Cancelled) {
            return Err(conflict_error("Cannot take payments on a cancelled booking"));
        }
        if request.customer_id != booking.customer_id {
            return Err(validation_error(
                "Payment customer does not match the booking's customer",
            ));
        }
        if request.amount > booking.balance_amount() {
            return Err(validation_error(format!(
                "Payment of {} exceeds outstanding balance {}",
                request.amount,
                booking.balance_amount()
            )));
        }

        let reference =
            ReferenceService::next_reference(&mut tx, EntityKind::Payment, Utc::now()).await?;

        let payment = PaymentRepository::insert(
            &mut tx,
            NewPayment {
                payment_reference: reference,
                booking_id: booking.id,
                customer_id: booking.customer_id,
                amount: request.amount,
                currency: request.currency,
                payment_method: request.payment_method,
                transaction_id: request.transaction_id,
                status: PaymentStatus::Pending,
                payment_date: None,
                notes: request.notes,
                metadata: json!({}),
            },
        )
        .await?;

        activity_service::record(
            &mut tx,
            actor,
            "payment.created",
            "payment",
            payment.id,
            json!({
                "payment_reference": payment.payment_reference,
                "booking_reference": booking.booking_reference,
                "amount": payment.amount,
            }),
        )
        .await?;

        tx.commit().await?;

        self.dispatcher
            .dispatch(NotificationEvent::new(
                "payment.created",
                "payment",
                payment.id,
                payment.payment_reference.clone(),
                json!({ "booking_id": booking.id, "amount": payment.amount }),
            ))
            .await;

        Ok(payment)
    }

    pub async fn get_payment(&self, id: Uuid) -> AppResult<Payment> {
        let mut conn = self.pool.acquire().await?;
        PaymentRepository::find_by_id(&mut conn, id)
            .await?
            .ok_or_else(|| not_found_error("Payment", id))
    }

    pub async fn payments_for_booking(&self, booking_id: Uuid) -> AppResult<Vec<Payment>> {
        let mut conn = self.pool.acquire().await?;
        PaymentRepository::find_by_booking(&mut conn, booking_id).await
    }

    /// Confirmación del cobro: pendiente pasa a completado y se imputa el
    /// importe al saldo de la reserva en la misma transacción.
    pub async fn complete_payment(
        &self,
        id: Uuid,
        transaction_id: Option<String>,
        actor: &Actor,
    ) -> AppResult<Payment> {
        let mut tx = self.pool.begin().await?;

        let payment = Self::locked_payment(&mut tx, id).await?;
        Self::ensure_transition(&payment, PaymentStatus::Completed)?;

        let booking = BookingRepository::find_by_id_for_update(&mut tx, payment.booking_id)
            .await?
            .ok_or_else(|| not_found_error("Booking", payment.booking_id))?;
        if payment.amount > booking.balance_amount() {
            return Err(conflict_error(format!(
                "Payment {} of {} no longer fits the outstanding balance {}",
                payment.payment_reference,
                payment.amount,
                booking.balance_amount()
            )));
        }

        let updated = PaymentRepository::update_status(
            &mut tx,
            id,
            PaymentStatus::Completed,
            Some(Utc::now()),
            transaction_id,
            None,
        )
        .await?;

        activity_service::record(
            &mut tx,
            actor,
            "payment.completed",
            "payment",
            updated.id,
            json!({ "from": payment.status.as_str(), "amount": updated.amount }),
        )
        .await?;

        let (_, cascade_events) = CascadeService::apply_payment_to_booking(
            &mut tx,
            actor,
            &booking,
            updated.amount,
            &updated.payment_reference,
        )
        .await?;

        tx.commit().await?;

        self.notify_status(&updated, "payment.completed").await;
        for event in cascade_events {
            self.dispatcher.dispatch(event).await;
        }

        Ok(updated)
    }

    pub async fn fail_payment(
        &self,
        id: Uuid,
        notes: Option<String>,
        actor: &Actor,
    ) -> AppResult<Payment> {
        self.simple_transition(id, PaymentStatus::Failed, notes, "payment.failed", actor)
            .await
    }

    pub async fn cancel_payment(&self, id: Uuid, actor: &Actor) -> AppResult<Payment> {
        self.simple_transition(id, PaymentStatus::Cancelled, None, "payment.cancelled", actor)
            .await
    }

    /// Reintento de un pago fallido: vuelve a pendiente conservando la
    /// misma referencia.
    pub async fn retry_payment(&self, id: Uuid, actor: &Actor) -> AppResult<Payment> {
        self.simple_transition(id, PaymentStatus::Pending, None, "payment.retried", actor)
            .await
    }

    /// Reembolso parcial o total dentro de la ventana permitida. Genera un
    /// pago negativo completado que referencia al original; el original solo
    /// pasa a reembolsado cuando el acumulado cubre el importe íntegro.
    pub async fn process_refund(
        &self,
        original_id: Uuid,
        amount: Option<Decimal>,
        reason: Option<String>,
        actor: &Actor,
    ) -> AppResult<Payment> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let original = Self::locked_payment(&mut tx, original_id).await?;
        if !original.is_refundable(now) {
            return Err(conflict_error(format!(
                "Payment {} is not refundable",
                original.payment_reference
            )));
        }

        let already_refunded = original
            .metadata
            .0
            .get("refunded_total")
            .and_then(|value| value.as_str())
            .and_then(|raw| raw.parse::<Decimal>().ok())
            .unwrap_or(Decimal::ZERO);
        let refundable = original.amount - already_refunded;

        let refund_amount = amount.unwrap_or(refundable);
        if refund_amount <= Decimal::ZERO {
            return Err(validation_error("Refund amount must be positive"));
        }
        if refund_amount > refundable {
            return Err(validation_error(format!(
                "Refund of {} exceeds the refundable remainder {}",
                refund_amount, refundable
            )));
        }

        let booking = BookingRepository::find_by_id_for_update(&mut tx, original.booking_id)
            .await?
            .ok_or_else(|| not_found_error("Booking", original.booking_id))?;

        let reference = ReferenceService::next_reference(&mut tx, EntityKind::Payment, now).await?;

        let refund = PaymentRepository::insert(
            &mut tx,
            NewPayment {
                payment_reference: reference,
                booking_id: original.booking_id,
                customer_id: original.customer_id,
                amount: -refund_amount,
                currency: original.currency.clone(),
                payment_method: original.payment_method,
                transaction_id: None,
                status: PaymentStatus::Completed,
                payment_date: Some(now),
                notes: reason.clone(),
                metadata: json!({
                    "refund_of": original.id,
                    "refund_of_reference": original.payment_reference,
                    "reason": reason,
                }),
            },
        )
        .await?;

        let new_refunded_total = already_refunded + refund_amount;
        PaymentRepository::merge_metadata(
            &mut tx,
            original.id,
            json!({ "refunded_total": new_refunded_total.to_string() }),
        )
        .await?;

        let fully_refunded = new_refunded_total >= original.amount;
        if fully_refunded {
            Self::ensure_transition(&original, PaymentStatus::Refunded)?;
            PaymentRepository::update_status(
                &mut tx,
                original.id,
                PaymentStatus::Refunded,
                None,
                None,
                None,
            )
            .await?;
        }

        BookingRepository::add_to_paid_amount(&mut tx, booking.id, -refund_amount).await?;

        activity_service::record(
            &mut tx,
            actor,
            "payment.refunded",
            "payment",
            original.id,
            json!({
                "refund_reference": refund.payment_reference,
                "amount": refund_amount,
                "fully_refunded": fully_refunded,
            }),
        )
        .await?;

        tx.commit().await?;

        self.dispatcher
            .dispatch(NotificationEvent::new(
                "payment.refunded",
                "payment",
                original.id,
                original.payment_reference.clone(),
                json!({
                    "refund_reference": refund.payment_reference,
                    "amount": refund_amount,
                    "fully_refunded": fully_refunded,
                }),
            ))
            .await;

        Ok(refund)
    }

    async fn simple_transition(
        &self,
        id: Uuid,
        target: PaymentStatus,
        notes: Option<String>,
        event: &str,
        actor: &Actor,
    ) -> AppResult<Payment> {
        let mut tx: Transaction<'_, Postgres> = self.pool.begin().await?;

        let payment = Self::locked_payment(&mut tx, id).await?;
        Self::ensure_transition(&payment, target)?;

        let updated =
            PaymentRepository::update_status(&mut tx, id, target, None, None, notes).await?;

        activity_service::record(
            &mut tx,
            actor,
            event,
            "payment",
            updated.id,
            json!({ "from": payment.status.as_str(), "to": target.as_str() }),
        )
        .await?;

        tx.commit().await?;

        self.notify_status(&updated, event).await;
        Ok(updated)
    }

    async fn locked_payment(tx: &mut PgConnection, id: Uuid) -> AppResult<Payment> {
        PaymentRepository::find_by_id_for_update(tx, id)
            .await?
            .ok_or_else(|| not_found_error("Payment", id))
    }

    fn ensure_transition(payment: &Payment, target: PaymentStatus) -> AppResult<()> {
        if payment.status.can_transition_to(target) {
            Ok(())
        } else {
            Err(AppError::InvalidTransition {
                entity: "payment",
                from: payment.status.as_str().to_string(),
                to: target.as_str().to_string(),
            })
        }
    }

    async fn notify_status(&self, payment: &Payment, event: &str) {
        self.dispatcher
            .dispatch(NotificationEvent::new(
                event,
                "payment",
                payment.id,
                payment.payment_reference.clone(),
                json!({ "status": payment.status.as_str(), "amount": payment.amount }),
            ))
            .await;
    }
}
