//! Servicio de cotizaciones
//!
//! Aprobación, rechazo, expiración y conversión a reserva. El total se
//! recalcula siempre en servidor a partir del precio base y los recargos:
//! lo que venga calculado desde fuera se ignora.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::models::quote::compute_total;
use crate::models::reference::EntityKind;
use crate::models::{Actor, Booking, CreateQuoteRequest, Quote, QuoteStatus};
use crate::repositories::booking_repository::NewBooking;
use crate::repositories::quote_repository::NewQuote;
use crate::repositories::{BookingRepository, CustomerRepository, QuoteRepository};
use crate::services::activity_service;
use crate::services::notification_service::{NotificationDispatcher, NotificationEvent};
use crate::services::reference_service::ReferenceService;
use crate::utils::errors::{conflict_error, not_found_error, validation_error, AppError, AppResult};

/// Vigencia por defecto cuando la petición no trae fecha límite
pub const DEFAULT_VALIDITY_DAYS: i64 = 30;

pub struct QuoteService {
    pool: PgPool,
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl QuoteService {
    pub fn new(pool: PgPool, dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        Self { pool, dispatcher }
    }

    pub async fn create_quote(&self, request: CreateQuoteRequest, actor: &Actor) -> AppResult<Quote> {
        request.validate()?;

        let today = Utc::now().date_naive();
        let valid_until = request
            .valid_until
            .unwrap_or_else(|| today + Duration::days(DEFAULT_VALIDITY_DAYS));
        if valid_until < today {
            return Err(validation_error("Quote validity cannot end in the past"));
        }

        let total_amount = compute_total(request.base_price, &request.additional_fees);

        let mut tx = self.pool.begin().await?;

        let customer = CustomerRepository::find_by_id(&mut tx, request.customer_id)
            .await?
            .ok_or_else(|| not_found_error("Customer", request.customer_id))?;
        if !customer.is_active {
            return Err(conflict_error("Customer account is inactive"));
        }

        let reference =
            ReferenceService::next_reference(&mut tx, EntityKind::Quote, Utc::now()).await?;

        let quote = QuoteRepository::insert(
            &mut tx,
            NewQuote {
                quote_reference: reference,
                customer_id: request.customer_id,
                route_id: request.route_id,
                vehicle_details: request.vehicle_details,
                base_price: request.base_price,
                additional_fees: request.additional_fees,
                total_amount,
                currency: request.currency,
                valid_until,
                notes: request.notes,
                created_by: actor.id(),
            },
        )
        .await?;

        activity_service::record(
            &mut tx,
            actor,
            "quote.created",
            "quote",
            quote.id,
            json!({
                "quote_reference": quote.quote_reference,
                "total_amount": quote.total_amount,
                "valid_until": quote.valid_until,
            }),
        )
        .await?;

        tx.commit().await?;

        self.dispatcher
            .dispatch(NotificationEvent::new(
                "quote.created",
                "quote",
                quote.id,
                quote.quote_reference.clone(),
                json!({ "customer_id": quote.customer_id }),
            ))
            .await;

        Ok(quote)
    }

    pub async fn get_quote(&self, id: Uuid) -> AppResult<Quote> {
        let mut conn = self.pool.acquire().await?;
        QuoteRepository::find_by_id(&mut conn, id)
            .await?
            .ok_or_else(|| not_found_error("Quote", id))
    }

    pub async fn approve_quote(
        &self,
        id: Uuid,
        notes: Option<String>,
        actor: &Actor,
    ) -> AppResult<Quote> {
        let mut tx = self.pool.begin().await?;

        let quote = Self::locked_quote(&mut tx, id).await?;
        Self::ensure_transition(&quote, QuoteStatus::Approved)?;
        if quote.is_expired(Utc::now().date_naive()) {
            return Err(conflict_error(format!(
                "Quote {} expired on {}",
                quote.quote_reference, quote.valid_until
            )));
        }

        let updated =
            QuoteRepository::mark_approved(&mut tx, id, actor.id(), Utc::now(), notes).await?;

        activity_service::record(
            &mut tx,
            actor,
            "quote.approved",
            "quote",
            updated.id,
            json!({ "from": quote.status.as_str(), "to": "approved" }),
        )
        .await?;

        tx.commit().await?;

        self.notify_status(&updated, "quote.approved").await;
        Ok(updated)
    }

    /// Rechazo con motivo obligatorio; queda en el historial de auditoría
    pub async fn reject_quote(&self, id: Uuid, reason: String, actor: &Actor) -> AppResult<Quote> {
        if reason.trim().is_empty() {
            return Err(validation_error("A rejection reason is required"));
        }

        let mut tx = self.pool.begin().await?;

        let quote = Self::locked_quote(&mut tx, id).await?;
        Self::ensure_transition(&quote, QuoteStatus::Rejected)?;

        let updated = QuoteRepository::update_status(&mut tx, id, QuoteStatus::Rejected).await?;

        activity_service::record(
            &mut tx,
            actor,
            "quote.rejected",
            "quote",
            updated.id,
            json!({ "from": quote.status.as_str(), "to": "rejected", "reason": reason }),
        )
        .await?;

        tx.commit().await?;

        self.notify_status(&updated, "quote.rejected").await;
        Ok(updated)
    }

    /// Conversión de un solo uso: el candado FOR UPDATE serializa a los
    /// convertidores concurrentes y el chequeo de estado descarta al segundo.
    pub async fn convert_quote_to_booking(&self, id: Uuid, actor: &Actor) -> AppResult<Booking> {
        let mut tx = self.pool.begin().await?;

        let quote = Self::locked_quote(&mut tx, id).await?;

        if quote.status != QuoteStatus::Approved {
            return Err(AppError::InvalidTransition {
                entity: "quote",
                from: quote.status.as_str().to_string(),
                to: QuoteStatus::Converted.as_str().to_string(),
            });
        }
        if quote.is_expired(Utc::now().date_naive()) {
            return Err(conflict_error(format!(
                "Quote {} expired on {}",
                quote.quote_reference, quote.valid_until
            )));
        }
        if let Some(existing) = BookingRepository::find_by_quote_id(&mut tx, quote.id).await? {
            return Err(conflict_error(format!(
                "Quote {} was already converted to booking {}",
                quote.quote_reference, existing.booking_reference
            )));
        }

        let reference =
            ReferenceService::next_reference(&mut tx, EntityKind::Booking, Utc::now()).await?;

        let booking = BookingRepository::insert(
            &mut tx,
            NewBooking {
                booking_reference: reference,
                customer_id: quote.customer_id,
                quote_id: Some(quote.id),
                vehicle_id: None,
                route_id: quote.route_id,
                pickup_date: None,
                delivery_date: None,
                estimated_delivery: None,
                total_amount: quote.total_amount,
                currency: quote.currency.clone(),
                notes: quote.notes.clone(),
                created_by: actor.id(),
            },
        )
        .await?;

        let converted = QuoteRepository::update_status(&mut tx, id, QuoteStatus::Converted).await?;

        activity_service::record(
            &mut tx,
            actor,
            "quote.converted",
            "quote",
            converted.id,
            json!({ "booking_reference": booking.booking_reference }),
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
                "quote_reference": converted.quote_reference,
                "total_amount": booking.total_amount,
            }),
        )
        .await?;

        tx.commit().await?;

        self.dispatcher
            .dispatch(NotificationEvent::new(
                "quote.converted",
                "quote",
                converted.id,
                converted.quote_reference.clone(),
                json!({ "booking_reference": booking.booking_reference }),
            ))
            .await;
        self.dispatcher
            .dispatch(NotificationEvent::new(
                "booking.created",
                "booking",
                booking.id,
                booking.booking_reference.clone(),
                json!({ "quote_id": converted.id }),
            ))
            .await;

        Ok(booking)
    }

    /// Extender la vigencia de una cotización todavía abierta
    pub async fn extend_validity(
        &self,
        id: Uuid,
        new_valid_until: chrono::NaiveDate,
        actor: &Actor,
    ) -> AppResult<Quote> {
        let today = Utc::now().date_naive();
        if new_valid_until < today {
            return Err(validation_error("New validity date cannot be in the past"));
        }

        let mut tx = self.pool.begin().await?;

        let quote = Self::locked_quote(&mut tx, id).await?;
        if !matches!(
            quote.status,
            QuoteStatus::Pending | QuoteStatus::Approved | QuoteStatus::Expired
        ) {
            return Err(conflict_error(format!(
                "Quote {} is {} and its validity cannot be extended",
                quote.quote_reference,
                quote.status.as_str()
            )));
        }
        if new_valid_until <= quote.valid_until {
            return Err(validation_error(
                "New validity date must extend the current one",
            ));
        }

        // Extender una cotización ya expirada la devuelve a pendiente
        let next_status = match quote.status {
            QuoteStatus::Expired => QuoteStatus::Pending,
            other => other,
        };
        let updated =
            QuoteRepository::update_validity(&mut tx, id, new_valid_until, next_status).await?;

        activity_service::record(
            &mut tx,
            actor,
            "quote.validity_extended",
            "quote",
            updated.id,
            json!({
                "from": quote.valid_until,
                "to": new_valid_until,
                "status": next_status.as_str(),
            }),
        )
        .await?;

        tx.commit().await?;

        Ok(updated)
    }

    /// Barrido de expiración: marca como expiradas las cotizaciones abiertas
    /// cuya vigencia ya venció. Pensado para invocarse periódicamente con
    /// `Actor::System`.
    pub async fn expire_due_quotes(&self, actor: &Actor) -> AppResult<Vec<Quote>> {
        let today = Utc::now().date_naive();
        let mut tx = self.pool.begin().await?;

        let due = QuoteRepository::find_due_for_expiry(&mut tx, today).await?;
        let mut expired = Vec::with_capacity(due.len());

        for quote in due {
            if !quote.status.can_transition_to(QuoteStatus::Expired) {
                continue;
            }
            let updated = QuoteRepository::update_status(&mut tx, quote.id, QuoteStatus::Expired).await?;
            activity_service::record(
                &mut tx,
                actor,
                "quote.expired",
                "quote",
                updated.id,
                json!({ "from": quote.status.as_str(), "valid_until": quote.valid_until }),
            )
            .await?;
            expired.push(updated);
        }

        tx.commit().await?;

        for quote in &expired {
            self.notify_status(quote, "quote.expired").await;
        }

        Ok(expired)
    }

    async fn locked_quote(tx: &mut sqlx::PgConnection, id: Uuid) -> AppResult<Quote> {
        QuoteRepository::find_by_id_for_update(tx, id)
            .await?
            .ok_or_else(|| not_found_error("Quote", id))
    }

    fn ensure_transition(quote: &Quote, target: QuoteStatus) -> AppResult<()> {
        if quote.status.can_transition_to(target) {
            Ok(())
        } else {
            Err(AppError::InvalidTransition {
                entity: "quote",
                from: quote.status.as_str().to_string(),
                to: target.as_str().to_string(),
            })
        }
    }

    async fn notify_status(&self, quote: &Quote, event: &str) {
        self.dispatcher
            .dispatch(NotificationEvent::new(
                event,
                "quote",
                quote.id,
                quote.quote_reference.clone(),
                json!({ "status": quote.status.as_str() }),
            ))
            .await;
    }
}
