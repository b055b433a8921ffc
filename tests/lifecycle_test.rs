//! Pruebas de integración del ciclo de vida completo
//!
//! Requieren una base PostgreSQL accesible vía DATABASE_URL con las
//! migraciones aplicables; sin esa variable se omiten limpiamente.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use sqlx::types::Json;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use vehicle_shipping_core::models::{
    ActivityLogFilter, Actor, BookingStatus, CreateBookingRequest, CreatePaymentRequest,
    CreateQuoteRequest, CreateShipmentRequest, PaymentMethod, PaymentStatus, QuoteStatus,
    Shipment, ShipmentStatus, UpdateBookingRequest, VehicleDetails,
};
use vehicle_shipping_core::repositories::customer_repository::{CustomerRepository, NewCustomer};
use vehicle_shipping_core::services::cascade_service::CascadeService;
use vehicle_shipping_core::services::{
    ActivityService, BookingService, PaymentService, QuoteService, RecordingDispatcher,
    ShipmentService,
};
use vehicle_shipping_core::AppError;

async fn test_pool() -> Option<PgPool> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("DATABASE_URL not set, skipping integration test");
            return None;
        }
    };
    let pool = PgPool::connect(&url).await.expect("failed to connect");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");
    Some(pool)
}

async fn seed_customer(pool: &PgPool) -> Uuid {
    let mut conn = pool.acquire().await.unwrap();
    let customer = CustomerRepository::insert(
        &mut conn,
        NewCustomer {
            first_name: "Amina".into(),
            last_name: "Diallo".into(),
            email: format!("amina+{}@example.com", Uuid::new_v4()),
            phone: None,
        },
    )
    .await
    .unwrap();
    customer.id
}

fn booking_request(customer_id: Uuid, total: Decimal) -> CreateBookingRequest {
    CreateBookingRequest {
        customer_id,
        quote_id: None,
        vehicle_id: None,
        route_id: None,
        pickup_date: None,
        delivery_date: None,
        estimated_delivery: None,
        total_amount: total,
        currency: "EUR".into(),
        notes: None,
    }
}

#[tokio::test]
async fn booking_runs_through_delivery_and_updates_customer_stats() {
    let Some(pool) = test_pool().await else { return };
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let bookings = BookingService::new(pool.clone(), dispatcher.clone());
    let shipments = ShipmentService::new(pool.clone(), dispatcher.clone());
    let actor = Actor::System;

    let customer_id = seed_customer(&pool).await;
    let booking = bookings
        .create_booking(booking_request(customer_id, Decimal::new(250_000, 2)), &actor)
        .await
        .unwrap();
    assert!(booking.booking_reference.starts_with("BK"));
    assert_eq!(booking.status, BookingStatus::Pending);

    let booking = bookings
        .update_booking_status(booking.id, BookingStatus::Confirmed, None, &actor)
        .await
        .unwrap();

    let shipment = shipments
        .create_shipment(
            CreateShipmentRequest {
                booking_id: booking.id,
                carrier_name: Some("Atlantic Lines".into()),
                vessel_name: None,
                container_number: None,
                departure_port: Some("Anvers".into()),
                arrival_port: Some("Dakar".into()),
                departure_date: None,
                estimated_arrival: None,
            },
            &actor,
        )
        .await
        .unwrap();
    assert!(shipment.tracking_number.starts_with("TRK"));

    // Crear el embarque ya movió la reserva a en tránsito
    let booking = bookings.get_booking(booking.id).await.unwrap();
    assert_eq!(booking.status, BookingStatus::InTransit);

    let shipment = shipments
        .update_shipment_status(
            shipment.id,
            ShipmentStatus::InTransit,
            Some("Atlantic".into()),
            None,
            &actor,
        )
        .await
        .unwrap();
    let shipment = shipments
        .update_shipment_status(shipment.id, ShipmentStatus::Delivered, Some("Dakar".into()), None, &actor)
        .await
        .unwrap();
    assert!(shipment.actual_arrival.is_some());

    // La entrega del embarque arrastra la reserva y al cliente
    let booking = bookings.get_booking(booking.id).await.unwrap();
    assert_eq!(booking.status, BookingStatus::Delivered);

    let mut conn = pool.acquire().await.unwrap();
    let customer = CustomerRepository::find_by_id(&mut conn, customer_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(customer.total_bookings, 1);
    assert_eq!(customer.total_spent, booking.total_amount);

    let events: Vec<String> = dispatcher
        .take_events()
        .into_iter()
        .map(|event| event.event)
        .collect();
    assert!(events.contains(&"booking.created".to_string()));
    assert!(events.contains(&"shipment.status_changed".to_string()));
    assert!(events.contains(&"booking.delivered".to_string()));
}

#[tokio::test]
async fn invalid_booking_transition_is_rejected() {
    let Some(pool) = test_pool().await else { return };
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let bookings = BookingService::new(pool.clone(), dispatcher);
    let actor = Actor::System;

    let customer_id = seed_customer(&pool).await;
    let booking = bookings
        .create_booking(booking_request(customer_id, Decimal::new(100_000, 2)), &actor)
        .await
        .unwrap();

    let err = bookings
        .update_booking_status(booking.id, BookingStatus::Delivered, None, &actor)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition { entity: "booking", .. }));

    // El estado no cambió
    let booking = bookings.get_booking(booking.id).await.unwrap();
    assert_eq!(booking.status, BookingStatus::Pending);
}

#[tokio::test]
async fn payment_completion_accrues_and_refund_reverses() {
    let Some(pool) = test_pool().await else { return };
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let bookings = BookingService::new(pool.clone(), dispatcher.clone());
    let payments = PaymentService::new(pool.clone(), dispatcher.clone());
    let actor = Actor::System;

    let customer_id = seed_customer(&pool).await;
    let total = Decimal::new(200_000, 2);
    let booking = bookings
        .create_booking(booking_request(customer_id, total), &actor)
        .await
        .unwrap();

    let payment = payments
        .create_payment(
            CreatePaymentRequest {
                booking_id: booking.id,
                customer_id,
                amount: Decimal::new(120_000, 2),
                currency: "EUR".into(),
                payment_method: PaymentMethod::BankTransfer,
                transaction_id: None,
                notes: None,
            },
            &actor,
        )
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);

    // Pendiente no imputa nada todavía
    let fresh = bookings.get_booking(booking.id).await.unwrap();
    assert_eq!(fresh.paid_amount, Decimal::ZERO);

    let payment = payments
        .complete_payment(payment.id, Some("TX-123".into()), &actor)
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Completed);

    let fresh = bookings.get_booking(booking.id).await.unwrap();
    assert_eq!(fresh.paid_amount, Decimal::new(120_000, 2));

    // Reembolso parcial: pago negativo nuevo, el original sigue completado
    let refund = payments
        .process_refund(payment.id, Some(Decimal::new(20_000, 2)), Some("damaged".into()), &actor)
        .await
        .unwrap();
    assert_eq!(refund.amount, Decimal::new(-20_000, 2));
    assert!(refund.is_refund_record());

    let original = payments.get_payment(payment.id).await.unwrap();
    assert_eq!(original.status, PaymentStatus::Completed);

    let fresh = bookings.get_booking(booking.id).await.unwrap();
    assert_eq!(fresh.paid_amount, Decimal::new(100_000, 2));

    // Reembolsar el resto sí marca el original como reembolsado
    payments
        .process_refund(payment.id, None, None, &actor)
        .await
        .unwrap();
    let original = payments.get_payment(payment.id).await.unwrap();
    assert_eq!(original.status, PaymentStatus::Refunded);

    let fresh = bookings.get_booking(booking.id).await.unwrap();
    assert_eq!(fresh.paid_amount, Decimal::ZERO);
}

#[tokio::test]
async fn overpayment_is_rejected_before_touching_the_booking() {
    let Some(pool) = test_pool().await else { return };
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let bookings = BookingService::new(pool.clone(), dispatcher.clone());
    let actor = Actor::System;

    let customer_id = seed_customer(&pool).await;
    let booking = bookings
        .create_booking(booking_request(customer_id, Decimal::new(50_000, 2)), &actor)
        .await
        .unwrap();

    let err = bookings
        .process_payment(
            booking.id,
            CreatePaymentRequest {
                booking_id: booking.id,
                customer_id,
                amount: Decimal::new(60_000, 2),
                currency: "EUR".into(),
                payment_method: PaymentMethod::Cash,
                transaction_id: None,
                notes: None,
            },
            &actor,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let fresh = bookings.get_booking(booking.id).await.unwrap();
    assert_eq!(fresh.paid_amount, Decimal::ZERO);
}

#[tokio::test]
async fn quote_converts_once_and_only_once() {
    let Some(pool) = test_pool().await else { return };
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let quotes = QuoteService::new(pool.clone(), dispatcher.clone());
    let actor = Actor::System;

    let customer_id = seed_customer(&pool).await;
    let quote = quotes
        .create_quote(
            CreateQuoteRequest {
                customer_id,
                route_id: None,
                vehicle_details: VehicleDetails {
                    make: "Toyota".into(),
                    model: "Corolla".into(),
                    year: 2021,
                    color: None,
                },
                base_price: Decimal::new(150_000, 2),
                additional_fees: vec![],
                currency: "EUR".into(),
                valid_until: None,
                notes: None,
            },
            &actor,
        )
        .await
        .unwrap();
    assert!(quote.quote_reference.starts_with("QT"));
    assert_eq!(quote.status, QuoteStatus::Pending);
    assert_eq!(quote.total_amount, Decimal::new(150_000, 2));

    // No se puede convertir sin aprobar antes
    let err = quotes.convert_quote_to_booking(quote.id, &actor).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition { entity: "quote", .. }));

    let quote = quotes.approve_quote(quote.id, None, &actor).await.unwrap();
    assert_eq!(quote.status, QuoteStatus::Approved);

    let booking = quotes.convert_quote_to_booking(quote.id, &actor).await.unwrap();
    assert_eq!(booking.quote_id, Some(quote.id));
    assert_eq!(booking.total_amount, quote.total_amount);

    // Segunda conversión rechazada: la cotización ya quedó convertida
    let err = quotes.convert_quote_to_booking(quote.id, &actor).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::InvalidTransition { entity: "quote", .. } | AppError::Conflict(_)
    ));
}

#[tokio::test]
async fn expiry_sweep_only_touches_open_overdue_quotes() {
    let Some(pool) = test_pool().await else { return };
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let quotes = QuoteService::new(pool.clone(), dispatcher.clone());
    let actor = Actor::System;

    let customer_id = seed_customer(&pool).await;
    let open_quote = quotes
        .create_quote(
            CreateQuoteRequest {
                customer_id,
                route_id: None,
                vehicle_details: VehicleDetails {
                    make: "Renault".into(),
                    model: "Clio".into(),
                    year: 2019,
                    color: Some("red".into()),
                },
                base_price: Decimal::new(90_000, 2),
                additional_fees: vec![],
                currency: "EUR".into(),
                valid_until: Some(Utc::now().date_naive() + Duration::days(10)),
                notes: None,
            },
            &actor,
        )
        .await
        .unwrap();

    let expired = quotes.expire_due_quotes(&actor).await.unwrap();
    assert!(expired.iter().all(|quote| quote.id != open_quote.id));

    let still_open = quotes.get_quote(open_quote.id).await.unwrap();
    assert_eq!(still_open.status, QuoteStatus::Pending);
}

#[tokio::test]
async fn cancelling_a_booking_delays_its_shipment() {
    let Some(pool) = test_pool().await else { return };
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let bookings = BookingService::new(pool.clone(), dispatcher.clone());
    let shipments = ShipmentService::new(pool.clone(), dispatcher.clone());
    let actor = Actor::System;

    let customer_id = seed_customer(&pool).await;
    let booking = bookings
        .create_booking(booking_request(customer_id, Decimal::new(80_000, 2)), &actor)
        .await
        .unwrap();
    let booking = bookings
        .update_booking_status(booking.id, BookingStatus::Confirmed, None, &actor)
        .await
        .unwrap();
    let shipment = shipments
        .create_shipment(
            CreateShipmentRequest {
                booking_id: booking.id,
                carrier_name: None,
                vessel_name: None,
                container_number: None,
                departure_port: None,
                arrival_port: None,
                departure_date: None,
                estimated_arrival: None,
            },
            &actor,
        )
        .await
        .unwrap();

    bookings
        .update_booking_status(booking.id, BookingStatus::Cancelled, Some("customer withdrew".into()), &actor)
        .await
        .unwrap();

    let shipment = shipments.get_shipment(shipment.id).await.unwrap();
    assert_eq!(shipment.status, ShipmentStatus::Delayed);
    assert!(shipment
        .latest_tracking_update()
        .map(|update| update.status == "delayed")
        .unwrap_or(false));
}

#[tokio::test]
async fn every_mutation_leaves_an_audit_entry() {
    let Some(pool) = test_pool().await else { return };
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let bookings = BookingService::new(pool.clone(), dispatcher.clone());
    let activity = ActivityService::new(pool.clone());
    let user = Actor::User(Uuid::new_v4());

    let customer_id = seed_customer(&pool).await;
    let booking = bookings
        .create_booking(booking_request(customer_id, Decimal::new(30_000, 2)), &user)
        .await
        .unwrap();
    bookings
        .update_booking_status(booking.id, BookingStatus::Confirmed, None, &user)
        .await
        .unwrap();

    let history = activity.history_for("booking", booking.id).await.unwrap();
    let actions: Vec<&str> = history.iter().map(|entry| entry.action.as_str()).collect();
    assert_eq!(actions, vec!["booking.created", "booking.status_changed"]);
    assert!(history.iter().all(|entry| entry.actor_id == user.id()));
}

#[tokio::test]
async fn booking_update_rejects_delivery_before_pickup() {
    let Some(pool) = test_pool().await else { return };
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let bookings = BookingService::new(pool.clone(), dispatcher);
    let actor = Actor::System;

    let customer_id = seed_customer(&pool).await;
    let booking = bookings
        .create_booking(booking_request(customer_id, Decimal::new(40_000, 2)), &actor)
        .await
        .unwrap();

    let err = bookings
        .update_booking(
            booking.id,
            UpdateBookingRequest {
                pickup_date: NaiveDate::from_ymd_opt(2026, 9, 10),
                delivery_date: NaiveDate::from_ymd_opt(2026, 9, 1),
                ..Default::default()
            },
            &actor,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    // También contra una fecha ya persistida, no solo entre las nuevas
    bookings
        .update_booking(
            booking.id,
            UpdateBookingRequest {
                pickup_date: NaiveDate::from_ymd_opt(2026, 9, 10),
                ..Default::default()
            },
            &actor,
        )
        .await
        .unwrap();
    let err = bookings
        .update_booking(
            booking.id,
            UpdateBookingRequest {
                delivery_date: NaiveDate::from_ymd_opt(2026, 9, 1),
                ..Default::default()
            },
            &actor,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let fresh = bookings.get_booking(booking.id).await.unwrap();
    assert_eq!(fresh.delivery_date, None);
}

#[tokio::test]
async fn second_shipment_for_a_booking_is_rejected_without_side_effects() {
    let Some(pool) = test_pool().await else { return };
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let bookings = BookingService::new(pool.clone(), dispatcher.clone());
    let shipments = ShipmentService::new(pool.clone(), dispatcher.clone());
    let activity = ActivityService::new(pool.clone());
    let actor = Actor::System;

    let customer_id = seed_customer(&pool).await;
    let booking = bookings
        .create_booking(booking_request(customer_id, Decimal::new(70_000, 2)), &actor)
        .await
        .unwrap();
    let booking = bookings
        .update_booking_status(booking.id, BookingStatus::Confirmed, None, &actor)
        .await
        .unwrap();

    let request = CreateShipmentRequest {
        booking_id: booking.id,
        carrier_name: None,
        vessel_name: None,
        container_number: None,
        departure_port: None,
        arrival_port: None,
        departure_date: None,
        estimated_arrival: None,
    };
    let first = shipments.create_shipment(request.clone(), &actor).await.unwrap();

    let err = shipments.create_shipment(request, &actor).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    // Sin segunda fila y sin segunda entrada de auditoría para esta reserva
    let found = shipments.get_tracking(&first.tracking_number).await.unwrap();
    assert_eq!(found.id, first.id);

    let created_entries = activity
        .search(&ActivityLogFilter {
            action: Some("shipment.created".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    let for_this_booking = created_entries
        .iter()
        .filter(|entry| {
            entry.changes.0["booking_reference"] == booking.booking_reference.as_str()
        })
        .count();
    assert_eq!(for_this_booking, 1);
}

#[tokio::test]
async fn fully_paid_event_fires_exactly_once() {
    let Some(pool) = test_pool().await else { return };
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let bookings = BookingService::new(pool.clone(), dispatcher.clone());
    let payments = PaymentService::new(pool.clone(), dispatcher.clone());
    let actor = Actor::System;

    let customer_id = seed_customer(&pool).await;
    let booking = bookings
        .create_booking(booking_request(customer_id, Decimal::new(200_000, 2)), &actor)
        .await
        .unwrap();

    for amount in [Decimal::new(120_000, 2), Decimal::new(80_000, 2)] {
        let payment = payments
            .create_payment(
                CreatePaymentRequest {
                    booking_id: booking.id,
                    customer_id,
                    amount,
                    currency: "EUR".into(),
                    payment_method: PaymentMethod::BankTransfer,
                    transaction_id: None,
                    notes: None,
                },
                &actor,
            )
            .await
            .unwrap();
        payments.complete_payment(payment.id, None, &actor).await.unwrap();
    }

    let fresh = bookings.get_booking(booking.id).await.unwrap();
    assert_eq!(fresh.paid_amount, fresh.total_amount);

    let fully_paid_events = dispatcher
        .take_events()
        .into_iter()
        .filter(|event| event.event == "booking.fully_paid")
        .count();
    assert_eq!(fully_paid_events, 1);
}

#[tokio::test]
async fn delivered_cascade_on_ineligible_booking_surfaces_an_error() {
    let Some(pool) = test_pool().await else { return };
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let bookings = BookingService::new(pool.clone(), dispatcher);
    let actor = Actor::System;

    let customer_id = seed_customer(&pool).await;
    let booking = bookings
        .create_booking(booking_request(customer_id, Decimal::new(10_000, 2)), &actor)
        .await
        .unwrap();

    // Embarque entregado apuntando a una reserva que aún está pendiente:
    // el sincronizador debe fallar, no saltarse la regla en silencio.
    let now = Utc::now();
    let shipment = Shipment {
        id: Uuid::new_v4(),
        tracking_number: "TRK000000000000".to_string(),
        booking_id: booking.id,
        status: ShipmentStatus::Delivered,
        carrier_name: None,
        vessel_name: None,
        container_number: None,
        current_location: None,
        departure_port: None,
        arrival_port: None,
        departure_date: None,
        estimated_arrival: None,
        actual_arrival: Some(now.date_naive()),
        tracking_updates: Json(Vec::new()),
        created_at: now,
        updated_at: now,
    };

    let mut tx = pool.begin().await.unwrap();
    let err = CascadeService::on_shipment_delivered(&mut tx, &actor, &shipment)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition { entity: "booking", .. }));
    drop(tx);

    let fresh = bookings.get_booking(booking.id).await.unwrap();
    assert_eq!(fresh.status, BookingStatus::Pending);
}
