//! Modelos del sistema
//!
//! Este módulo contiene todos los modelos de datos que mapean exactamente
//! al schema PostgreSQL, más las máquinas de estado por entidad y el actor
//! explícito de cada operación.

pub mod activity_log;
pub mod actor;
pub mod booking;
pub mod customer;
pub mod payment;
pub mod quote;
pub mod reference;
pub mod shipment;

pub use activity_log::{ActivityLog, ActivityLogFilter};
pub use actor::Actor;
pub use booking::{Booking, BookingStatus, CreateBookingRequest, PaymentProgress, UpdateBookingRequest};
pub use customer::Customer;
pub use payment::{CreatePaymentRequest, Payment, PaymentMethod, PaymentStatus};
pub use quote::{CreateQuoteRequest, Quote, QuoteFee, QuoteStatus, VehicleDetails};
pub use reference::EntityKind;
pub use shipment::{CreateShipmentRequest, Shipment, ShipmentStatus, TrackingUpdate};
