//! Capa de servicios
//!
//! Cada operación de negocio abre una única transacción, compone los
//! repositorios dentro de ella y solo notifica después del commit. Las
//! transiciones de estado se validan contra las tablas de los modelos
//! antes de tocar la base de datos.

pub mod activity_service;
pub mod booking_service;
pub mod cascade_service;
pub mod notification_service;
pub mod payment_service;
pub mod quote_service;
pub mod reference_service;
pub mod shipment_service;

pub use activity_service::ActivityService;
pub use booking_service::BookingService;
pub use notification_service::{
    LoggingDispatcher, NotificationDispatcher, NotificationEvent, RecordingDispatcher,
};
pub use payment_service::PaymentService;
pub use quote_service::QuoteService;
pub use reference_service::ReferenceService;
pub use shipment_service::ShipmentService;
