//! Repositorios de acceso a datos
//!
//! Consultas sqlx crudas por entidad. Todas las operaciones reciben una
//! `&mut PgConnection` para poder componerse dentro de la única transacción
//! del workflow: el repositorio nunca abre ni cierra transacciones.

pub mod activity_log_repository;
pub mod booking_repository;
pub mod customer_repository;
pub mod payment_repository;
pub mod quote_repository;
pub mod shipment_repository;

pub use activity_log_repository::ActivityLogRepository;
pub use booking_repository::BookingRepository;
pub use customer_repository::CustomerRepository;
pub use payment_repository::PaymentRepository;
pub use quote_repository::QuoteRepository;
pub use shipment_repository::ShipmentRepository;
