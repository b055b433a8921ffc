//! Núcleo de orquestación del ciclo de vida de envíos de vehículos
//!
//! Esta librería implementa el núcleo transaccional del sistema: las máquinas
//! de estado por entidad (Booking, Quote, Payment, Shipment), el generador de
//! números de referencia seguro bajo concurrencia, el registro de auditoría
//! inmutable y los servicios de workflow que combinan todo de forma atómica.
//!
//! No expone ningún endpoint HTTP: es una frontera de orquestación a nivel de
//! librería. La capa web, el almacenamiento de documentos y el envío real de
//! notificaciones son colaboradores externos.

pub mod config;
pub mod database;
pub mod models;
pub mod repositories;
pub mod services;
pub mod utils;

pub use utils::errors::{AppError, AppResult};
