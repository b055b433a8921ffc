//! Configuración del núcleo
//!
//! Solo configuración de base de datos: el núcleo no tiene superficie HTTP
//! ni integraciones externas propias.

pub mod database;

pub use database::DatabaseConfig;
