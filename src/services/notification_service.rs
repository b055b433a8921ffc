//! Despacho de notificaciones de dominio
//!
//! Las notificaciones salen estrictamente después del commit y nunca hacen
//! fallar la operación: un fallo aquí se registra y se descarta.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

/// Evento emitido tras confirmar una operación de negocio
#[derive(Debug, Clone, Serialize)]
pub struct NotificationEvent {
    pub event: String,
    pub subject_type: &'static str,
    pub subject_id: Uuid,
    pub reference: String,
    pub payload: serde_json::Value,
}

impl NotificationEvent {
    pub fn new(
        event: impl Into<String>,
        subject_type: &'static str,
        subject_id: Uuid,
        reference: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event: event.into(),
            subject_type,
            subject_id,
            reference: reference.into(),
            payload,
        }
    }
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, event: NotificationEvent);
}

/// Despachador por defecto: traza estructurada, sin transporte externo
pub struct LoggingDispatcher;

#[async_trait]
impl NotificationDispatcher for LoggingDispatcher {
    async fn dispatch(&self, event: NotificationEvent) {
        info!(
            event = %event.event,
            subject_type = event.subject_type,
            subject_id = %event.subject_id,
            reference = %event.reference,
            "domain event dispatched"
        );
    }
}

/// Despachador de pruebas: acumula los eventos para inspeccionarlos
#[derive(Default)]
pub struct RecordingDispatcher {
    events: Mutex<Vec<NotificationEvent>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take_events(&self) -> Vec<NotificationEvent> {
        std::mem::take(&mut self.events.lock().unwrap())
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn dispatch(&self, event: NotificationEvent) {
        self.events.lock().unwrap().push(event);
    }
}
