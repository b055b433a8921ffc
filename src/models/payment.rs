//! Modelo de Payment (pago)
//!
//! Los montos llevan signo: un reembolso es un registro nuevo con monto
//! negativo que referencia al pago original; la historia nunca se muta.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Ventana de reembolso en días desde la fecha de pago
pub const REFUND_WINDOW_DAYS: i64 = 90;

/// Estado del ciclo de vida de un pago
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
    Cancelled,
}

impl PaymentStatus {
    /// Tabla de transiciones autoritativa
    pub fn allowed_transitions(self) -> &'static [PaymentStatus] {
        match self {
            PaymentStatus::Pending => &[
                PaymentStatus::Completed,
                PaymentStatus::Failed,
                PaymentStatus::Cancelled,
            ],
            PaymentStatus::Completed => &[PaymentStatus::Refunded],
            PaymentStatus::Failed => &[PaymentStatus::Pending, PaymentStatus::Cancelled],
            PaymentStatus::Refunded => &[],
            PaymentStatus::Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, target: PaymentStatus) -> bool {
        self.allowed_transitions().contains(&target)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Método de pago
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    BankTransfer,
    MobileMoney,
    CreditCard,
    Cash,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::MobileMoney => "mobile_money",
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::Cash => "cash",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pago - mapea exactamente a la tabla payments
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub payment_reference: String,
    pub booking_id: Uuid,
    pub customer_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub transaction_id: Option<String>,
    pub status: PaymentStatus,
    pub payment_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub metadata: Json<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Solo un pago completado, dentro de la ventana de 90 días, es
    /// reembolsable. Un registro de reembolso nunca se reembolsa a su vez.
    pub fn is_refundable(&self, now: DateTime<Utc>) -> bool {
        self.status == PaymentStatus::Completed
            && !self.is_refund_record()
            && self
                .payment_date
                .map(|date| date + Duration::days(REFUND_WINDOW_DAYS) > now)
                .unwrap_or(false)
    }

    pub fn is_refund_record(&self) -> bool {
        self.amount < Decimal::ZERO
    }
}

/// Request para crear un nuevo pago
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePaymentRequest {
    pub booking_id: Uuid,
    pub customer_id: Uuid,
    pub amount: Decimal,

    #[validate(length(equal = 3))]
    pub currency: String,

    pub payment_method: PaymentMethod,

    #[validate(length(max = 100))]
    pub transaction_id: Option<String>,

    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}
