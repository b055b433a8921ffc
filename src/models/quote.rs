//! Modelo de Quote (cotización)
//!
//! El total siempre se deriva de base_price + Σ fees en el servidor; el valor
//! que envíe el cliente no se persiste nunca tal cual.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Estado del ciclo de vida de una cotización
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Pending,
    Approved,
    Rejected,
    Converted,
    Expired,
}

impl QuoteStatus {
    /// pending→{approved,rejected}, approved→{converted}; cualquier estado no
    /// convertido puede expirar.
    pub fn allowed_transitions(self) -> &'static [QuoteStatus] {
        match self {
            QuoteStatus::Pending => &[
                QuoteStatus::Approved,
                QuoteStatus::Rejected,
                QuoteStatus::Expired,
            ],
            QuoteStatus::Approved => &[QuoteStatus::Converted, QuoteStatus::Expired],
            QuoteStatus::Rejected => &[QuoteStatus::Expired],
            QuoteStatus::Converted => &[],
            QuoteStatus::Expired => &[],
        }
    }

    pub fn can_transition_to(self, target: QuoteStatus) -> bool {
        self.allowed_transitions().contains(&target)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QuoteStatus::Pending => "pending",
            QuoteStatus::Approved => "approved",
            QuoteStatus::Rejected => "rejected",
            QuoteStatus::Converted => "converted",
            QuoteStatus::Expired => "expired",
        }
    }
}

impl std::fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descripción estructurada del vehículo cotizado
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleDetails {
    pub make: String,
    pub model: String,
    pub year: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl VehicleDetails {
    pub fn description(&self) -> String {
        match &self.color {
            Some(color) => format!("{} {} {} ({})", self.year, self.make, self.model, color),
            None => format!("{} {} {}", self.year, self.make, self.model),
        }
    }
}

/// Cargo adicional sobre el precio base
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteFee {
    pub name: String,
    pub amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Cotización - mapea exactamente a la tabla quotes
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Quote {
    pub id: Uuid,
    pub quote_reference: String,
    pub customer_id: Uuid,
    pub route_id: Option<Uuid>,
    pub vehicle_details: Json<VehicleDetails>,
    pub base_price: Decimal,
    pub additional_fees: Json<Vec<QuoteFee>>,
    pub total_amount: Decimal,
    pub currency: String,
    pub status: QuoteStatus,
    pub valid_until: NaiveDate,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quote {
    /// Una cotización convertida ya no cuenta como expirada
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.valid_until < today && self.status != QuoteStatus::Converted
    }

    pub fn is_valid(&self, today: NaiveDate) -> bool {
        self.valid_until >= today
            && matches!(self.status, QuoteStatus::Pending | QuoteStatus::Approved)
    }
}

/// Suma del precio base más todos los cargos adicionales
pub fn compute_total(base_price: Decimal, fees: &[QuoteFee]) -> Decimal {
    fees.iter().fold(base_price, |total, fee| total + fee.amount)
}

/// Request para crear una nueva cotización
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateQuoteRequest {
    pub customer_id: Uuid,
    pub route_id: Option<Uuid>,
    pub vehicle_details: VehicleDetails,
    pub base_price: Decimal,
    #[serde(default)]
    pub additional_fees: Vec<QuoteFee>,

    #[validate(length(equal = 3))]
    pub currency: String,

    /// Por defecto: 30 días desde la creación
    pub valid_until: Option<NaiveDate>,

    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_quote_can_be_approved_or_rejected() {
        assert!(QuoteStatus::Pending.can_transition_to(QuoteStatus::Approved));
        assert!(QuoteStatus::Pending.can_transition_to(QuoteStatus::Rejected));
        assert!(!QuoteStatus::Pending.can_transition_to(QuoteStatus::Converted));
    }

    #[test]
    fn only_approved_quotes_convert_and_conversion_is_final() {
        assert!(QuoteStatus::Approved.can_transition_to(QuoteStatus::Converted));
        assert!(QuoteStatus::Converted.is_terminal());
        assert!(!QuoteStatus::Converted.can_transition_to(QuoteStatus::Expired));
    }

    #[test]
    fn non_converted_states_can_expire() {
        assert!(QuoteStatus::Pending.can_transition_to(QuoteStatus::Expired));
        assert!(QuoteStatus::Approved.can_transition_to(QuoteStatus::Expired));
        assert!(QuoteStatus::Rejected.can_transition_to(QuoteStatus::Expired));
    }

    #[test]
    fn compute_total_sums_base_and_fees() {
        let fees = vec![
            QuoteFee {
                name: "insurance".to_string(),
                amount: Decimal::new(15000, 2),
                description: None,
            },
            QuoteFee {
                name: "customs".to_string(),
                amount: Decimal::new(25050, 2),
                description: Some("Import clearance".to_string()),
            },
        ];
        let total = compute_total(Decimal::new(100000, 2), &fees);
        assert_eq!(total, Decimal::new(140050, 2)); // 1400.50
    }

    #[test]
    fn compute_total_without_fees_is_base_price() {
        assert_eq!(
            compute_total(Decimal::new(99900, 2), &[]),
            Decimal::new(99900, 2)
        );
    }

    #[test]
    fn vehicle_description_includes_color_when_present() {
        let details = VehicleDetails {
            make: "Toyota".to_string(),
            model: "Land Cruiser".to_string(),
            year: 2023,
            color: Some("White".to_string()),
        };
        assert_eq!(details.description(), "2023 Toyota Land Cruiser (White)");
    }
}
