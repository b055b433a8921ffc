//! Números de referencia legibles
//!
//! Formato determinista `PREFIJO + AÑO + MES + secuencia con ceros`:
//! BK2026080001, QT2026080001, PAY202608000001, TRK202608000001.
//! Cada tipo de entidad tiene su propio espacio de secuencia, incluso dentro
//! del mismo periodo.

use chrono::{DateTime, Datelike, Utc};

/// Tipo de entidad que consume referencias
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Booking,
    Quote,
    Payment,
    Shipment,
}

impl EntityKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            EntityKind::Booking => "BK",
            EntityKind::Quote => "QT",
            EntityKind::Payment => "PAY",
            EntityKind::Shipment => "TRK",
        }
    }

    /// Ancho de la secuencia: 4 dígitos para booking/quote, 6 para payment/shipment
    pub fn pad_width(&self) -> usize {
        match self {
            EntityKind::Booking | EntityKind::Quote => 4,
            EntityKind::Payment | EntityKind::Shipment => 6,
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Booking => "bookings",
            EntityKind::Quote => "quotes",
            EntityKind::Payment => "payments",
            EntityKind::Shipment => "shipments",
        }
    }

    pub fn reference_column(&self) -> &'static str {
        match self {
            EntityKind::Booking => "booking_reference",
            EntityKind::Quote => "quote_reference",
            EntityKind::Payment => "payment_reference",
            EntityKind::Shipment => "tracking_number",
        }
    }

    pub fn subject_type(&self) -> &'static str {
        match self {
            EntityKind::Booking => "booking",
            EntityKind::Quote => "quote",
            EntityKind::Payment => "payment",
            EntityKind::Shipment => "shipment",
        }
    }
}

/// Prefijo de periodo `PREFIJO + YYYY + MM` para el mes dado
pub fn period_prefix(kind: EntityKind, now: DateTime<Utc>) -> String {
    format!("{}{}{:02}", kind.prefix(), now.year(), now.month())
}

/// Construir la referencia candidata para una secuencia dentro del periodo
pub fn format_reference(kind: EntityKind, now: DateTime<Utc>, sequence: u32) -> String {
    format!(
        "{}{:0width$}",
        period_prefix(kind, now),
        sequence,
        width = kind.pad_width()
    )
}

/// Extraer la secuencia de la última referencia emitida en el periodo.
/// Devuelve None si el sufijo no es numérico (p. ej. una referencia de
/// fallback de ancho distinto quedó primera en el orden).
pub fn parse_sequence(kind: EntityKind, reference: &str) -> Option<u32> {
    let expected_len = period_prefix_len(kind) + kind.pad_width();
    if reference.len() != expected_len {
        return None;
    }
    reference[period_prefix_len(kind)..].parse().ok()
}

fn period_prefix_len(kind: EntityKind) -> usize {
    // PREFIJO + YYYY + MM
    kind.prefix().len() + 4 + 2
}

/// Referencia degradada derivada del reloj cuando los reintentos acotados se
/// agotan. Un dígito más ancha que la secuencia normal, así nunca colisiona
/// con el espacio secuencial ni envenena la siguiente lectura bloqueada.
pub fn fallback_reference(kind: EntityKind, now: DateTime<Utc>, jitter: u32) -> String {
    let width = kind.pad_width() + 1;
    let modulus = 10u64.pow(width as u32);
    let micros = now.timestamp_micros().unsigned_abs();
    let digits = (micros.wrapping_add(jitter as u64)) % modulus;
    format!(
        "{}{:0width$}",
        period_prefix(kind, now),
        digits,
        width = width
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn august() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn booking_references_use_four_digit_sequences() {
        assert_eq!(format_reference(EntityKind::Booking, august(), 1), "BK2026080001");
        assert_eq!(format_reference(EntityKind::Quote, august(), 42), "QT2026080042");
    }

    #[test]
    fn payment_and_shipment_use_six_digit_sequences() {
        assert_eq!(
            format_reference(EntityKind::Payment, august(), 1),
            "PAY202608000001"
        );
        assert_eq!(
            format_reference(EntityKind::Shipment, august(), 123456),
            "TRK202608123456"
        );
    }

    #[test]
    fn parse_sequence_roundtrips_formatted_references() {
        for kind in [
            EntityKind::Booking,
            EntityKind::Quote,
            EntityKind::Payment,
            EntityKind::Shipment,
        ] {
            let reference = format_reference(kind, august(), 37);
            assert_eq!(parse_sequence(kind, &reference), Some(37));
        }
    }

    #[test]
    fn parse_sequence_rejects_fallback_width_references() {
        // Una referencia de fallback es un dígito más ancha y no debe
        // interpretarse como última secuencia.
        let fallback = fallback_reference(EntityKind::Booking, august(), 0);
        assert_eq!(parse_sequence(EntityKind::Booking, &fallback), None);
    }

    #[test]
    fn fallback_reference_stays_in_period_namespace() {
        let reference = fallback_reference(EntityKind::Payment, august(), 7);
        assert!(reference.starts_with("PAY202608"));
        assert_eq!(reference.len(), "PAY202608".len() + 7);
    }

    #[test]
    fn entity_kinds_never_share_a_prefix() {
        let prefixes = [
            EntityKind::Booking.prefix(),
            EntityKind::Quote.prefix(),
            EntityKind::Payment.prefix(),
            EntityKind::Shipment.prefix(),
        ];
        for (i, a) in prefixes.iter().enumerate() {
            for (j, b) in prefixes.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b);
                }
            }
        }
    }
}
