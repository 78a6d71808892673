//! Bid pricing.
//!
//! All amounts are held in euro cents (1 € = 100 cents) so that totals are
//! exact; the wire format stays a decimal euro amount.
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::models::bidmodel::{BidTotals, LineItem};

pub const TVA_PERCENT: i64 = 10;
pub const DEPOSIT_PERCENT: i64 = 30;
pub const COMMISSION_PERCENT: i64 = 7;

/// Client totals may differ from ours by at most one cent.
pub const TOTALS_TOLERANCE_CENTS: i64 = 1;

pub const MAX_QUANTITY: f64 = 1_000_000.0;
pub const MAX_UNIT_PRICE_CENTS: i64 = 1_000_000_000;

#[derive(Debug, Error, Clone, PartialEq)]
#[error("bid amounts are too large to price")]
pub struct AmountOverflow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    pub fn from_euros(euros: f64) -> Self {
        Money(euros_to_cents(euros))
    }

    pub fn cents(&self) -> i64 {
        self.0
    }

    pub fn euros(&self) -> f64 {
        cents_to_euros(self.0)
    }

    /// `percent` % of this amount, rounded half-up to the cent.
    pub fn percent(&self, percent: i64) -> Result<Money, AmountOverflow> {
        let scaled = self.0.checked_mul(percent).ok_or(AmountOverflow)?;
        Ok(Money(div_round_half_up(scaled, 100)))
    }

    pub fn checked_add(self, rhs: Money) -> Result<Money, AmountOverflow> {
        self.0.checked_add(rhs.0).map(Money).ok_or(AmountOverflow)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.euros())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let euros = f64::deserialize(deserializer)?;
        if !euros.is_finite() {
            return Err(serde::de::Error::custom("amount must be a finite number"));
        }
        Ok(Money::from_euros(euros))
    }
}

pub fn euros_to_cents(euros: f64) -> i64 {
    (euros * 100.0).round() as i64
}

pub fn cents_to_euros(cents: i64) -> f64 {
    cents as f64 / 100.0
}

fn div_round_half_up(numerator: i64, denominator: i64) -> i64 {
    if numerator >= 0 {
        (numerator + denominator / 2) / denominator
    } else {
        -((-numerator + denominator / 2) / denominator)
    }
}

pub fn line_total(item: &LineItem) -> Result<Money, AmountOverflow> {
    let cents = (item.quantity * item.unit_price.cents() as f64).round();
    // `as` saturates, so range-check before converting.
    if !cents.is_finite() || cents.abs() >= i64::MAX as f64 {
        return Err(AmountOverflow);
    }
    Ok(Money(cents as i64))
}

/// Totals for a bid. Always computed here; whatever the client sent is only
/// compared against the result.
pub fn compute_totals(
    labor: &LineItem,
    consumables: &[LineItem],
    non_consumables: &[LineItem],
) -> Result<BidTotals, AmountOverflow> {
    let mut subtotal_ht = Money::ZERO;
    for item in std::iter::once(labor).chain(consumables).chain(non_consumables) {
        subtotal_ht = subtotal_ht.checked_add(line_total(item)?)?;
    }
    let tva = subtotal_ht.percent(TVA_PERCENT)?;
    let total_ttc = subtotal_ht.checked_add(tva)?;
    let deposit = total_ttc.percent(DEPOSIT_PERCENT)?;
    let platform_commission = deposit.percent(COMMISSION_PERCENT)?;

    Ok(BidTotals {
        subtotal_ht,
        tva,
        total_ttc,
        deposit,
        platform_commission,
    })
}

/// Totals as the client computed them. Any field may be omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientTotals {
    #[serde(rename = "subtotalHT")]
    pub subtotal_ht: Option<f64>,
    pub tva: Option<f64>,
    #[serde(rename = "totalTTC")]
    pub total_ttc: Option<f64>,
    pub deposit: Option<f64>,
    pub platform_commission: Option<f64>,
}

#[derive(Debug, Error, Clone, PartialEq)]
#[error("stale totals: client sent {field} = {client}, server computed {computed}")]
pub struct StaleTotals {
    pub field: &'static str,
    pub client: f64,
    pub computed: Money,
}

pub fn verify_client_totals(client: &ClientTotals, computed: &BidTotals) -> Result<(), StaleTotals> {
    let pairs = [
        ("subtotalHT", client.subtotal_ht, computed.subtotal_ht),
        ("tva", client.tva, computed.tva),
        ("totalTTC", client.total_ttc, computed.total_ttc),
        ("deposit", client.deposit, computed.deposit),
        ("platformCommission", client.platform_commission, computed.platform_commission),
    ];

    for (field, sent, ours) in pairs {
        let Some(sent) = sent else { continue };
        let drift = (euros_to_cents(sent) - ours.cents()).abs();
        if !sent.is_finite() || drift > TOTALS_TOLERANCE_CENTS {
            return Err(StaleTotals { field, client: sent, computed: ours });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(quantity: f64, unit_price: f64) -> LineItem {
        LineItem {
            description: "item".to_string(),
            quantity,
            unit_price: Money::from_euros(unit_price),
        }
    }

    #[test]
    fn test_marseille_totals() {
        let totals = compute_totals(&item(10.0, 50.0), &[item(5.0, 20.0)], &[]).unwrap();
        assert_eq!(totals.subtotal_ht, Money::from_cents(60_000));
        assert_eq!(totals.tva, Money::from_cents(6_000));
        assert_eq!(totals.total_ttc, Money::from_cents(66_000));
        assert_eq!(totals.deposit, Money::from_cents(19_800));
        assert_eq!(totals.platform_commission, Money::from_cents(1_386));
    }

    #[test]
    fn test_total_is_subtotal_plus_ten_percent() {
        let totals = compute_totals(&item(3.0, 33.33), &[item(1.5, 12.99)], &[item(7.0, 0.19)]).unwrap();
        let subtotal = 9999 + 1949 + 133;
        assert_eq!(totals.subtotal_ht.cents(), subtotal);
        assert_eq!(totals.total_ttc.cents(), (subtotal as f64 * 1.10).round() as i64);
    }

    #[test]
    fn test_half_cent_rounds_up() {
        assert_eq!(Money::from_cents(5).percent(10), Ok(Money::from_cents(1)));
        assert_eq!(Money::from_cents(4).percent(10), Ok(Money::from_cents(0)));
    }

    #[test]
    fn test_money_wire_format() {
        let encoded = serde_json::to_value(Money::from_cents(1386)).unwrap();
        assert_eq!(encoded, serde_json::json!(13.86));
        let decoded: Money = serde_json::from_value(serde_json::json!(198.0)).unwrap();
        assert_eq!(decoded.cents(), 19_800);
        assert_eq!(Money::from_cents(66_000).to_string(), "660.00");
    }

    #[test]
    fn test_client_totals_within_a_cent_pass() {
        let totals = compute_totals(&item(10.0, 50.0), &[item(5.0, 20.0)], &[]).unwrap();
        let client = ClientTotals {
            total_ttc: Some(660.01),
            deposit: Some(198.0),
            ..Default::default()
        };
        assert!(verify_client_totals(&client, &totals).is_ok());
    }

    #[test]
    fn test_client_totals_drift_is_reported() {
        let totals = compute_totals(&item(10.0, 50.0), &[item(5.0, 20.0)], &[]).unwrap();
        let client = ClientTotals {
            total_ttc: Some(700.0),
            ..Default::default()
        };
        let stale = verify_client_totals(&client, &totals).unwrap_err();
        assert_eq!(stale.field, "totalTTC");
        assert_eq!(stale.computed, Money::from_cents(66_000));
    }

    #[test]
    fn test_huge_lines_overflow_instead_of_wrapping() {
        assert_eq!(line_total(&item(1e10, 9_999_999.0)), Err(AmountOverflow));
        assert_eq!(
            compute_totals(&item(1e10, 9_999_999.0), &[], &[]),
            Err(AmountOverflow)
        );
        assert_eq!(Money::from_cents(i64::MAX).percent(10), Err(AmountOverflow));
        assert_eq!(
            Money::from_cents(i64::MAX).checked_add(Money::from_cents(1)),
            Err(AmountOverflow)
        );
    }

    #[test]
    fn test_largest_accepted_line_prices() {
        let max_unit = MAX_UNIT_PRICE_CENTS as f64 / 100.0;
        let totals = compute_totals(&item(MAX_QUANTITY, max_unit), &[], &[]).unwrap();
        assert_eq!(totals.subtotal_ht.cents(), 1_000_000_000_000_000);
    }
}
