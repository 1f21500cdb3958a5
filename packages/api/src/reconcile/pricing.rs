//! Settlement arithmetic: currency normalisation, commission and renewal split.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Platform settlement currency code
pub const SETTLEMENT_CURRENCY: &str = "KZ";

/// Platform fee in basis points (8.99 %)
pub const PLATFORM_FEE_BPS: i64 = 899;
/// Seller share in basis points (91.01 %)
pub const SELLER_SHARE_BPS: i64 = 10_000 - PLATFORM_FEE_BPS;

const BUILTIN_RATES: &[(&str, f64)] = &[
    ("EUR", 1100.0),
    ("USD", 1000.0),
    ("GBP", 1300.0),
    ("MZN", 14.3),
    ("BRL", 180.0),
];

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PricingError {
    #[error("Invalid exchange rate table: {0}")]
    InvalidRates(String),
    #[error("Amount {0} cannot be split")]
    InvalidAmount(i64),
}

pub fn is_settlement_currency(currency: &str) -> bool {
    matches!(currency.to_uppercase().as_str(), "KZ" | "AOA")
}

/// Versioned conversion table into the settlement currency
#[derive(Clone, Debug, PartialEq)]
pub struct ExchangeRates {
    pub version: String,
    pub loaded_at: DateTime<Utc>,
    rates: HashMap<String, f64>,
}

impl Default for ExchangeRates {
    fn default() -> Self {
        Self::new(
            "builtin-v1",
            BUILTIN_RATES.iter().map(|(c, r)| (c.to_string(), *r)),
        )
    }
}

impl ExchangeRates {
    pub fn new(version: impl Into<String>, rates: impl IntoIterator<Item = (String, f64)>) -> Self {
        Self {
            version: version.into(),
            loaded_at: Utc::now(),
            rates: rates
                .into_iter()
                .map(|(c, r)| (c.to_uppercase(), r))
                .collect(),
        }
    }

    /// Parse a JSON object such as `{"EUR": 1100, "USD": 1000}`.
    pub fn from_json(version: impl Into<String>, json: &str) -> Result<Self, PricingError> {
        let rates: HashMap<String, f64> =
            serde_json::from_str(json).map_err(|e| PricingError::InvalidRates(e.to_string()))?;

        if let Some((currency, rate)) = rates.iter().find(|(_, r)| !r.is_finite() || **r <= 0.0) {
            return Err(PricingError::InvalidRates(format!(
                "rate for {} must be positive, got {}",
                currency, rate
            )));
        }

        Ok(Self::new(version, rates))
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn rate(&self, currency: &str) -> Option<f64> {
        if is_settlement_currency(currency) {
            return Some(1.0);
        }
        self.rates.get(&currency.to_uppercase()).copied()
    }

    /// Convert a major-unit amount into whole settlement units.
    pub fn to_settlement(&self, amount: f64, currency: &str) -> Conversion {
        let rate = match self.rate(currency) {
            Some(rate) => rate,
            None => {
                tracing::warn!(
                    currency = %currency,
                    rates_version = %self.version,
                    "No exchange rate for currency, converting at 1"
                );
                1.0
            }
        };

        Conversion {
            amount: (amount * rate).round() as i64,
            rate,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Conversion {
    pub amount: i64,
    pub rate: f64,
}

/// Parse a formatted list price like `"5,000 KZ"` by keeping digits and dots.
pub fn parse_list_price(price: &str) -> Option<f64> {
    let cleaned: String = price
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    cleaned.parse::<f64>().ok()
}

/// Seller's share of `base`.
pub fn seller_commission(base: f64) -> f64 {
    base * SELLER_SHARE_BPS as f64 / 10_000.0
}

pub fn minor_to_major(amount: i64) -> f64 {
    amount as f64 / 100.0
}

/// Which price the buyer saw at checkout
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PricingFlow {
    /// Seller-defined price in the buyer's currency; commission follows what was charged
    Custom,
    /// Default price converted for display; commission follows the list price
    ConvertedDefault { list_price: Option<f64> },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrderSettlementAmounts {
    pub amount_in_settlement: i64,
    pub commission_base: f64,
    pub seller_commission: f64,
    pub rate: f64,
}

pub fn settle_order(
    rates: &ExchangeRates,
    charged_minor: i64,
    charged_currency: &str,
    flow: PricingFlow,
) -> OrderSettlementAmounts {
    let conversion = rates.to_settlement(minor_to_major(charged_minor), charged_currency);

    let commission_base = match flow {
        PricingFlow::Custom => conversion.amount as f64,
        PricingFlow::ConvertedDefault {
            list_price: Some(price),
        } => price,
        PricingFlow::ConvertedDefault { list_price: None } => {
            tracing::warn!("List price unavailable, using charged amount as commission base");
            conversion.amount as f64
        }
    };

    OrderSettlementAmounts {
        amount_in_settlement: conversion.amount,
        commission_base,
        seller_commission: seller_commission(commission_base),
        rate: conversion.rate,
    }
}

/// Renewal gross split, all minor units. `seller_net + platform_fee == gross` always.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenewalSplit {
    pub gross: i64,
    pub platform_fee: i64,
    pub seller_net: i64,
}

/// Split a non-negative `gross`; the fee rounds half up.
pub fn split_renewal(gross: i64) -> Result<RenewalSplit, PricingError> {
    if gross < 0 {
        return Err(PricingError::InvalidAmount(gross));
    }
    let platform_fee = gross
        .checked_mul(PLATFORM_FEE_BPS)
        .and_then(|scaled| scaled.checked_add(5_000))
        .map(|scaled| scaled / 10_000)
        .ok_or(PricingError::InvalidAmount(gross))?;

    Ok(RenewalSplit {
        gross,
        platform_fee,
        seller_net: gross - platform_fee,
    })
}
