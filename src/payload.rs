//! Shared payload-parsing helpers used by handler implementations (§4.7).
//!
//! The payload is a string-keyed JSON map (§4.1, §9); these helpers centralize
//! the small amount of type coercion every handler needs so individual
//! handlers stay focused on their own debit/credit shape.

use std::str::FromStr;

use uuid::Uuid;

use crate::{
    amount::{Amount, UsdRate},
    handler_registry::Payload,
};

pub fn get_str<'a>(payload: &'a Payload, key: &str) -> Result<&'a str, String> {
    payload
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("missing or non-string field {key:?}"))
}

pub fn get_str_opt<'a>(payload: &'a Payload, key: &str) -> Option<&'a str> {
    payload.get(key).and_then(|v| v.as_str())
}

pub fn get_uuid(payload: &Payload, key: &str) -> Result<Uuid, String> {
    let raw = get_str(payload, key)?;
    Uuid::from_str(raw).map_err(|e| format!("field {key:?} is not a valid uuid: {e}"))
}

pub fn get_amount(payload: &Payload, key: &str) -> Result<Amount, String> {
    let raw = get_str(payload, key)?;
    Amount::from_str(raw).map_err(|e| format!("field {key:?} is not a valid amount: {e}"))
}

pub fn get_usd_rate_opt(payload: &Payload, key: &str) -> Result<Option<UsdRate>, String> {
    match get_str_opt(payload, key) {
        None => Ok(None),
        Some(raw) => UsdRate::from_str(raw)
            .map(Some)
            .map_err(|e| format!("field {key:?} is not a valid usd rate: {e}")),
    }
}

pub fn get_i64(payload: &Payload, key: &str) -> Result<i64, String> {
    payload
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| format!("missing or non-integer field {key:?}"))
}

/// Asset decimals for the §3 `usd_value = amount * usd_rate / 10^decimals`
/// formula. Absent for manual callers that never populate `decimals`; `0`
/// then leaves the formula's denominator at `10^0`, i.e. unscaled.
pub fn get_decimals(payload: &Payload, key: &str) -> u32 {
    payload
        .get(key)
        .and_then(|v| v.as_u64())
        .map(|v| v as u32)
        .unwrap_or(0)
}
