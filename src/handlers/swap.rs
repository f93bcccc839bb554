//! `swap` handler (§4.7).
//!
//! Payload fields: `wallet_id`; `transfers_in` / `transfers_out`, each an
//! array of `{asset, amount, usd_rate?, decimals?}` (decimal strings;
//! `usd_rate` scale `10^8`; `decimals` an integer, `0` if absent), as
//! assembled by [`crate::processor`] for a `TRADE`/inferred-swap
//! decoded transaction. For each leg a clearing account `swap_clearing.
//! {asset}` absorbs the other side so every asset balances exactly in base
//! units without needing to match IN/OUT legs pairwise.
//!
//! Per the Open Question resolution recorded in `DESIGN.md`, a USD-value
//! mismatch between the IN and OUT legs (the providers disagree on price)
//! is recorded as a zero-amount informational entry against
//! `swap_residual.USD` — it never affects the base-unit balance invariant,
//! only the informational `usd_value` total.

use std::str::FromStr;

use crate::{
    amount::{Amount, UsdRate, UsdValue},
    handler_registry::{GeneratedEntry, Payload, TransactionHandler},
    handlers::codes,
    payload,
    types::{AccountType, EntrySide},
};

struct Leg {
    asset: String,
    amount: Amount,
    usd_rate: UsdRate,
    decimals: u32,
}

fn parse_legs(payload: &Payload, key: &str) -> Result<Vec<Leg>, String> {
    let raw = payload
        .get(key)
        .ok_or_else(|| format!("missing field {key:?}"))?
        .as_array()
        .ok_or_else(|| format!("field {key:?} must be an array"))?;

    let mut legs = Vec::with_capacity(raw.len());
    for (i, item) in raw.iter().enumerate() {
        let obj = item
            .as_object()
            .ok_or_else(|| format!("{key}[{i}] must be an object"))?;
        let asset = obj
            .get("asset")
            .and_then(|v| v.as_str())
            .ok_or_else(|| format!("{key}[{i}].asset missing"))?
            .to_string();
        let amount_str = obj
            .get("amount")
            .and_then(|v| v.as_str())
            .ok_or_else(|| format!("{key}[{i}].amount missing"))?;
        let amount = Amount::from_str(amount_str)
            .map_err(|e| format!("{key}[{i}].amount invalid: {e}"))?;
        let usd_rate = match obj.get("usd_rate").and_then(|v| v.as_str()) {
            Some(s) => UsdRate::from_str(s).map_err(|e| format!("{key}[{i}].usd_rate invalid: {e}"))?,
            None => UsdRate::zero(),
        };
        let decimals = obj
            .get("decimals")
            .and_then(|v| v.as_u64())
            .map(|v| v as u32)
            .unwrap_or(0);
        legs.push(Leg { asset, amount, usd_rate, decimals });
    }
    Ok(legs)
}

pub struct SwapHandler;

impl TransactionHandler for SwapHandler {
    fn validate(&self, payload: &Payload) -> Result<(), String> {
        payload::get_uuid(payload, "wallet_id")?;
        let ins = parse_legs(payload, "transfers_in")?;
        let outs = parse_legs(payload, "transfers_out")?;
        if ins.is_empty() && outs.is_empty() {
            return Err("swap requires at least one transfer leg".to_string());
        }
        Ok(())
    }

    fn generate_entries(&self, payload: &Payload) -> Result<Vec<GeneratedEntry>, String> {
        let wallet_id = payload::get_uuid(payload, "wallet_id")?;
        let ins = parse_legs(payload, "transfers_in")?;
        let outs = parse_legs(payload, "transfers_out")?;

        let mut entries = Vec::with_capacity(ins.len() * 2 + outs.len() * 2 + 1);
        let mut usd_in = UsdValue::zero();
        let mut usd_out = UsdValue::zero();

        for leg in &outs {
            let usd_value = leg.amount.usd_value(&leg.usd_rate, leg.decimals);
            usd_out = usd_out + usd_value.clone();
            entries.push(
                GeneratedEntry::new(
                    codes::wallet(wallet_id, &leg.asset),
                    AccountType::CryptoWallet,
                    EntrySide::Credit,
                    "swap",
                    leg.amount.clone(),
                    leg.asset.clone(),
                    leg.usd_rate.clone(),
                    usd_value.clone(),
                )
                .with_wallet(wallet_id),
            );
            entries.push(GeneratedEntry::new(
                codes::swap_clearing(&leg.asset),
                AccountType::Expense,
                EntrySide::Debit,
                "swap_clearing",
                leg.amount.clone(),
                leg.asset.clone(),
                leg.usd_rate.clone(),
                usd_value,
            ));
        }

        for leg in &ins {
            let usd_value = leg.amount.usd_value(&leg.usd_rate, leg.decimals);
            usd_in = usd_in + usd_value.clone();
            entries.push(
                GeneratedEntry::new(
                    codes::wallet(wallet_id, &leg.asset),
                    AccountType::CryptoWallet,
                    EntrySide::Debit,
                    "swap",
                    leg.amount.clone(),
                    leg.asset.clone(),
                    leg.usd_rate.clone(),
                    usd_value.clone(),
                )
                .with_wallet(wallet_id),
            );
            entries.push(GeneratedEntry::new(
                codes::swap_clearing(&leg.asset),
                AccountType::Expense,
                EntrySide::Credit,
                "swap_clearing",
                leg.amount.clone(),
                leg.asset.clone(),
                leg.usd_rate.clone(),
                usd_value,
            ));
        }

        if usd_in.0 != usd_out.0 {
            let (side, residual) = if usd_in.0 > usd_out.0 {
                (EntrySide::Credit, UsdValue(&usd_in.0 - &usd_out.0))
            } else {
                (EntrySide::Debit, UsdValue(&usd_out.0 - &usd_in.0))
            };
            entries.push(GeneratedEntry::new(
                codes::swap_residual("USD"),
                AccountType::Expense,
                side,
                "swap_residual",
                Amount::zero(),
                "USD",
                UsdRate::zero(),
                residual,
            ));
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn payload(wallet_id: Uuid, ins: serde_json::Value, outs: serde_json::Value) -> Payload {
        let mut map = HashMap::new();
        map.insert("wallet_id".to_string(), serde_json::json!(wallet_id.to_string()));
        map.insert("transfers_in".to_string(), ins);
        map.insert("transfers_out".to_string(), outs);
        map
    }

    #[test]
    fn swap_balances_each_asset_via_clearing() {
        let wallet_id = Uuid::new_v4();
        let p = payload(
            wallet_id,
            serde_json::json!([{"asset": "USDC", "amount": "1000000", "usd_rate": "100000000"}]),
            serde_json::json!([{"asset": "ETH", "amount": "500000000000000000", "usd_rate": "200000000000"}]),
        );
        let entries = SwapHandler.generate_entries(&p).unwrap();
        // 2 legs * 2 entries + possible residual.
        assert!(entries.len() >= 4);

        let mut debits: std::collections::HashMap<&str, Amount> = std::collections::HashMap::new();
        let mut credits: std::collections::HashMap<&str, Amount> = std::collections::HashMap::new();
        for e in &entries {
            let bucket = match e.side {
                EntrySide::Debit => &mut debits,
                EntrySide::Credit => &mut credits,
            };
            let total = bucket.entry(e.asset_id.as_str()).or_insert_with(Amount::zero);
            *total = total.clone() + e.amount.clone();
        }
        for asset in debits.keys().chain(credits.keys()) {
            assert_eq!(
                debits.get(asset).cloned().unwrap_or_else(Amount::zero),
                credits.get(asset).cloned().unwrap_or_else(Amount::zero),
                "asset {asset} did not balance"
            );
        }
    }

    #[test]
    fn swap_requires_at_least_one_leg() {
        let wallet_id = Uuid::new_v4();
        let p = payload(wallet_id, serde_json::json!([]), serde_json::json!([]));
        assert!(SwapHandler.validate(&p).is_err());
    }
}
