//! Manual entry handlers (§4.7): `manual_income`, `manual_outcome`,
//! `asset_adjustment`. These are the handlers a manual HTTP caller reaches,
//! not the sync pipeline.
//!
//! Common payload fields: `wallet_id` (uuid string), `asset` (asset symbol),
//! `amount` (decimal string, base units), `usd_rate` (optional decimal
//! string, scale `10^8`).
//!
//! Balance sufficiency for `manual_outcome` is not checked here — handlers
//! never touch persistence (§4.1) — it is enforced by
//! [`crate::ledger_service::LedgerService`]'s row-locked balance check
//! (§4.2 step 6), which returns `NegativeBalanceForbidden` with no side
//! effects, exactly as `validate` returning an error would.

use crate::{
    amount::{Amount, UsdValue},
    handler_registry::{GeneratedEntry, Payload, TransactionHandler},
    handlers::codes,
    payload,
    types::{AccountType, EntrySide},
};

fn usd_value_or_zero(amount: &Amount, payload: &Payload) -> Result<UsdValue, String> {
    match crate::payload::get_usd_rate_opt(payload, "usd_rate")? {
        Some(rate) => {
            let decimals = payload::get_decimals(payload, "decimals");
            Ok(amount.usd_value(&rate, decimals))
        }
        None => Ok(UsdValue::zero()),
    }
}

pub struct ManualIncomeHandler;

impl TransactionHandler for ManualIncomeHandler {
    fn validate(&self, payload: &Payload) -> Result<(), String> {
        payload::get_uuid(payload, "wallet_id")?;
        let asset = payload::get_str(payload, "asset")?;
        if asset.is_empty() {
            return Err("asset must not be empty".to_string());
        }
        let amount = payload::get_amount(payload, "amount")?;
        if amount.is_zero() {
            return Err("manual_income amount must be > 0".to_string());
        }
        Ok(())
    }

    fn generate_entries(&self, payload: &Payload) -> Result<Vec<GeneratedEntry>, String> {
        let wallet_id = payload::get_uuid(payload, "wallet_id")?;
        let asset = payload::get_str(payload, "asset")?;
        let amount = payload::get_amount(payload, "amount")?;
        let usd_rate = crate::payload::get_usd_rate_opt(payload, "usd_rate")?.unwrap_or_default();
        let decimals = payload::get_decimals(payload, "decimals");
        let usd_value = amount.usd_value(&usd_rate, decimals);

        Ok(vec![
            GeneratedEntry::new(
                codes::wallet(wallet_id, asset),
                AccountType::CryptoWallet,
                EntrySide::Debit,
                "asset_increase",
                amount.clone(),
                asset,
                usd_rate.clone(),
                usd_value.clone(),
            )
            .with_wallet(wallet_id),
            GeneratedEntry::new(
                codes::income(asset),
                AccountType::Income,
                EntrySide::Credit,
                "income",
                amount,
                asset,
                usd_rate,
                usd_value,
            ),
        ])
    }
}

pub struct ManualOutcomeHandler;

impl TransactionHandler for ManualOutcomeHandler {
    fn validate(&self, payload: &Payload) -> Result<(), String> {
        payload::get_uuid(payload, "wallet_id")?;
        let asset = payload::get_str(payload, "asset")?;
        if asset.is_empty() {
            return Err("asset must not be empty".to_string());
        }
        payload::get_amount(payload, "amount")?;
        Ok(())
    }

    fn generate_entries(&self, payload: &Payload) -> Result<Vec<GeneratedEntry>, String> {
        let wallet_id = payload::get_uuid(payload, "wallet_id")?;
        let asset = payload::get_str(payload, "asset")?;
        let amount = payload::get_amount(payload, "amount")?;
        let usd_rate = crate::payload::get_usd_rate_opt(payload, "usd_rate")?.unwrap_or_default();
        let decimals = payload::get_decimals(payload, "decimals");
        let usd_value = amount.usd_value(&usd_rate, decimals);

        Ok(vec![
            GeneratedEntry::new(
                codes::expense(asset),
                AccountType::Expense,
                EntrySide::Debit,
                "expense",
                amount.clone(),
                asset,
                usd_rate.clone(),
                usd_value.clone(),
            ),
            GeneratedEntry::new(
                codes::wallet(wallet_id, asset),
                AccountType::CryptoWallet,
                EntrySide::Credit,
                "asset_decrease",
                amount,
                asset,
                usd_rate,
                usd_value,
            )
            .with_wallet(wallet_id),
        ])
    }
}

pub struct AssetAdjustmentHandler;

impl TransactionHandler for AssetAdjustmentHandler {
    fn validate(&self, payload: &Payload) -> Result<(), String> {
        payload::get_uuid(payload, "wallet_id")?;
        let asset = payload::get_str(payload, "asset")?;
        if asset.is_empty() {
            return Err("asset must not be empty".to_string());
        }
        payload::get_amount(payload, "current_balance")?;
        payload::get_amount(payload, "new_balance")?;
        Ok(())
    }

    fn generate_entries(&self, payload: &Payload) -> Result<Vec<GeneratedEntry>, String> {
        let wallet_id = payload::get_uuid(payload, "wallet_id")?;
        let asset = payload::get_str(payload, "asset")?;
        let current = payload::get_amount(payload, "current_balance")?;
        let target = payload::get_amount(payload, "new_balance")?;
        let usd_rate = crate::payload::get_usd_rate_opt(payload, "usd_rate")?.unwrap_or_default();

        let wallet_code = codes::wallet(wallet_id, asset);
        let nominal_code = codes::adjustment_income(asset);

        let (delta, wallet_side, nominal_side) = match target.0.cmp(&current.0) {
            std::cmp::Ordering::Greater | std::cmp::Ordering::Equal => (
                target.checked_sub(&current).unwrap_or_else(Amount::zero),
                EntrySide::Debit,
                EntrySide::Credit,
            ),
            std::cmp::Ordering::Less => (
                current.checked_sub(&target).ok_or("unreachable: current < target")?,
                EntrySide::Credit,
                EntrySide::Debit,
            ),
        };
        let usd_value = usd_value_or_zero(&delta, payload)?;

        Ok(vec![
            GeneratedEntry::new(
                wallet_code,
                AccountType::CryptoWallet,
                wallet_side,
                "asset_adjustment",
                delta.clone(),
                asset,
                usd_rate.clone(),
                usd_value.clone(),
            )
            .with_wallet(wallet_id),
            GeneratedEntry::new(
                nominal_code,
                AccountType::Income,
                nominal_side,
                "asset_adjustment",
                delta,
                asset,
                usd_rate,
                usd_value,
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn payload(pairs: &[(&str, serde_json::Value)]) -> Payload {
        let mut map = HashMap::new();
        for (k, v) in pairs {
            map.insert(k.to_string(), v.clone());
        }
        map
    }

    #[test]
    fn manual_income_generates_balanced_pair() {
        let wallet_id = Uuid::new_v4();
        let p = payload(&[
            ("wallet_id", serde_json::json!(wallet_id.to_string())),
            ("asset", serde_json::json!("BTC")),
            ("amount", serde_json::json!("100000000")),
            ("usd_rate", serde_json::json!("4500000000000")),
        ]);
        let handler = ManualIncomeHandler;
        handler.validate(&p).unwrap();
        let entries = handler.generate_entries(&p).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].amount, entries[1].amount);
        assert_eq!(entries[0].side, EntrySide::Debit);
        assert_eq!(entries[1].side, EntrySide::Credit);
    }

    #[test]
    fn manual_income_rejects_zero_amount() {
        let p = payload(&[
            ("wallet_id", serde_json::json!(Uuid::new_v4().to_string())),
            ("asset", serde_json::json!("BTC")),
            ("amount", serde_json::json!("0")),
        ]);
        assert!(ManualIncomeHandler.validate(&p).is_err());
    }

    #[test]
    fn asset_adjustment_upward_debits_wallet() {
        let wallet_id = Uuid::new_v4();
        let p = payload(&[
            ("wallet_id", serde_json::json!(wallet_id.to_string())),
            ("asset", serde_json::json!("ETH")),
            ("current_balance", serde_json::json!("10")),
            ("new_balance", serde_json::json!("15")),
        ]);
        let entries = AssetAdjustmentHandler.generate_entries(&p).unwrap();
        assert_eq!(entries[0].side, EntrySide::Debit);
        assert_eq!(entries[0].amount, Amount::from(5u64));
    }

    #[test]
    fn asset_adjustment_downward_credits_wallet() {
        let wallet_id = Uuid::new_v4();
        let p = payload(&[
            ("wallet_id", serde_json::json!(wallet_id.to_string())),
            ("asset", serde_json::json!("ETH")),
            ("current_balance", serde_json::json!("15")),
            ("new_balance", serde_json::json!("10")),
        ]);
        let entries = AssetAdjustmentHandler.generate_entries(&p).unwrap();
        assert_eq!(entries[0].side, EntrySide::Credit);
        assert_eq!(entries[0].amount, Amount::from(5u64));
    }
}
