//! `transfer_in`, `transfer_out`, `internal_transfer` handlers (§4.7).
//!
//! Payload fields (assembled by [`crate::processor`] for the sync path, or
//! supplied directly by a manual caller): `wallet_id`, `asset`, `amount`
//! (decimal string), `usd_rate` (optional decimal string, scale `10^8`),
//! `decimals` (optional integer, the asset's on-chain decimals; `0` if
//! absent). `internal_transfer` additionally carries `dest_wallet_id` — the
//! counterparty wallet already proven to belong to the same user by the
//! processor (§4.5 step 1); this handler does not re-check ownership.

use crate::{
    handler_registry::{GeneratedEntry, Payload, TransactionHandler},
    handlers::codes,
    payload,
    types::{AccountType, EntrySide},
};

fn parse_common(
    payload: &Payload,
) -> Result<(uuid::Uuid, String, crate::amount::Amount, crate::amount::UsdRate, u32), String> {
    let wallet_id = payload::get_uuid(payload, "wallet_id")?;
    let asset = payload::get_str(payload, "asset")?.to_string();
    let amount = payload::get_amount(payload, "amount")?;
    let usd_rate = payload::get_usd_rate_opt(payload, "usd_rate")?.unwrap_or_default();
    let decimals = payload::get_decimals(payload, "decimals");
    Ok((wallet_id, asset, amount, usd_rate, decimals))
}

pub struct TransferInHandler;

impl TransactionHandler for TransferInHandler {
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
        let (wallet_id, asset, amount, usd_rate, decimals) = parse_common(payload)?;
        let usd_value = amount.usd_value(&usd_rate, decimals);

        Ok(vec![
            GeneratedEntry::new(
                codes::wallet(wallet_id, &asset),
                AccountType::CryptoWallet,
                EntrySide::Debit,
                "transfer",
                amount.clone(),
                asset.clone(),
                usd_rate.clone(),
                usd_value.clone(),
            )
            .with_wallet(wallet_id),
            GeneratedEntry::new(
                codes::income(&asset),
                AccountType::Income,
                EntrySide::Credit,
                "transfer",
                amount,
                asset,
                usd_rate,
                usd_value,
            ),
        ])
    }
}

pub struct TransferOutHandler;

impl TransactionHandler for TransferOutHandler {
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
        let (wallet_id, asset, amount, usd_rate, decimals) = parse_common(payload)?;
        let usd_value = amount.usd_value(&usd_rate, decimals);

        Ok(vec![
            GeneratedEntry::new(
                codes::expense(&asset),
                AccountType::Expense,
                EntrySide::Debit,
                "transfer",
                amount.clone(),
                asset.clone(),
                usd_rate.clone(),
                usd_value.clone(),
            ),
            GeneratedEntry::new(
                codes::wallet(wallet_id, &asset),
                AccountType::CryptoWallet,
                EntrySide::Credit,
                "transfer",
                amount,
                asset,
                usd_rate,
                usd_value,
            )
            .with_wallet(wallet_id),
        ])
    }
}

pub struct InternalTransferHandler;

impl TransactionHandler for InternalTransferHandler {
    fn validate(&self, payload: &Payload) -> Result<(), String> {
        let source = payload::get_uuid(payload, "wallet_id")?;
        let dest = payload::get_uuid(payload, "dest_wallet_id")?;
        if source == dest {
            return Err("internal_transfer source and destination wallets must differ".to_string());
        }
        let asset = payload::get_str(payload, "asset")?;
        if asset.is_empty() {
            return Err("asset must not be empty".to_string());
        }
        payload::get_amount(payload, "amount")?;
        Ok(())
    }

    fn generate_entries(&self, payload: &Payload) -> Result<Vec<GeneratedEntry>, String> {
        let source_wallet = payload::get_uuid(payload, "wallet_id")?;
        let dest_wallet = payload::get_uuid(payload, "dest_wallet_id")?;
        let asset = payload::get_str(payload, "asset")?.to_string();
        let amount = payload::get_amount(payload, "amount")?;
        let usd_rate = payload::get_usd_rate_opt(payload, "usd_rate")?.unwrap_or_default();
        let decimals = payload::get_decimals(payload, "decimals");
        let usd_value = amount.usd_value(&usd_rate, decimals);

        Ok(vec![
            GeneratedEntry::new(
                codes::wallet(dest_wallet, &asset),
                AccountType::CryptoWallet,
                EntrySide::Debit,
                "internal_transfer",
                amount.clone(),
                asset.clone(),
                usd_rate.clone(),
                usd_value.clone(),
            )
            .with_wallet(dest_wallet),
            GeneratedEntry::new(
                codes::wallet(source_wallet, &asset),
                AccountType::CryptoWallet,
                EntrySide::Credit,
                "internal_transfer",
                amount,
                asset,
                usd_rate,
                usd_value,
            )
            .with_wallet(source_wallet),
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
    fn internal_transfer_rejects_same_wallet() {
        let wallet_id = Uuid::new_v4();
        let p = payload(&[
            ("wallet_id", serde_json::json!(wallet_id.to_string())),
            ("dest_wallet_id", serde_json::json!(wallet_id.to_string())),
            ("asset", serde_json::json!("ETH")),
            ("amount", serde_json::json!("1")),
        ]);
        assert!(InternalTransferHandler.validate(&p).is_err());
    }

    #[test]
    fn internal_transfer_debits_dest_credits_source() {
        let source = Uuid::new_v4();
        let dest = Uuid::new_v4();
        let p = payload(&[
            ("wallet_id", serde_json::json!(source.to_string())),
            ("dest_wallet_id", serde_json::json!(dest.to_string())),
            ("asset", serde_json::json!("ETH")),
            ("amount", serde_json::json!("500000000000000000")),
        ]);
        let entries = InternalTransferHandler.generate_entries(&p).unwrap();
        assert_eq!(entries[0].wallet_id, Some(dest));
        assert_eq!(entries[0].side, EntrySide::Debit);
        assert_eq!(entries[1].wallet_id, Some(source));
        assert_eq!(entries[1].side, EntrySide::Credit);
        assert_eq!(entries[0].amount, entries[1].amount);
    }
}
