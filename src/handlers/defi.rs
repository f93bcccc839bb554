//! `defi_deposit`, `defi_withdraw`, `defi_claim` handlers (§4.7).
//!
//! Payload fields: `wallet_id`, `asset`, `amount` (decimal string),
//! `protocol`, `usd_rate` (optional decimal string, scale `10^8`),
//! `decimals` (optional integer, `0` if absent). Deposit
//! and withdraw move funds between the wallet and a protocol-scoped
//! clearing account `defi.{protocol}.{asset}`; claim credits rewards
//! earned from the protocol directly into the wallet.

use crate::{
    amount::Amount,
    handler_registry::{GeneratedEntry, Payload, TransactionHandler},
    handlers::codes,
    payload,
    types::{AccountType, EntrySide},
};

fn parse_common(
    payload: &Payload,
) -> Result<(uuid::Uuid, String, Amount, String, crate::amount::UsdRate, u32), String> {
    let wallet_id = payload::get_uuid(payload, "wallet_id")?;
    let asset = payload::get_str(payload, "asset")?.to_string();
    let amount = payload::get_amount(payload, "amount")?;
    let protocol = payload::get_str(payload, "protocol")?.to_string();
    let usd_rate = payload::get_usd_rate_opt(payload, "usd_rate")?.unwrap_or_default();
    let decimals = payload::get_decimals(payload, "decimals");
    Ok((wallet_id, asset, amount, protocol, usd_rate, decimals))
}

fn validate_common(payload: &Payload) -> Result<(), String> {
    payload::get_uuid(payload, "wallet_id")?;
    let asset = payload::get_str(payload, "asset")?;
    if asset.is_empty() {
        return Err("asset must not be empty".to_string());
    }
    let protocol = payload::get_str(payload, "protocol")?;
    if protocol.is_empty() {
        return Err("protocol must not be empty".to_string());
    }
    payload::get_amount(payload, "amount")?;
    Ok(())
}

pub struct DefiDepositHandler;

impl TransactionHandler for DefiDepositHandler {
    fn validate(&self, payload: &Payload) -> Result<(), String> {
        validate_common(payload)
    }

    fn generate_entries(&self, payload: &Payload) -> Result<Vec<GeneratedEntry>, String> {
        let (wallet_id, asset, amount, protocol, usd_rate, decimals) = parse_common(payload)?;
        let usd_value = amount.usd_value(&usd_rate, decimals);

        // Deposit credits (decreases) the wallet and debits (increases) the
        // protocol's clearing account — funds are moving out of the user's
        // own custody into the protocol (§4.7).
        Ok(vec![
            GeneratedEntry::new(
                codes::wallet(wallet_id, &asset),
                AccountType::CryptoWallet,
                EntrySide::Credit,
                "defi_deposit",
                amount.clone(),
                asset.clone(),
                usd_rate.clone(),
                usd_value.clone(),
            )
            .with_wallet(wallet_id),
            GeneratedEntry::new(
                codes::defi_clearing(&protocol, &asset),
                AccountType::Expense,
                EntrySide::Debit,
                "defi_clearing",
                amount,
                asset,
                usd_rate,
                usd_value,
            ),
        ])
    }
}

pub struct DefiWithdrawHandler;

impl TransactionHandler for DefiWithdrawHandler {
    fn validate(&self, payload: &Payload) -> Result<(), String> {
        validate_common(payload)
    }

    fn generate_entries(&self, payload: &Payload) -> Result<Vec<GeneratedEntry>, String> {
        let (wallet_id, asset, amount, protocol, usd_rate, decimals) = parse_common(payload)?;
        let usd_value = amount.usd_value(&usd_rate, decimals);

        Ok(vec![
            GeneratedEntry::new(
                codes::defi_clearing(&protocol, &asset),
                AccountType::Expense,
                EntrySide::Credit,
                "defi_clearing",
                amount.clone(),
                asset.clone(),
                usd_rate.clone(),
                usd_value.clone(),
            ),
            GeneratedEntry::new(
                codes::wallet(wallet_id, &asset),
                AccountType::CryptoWallet,
                EntrySide::Debit,
                "defi_withdraw",
                amount,
                asset,
                usd_rate,
                usd_value,
            )
            .with_wallet(wallet_id),
        ])
    }
}

pub struct DefiClaimHandler;

impl TransactionHandler for DefiClaimHandler {
    fn validate(&self, payload: &Payload) -> Result<(), String> {
        validate_common(payload)
    }

    fn generate_entries(&self, payload: &Payload) -> Result<Vec<GeneratedEntry>, String> {
        let (wallet_id, asset, amount, _protocol, usd_rate, decimals) = parse_common(payload)?;
        let usd_value = amount.usd_value(&usd_rate, decimals);

        Ok(vec![
            GeneratedEntry::new(
                codes::wallet(wallet_id, &asset),
                AccountType::CryptoWallet,
                EntrySide::Debit,
                "defi_claim",
                amount.clone(),
                asset.clone(),
                usd_rate.clone(),
                usd_value.clone(),
            )
            .with_wallet(wallet_id),
            GeneratedEntry::new(
                codes::rewards_income(&asset),
                AccountType::Income,
                EntrySide::Credit,
                "defi_claim",
                amount,
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

    fn payload(wallet_id: Uuid, protocol: &str) -> Payload {
        let mut map = HashMap::new();
        map.insert("wallet_id".to_string(), serde_json::json!(wallet_id.to_string()));
        map.insert("asset".to_string(), serde_json::json!("USDC"));
        map.insert("amount".to_string(), serde_json::json!("1000000"));
        map.insert("protocol".to_string(), serde_json::json!(protocol));
        map
    }

    #[test]
    fn deposit_credits_wallet_debits_clearing() {
        let p = payload(Uuid::new_v4(), "aave");
        let entries = DefiDepositHandler.generate_entries(&p).unwrap();
        assert_eq!(entries[0].side, EntrySide::Credit);
        assert_eq!(entries[1].side, EntrySide::Debit);
        assert_eq!(entries[1].account_code, "defi.aave.USDC");
    }

    #[test]
    fn withdraw_debits_wallet_credits_clearing() {
        let p = payload(Uuid::new_v4(), "aave");
        let entries = DefiWithdrawHandler.generate_entries(&p).unwrap();
        assert_eq!(entries[0].side, EntrySide::Credit);
        assert_eq!(entries[1].side, EntrySide::Debit);
    }

    #[test]
    fn claim_debits_wallet_credits_rewards_income() {
        let p = payload(Uuid::new_v4(), "aave");
        let entries = DefiClaimHandler.generate_entries(&p).unwrap();
        assert_eq!(entries[0].side, EntrySide::Debit);
        assert_eq!(entries[1].account_code, "rewards_income.USDC");
    }

    #[test]
    fn empty_protocol_is_rejected() {
        let mut p = payload(Uuid::new_v4(), "");
        p.insert("protocol".to_string(), serde_json::json!(""));
        assert!(DefiDepositHandler.validate(&p).is_err());
    }
}
