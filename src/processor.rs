//! Zerion-style processor (§4.5, component C7): internal-transfer detection
//! and handler-payload assembly, sitting between the sync service and the
//! ledger service.
//!
//! `source = "zerion"` labels the decoded-transaction provider this
//! processor understands (§4.5 step 4); a different provider shape would
//! get its own processor rather than branching inside this one (§9
//! "Polymorphism over source-typed generics").

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::{
    classifier::{self, Classification, TYPE_INTERNAL_TRANSFER, TYPE_SWAP},
    db::{wallet::WalletRepository, Conn},
    error::LedgerError,
    handler_registry::Payload,
    ledger_service::LedgerService,
    price_oracle::PriceOracle,
    types::{DecodedTransaction, Transfer, TransferDirection, Wallet},
};

pub const SOURCE_ZERION: &str = "zerion";

/// Outcome of processing a single decoded transaction, surfaced to the sync
/// service so it can decide whether to stop the pass (§4.6 step 3d).
#[derive(Debug)]
pub enum ProcessOutcome {
    /// Recorded (or a duplicate was suppressed) — safe to advance the
    /// cursor past this transaction.
    Committed,
    /// Classifier said skip, or this wallet is the elected non-recording
    /// side of an internal transfer (§4.5 step 2).
    Skipped,
    /// A non-duplicate error occurred; the sync service stops the pass and
    /// does not advance the cursor past this transaction (§4.6 step 3d).
    Failed(LedgerError),
}

pub struct Processor {
    ledger: Arc<LedgerService>,
    price_oracle: Arc<dyn PriceOracle>,
    /// Per-sync-pass address→wallet-ownership cache (§4.5 step 1), keyed by
    /// lowercased address. Scoped to one [`Processor`] instance per pass —
    /// never shared across wallets or ticks (§5 "In-process state ...
    /// scoped to a single sync pass").
    address_cache: Mutex<HashMap<String, Option<Uuid>>>,
}

impl Processor {
    pub fn new(ledger: Arc<LedgerService>, price_oracle: Arc<dyn PriceOracle>) -> Self {
        Self {
            ledger,
            price_oracle,
            address_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Runs the full `classify → detect-internal → build-payload →
    /// LedgerService.Record` pipeline for one decoded transaction (§4.5).
    pub fn process(
        &self,
        conn: &mut Conn,
        wallet_repo: &dyn WalletRepository,
        wallet: &Wallet,
        decoded_tx: &DecodedTransaction,
    ) -> ProcessOutcome {
        let classification = classifier::classify(decoded_tx);
        let tx_type = match classification {
            Classification::Skip => {
                debug!(tx_id = %decoded_tx.id, "skipped by classifier");
                return ProcessOutcome::Skipped;
            }
            Classification::Type(t) => t,
        };

        let (tx_type, counterparty) =
            self.detect_internal_transfer(conn, wallet_repo, wallet, decoded_tx, tx_type);

        if tx_type == TYPE_INTERNAL_TRANSFER {
            // Step 2: elect a single side. The current wallet recorded this
            // internal transfer only if it is on the OUT (sending) side;
            // the IN side defers to avoid double counting.
            let current_side_is_out = decoded_tx
                .transfers
                .iter()
                .any(|t| t.direction == TransferDirection::Out);
            if !current_side_is_out {
                return ProcessOutcome::Skipped;
            }
        }

        let payload = match self.build_payload(wallet, decoded_tx, tx_type, counterparty) {
            Ok(p) => p,
            Err(msg) => {
                return ProcessOutcome::Failed(LedgerError::ValidationFailed(msg));
            }
        };

        match self.ledger.record(
            tx_type,
            SOURCE_ZERION,
            Some(decoded_tx.id.as_str()),
            decoded_tx.mined_at,
            payload,
        ) {
            Ok(_) => ProcessOutcome::Committed,
            Err(LedgerError::DuplicateExternalID) => {
                // Step 5: idempotency path — suppress and continue.
                debug!(tx_id = %decoded_tx.id, "duplicate external id, suppressing");
                ProcessOutcome::Committed
            }
            Err(other) => ProcessOutcome::Failed(other),
        }
    }

    fn detect_internal_transfer(
        &self,
        conn: &mut Conn,
        wallet_repo: &dyn WalletRepository,
        wallet: &Wallet,
        decoded_tx: &DecodedTransaction,
        tx_type: &'static str,
    ) -> (&'static str, Option<Uuid>) {
        use crate::classifier::{TYPE_TRANSFER_IN, TYPE_TRANSFER_OUT};

        let direction = match tx_type {
            TYPE_TRANSFER_IN => TransferDirection::In,
            TYPE_TRANSFER_OUT => TransferDirection::Out,
            _ => return (tx_type, None),
        };

        for transfer in decoded_tx.transfers.iter().filter(|t| t.direction == direction) {
            let counterparty_address = match direction {
                TransferDirection::In => &transfer.sender,
                TransferDirection::Out => &transfer.recipient,
            };
            if let Some(wallet_id) =
                self.lookup_owned_wallet(conn, wallet_repo, counterparty_address, wallet.user_id)
            {
                return (TYPE_INTERNAL_TRANSFER, Some(wallet_id));
            }
        }
        (tx_type, None)
    }

    fn lookup_owned_wallet(
        &self,
        conn: &mut Conn,
        wallet_repo: &dyn WalletRepository,
        address: &str,
        user_id: Uuid,
    ) -> Option<Uuid> {
        let key = address.to_lowercase();
        if let Some(cached) = self.address_cache.lock().unwrap().get(&key) {
            return *cached;
        }

        let found = wallet_repo
            .get_wallets_by_address_and_user_id(conn, &key, user_id)
            .ok()
            .and_then(|wallets| wallets.first().map(|w| w.id));

        self.address_cache.lock().unwrap().insert(key, found);
        found
    }

    /// Builds the handler payload (§4.5 step 3): the full decoded-tx shape
    /// (wallet id, tx hash, chain id, occurred_at, protocol, fee, transfers)
    /// plus the per-type derived fields each handler in §4.7 actually reads.
    fn build_payload(
        &self,
        wallet: &Wallet,
        decoded_tx: &DecodedTransaction,
        tx_type: &'static str,
        counterparty: Option<Uuid>,
    ) -> Result<Payload, String> {
        let mut payload: Payload = HashMap::new();
        payload.insert("wallet_id".to_string(), json!(wallet.id.to_string()));
        payload.insert("tx_hash".to_string(), json!(decoded_tx.tx_hash));
        payload.insert("chain_id".to_string(), json!(decoded_tx.chain_id));
        payload.insert(
            "occurred_at".to_string(),
            json!(decoded_tx.mined_at.to_rfc3339()),
        );
        if let Some(protocol) = &decoded_tx.protocol {
            payload.insert("protocol".to_string(), json!(protocol));
        }
        if let Some(fee) = &decoded_tx.fee {
            payload.insert("fee_asset".to_string(), json!(fee.asset_symbol));
            payload.insert("fee_amount".to_string(), json!(fee.amount.to_string()));
        }
        payload.insert(
            "transfers".to_string(),
            json!(decoded_tx
                .transfers
                .iter()
                .map(transfer_to_json)
                .collect::<Vec<_>>()),
        );

        match tx_type {
            TYPE_SWAP => {
                let transfers_in: Vec<_> = decoded_tx
                    .transfers
                    .iter()
                    .filter(|t| t.direction == TransferDirection::In)
                    .map(|t| self.leg_json(t, decoded_tx.chain_id))
                    .collect();
                let transfers_out: Vec<_> = decoded_tx
                    .transfers
                    .iter()
                    .filter(|t| t.direction == TransferDirection::Out)
                    .map(|t| self.leg_json(t, decoded_tx.chain_id))
                    .collect();
                payload.insert("transfers_in".to_string(), json!(transfers_in));
                payload.insert("transfers_out".to_string(), json!(transfers_out));
            }
            "defi_deposit" | "defi_withdraw" | "defi_claim" => {
                let transfer = decoded_tx
                    .transfers
                    .first()
                    .ok_or_else(|| "defi transaction has no transfers".to_string())?;
                payload.insert("asset".to_string(), json!(transfer.asset_symbol));
                payload.insert("amount".to_string(), json!(transfer.amount.to_string()));
                payload.insert("decimals".to_string(), json!(transfer.decimals));
                payload.insert(
                    "protocol".to_string(),
                    json!(decoded_tx.protocol.clone().unwrap_or_else(|| "unknown".to_string())),
                );
                if let Some(rate) = self.resolve_usd_rate(transfer, decoded_tx.chain_id) {
                    payload.insert("usd_rate".to_string(), json!(rate.to_string()));
                }
            }
            TYPE_INTERNAL_TRANSFER => {
                let transfer = decoded_tx
                    .transfers
                    .iter()
                    .find(|t| t.direction == TransferDirection::Out)
                    .ok_or_else(|| "internal transfer has no outbound transfer".to_string())?;
                payload.insert("asset".to_string(), json!(transfer.asset_symbol));
                payload.insert("amount".to_string(), json!(transfer.amount.to_string()));
                payload.insert("decimals".to_string(), json!(transfer.decimals));
                let dest = counterparty.ok_or_else(|| "internal transfer missing counterparty".to_string())?;
                payload.insert("dest_wallet_id".to_string(), json!(dest.to_string()));
                if let Some(rate) = self.resolve_usd_rate(transfer, decoded_tx.chain_id) {
                    payload.insert("usd_rate".to_string(), json!(rate.to_string()));
                }
            }
            _ => {
                // transfer_in / transfer_out: the single dominant transfer
                // in the matching direction.
                let direction = if tx_type == crate::classifier::TYPE_TRANSFER_IN {
                    TransferDirection::In
                } else {
                    TransferDirection::Out
                };
                let transfer = decoded_tx
                    .transfers
                    .iter()
                    .find(|t| t.direction == direction)
                    .ok_or_else(|| "transfer has no matching-direction leg".to_string())?;
                payload.insert("asset".to_string(), json!(transfer.asset_symbol));
                payload.insert("amount".to_string(), json!(transfer.amount.to_string()));
                payload.insert("decimals".to_string(), json!(transfer.decimals));
                if let Some(rate) = self.resolve_usd_rate(transfer, decoded_tx.chain_id) {
                    payload.insert("usd_rate".to_string(), json!(rate.to_string()));
                }
            }
        }

        Ok(payload)
    }

    fn leg_json(&self, transfer: &Transfer, chain_id: i64) -> serde_json::Value {
        let usd_rate = self.resolve_usd_rate(transfer, chain_id);
        json!({
            "asset": transfer.asset_symbol,
            "amount": transfer.amount.to_string(),
            "usd_rate": usd_rate.map(|r| r.to_string()).unwrap_or_else(|| "0".to_string()),
            "decimals": transfer.decimals,
        })
    }

    /// USD-rate precedence (§4.7): explicit `usd_price` on the transfer,
    /// else the price oracle; `None` means "store 0 and continue".
    fn resolve_usd_rate(&self, transfer: &Transfer, chain_id: i64) -> Option<crate::amount::UsdRate> {
        if let Some(price) = transfer.usd_price {
            return Some(crate::amount::UsdRate::from_f64_lossy(price));
        }
        self.price_oracle
            .get_price_by_symbol(&transfer.asset_symbol, chain_id)
    }
}

fn transfer_to_json(transfer: &Transfer) -> serde_json::Value {
    json!({
        "asset_symbol": transfer.asset_symbol,
        "contract_address": transfer.contract_address,
        "decimals": transfer.decimals,
        "amount": transfer.amount.to_string(),
        "direction": transfer.direction.to_string(),
        "sender": transfer.sender,
        "recipient": transfer.recipient,
        "usd_price": transfer.usd_price.map(|p| p.to_string()).unwrap_or_else(|| "0".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Amount;
    use chrono::Utc;

    fn transfer(direction: TransferDirection, sender: &str, recipient: &str) -> Transfer {
        Transfer {
            asset_symbol: "ETH".into(),
            contract_address: None,
            decimals: 18,
            amount: Amount::from(500_000_000_000_000_000u64),
            direction,
            sender: sender.into(),
            recipient: recipient.into(),
            usd_price: Some(2000.0),
        }
    }

    #[test]
    fn transfer_to_json_encodes_usd_price_as_decimal_string() {
        let t = transfer(TransferDirection::In, "0xa", "0xb");
        let v = transfer_to_json(&t);
        assert_eq!(v["usd_price"], json!("2000"));
        assert_eq!(v["direction"], json!("IN"));
    }

    #[test]
    fn decoded_tx_with_no_transfers_has_empty_array() {
        let tx = DecodedTransaction {
            id: "t1".into(),
            tx_hash: "0x1".into(),
            chain_id: 1,
            operation_type: crate::types::OperationType::Approve,
            protocol: None,
            transfers: vec![],
            fee: None,
            mined_at: Utc::now(),
            status: crate::types::DecodedTxStatus::Confirmed,
        };
        assert!(matches!(classifier::classify(&tx), Classification::Skip));
    }
}
