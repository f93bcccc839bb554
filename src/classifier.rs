//! Classifier — pure mapping from decoded-transaction shape to ledger
//! transaction type (§4.4, component C6).

use crate::types::{DecodedTransaction, DecodedTxStatus, OperationType, TransferDirection};

pub const TYPE_SWAP: &str = "swap";
pub const TYPE_DEFI_DEPOSIT: &str = "defi_deposit";
pub const TYPE_DEFI_WITHDRAW: &str = "defi_withdraw";
pub const TYPE_DEFI_CLAIM: &str = "defi_claim";
pub const TYPE_TRANSFER_IN: &str = "transfer_in";
pub const TYPE_TRANSFER_OUT: &str = "transfer_out";
pub const TYPE_INTERNAL_TRANSFER: &str = "internal_transfer";
pub const TYPE_MANUAL_INCOME: &str = "manual_income";
pub const TYPE_MANUAL_OUTCOME: &str = "manual_outcome";
pub const TYPE_ASSET_ADJUSTMENT: &str = "asset_adjustment";

/// Result of [`classify`]: either a ledger transaction type to record, or an
/// instruction to skip the decoded transaction entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Type(&'static str),
    Skip,
}

/// `classify(decoded_tx) → type_tag | skip` (§4.4). `FAILED` decoded
/// transactions are skipped before classification.
pub fn classify(tx: &DecodedTransaction) -> Classification {
    if tx.status == DecodedTxStatus::Failed {
        return Classification::Skip;
    }

    match tx.operation_type {
        OperationType::Trade => Classification::Type(TYPE_SWAP),
        OperationType::Deposit | OperationType::Mint => Classification::Type(TYPE_DEFI_DEPOSIT),
        OperationType::Withdraw | OperationType::Burn => Classification::Type(TYPE_DEFI_WITHDRAW),
        OperationType::Claim => Classification::Type(TYPE_DEFI_CLAIM),
        OperationType::Receive => Classification::Type(TYPE_TRANSFER_IN),
        OperationType::Send => Classification::Type(TYPE_TRANSFER_OUT),
        OperationType::Approve => Classification::Skip,
        OperationType::Execute => classify_by_transfers(tx),
    }
}

/// EXECUTE (or any future/unknown tag handled the same way): infer purely
/// from transfer directions — both IN & OUT present → swap; only IN →
/// transfer_in; only OUT → transfer_out; none → skip (§4.4).
fn classify_by_transfers(tx: &DecodedTransaction) -> Classification {
    let has_in = tx
        .transfers
        .iter()
        .any(|t| t.direction == TransferDirection::In);
    let has_out = tx
        .transfers
        .iter()
        .any(|t| t.direction == TransferDirection::Out);

    match (has_in, has_out) {
        (true, true) => Classification::Type(TYPE_SWAP),
        (true, false) => Classification::Type(TYPE_TRANSFER_IN),
        (false, true) => Classification::Type(TYPE_TRANSFER_OUT),
        (false, false) => Classification::Skip,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Amount;
    use crate::types::Transfer;
    use chrono::Utc;

    fn base_tx(op: OperationType, transfers: Vec<Transfer>) -> DecodedTransaction {
        DecodedTransaction {
            id: "tx1".into(),
            tx_hash: "0xabc".into(),
            chain_id: 1,
            operation_type: op,
            protocol: None,
            transfers,
            fee: None,
            mined_at: Utc::now(),
            status: DecodedTxStatus::Confirmed,
        }
    }

    fn transfer(direction: TransferDirection) -> Transfer {
        Transfer {
            asset_symbol: "ETH".into(),
            contract_address: None,
            decimals: 18,
            amount: Amount::from(1u64),
            direction,
            sender: "0xsender".into(),
            recipient: "0xrecipient".into(),
            usd_price: None,
        }
    }

    #[test]
    fn failed_tx_is_always_skipped() {
        let mut tx = base_tx(OperationType::Receive, vec![transfer(TransferDirection::In)]);
        tx.status = DecodedTxStatus::Failed;
        assert_eq!(classify(&tx), Classification::Skip);
    }

    #[test]
    fn simple_tags_map_directly() {
        assert_eq!(
            classify(&base_tx(OperationType::Trade, vec![])),
            Classification::Type(TYPE_SWAP)
        );
        assert_eq!(
            classify(&base_tx(OperationType::Deposit, vec![])),
            Classification::Type(TYPE_DEFI_DEPOSIT)
        );
        assert_eq!(
            classify(&base_tx(OperationType::Mint, vec![])),
            Classification::Type(TYPE_DEFI_DEPOSIT)
        );
        assert_eq!(
            classify(&base_tx(OperationType::Withdraw, vec![])),
            Classification::Type(TYPE_DEFI_WITHDRAW)
        );
        assert_eq!(
            classify(&base_tx(OperationType::Burn, vec![])),
            Classification::Type(TYPE_DEFI_WITHDRAW)
        );
        assert_eq!(
            classify(&base_tx(OperationType::Claim, vec![])),
            Classification::Type(TYPE_DEFI_CLAIM)
        );
        assert_eq!(
            classify(&base_tx(OperationType::Receive, vec![])),
            Classification::Type(TYPE_TRANSFER_IN)
        );
        assert_eq!(
            classify(&base_tx(OperationType::Send, vec![])),
            Classification::Type(TYPE_TRANSFER_OUT)
        );
        assert_eq!(
            classify(&base_tx(OperationType::Approve, vec![])),
            Classification::Skip
        );
    }

    #[test]
    fn execute_is_inferred_from_transfers() {
        assert_eq!(
            classify(&base_tx(
                OperationType::Execute,
                vec![transfer(TransferDirection::In), transfer(TransferDirection::Out)]
            )),
            Classification::Type(TYPE_SWAP)
        );
        assert_eq!(
            classify(&base_tx(OperationType::Execute, vec![transfer(TransferDirection::In)])),
            Classification::Type(TYPE_TRANSFER_IN)
        );
        assert_eq!(
            classify(&base_tx(OperationType::Execute, vec![transfer(TransferDirection::Out)])),
            Classification::Type(TYPE_TRANSFER_OUT)
        );
        assert_eq!(
            classify(&base_tx(OperationType::Execute, vec![])),
            Classification::Skip
        );
    }
}
