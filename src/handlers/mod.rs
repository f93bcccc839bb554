//! Handler implementations (§4.7, component C9).
//!
//! Every handler here is a pure function from payload to a balanced entry
//! set (§4.1): no database access, no network access, no clock reads beyond
//! what the caller already resolved. Each submodule documents its own
//! payload shape in its module doc comment.

mod defi;
mod manual;
mod swap;
mod transfer;

use std::sync::Arc;

use crate::{
    classifier::{
        TYPE_ASSET_ADJUSTMENT, TYPE_DEFI_CLAIM, TYPE_DEFI_DEPOSIT, TYPE_DEFI_WITHDRAW,
        TYPE_INTERNAL_TRANSFER, TYPE_MANUAL_INCOME, TYPE_MANUAL_OUTCOME, TYPE_SWAP,
        TYPE_TRANSFER_IN, TYPE_TRANSFER_OUT,
    },
    error::RegistryError,
    handler_registry::HandlerRegistryBuilder,
};

pub use defi::{DefiClaimHandler, DefiDepositHandler, DefiWithdrawHandler};
pub use manual::{AssetAdjustmentHandler, ManualIncomeHandler, ManualOutcomeHandler};
pub use swap::SwapHandler;
pub use transfer::{InternalTransferHandler, TransferInHandler, TransferOutHandler};

/// Registers every built-in handler under its spec-defined tag (§4.7).
/// Called once at process start; see [`crate::handler_registry`] module doc.
pub fn register_defaults(
    builder: &mut HandlerRegistryBuilder,
) -> Result<(), RegistryError> {
    builder.register(TYPE_MANUAL_INCOME, Arc::new(ManualIncomeHandler))?;
    builder.register(TYPE_MANUAL_OUTCOME, Arc::new(ManualOutcomeHandler))?;
    builder.register(TYPE_ASSET_ADJUSTMENT, Arc::new(AssetAdjustmentHandler))?;
    builder.register(TYPE_TRANSFER_IN, Arc::new(TransferInHandler))?;
    builder.register(TYPE_TRANSFER_OUT, Arc::new(TransferOutHandler))?;
    builder.register(TYPE_INTERNAL_TRANSFER, Arc::new(InternalTransferHandler))?;
    builder.register(TYPE_SWAP, Arc::new(SwapHandler))?;
    builder.register(TYPE_DEFI_DEPOSIT, Arc::new(DefiDepositHandler))?;
    builder.register(TYPE_DEFI_WITHDRAW, Arc::new(DefiWithdrawHandler))?;
    builder.register(TYPE_DEFI_CLAIM, Arc::new(DefiClaimHandler))?;
    Ok(())
}

/// Account-code helpers shared by every handler (§3 "code is derived and
/// unique"). Wallet/nominal account codes for the fixed prefixes in §4.7.
pub(crate) mod codes {
    use uuid::Uuid;

    pub fn wallet(wallet_id: Uuid, asset: &str) -> String {
        crate::db::account::wallet_account_code(wallet_id, asset)
    }

    pub fn income(asset: &str) -> String {
        crate::db::account::nominal_account_code("income", asset)
    }

    pub fn expense(asset: &str) -> String {
        crate::db::account::nominal_account_code("expense", asset)
    }

    pub fn adjustment_income(asset: &str) -> String {
        crate::db::account::nominal_account_code("adjustment_income", asset)
    }

    pub fn rewards_income(asset: &str) -> String {
        crate::db::account::nominal_account_code("rewards_income", asset)
    }

    pub fn swap_clearing(asset: &str) -> String {
        crate::db::account::nominal_account_code("swap_clearing", asset)
    }

    pub fn swap_residual(asset: &str) -> String {
        crate::db::account::nominal_account_code("swap_residual", asset)
    }

    pub fn defi_clearing(protocol: &str, asset: &str) -> String {
        format!("defi.{protocol}.{asset}")
    }
}
