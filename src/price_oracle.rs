//! Price oracle (consumed, optional) — §6, §4.7 USD-rate precedence.
//!
//! Only the processor (§4.5/§4.7) ever calls this; the ledger service and
//! handlers never reach for it directly, keeping `record` side-effect-free
//! with respect to the network (§9 "No global mutable state").

use crate::amount::UsdRate;

pub trait PriceOracle: Send + Sync {
    /// Returns `None` when the oracle has no price for `symbol` on
    /// `chain_id`, or on any transient failure — callers fall back to `0`
    /// and continue (§4.7).
    fn get_price_by_symbol(&self, symbol: &str, chain_id: i64) -> Option<UsdRate>;
}

/// No-op oracle used where no price collaborator is configured; every
/// lookup misses and callers fall back to `0` per §4.7.
pub struct NullPriceOracle;

impl PriceOracle for NullPriceOracle {
    fn get_price_by_symbol(&self, _symbol: &str, _chain_id: i64) -> Option<UsdRate> {
        None
    }
}
