//! Handler registry (§4.1, component C3).
//!
//! Maps a transaction-type tag to exactly one handler. Registration happens
//! once at process start (§9 "No global mutable state": the registry is
//! mutated only at startup); lookup afterward is a lock-free read from a
//! plain `HashMap` behind an `Arc`, never touched again.

use std::{collections::HashMap, sync::Arc};

use serde_json::Value;

use crate::{
    amount::{Amount, UsdRate, UsdValue},
    error::RegistryError,
    types::{AccountType, EntrySide},
};

/// A string-keyed payload understood by exactly one handler (§4.1, §9
/// "Polymorphism over source-typed generics"). The shape per tag is
/// documented in §4.7 and in each handler's module doc comment.
pub type Payload = HashMap<String, Value>;

/// One side of a handler-generated entry, addressed by account *code*
/// rather than account id (§4.1: "produces the balanced entry set along
/// with the account code each entry targets"). The ledger service resolves
/// or creates the account for `account_code` inside the persistence
/// transaction (§4.2 step 4) and fills in the id before insert.
#[derive(Debug, Clone)]
pub struct GeneratedEntry {
    pub account_code: String,
    pub account_type: AccountType,
    pub wallet_id: Option<uuid::Uuid>,
    pub chain_id: Option<i64>,
    pub side: EntrySide,
    pub entry_type: String,
    pub amount: Amount,
    pub asset_id: String,
    pub usd_rate: UsdRate,
    pub usd_value: UsdValue,
    pub metadata: Value,
}

impl GeneratedEntry {
    pub fn new(
        account_code: impl Into<String>,
        account_type: AccountType,
        side: EntrySide,
        entry_type: impl Into<String>,
        amount: Amount,
        asset_id: impl Into<String>,
        usd_rate: UsdRate,
        usd_value: UsdValue,
    ) -> Self {
        Self {
            account_code: account_code.into(),
            account_type,
            wallet_id: None,
            chain_id: None,
            side,
            entry_type: entry_type.into(),
            amount,
            asset_id: asset_id.into(),
            usd_rate,
            usd_value,
            metadata: Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_wallet(mut self, wallet_id: uuid::Uuid) -> Self {
        self.wallet_id = Some(wallet_id);
        self
    }

    pub fn with_chain(mut self, chain_id: i64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A single handler: payload validation plus balanced entry generation.
/// Implementations never touch persistence (§4.1); `generate_entries`
/// returns entries addressed by account code, which the ledger service
/// resolves or creates inside the persistence transaction.
pub trait TransactionHandler: Send + Sync {
    /// Payload-shape and business validation (wallet exists, asset
    /// non-empty, amount parseable, sufficient balance for outcomes, ...).
    fn validate(&self, payload: &Payload) -> Result<(), String>;

    /// Produces the balanced entry set for this transaction type. Called
    /// only after `validate` has returned `Ok`.
    fn generate_entries(&self, payload: &Payload) -> Result<Vec<GeneratedEntry>, String>;
}

/// Read-only after startup; see module doc comment.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Arc<HashMap<String, Arc<dyn TransactionHandler>>>,
}

/// Builder used during process startup; consumed into a [`HandlerRegistry`]
/// once all handlers are registered.
#[derive(Default)]
pub struct HandlerRegistryBuilder {
    handlers: HashMap<String, Arc<dyn TransactionHandler>>,
}

impl HandlerRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `tx_type`. Registering a tag already
    /// present is an error (§4.1).
    pub fn register(
        &mut self,
        tx_type: &str,
        handler: Arc<dyn TransactionHandler>,
    ) -> Result<&mut Self, RegistryError> {
        if self.handlers.contains_key(tx_type) {
            return Err(RegistryError::DuplicateRegistration(tx_type.to_string()));
        }
        self.handlers.insert(tx_type.to_string(), handler);
        Ok(self)
    }

    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            handlers: Arc::new(self.handlers),
        }
    }
}

impl HandlerRegistry {
    pub fn get(&self, tx_type: &str) -> Option<Arc<dyn TransactionHandler>> {
        self.handlers.get(tx_type).cloned()
    }

    pub fn is_registered(&self, tx_type: &str) -> bool {
        self.handlers.contains_key(tx_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopHandler;

    impl TransactionHandler for NoopHandler {
        fn validate(&self, _payload: &Payload) -> Result<(), String> {
            Ok(())
        }

        fn generate_entries(&self, _payload: &Payload) -> Result<Vec<GeneratedEntry>, String> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut builder = HandlerRegistryBuilder::new();
        builder.register("manual_income", Arc::new(NoopHandler)).unwrap();
        let err = builder
            .register("manual_income", Arc::new(NoopHandler))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateRegistration(tag) if tag == "manual_income"));
    }

    #[test]
    fn lookup_after_build_is_read_only() {
        let mut builder = HandlerRegistryBuilder::new();
        builder.register("swap", Arc::new(NoopHandler)).unwrap();
        let registry = builder.build();
        assert!(registry.is_registered("swap"));
        assert!(registry.get("swap").is_some());
        assert!(registry.get("unknown").is_none());
    }
}
