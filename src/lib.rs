//! Double-entry ledger core and wallet synchronization engine: the
//! append-only ledger, the handler-based classification and entry-generation
//! pipeline, and the bounded-concurrency wallet sync driver.

pub mod amount;
pub mod classifier;
pub mod config;
pub mod db;
pub mod error;
pub mod handler_registry;
pub mod handlers;
pub mod ledger_service;
pub mod payload;
pub mod price_oracle;
pub mod processor;
pub mod provider;
pub mod sync_service;
pub mod types;

#[cfg(any(test, feature = "test_support"))]
pub mod test_support;
