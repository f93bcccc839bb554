//! Implementations of DB and DB models (§3, §6 persisted state layout).

pub mod account;
pub mod ledger_store;
pub mod models;
pub mod schema;
pub mod wallet;
pub mod wallet_db;

pub use wallet_db::{Conn, LedgerDb};
