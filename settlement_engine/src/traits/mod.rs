//! Behaviour contracts for settlement backends and the external processor.
//!
//! The engine's public API types are generic over these traits, so that the SQLite backend can be swapped for
//! Postgres, and the live processor client for a scripted one in tests, without touching the flow logic.

mod payee_account_management;
mod processor_client;
mod settlement_database;

pub use payee_account_management::PayeeAccountManagement;
pub use processor_client::ProcessorClient;
pub use settlement_database::{SettlementDatabase, SettlementError};
