//! # Settlement engine public API
//!
//! The API is modular: clients pick the pieces they need, and every piece is generic over the backend traits. An API
//! instance is created by supplying a database backend (and, where the flow talks to the processor, a client):
//!
//! ```rust,ignore
//! use settlement_engine::{PayeeApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url("sqlite://data/settlement_store.db", 10).await?;
//! let api = PayeeApi::new(db, processor_client);
//! let account = api.get_account("dev_42").await?;
//! ```
//!
//! * [`payee_api`] — the payee account registry: onboarding, capability refresh, hosted-flow links.
//! * [`settlement_api`] — the purchase flow: ledger rows, payment intents, earnings.
//! * [`refund_api`] — administrator-initiated refunds and cancellations.
//! * [`dispute_api`] — dispute ingestion and evidence submission.
//! * [`reconciler`] — the webhook entry point that drives all processor-reported transitions.

pub mod dispute_api;
pub mod errors;
pub mod payee_api;
pub mod reconciler;
pub mod refund_api;
pub mod settlement_api;

pub use dispute_api::DisputeApi;
pub use payee_api::PayeeApi;
pub use reconciler::WebhookReconciler;
pub use refund_api::RefundApi;
pub use settlement_api::{PurchaseIntentResult, SettlementFlowApi};
