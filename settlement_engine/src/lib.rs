//! Marketplace Settlement Engine
//!
//! The settlement engine is the core of the marketplace payment service: it computes commission splits, maintains the
//! settlement ledger, mirrors payee account state, tracks refund and dispute lifecycles, and reconciles the signed
//! webhook stream from the card-payment processor against local state.
//!
//! The library is divided into three main sections:
//! 1. Database management and control ([`mod@db`]). SQLite is the supported backend. You should never need to access
//!    the database directly; use the public API instead. The exception is the data types used in the database, which
//!    are defined in the [`db_types`] module and are public.
//! 2. The public API ([`mod@api`]). Each API type is generic over the backend traits in [`mod@traits`], so the
//!    storage backend and the processor client can both be swapped out (which is also how the tests run against a
//!    scripted processor).
//! 3. Settlement events ([`mod@events`]). A simple actor framework lets downstream collaborators subscribe to
//!    settlement outcomes (purchase settled, refund settled, dispute closed) without coupling to the flow logic.

mod api;
mod db;

pub mod commission;
pub mod db_types;
pub mod events;
pub mod traits;

pub mod test_utils;

pub use api::{
    errors::{PaymentEngineError, WebhookError},
    DisputeApi,
    PayeeApi,
    PurchaseIntentResult,
    RefundApi,
    SettlementFlowApi,
    WebhookReconciler,
};
#[cfg(feature = "sqlite")]
pub use db::sqlite::SqliteDatabase;
pub use traits::{PayeeAccountManagement, ProcessorClient, SettlementDatabase, SettlementError};
