//! Client library for the external card-payment processor.
//!
//! The processor holds the funds, splits charges between the platform and connected payee accounts, and notifies us
//! of charge, refund and dispute lifecycle changes via signed webhooks. This crate contains the wire data objects,
//! a thin REST client, and the webhook signature scheme. It knows nothing about the settlement ledger; the engine
//! crate consumes these types through its `ProcessorClient` trait.

pub mod api;
pub mod config;
pub mod data_objects;
mod error;
pub mod webhook;

pub use api::ProcessorApi;
pub use config::ProcessorConfig;
pub use error::ProcessorApiError;
