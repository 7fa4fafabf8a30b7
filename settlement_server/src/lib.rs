//! Marketplace Settlement Server
//!
//! The HTTP front end for the settlement engine. Authentication happens upstream at the API gateway, which forwards
//! a verified identity in headers; this crate is responsible for authorization, request validation, and translating
//! engine errors into HTTP responses. The webhook endpoint is the exception: it authenticates its caller itself,
//! via the processor's payload signature.

pub mod auth;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod integrations;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
