//! Core domain + application logic for the Telegram number-checker service.
//!
//! This crate is intentionally framework-agnostic. The platform transport
//! (MTProto client) and the persistent store live behind ports (traits);
//! `tnc-store` implements the store over Postgres, and `transport::fake`
//! ships an in-process transport for tests and development runs.

pub mod auth;
pub mod config;
pub mod domain;
pub mod errors;
pub mod gateway;
pub mod logging;
pub mod normalize;
pub mod pool;
pub mod probe;
pub mod report;
pub mod session;
pub mod store;
pub mod transport;
pub mod verify;

pub use errors::{Error, Result};
