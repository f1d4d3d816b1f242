#![allow(clippy::result_large_err)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
//! Stores, enriches and deploys docker compose stacks.
//!
//! A stack is saved twice: the original document, with plaintext credentials moved to the
//! secret store, and the effective document, which also gets the shared network, resource
//! limits, container names, secret declarations and reverse proxy labels. Deploying resolves
//! the placeholders of the effective document and pipes it to the engine.

pub mod cli;
pub mod config;
pub mod engine;
pub mod enrich;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod inspect;
pub mod manager;
pub mod ports;
pub mod reconcile;
pub mod resolver;
pub mod secrets;
pub mod store;
pub mod variables;

pub use config::*;
pub use errors::*;
