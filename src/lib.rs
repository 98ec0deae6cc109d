//! DealScope: saved-search deal scanner for Kleinanzeigen and Vinted.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod dashboard;
pub mod engine;
pub mod events;
pub mod marketplaces;
pub mod storage;
pub mod types;
