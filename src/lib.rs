//! Oracle Indexer Library
//!
//! Price-source resolution and fallback-oracle decisions for an on-chain price oracle

pub mod config;
pub mod error;
pub mod oracle;
pub mod persistence;
pub mod scenario;
pub mod types;
