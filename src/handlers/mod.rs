//! Command Handlers module
//!
//! Orchestration of business operations. The transfer engine is the only
//! write path into balances and the ledger.

mod commands;
mod transfer_engine;

pub use commands::*;
pub use transfer_engine::TransferEngine;
