//! ewallet Library
//!
//! Re-exports modules for integration testing and external use.

pub mod api;
pub mod domain;
pub mod handlers;
pub mod limits;
pub mod store;
pub mod validation;

pub mod config;
pub mod db;
mod error;

pub use config::{Config, EngineConfig};
pub use domain::{AmountCents, OperationContext, TransferError};
pub use error::{AppError, AppResult, ErrorResponse};
pub use handlers::{SendMoneyCommand, SendMoneyResult, TransferEngine};
pub use limits::TransferLimits;
