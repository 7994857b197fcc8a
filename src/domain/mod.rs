//! Domain module
//!
//! Core domain types and business rules of the transfer engine.

pub mod amount;
pub mod context;
pub mod error;
pub mod transaction;

pub use amount::{dollars, AmountCents, AmountError};
pub use context::OperationContext;
pub use error::TransferError;
pub use transaction::{LedgerEntry, NewEntry, TransferPair};
