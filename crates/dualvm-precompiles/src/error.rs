//! Token error taxonomy.

use crate::{address::AddressError, guard::GuardRejected, storage::StorageError};
use alloy_primitives::U256;
use thiserror::Error;

/// Errors produced by token operations.
///
/// Everything except [`TokenError::is_fatal`] variants is reported to callers
/// as a plain `false`, so a guard rejection looks exactly like a failed
/// transfer from the outside.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenError {
    /// An address could not be canonicalised.
    #[error("invalid address format: {0}")]
    InvalidAddressFormat(#[from] AddressError),
    /// The debited account does not hold enough tokens.
    #[error("insufficient balance: {available} < {required}")]
    InsufficientBalance {
        /// Current balance.
        available: U256,
        /// Requested amount.
        required: U256,
    },
    /// The spender is not allowed to move that much.
    #[error("insufficient allowance: {available} < {required}")]
    InsufficientAllowance {
        /// Current allowance.
        available: U256,
        /// Requested amount.
        required: U256,
    },
    /// A mutation was attempted through a delegated call or a static frame.
    #[error(transparent)]
    GuardRejected(#[from] GuardRejected),
    /// A credit would overflow a balance or the supply.
    #[error("balance overflow")]
    BalanceOverflow,
    /// The state backend failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl TokenError {
    /// Returns `true` for failures of the environment rather than of the call.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::BalanceOverflow | Self::Storage(_))
    }
}
