//! End-to-end tests for the dual-VM token
//!
//! This crate drives the token precompile through a real EVM, alongside the
//! attacker and forwarder contracts used to probe the call-origin guard.


#[cfg(test)]
pub(crate) mod e2e_tests;

// Re-export common test utilities
pub use common::*;
pub use contracts::Contract;
