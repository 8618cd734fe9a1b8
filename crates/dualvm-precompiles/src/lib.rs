//! # Dual-VM Token Precompile
//!
//! This crate provides a stateful EVM precompile implementing a token whose
//! accounts are addressable both by 160-bit EVM address and by Starknet felt.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`address`] | Canonical identities across the two address spaces |
//! | [`guard`] | Call-origin guard rejecting delegated mutations |
//! | [`storage`] | Slot-level storage seam (journal or in-memory) |
//! | [`ledger`] | Balances, allowances, supply and EVM registry |
//! | [`dual_vm_token`] | The precompile: ABI dispatch and return encoding |
//! | [`config`] | Installation settings, loadable from the environment |
//!
//! ## Integration
//!
//! The precompile is registered by `dualvm_revm::DualVmEvmFactory`, which
//! wraps the standard `EthEvmFactory` and injects it into every EVM it builds.
//!
//! ```ignore
//! use dualvm_precompiles::{config::DualVmTokenConfig, dual_vm_token::DualVmTokenPrecompile};
//! use dualvm_revm::DualVmEvmFactory;
//!
//! let token = DualVmTokenPrecompile::new(DualVmTokenConfig::from_env()?);
//! let factory = DualVmEvmFactory::new(EthEvmFactory::default(), Some(token));
//! ```
//!
//! ## Security Considerations
//!
//! - Mutations only run when the call executes in the token's own storage
//!   context; `DELEGATECALL` and `CALLCODE` wrappers get `false`
//! - All checks precede all writes, so refused calls leave no trace
//! - Allowances are strictly decremented, with no unlimited sentinel

pub mod abi;
pub mod address;
pub mod config;
pub mod dual_vm_token;
pub mod error;
pub mod guard;
pub mod ledger;
pub mod storage;

pub use address::{AddressMapper, AddressSpace, CanonicalId, Felt, RawAddress};
pub use config::DualVmTokenConfig;
pub use dual_vm_token::{DualVmTokenPrecompile, DUAL_VM_TOKEN_PRECOMPILE_ADDR};
pub use error::TokenError;
