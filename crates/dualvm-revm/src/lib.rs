//! Dual-VM token integration for `revm`.

pub mod factory;

pub use factory::{with_dual_vm_token, DualVmEvmFactory};
