//! Slot-level storage used by the token ledger.
//!
//! The ledger never names an account: every backend is bound to the ledger's
//! own address when it is created, so reads and writes can only ever land in
//! the token's storage regardless of which context invoked the precompile.

use alloy_evm::{EvmInternals, EvmInternalsError};
use alloy_primitives::{Address, Bytes, Log, LogData, U256};
use revm::bytecode::Bytecode;
use std::{collections::BTreeMap, sync::OnceLock};
use thiserror::Error;

/// Failure of the underlying state backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("ledger storage failure: {0}")]
pub struct StorageError(pub String);

impl From<EvmInternalsError> for StorageError {
    fn from(err: EvmInternalsError) -> Self {
        Self(err.to_string())
    }
}

/// Storage operations for the ledger account.
pub trait LedgerStorage {
    /// Reads `slot`.
    fn sload(&mut self, slot: U256) -> Result<U256, StorageError>;

    /// Writes `value` to `slot`.
    fn sstore(&mut self, slot: U256, value: U256) -> Result<(), StorageError>;

    /// Emits a log from the ledger account.
    fn emit(&mut self, log: LogData) -> Result<(), StorageError>;
}

/// Bytecode marker for the ledger account.
///
/// The account is given the invalid instruction `0xFE` so it is never pruned
/// as empty and never executes as a regular contract.
pub fn ledger_bytecode() -> &'static Bytecode {
    static BYTECODE: OnceLock<Bytecode> = OnceLock::new();
    BYTECODE.get_or_init(|| Bytecode::new_raw(Bytes::from_static(&[0xFE])))
}

/// Ledger storage backed by the EVM journal.
#[derive(Debug)]
pub struct EvmLedgerStorage<'a, 'b> {
    internals: &'a mut EvmInternals<'b>,
    address: Address,
}

impl<'a, 'b> EvmLedgerStorage<'a, 'b> {
    /// Binds the journal to the ledger account at `address`, creating the
    /// account if it does not exist yet.
    pub fn new(
        internals: &'a mut EvmInternals<'b>,
        address: Address,
    ) -> Result<Self, StorageError> {
        let account = internals.load_account(address)?;
        if account.is_loaded_as_not_existing() {
            internals.set_code(address, ledger_bytecode().clone());
            internals.nonce_bump_journal_entry(address);
            internals.touch_account(address);
        }
        Ok(Self { internals, address })
    }
}

impl LedgerStorage for EvmLedgerStorage<'_, '_> {
    fn sload(&mut self, slot: U256) -> Result<U256, StorageError> {
        let value = self.internals.sload(self.address, slot)?;
        Ok(value.data)
    }

    fn sstore(&mut self, slot: U256, value: U256) -> Result<(), StorageError> {
        self.internals.sstore(self.address, slot, value)?;
        self.internals.touch_account(self.address);
        Ok(())
    }

    fn emit(&mut self, log: LogData) -> Result<(), StorageError> {
        self.internals.log(Log {
            address: self.address,
            data: log,
        });
        Ok(())
    }
}

/// In-memory ledger storage.
///
/// Used to build the genesis storage image and in tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStorage {
    slots: BTreeMap<U256, U256>,
    logs: Vec<LogData>,
}

impl MemoryStorage {
    /// Creates empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-zero slots written so far.
    pub const fn slots(&self) -> &BTreeMap<U256, U256> {
        &self.slots
    }

    /// Logs emitted so far.
    pub fn logs(&self) -> &[LogData] {
        &self.logs
    }

    /// Consumes the storage, returning its slots.
    pub fn into_slots(self) -> BTreeMap<U256, U256> {
        self.slots
    }
}

impl LedgerStorage for MemoryStorage {
    fn sload(&mut self, slot: U256) -> Result<U256, StorageError> {
        Ok(self.slots.get(&slot).copied().unwrap_or_default())
    }

    fn sstore(&mut self, slot: U256, value: U256) -> Result<(), StorageError> {
        if value.is_zero() {
            self.slots.remove(&slot);
        } else {
            self.slots.insert(slot, value);
        }
        Ok(())
    }

    fn emit(&mut self, log: LogData) -> Result<(), StorageError> {
        self.logs.push(log);
        Ok(())
    }
}
