//! Token ledger keyed by canonical identity.
//!
//! ## Storage Layout
//!
//! All keys are canonical felts, so an account's EVM and Starknet presentations
//! share one row.
//!
//! | Slot | Description |
//! |------|-------------|
//! | `keccak256(felt ‖ 0)` | Balance |
//! | `keccak256(spender ‖ keccak256(owner ‖ 1))` | Allowance |
//! | `2` | Total supply |
//! | `keccak256(felt ‖ 3)` | Registered EVM address for the felt |
//!
//! Every mutating operation validates first and writes last, so an operation
//! that returns an error has not touched storage.

use crate::{
    abi::IDualVmToken,
    address::{AddressError, AddressMapper, CanonicalId, Felt, RawAddress},
    error::TokenError,
    guard::DirectCall,
    storage::LedgerStorage,
};
use alloy::sol_types::SolEvent;
use alloy_primitives::{keccak256, Address, B256, U256};

/// Base slot of the balance mapping.
pub const BALANCES_SLOT: U256 = U256::ZERO;
/// Base slot of the nested allowance mapping.
pub const ALLOWANCES_SLOT: U256 = U256::from_limbs([1, 0, 0, 0]);
/// Slot holding the total supply.
pub const TOTAL_SUPPLY_SLOT: U256 = U256::from_limbs([2, 0, 0, 0]);
/// Base slot of the felt to EVM address registry.
pub const EVM_REGISTRY_SLOT: U256 = U256::from_limbs([3, 0, 0, 0]);

/// Solidity-style mapping slot: `keccak256(key ‖ base)`.
fn mapping_slot(key: U256, base: U256) -> U256 {
    let mut preimage = [0u8; 64];
    preimage[..32].copy_from_slice(&key.to_be_bytes::<32>());
    preimage[32..].copy_from_slice(&base.to_be_bytes::<32>());
    U256::from_be_bytes(keccak256(preimage).0)
}

fn balance_slot(account: Felt) -> U256 {
    mapping_slot(account.to_u256(), BALANCES_SLOT)
}

fn allowance_slot(owner: Felt, spender: Felt) -> U256 {
    mapping_slot(
        spender.to_u256(),
        mapping_slot(owner.to_u256(), ALLOWANCES_SLOT),
    )
}

fn registry_slot(account: Felt) -> U256 {
    mapping_slot(account.to_u256(), EVM_REGISTRY_SLOT)
}

/// A validated balance movement, ready to be written.
#[derive(Debug, Clone, Copy)]
struct PlannedMove {
    from: Felt,
    to: Felt,
    from_balance: U256,
    to_balance: U256,
}

/// Balances, allowances and supply of the dual address-space token.
#[derive(Debug)]
pub struct TokenLedger<S> {
    storage: S,
    mapper: AddressMapper,
}

impl<S: LedgerStorage> TokenLedger<S> {
    /// Creates a ledger over `storage`.
    pub const fn new(storage: S, mapper: AddressMapper) -> Self {
        Self { storage, mapper }
    }

    /// The address mapper used to canonicalise callers.
    pub const fn mapper(&self) -> &AddressMapper {
        &self.mapper
    }

    /// Consumes the ledger, returning its storage.
    pub fn into_storage(self) -> S {
        self.storage
    }

    // === Views ===

    /// Balance of `account`.
    pub fn balance_of(&mut self, account: &CanonicalId) -> Result<U256, TokenError> {
        Ok(self.storage.sload(balance_slot(account.native()))?)
    }

    /// Amount `spender` may still move out of `owner`.
    pub fn allowance(
        &mut self,
        owner: &CanonicalId,
        spender: &CanonicalId,
    ) -> Result<U256, TokenError> {
        Ok(self
            .storage
            .sload(allowance_slot(owner.native(), spender.native()))?)
    }

    /// Total minted supply.
    pub fn total_supply(&mut self) -> Result<U256, TokenError> {
        Ok(self.storage.sload(TOTAL_SUPPLY_SLOT)?)
    }

    /// EVM address registered for `account`, if it has ever acted through one.
    pub fn evm_address_of(&mut self, account: Felt) -> Result<Option<Address>, TokenError> {
        let word = self.storage.sload(registry_slot(account))?;
        if word.is_zero() {
            return Ok(None);
        }
        Ok(Some(Address::from_word(B256::from(word))))
    }

    /// Canonicalises `raw`, attaching the registered EVM projection to
    /// natively-presented accounts.
    pub fn resolve(&mut self, raw: RawAddress) -> Result<CanonicalId, TokenError> {
        let id = self.mapper.resolve(raw)?;
        if id.evm().is_some() {
            return Ok(id);
        }
        Ok(match self.evm_address_of(id.native())? {
            Some(evm) => id.with_evm(evm),
            None => id,
        })
    }

    // === Mutations ===

    /// Moves `amount` from the caller to `to`.
    pub fn transfer(
        &mut self,
        origin: &DirectCall,
        to: &CanonicalId,
        amount: U256,
    ) -> Result<(), TokenError> {
        let caller = self.mapper.from_evm(origin.caller());
        ensure_counterparty(to)?;
        if amount.is_zero() {
            return Ok(());
        }

        let planned = self.plan_move(&caller, to, amount)?;

        if let Some(planned) = planned {
            self.apply_move(planned)?;
        }
        self.register(&caller)?;
        self.register(to)?;
        self.emit_transfer(caller.native(), to.native(), amount)?;

        tracing::info!(
            target: "dual_vm_token",
            from = %caller.native(),
            to = %to.native(),
            %amount,
            "transfer executed"
        );
        Ok(())
    }

    /// Sets the caller's allowance for `spender` to `amount`.
    pub fn approve(
        &mut self,
        origin: &DirectCall,
        spender: &CanonicalId,
        amount: U256,
    ) -> Result<(), TokenError> {
        let owner = self.mapper.from_evm(origin.caller());
        ensure_counterparty(spender)?;

        self.storage.sstore(
            allowance_slot(owner.native(), spender.native()),
            amount,
        )?;
        self.register(&owner)?;
        self.register(spender)?;
        self.storage.emit(
            IDualVmToken::Approval {
                owner: owner.native().to_u256(),
                spender: spender.native().to_u256(),
                value: amount,
            }
            .encode_log_data(),
        )?;

        tracing::info!(
            target: "dual_vm_token",
            owner = %owner.native(),
            spender = %spender.native(),
            %amount,
            "approval set"
        );
        Ok(())
    }

    /// Moves `amount` from `owner` to `to`, spending the caller's allowance.
    ///
    /// The allowance is decremented by exactly `amount`; no value is treated
    /// as unlimited.
    pub fn transfer_from(
        &mut self,
        origin: &DirectCall,
        owner: &CanonicalId,
        to: &CanonicalId,
        amount: U256,
    ) -> Result<(), TokenError> {
        let spender = self.mapper.from_evm(origin.caller());
        ensure_counterparty(owner)?;
        ensure_counterparty(to)?;
        if amount.is_zero() {
            return Ok(());
        }

        let slot = allowance_slot(owner.native(), spender.native());
        let allowance = self.storage.sload(slot)?;
        let remaining = allowance
            .checked_sub(amount)
            .ok_or(TokenError::InsufficientAllowance {
                available: allowance,
                required: amount,
            })?;
        let planned = self.plan_move(owner, to, amount)?;

        self.storage.sstore(slot, remaining)?;
        if let Some(planned) = planned {
            self.apply_move(planned)?;
        }
        self.register(&spender)?;
        self.register(owner)?;
        self.register(to)?;
        self.emit_transfer(owner.native(), to.native(), amount)?;

        tracing::info!(
            target: "dual_vm_token",
            spender = %spender.native(),
            owner = %owner.native(),
            to = %to.native(),
            %amount,
            %remaining,
            "transferFrom executed"
        );
        Ok(())
    }

    /// Credits `amount` to `holder` and the total supply.
    ///
    /// Only used while building the genesis storage image.
    pub fn mint_genesis(&mut self, holder: &CanonicalId, amount: U256) -> Result<(), TokenError> {
        ensure_counterparty(holder)?;

        let supply = self
            .total_supply()?
            .checked_add(amount)
            .ok_or(TokenError::BalanceOverflow)?;
        let balance = self
            .balance_of(holder)?
            .checked_add(amount)
            .ok_or(TokenError::BalanceOverflow)?;

        self.storage.sstore(TOTAL_SUPPLY_SLOT, supply)?;
        self.storage.sstore(balance_slot(holder.native()), balance)?;
        self.register(holder)?;
        self.emit_transfer(Felt::ZERO, holder.native(), amount)?;

        tracing::info!(
            target: "dual_vm_token",
            holder = %holder.native(),
            %amount,
            %supply,
            "genesis mint"
        );
        Ok(())
    }

    // === Internals ===

    /// Validates a movement without writing. Returns `None` for a
    /// self-transfer, which needs no write once the balance is checked.
    fn plan_move(
        &mut self,
        from: &CanonicalId,
        to: &CanonicalId,
        amount: U256,
    ) -> Result<Option<PlannedMove>, TokenError> {
        let available = self.balance_of(from)?;
        let from_balance = available
            .checked_sub(amount)
            .ok_or(TokenError::InsufficientBalance {
                available,
                required: amount,
            })?;

        if from == to {
            tracing::debug!(target: "dual_vm_token", account = %from.native(), "self-transfer");
            return Ok(None);
        }

        let to_balance = self
            .balance_of(to)?
            .checked_add(amount)
            .ok_or(TokenError::BalanceOverflow)?;

        Ok(Some(PlannedMove {
            from: from.native(),
            to: to.native(),
            from_balance,
            to_balance,
        }))
    }

    fn apply_move(&mut self, planned: PlannedMove) -> Result<(), TokenError> {
        self.storage
            .sstore(balance_slot(planned.from), planned.from_balance)?;
        self.storage
            .sstore(balance_slot(planned.to), planned.to_balance)?;
        Ok(())
    }

    /// Records the EVM projection of `account` the first time it is seen.
    fn register(&mut self, account: &CanonicalId) -> Result<(), TokenError> {
        let Some(evm) = account.evm() else {
            return Ok(());
        };
        let slot = registry_slot(account.native());
        if self.storage.sload(slot)?.is_zero() {
            self.storage.sstore(slot, evm.into_word().into())?;
            tracing::debug!(
                target: "dual_vm_token",
                %evm,
                starknet = %account.native(),
                "registered evm address"
            );
        }
        Ok(())
    }

    fn emit_transfer(&mut self, from: Felt, to: Felt, value: U256) -> Result<(), TokenError> {
        self.storage.emit(
            IDualVmToken::Transfer {
                from: from.to_u256(),
                to: to.to_u256(),
                value,
            }
            .encode_log_data(),
        )?;
        Ok(())
    }
}

fn ensure_counterparty(account: &CanonicalId) -> Result<(), TokenError> {
    if account.is_zero() {
        return Err(AddressError::Zero.into());
    }
    Ok(())
}
