//! Dual-VM Token Precompile
//!
//! An ERC-20 style token whose accounts can be named by EVM address or by
//! Starknet felt. Every account-taking function is overloaded once per address
//! space; both overloads resolve to the same canonical ledger row.
//!
//! ## Address
//!
//! Installed at `0x00..075004` by default (see [`DualVmTokenConfig::address`]).
//!
//! ## Delegated calls
//!
//! A contract that `DELEGATECALL`s the precompile runs token code against its
//! own storage while `msg.sender` is still the account that called it. Without
//! a check, such a wrapper could spend the caller's balance or allowances in
//! the caller's name. Every mutating function therefore passes the
//! [`guard`](crate::guard) first and returns `false` unless the call runs in
//! the token's own storage context. Mutations from a static frame are refused
//! the same way. Views are unrestricted.
//!
//! ## Return values
//!
//! Mutating functions return an ABI `bool`. Business-rule failures
//! (insufficient funds, zero or malformed addresses, rejected origin) all
//! return `false` with no state change. An `address` argument whose word has
//! any of its upper 96 bits set is malformed; views given one revert. Malformed calldata and state backend
//! failures revert the call with [`PrecompileError`].
//!
//! ## Gas Costs
//!
//! | Call | Gas |
//! |------|-----|
//! | metadata (`name`, `symbol`, `decimals`, `starknetAddressOf`) | [`GAS_METADATA`] |
//! | storage views | [`GAS_VIEW`] |
//! | mutations | [`GAS_MUTATION`] |

use crate::{
    abi::IDualVmToken,
    address::{AddressError, AddressMapper, CanonicalId, RawAddress},
    config::DualVmTokenConfig,
    error::TokenError,
    guard::{check_call_origin, ExecutionContext},
    ledger::TokenLedger,
    storage::{EvmLedgerStorage, MemoryStorage},
};
use alloy::sol_types::{SolCall, SolInterface, SolValue};
use alloy_evm::{
    precompiles::{Precompile, PrecompileInput},
    revm::precompile::{PrecompileError, PrecompileId, PrecompileResult},
    EvmInternals,
};
use alloy_primitives::{address, Address, U256};
use revm::precompile::PrecompileOutput;
use std::{collections::BTreeMap, sync::OnceLock};

/// Default address of the dual-VM token precompile.
pub const DUAL_VM_TOKEN_PRECOMPILE_ADDR: Address =
    address!("0x0000000000000000000000000000000000075004");

/// Gas charged for calls answered from configuration.
pub const GAS_METADATA: u64 = 200;

/// Gas charged for calls reading ledger storage.
pub const GAS_VIEW: u64 = 2_600;

/// Gas charged for mutating calls, whether or not they succeed.
pub const GAS_MUTATION: u64 = 30_000;

/// A state change requested through the ABI, with each account tagged by the
/// address space it was presented in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenMutation {
    /// `transfer(to, amount)`
    Transfer {
        /// Recipient.
        to: RawAddress,
        /// Amount moved.
        amount: U256,
    },
    /// `approve(spender, amount)`
    Approve {
        /// Spender.
        spender: RawAddress,
        /// New allowance.
        amount: U256,
    },
    /// `transferFrom(owner, to, amount)`
    TransferFrom {
        /// Debited account.
        owner: RawAddress,
        /// Recipient.
        to: RawAddress,
        /// Amount moved.
        amount: U256,
    },
}

/// Dual-VM Token Precompile
#[derive(Clone, Debug)]
pub struct DualVmTokenPrecompile {
    config: DualVmTokenConfig,
    mapper: AddressMapper,
}

impl DualVmTokenPrecompile {
    /// Lazily-initialized precompile ID
    pub fn id() -> &'static PrecompileId {
        static ID: OnceLock<PrecompileId> = OnceLock::new();
        ID.get_or_init(|| PrecompileId::custom("dual_vm_token"))
    }

    /// Create new precompile with configuration
    pub const fn new(config: DualVmTokenConfig) -> Self {
        let mapper = config.mapper();
        Self { config, mapper }
    }

    /// Address the precompile is installed at.
    pub const fn address(&self) -> Address {
        self.config.address
    }

    /// The installation's configuration.
    pub const fn config(&self) -> &DualVmTokenConfig {
        &self.config
    }

    /// Storage image of the token account at genesis.
    ///
    /// Empty unless the configuration carries a genesis allocation.
    pub fn genesis_storage(&self) -> Result<BTreeMap<U256, U256>, TokenError> {
        let mut ledger = TokenLedger::new(MemoryStorage::new(), self.mapper);
        if let Some(genesis) = &self.config.genesis {
            let holder = self.mapper.resolve(genesis.holder)?;
            ledger.mint_genesis(&holder, genesis.supply)?;
        }
        Ok(ledger.into_storage().into_slots())
    }

    fn ledger<'a, 'b>(
        &self,
        internals: &'a mut EvmInternals<'b>,
    ) -> Result<TokenLedger<EvmLedgerStorage<'a, 'b>>, PrecompileError> {
        let storage =
            EvmLedgerStorage::new(internals, self.config.address).map_err(fatal_storage)?;
        Ok(TokenLedger::new(storage, self.mapper))
    }

    fn resolve(&self, raw: RawAddress) -> Result<CanonicalId, TokenError> {
        Ok(self.mapper.resolve(raw)?)
    }

    // === Mutations ===

    /// Runs `mutation` after the call-origin guard, mapping the outcome to
    /// the ABI success flag.
    ///
    /// `mutation` is `Err` when an `address` argument was wider than 160 bits;
    /// that is refused like any other business-rule failure.
    fn mutate(
        &self,
        context: &ExecutionContext,
        internals: &mut EvmInternals<'_>,
        gas_limit: u64,
        call: &'static str,
        mutation: Result<TokenMutation, AddressError>,
    ) -> PrecompileResult {
        charge(gas_limit, GAS_MUTATION)?;

        let result = self.execute(context, internals, mutation);
        let success = match result {
            Ok(()) => true,
            Err(err) if err.is_fatal() => {
                tracing::warn!(target: "dual_vm_token", call, %err, "mutation failed");
                return Err(PrecompileError::Other(err.to_string().into()));
            }
            Err(err) => {
                tracing::debug!(
                    target: "dual_vm_token",
                    call,
                    caller = ?context.caller,
                    %err,
                    "mutation refused"
                );
                false
            }
        };

        Ok(PrecompileOutput::new(
            GAS_MUTATION,
            success.abi_encode().into(),
        ))
    }

    fn execute(
        &self,
        context: &ExecutionContext,
        internals: &mut EvmInternals<'_>,
        mutation: Result<TokenMutation, AddressError>,
    ) -> Result<(), TokenError> {
        let origin = check_call_origin(context)?;
        let mutation = mutation?;
        let storage = EvmLedgerStorage::new(internals, self.config.address)?;
        let mut ledger = TokenLedger::new(storage, self.mapper);

        match mutation {
            TokenMutation::Transfer { to, amount } => {
                ledger.transfer(&origin, &self.resolve(to)?, amount)
            }
            TokenMutation::Approve { spender, amount } => {
                ledger.approve(&origin, &self.resolve(spender)?, amount)
            }
            TokenMutation::TransferFrom { owner, to, amount } => ledger.transfer_from(
                &origin,
                &self.resolve(owner)?,
                &self.resolve(to)?,
                amount,
            ),
        }
    }

    // === Views ===

    fn balance_of(
        &self,
        internals: &mut EvmInternals<'_>,
        account: RawAddress,
    ) -> Result<U256, PrecompileError> {
        let account = self.resolve(account).map_err(view_error)?;
        self.ledger(internals)?
            .balance_of(&account)
            .map_err(view_error)
    }

    fn allowance(
        &self,
        internals: &mut EvmInternals<'_>,
        owner: RawAddress,
        spender: RawAddress,
    ) -> Result<U256, PrecompileError> {
        let owner = self.resolve(owner).map_err(view_error)?;
        let spender = self.resolve(spender).map_err(view_error)?;
        self.ledger(internals)?
            .allowance(&owner, &spender)
            .map_err(view_error)
    }
}

impl Default for DualVmTokenPrecompile {
    fn default() -> Self {
        Self::new(DualVmTokenConfig::default())
    }
}

impl Precompile for DualVmTokenPrecompile {
    fn precompile_id(&self) -> &PrecompileId {
        Self::id()
    }

    fn call(&self, mut input: PrecompileInput<'_>) -> PrecompileResult {
        let context = ExecutionContext::from_input(&input);
        let gas_limit = input.gas;

        tracing::debug!(
            target: "dual_vm_token",
            caller = ?context.caller,
            code = ?context.code_address,
            storage = ?context.storage_address,
            is_static = context.is_static,
            gas = gas_limit,
            calldata_len = input.data.len(),
            "precompile call invoked"
        );

        let decoded = match IDualVmToken::IDualVmTokenCalls::abi_decode(input.data) {
            Ok(v) => v,
            Err(e) => return Err(PrecompileError::Other(e.to_string().into())),
        };
        let calldata = input.data;
        let evm = |index| evm_argument(calldata, index);
        let internals = input.internals_mut();

        use IDualVmToken::IDualVmTokenCalls as Calls;
        match decoded {
            // Metadata
            Calls::name(_) => answer(gas_limit, GAS_METADATA, self.config.name.abi_encode()),
            Calls::symbol(_) => answer(gas_limit, GAS_METADATA, self.config.symbol.abi_encode()),
            Calls::decimals(_) => answer(
                gas_limit,
                GAS_METADATA,
                IDualVmToken::decimalsCall::abi_encode_returns(&self.config.decimals),
            ),
            Calls::starknetAddressOf(call) => {
                evm(0).map_err(view_error)?;
                answer(
                    gas_limit,
                    GAS_METADATA,
                    self.mapper.derive_native(call.account).to_u256().abi_encode(),
                )
            }

            // Storage views
            Calls::totalSupply(_) => {
                charge(gas_limit, GAS_VIEW)?;
                let supply = self.ledger(internals)?.total_supply().map_err(view_error)?;
                answer(gas_limit, GAS_VIEW, supply.abi_encode())
            }
            Calls::balanceOf_0(_) => {
                charge(gas_limit, GAS_VIEW)?;
                let account = evm(0).map_err(view_error)?;
                let balance = self.balance_of(internals, account)?;
                answer(gas_limit, GAS_VIEW, balance.abi_encode())
            }
            Calls::balanceOf_1(call) => {
                charge(gas_limit, GAS_VIEW)?;
                let balance =
                    self.balance_of(internals, RawAddress::Native(call.starknetAccount))?;
                answer(gas_limit, GAS_VIEW, balance.abi_encode())
            }
            Calls::allowance_0(_) => {
                charge(gas_limit, GAS_VIEW)?;
                let owner = evm(0).map_err(view_error)?;
                let spender = evm(1).map_err(view_error)?;
                let amount = self.allowance(internals, owner, spender)?;
                answer(gas_limit, GAS_VIEW, amount.abi_encode())
            }
            Calls::allowance_1(call) => {
                charge(gas_limit, GAS_VIEW)?;
                let owner = evm(0).map_err(view_error)?;
                let amount =
                    self.allowance(internals, owner, RawAddress::Native(call.spender))?;
                answer(gas_limit, GAS_VIEW, amount.abi_encode())
            }
            Calls::evmAddressOf(call) => {
                charge(gas_limit, GAS_VIEW)?;
                let account = self
                    .resolve(RawAddress::Native(call.starknetAccount))
                    .map_err(view_error)?;
                let registered = self
                    .ledger(internals)?
                    .evm_address_of(account.native())
                    .map_err(view_error)?;
                answer(gas_limit, GAS_VIEW, registered.unwrap_or_default().abi_encode())
            }

            // Mutations
            Calls::transfer_0(call) => {
                let mutation = evm(0).map(|to| TokenMutation::Transfer {
                    to,
                    amount: call.amount,
                });
                self.mutate(&context, internals, gas_limit, "transfer", mutation)
            }
            Calls::transfer_1(call) => {
                let mutation = Ok(TokenMutation::Transfer {
                    to: RawAddress::Native(call.to),
                    amount: call.amount,
                });
                self.mutate(&context, internals, gas_limit, "transfer", mutation)
            }
            Calls::approve_0(call) => {
                let mutation = evm(0).map(|spender| TokenMutation::Approve {
                    spender,
                    amount: call.amount,
                });
                self.mutate(&context, internals, gas_limit, "approve", mutation)
            }
            Calls::approve_1(call) => {
                let mutation = Ok(TokenMutation::Approve {
                    spender: RawAddress::Native(call.spender),
                    amount: call.amount,
                });
                self.mutate(&context, internals, gas_limit, "approve", mutation)
            }
            Calls::transferFrom_0(call) => {
                let mutation = evm(0).and_then(|owner| {
                    Ok(TokenMutation::TransferFrom {
                        owner,
                        to: evm(1)?,
                        amount: call.amount,
                    })
                });
                self.mutate(&context, internals, gas_limit, "transferFrom", mutation)
            }
            Calls::transferFrom_1(call) => {
                let mutation = evm(1).map(|to| TokenMutation::TransferFrom {
                    owner: RawAddress::Native(call.from),
                    to,
                    amount: call.amount,
                });
                self.mutate(&context, internals, gas_limit, "transferFrom", mutation)
            }
            Calls::transferFrom_2(call) => {
                let mutation = evm(0).map(|owner| TokenMutation::TransferFrom {
                    owner,
                    to: RawAddress::Native(call.to),
                    amount: call.amount,
                });
                self.mutate(&context, internals, gas_limit, "transferFrom", mutation)
            }
            Calls::transferFrom_3(call) => {
                let mutation = Ok(TokenMutation::TransferFrom {
                    owner: RawAddress::Native(call.from),
                    to: RawAddress::Native(call.to),
                    amount: call.amount,
                });
                self.mutate(&context, internals, gas_limit, "transferFrom", mutation)
            }
        }
    }

    fn is_pure(&self) -> bool {
        false
    }
}

fn charge(gas_limit: u64, cost: u64) -> Result<(), PrecompileError> {
    if gas_limit < cost {
        return Err(PrecompileError::OutOfGas);
    }
    Ok(())
}

fn answer(gas_limit: u64, cost: u64, output: Vec<u8>) -> PrecompileResult {
    charge(gas_limit, cost)?;
    Ok(PrecompileOutput::new(cost, output.into()))
}

/// The `index`-th argument of `calldata`, read as an `address` parameter.
///
/// The ABI decoder drops the upper 96 bits of `address` words, so their width
/// is checked against the raw calldata.
fn evm_argument(calldata: &[u8], index: usize) -> Result<RawAddress, AddressError> {
    let offset = 4 + 32 * index;
    let word = calldata
        .get(offset..offset + 32)
        .map(U256::from_be_slice)
        .unwrap_or_default();
    RawAddress::from_evm_word(word)
}

fn view_error(err: impl Into<TokenError>) -> PrecompileError {
    PrecompileError::Other(err.into().to_string().into())
}

fn fatal_storage(err: crate::storage::StorageError) -> PrecompileError {
    PrecompileError::Other(err.to_string().into())
}
