//! Call-origin guard.
//!
//! A precompile can be reached two ways: through `CALL` (its own code runs
//! against its own account) or through `DELEGATECALL`/`CALLCODE` (its code runs
//! on behalf of another account, which keeps the original `msg.sender`). The
//! second path lets an attacker contract forward a victim's call into the token
//! and have it executed with the victim as caller. The guard binds every
//! mutation to the first path: the storage context of the call must be the
//! code that is executing. A direct call made from a static frame (reached
//! through `STATICCALL`) is refused too, since it must not write.
//!
//! ```text
//! Unchecked ──storage == code──▶ Direct   (pass)
//!     │   └──static frame────────────────────▶ Rejected (block)
//!     └──────storage != code──▶ Delegated ──▶ Rejected (block)
//! ```
//!
//! Passing the guard yields a [`DirectCall`], which every mutating ledger
//! operation takes by reference. Only the guard can construct one.

use alloy_evm::precompiles::PrecompileInput;
use alloy_primitives::Address;
use thiserror::Error;

/// Whose code runs and whose storage it runs against, for a single call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionContext {
    /// Account whose code is executing.
    pub code_address: Address,
    /// Account whose storage the call executes against.
    pub storage_address: Address,
    /// The `msg.sender` seen by the executing code.
    pub caller: Address,
    /// Whether the call runs in a static frame.
    pub is_static: bool,
}

impl ExecutionContext {
    /// Creates a new context.
    pub const fn new(code_address: Address, storage_address: Address, caller: Address) -> Self {
        Self {
            code_address,
            storage_address,
            caller,
            is_static: false,
        }
    }

    /// Marks the context as executing in a static frame.
    pub const fn in_static_frame(mut self) -> Self {
        self.is_static = true;
        self
    }

    /// Builds the context from a precompile invocation.
    pub fn from_input(input: &PrecompileInput<'_>) -> Self {
        Self {
            is_static: input.is_static,
            ..Self::new(input.bytecode_address, input.target_address, input.caller)
        }
    }

    /// Classifies the call.
    pub fn call_kind(&self) -> CallKind {
        if self.storage_address != self.code_address {
            CallKind::Delegated
        } else if self.is_static {
            CallKind::Static
        } else {
            CallKind::Direct
        }
    }
}

/// How the executing code was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Code runs against its own storage.
    Direct,
    /// Code runs against another account's storage.
    Delegated,
    /// Code runs against its own storage, inside a static frame.
    Static,
}

/// Guard progress for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    /// The context has not been inspected yet.
    Unchecked,
    /// The call runs in the ledger's own storage context.
    Direct,
    /// The call runs in a foreign storage context.
    Delegated,
    /// The call was blocked.
    Rejected,
}

impl GuardState {
    /// Returns `true` for `Direct` and `Rejected`.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Direct | Self::Rejected)
    }
}

/// A mutation was attempted from a context that may not write the ledger.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum GuardRejected {
    /// The call runs in a foreign storage context.
    #[error(
        "delegated call rejected: code {code_address} executing against storage of {storage_address}"
    )]
    Delegated {
        /// Account whose code was executing.
        code_address: Address,
        /// Account whose storage the call targeted.
        storage_address: Address,
    },
    /// The call runs in a static frame.
    #[error("mutation rejected in static frame")]
    Static,
}

/// Proof that the guard passed for the current call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectCall {
    caller: Address,
}

impl DirectCall {
    /// The caller authorised to mutate.
    pub const fn caller(&self) -> Address {
        self.caller
    }
}

/// Per-call guard driving a context through [`GuardState`].
#[derive(Debug)]
pub struct CallOriginGuard<'a> {
    context: &'a ExecutionContext,
    state: GuardState,
}

impl<'a> CallOriginGuard<'a> {
    /// Creates an unchecked guard for `context`.
    pub const fn new(context: &'a ExecutionContext) -> Self {
        Self {
            context,
            state: GuardState::Unchecked,
        }
    }

    /// Current state.
    pub const fn state(&self) -> GuardState {
        self.state
    }

    /// Performs one transition. Terminal states are left unchanged.
    pub fn advance(&mut self) -> GuardState {
        self.state = match self.state {
            GuardState::Unchecked => match self.context.call_kind() {
                CallKind::Direct => GuardState::Direct,
                CallKind::Delegated => GuardState::Delegated,
                CallKind::Static => GuardState::Rejected,
            },
            GuardState::Delegated => GuardState::Rejected,
            terminal @ (GuardState::Direct | GuardState::Rejected) => terminal,
        };
        self.state
    }

    /// Runs the guard to a terminal state.
    pub fn check(&mut self) -> Result<DirectCall, GuardRejected> {
        while !self.state.is_terminal() {
            self.advance();
        }

        if self.state == GuardState::Direct {
            return Ok(DirectCall {
                caller: self.context.caller,
            });
        }

        let rejection = match self.context.call_kind() {
            CallKind::Static => GuardRejected::Static,
            CallKind::Direct | CallKind::Delegated => GuardRejected::Delegated {
                code_address: self.context.code_address,
                storage_address: self.context.storage_address,
            },
        };
        tracing::warn!(
            target: "dual_vm_token",
            code = ?self.context.code_address,
            storage = ?self.context.storage_address,
            caller = ?self.context.caller,
            %rejection,
            "call rejected"
        );
        Err(rejection)
    }
}

/// Checks `context` in one step.
pub fn check_call_origin(context: &ExecutionContext) -> Result<DirectCall, GuardRejected> {
    CallOriginGuard::new(context).check()
}
