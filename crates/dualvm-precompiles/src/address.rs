//! Address-space mapping between EVM addresses and Starknet felts.
//!
//! Every account known to the token has exactly one canonical identity: its
//! Starknet address (a field element). EVM addresses are projected onto that
//! space by a deterministic derivation salted with the account deployer, so an
//! account can be presented either way and still hit the same ledger row.
//!
//! ## Derivation
//!
//! ```text
//! felt = keccak256("dualvm.starknet_address" ‖ deployer ‖ evm_address) & (2^250 - 1)
//! ```
//!
//! Masking to 250 bits follows Starknet's `sn_keccak` convention and keeps every
//! derived value below [`STARK_PRIME`].

use alloy_primitives::{keccak256, uint, Address, B256, U256};
use std::{fmt, hash::Hash, str::FromStr};
use thiserror::Error;

/// The Starknet field prime `2^251 + 17 * 2^192 + 1`.
pub const STARK_PRIME: U256 =
    uint!(0x0800000000000011000000000000000000000000000000000000000000000001_U256);

/// Mask keeping the low 250 bits of a word.
const MASK_250: U256 =
    uint!(0x03ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff_U256);

/// Widest raw value that still fits an EVM address.
const EVM_ADDRESS_BITS: usize = 160;

const DERIVATION_DOMAIN: &[u8] = b"dualvm.starknet_address";

/// Errors raised while canonicalising a raw address.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum AddressError {
    /// The value does not fit in 160 bits.
    #[error("evm address out of range: {0:#x}")]
    EvmOutOfRange(U256),
    /// The value is not a valid field element.
    #[error("felt out of range: {0:#x} >= STARK_PRIME")]
    FeltOutOfRange(U256),
    /// The zero address cannot take part in a transfer or approval.
    #[error("zero address is not a valid counterparty")]
    Zero,
}

/// Which address space a raw value was presented in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressSpace {
    /// 160-bit EVM address.
    Evm,
    /// Starknet field element.
    Native,
}

/// A Starknet field element, always strictly below [`STARK_PRIME`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Felt(U256);

impl Felt {
    /// The zero element.
    pub const ZERO: Self = Self(U256::ZERO);

    /// Validates `value` as a field element.
    pub fn new(value: U256) -> Result<Self, AddressError> {
        if value >= STARK_PRIME {
            return Err(AddressError::FeltOutOfRange(value));
        }
        Ok(Self(value))
    }

    /// Returns the underlying word.
    pub const fn to_u256(self) -> U256 {
        self.0
    }

    /// Returns `true` for the zero element.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl TryFrom<U256> for Felt {
    type Error = AddressError;

    fn try_from(value: U256) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Felt> for U256 {
    fn from(felt: Felt) -> Self {
        felt.0
    }
}

impl fmt::Display for Felt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// An address as presented at the ABI boundary, tagged with its space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawAddress {
    /// Presented through an `address` parameter.
    Evm(Address),
    /// Presented through a `uint256` parameter.
    Native(U256),
}

impl RawAddress {
    /// Returns the address space of this value.
    pub const fn space(&self) -> AddressSpace {
        match self {
            Self::Evm(_) => AddressSpace::Evm,
            Self::Native(_) => AddressSpace::Native,
        }
    }

    /// Tags a raw `address` argument word, rejecting words wider than 160 bits.
    pub fn from_evm_word(word: U256) -> Result<Self, AddressError> {
        evm_from_word(word).map(Self::Evm)
    }

    /// Returns the value as a raw 256-bit word.
    pub fn to_word(&self) -> U256 {
        match self {
            Self::Evm(address) => address.into_word().into(),
            Self::Native(value) => *value,
        }
    }
}

impl From<Address> for RawAddress {
    fn from(address: Address) -> Self {
        Self::Evm(address)
    }
}

impl From<Felt> for RawAddress {
    fn from(felt: Felt) -> Self {
        Self::Native(felt.to_u256())
    }
}

impl FromStr for RawAddress {
    type Err = String;

    /// Parses a 20-byte `0x`-prefixed hex string as an EVM address and anything
    /// else as a numeric felt (hex with `0x`, or decimal).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() == 42 && s.starts_with("0x") {
            return Address::from_str(s)
                .map(Self::Evm)
                .map_err(|err| err.to_string());
        }
        U256::from_str(s)
            .map(Self::Native)
            .map_err(|err| err.to_string())
    }
}

/// The canonical identity of an account.
///
/// Equality and hashing only consider the felt, so the EVM and native
/// presentations of one account are the same key.
#[derive(Debug, Clone, Copy)]
pub struct CanonicalId {
    native: Felt,
    evm: Option<Address>,
}

impl CanonicalId {
    /// Returns the canonical felt.
    pub const fn native(&self) -> Felt {
        self.native
    }

    /// Returns the EVM projection, when known.
    pub const fn evm(&self) -> Option<Address> {
        self.evm
    }

    /// Attaches a known EVM projection.
    pub const fn with_evm(mut self, evm: Address) -> Self {
        self.evm = Some(evm);
        self
    }

    /// Returns `true` if either presentation is the zero address.
    pub fn is_zero(&self) -> bool {
        self.native.is_zero() || self.evm.is_some_and(|evm| evm.is_zero())
    }
}

impl PartialEq for CanonicalId {
    fn eq(&self, other: &Self) -> bool {
        self.native == other.native
    }
}

impl Eq for CanonicalId {}

impl Hash for CanonicalId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.native.hash(state);
    }
}

/// Maps raw addresses from either space onto canonical identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressMapper {
    deployer: Address,
}

impl AddressMapper {
    /// Creates a mapper whose EVM derivation is salted with `deployer`.
    pub const fn new(deployer: Address) -> Self {
        Self { deployer }
    }

    /// Derives the Starknet address backing an EVM address.
    pub fn derive_native(&self, evm: Address) -> Felt {
        let mut preimage = Vec::with_capacity(DERIVATION_DOMAIN.len() + 40);
        preimage.extend_from_slice(DERIVATION_DOMAIN);
        preimage.extend_from_slice(self.deployer.as_slice());
        preimage.extend_from_slice(evm.as_slice());
        let word = U256::from_be_bytes(keccak256(&preimage).0) & MASK_250;
        Felt(word)
    }

    /// Canonical identity of an EVM-presented account.
    pub fn from_evm(&self, evm: Address) -> CanonicalId {
        CanonicalId {
            native: self.derive_native(evm),
            evm: Some(evm),
        }
    }

    /// Canonical identity of a natively-presented account.
    pub const fn from_native(&self, native: Felt) -> CanonicalId {
        CanonicalId { native, evm: None }
    }

    /// Canonicalises `raw` presented in `space`.
    pub fn to_canonical(
        &self,
        space: AddressSpace,
        raw: U256,
    ) -> Result<CanonicalId, AddressError> {
        match space {
            AddressSpace::Evm => evm_from_word(raw).map(|evm| self.from_evm(evm)),
            AddressSpace::Native => Felt::new(raw).map(|felt| self.from_native(felt)),
        }
    }

    /// Canonicalises a tagged raw address.
    pub fn resolve(&self, raw: RawAddress) -> Result<CanonicalId, AddressError> {
        self.to_canonical(raw.space(), raw.to_word())
    }

    /// Projects a canonical identity back to its EVM address, if it has one.
    pub const fn to_evm(&self, id: &CanonicalId) -> Option<Address> {
        id.evm
    }

    /// Projects a canonical identity onto its Starknet address.
    pub const fn to_native(&self, id: &CanonicalId) -> Felt {
        id.native
    }
}

fn evm_from_word(word: U256) -> Result<Address, AddressError> {
    if word.bit_len() > EVM_ADDRESS_BITS {
        return Err(AddressError::EvmOutOfRange(word));
    }
    Ok(Address::from_word(B256::from(word)))
}
