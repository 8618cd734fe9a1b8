//! Configuration for the dual-VM token precompile.

use crate::{
    address::{AddressError, AddressMapper, RawAddress},
    dual_vm_token::DUAL_VM_TOKEN_PRECOMPILE_ADDR,
};
use alloy_primitives::{address, Address, U256};
use std::{env, str::FromStr};
use thiserror::Error;

/// Installation address of the token.
pub const ENV_TOKEN_ADDR: &str = "DUALVM_TOKEN_ADDR";
/// Token name.
pub const ENV_TOKEN_NAME: &str = "DUALVM_TOKEN_NAME";
/// Token symbol.
pub const ENV_TOKEN_SYMBOL: &str = "DUALVM_TOKEN_SYMBOL";
/// Token decimals.
pub const ENV_TOKEN_DECIMALS: &str = "DUALVM_TOKEN_DECIMALS";
/// Account deployer salting the EVM to felt derivation.
pub const ENV_ACCOUNT_DEPLOYER: &str = "DUALVM_ACCOUNT_DEPLOYER";
/// Genesis holder, either an EVM address or a felt.
pub const ENV_GENESIS_HOLDER: &str = "DUALVM_GENESIS_HOLDER";
/// Genesis supply credited to the holder.
pub const ENV_GENESIS_SUPPLY: &str = "DUALVM_GENESIS_SUPPLY";

/// Default account deployer.
pub const DEFAULT_ACCOUNT_DEPLOYER: Address =
    address!("0x00000000000000000000000000000000000d3910");

/// Supply minted to one holder when the chain starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenGenesis {
    /// Receiving account, in either address space.
    pub holder: RawAddress,
    /// Amount minted.
    pub supply: U256,
}

/// Settings of one dual-VM token installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DualVmTokenConfig {
    /// Address the precompile is installed at.
    pub address: Address,
    /// ERC-20 name.
    pub name: String,
    /// ERC-20 symbol.
    pub symbol: String,
    /// ERC-20 decimals.
    pub decimals: u8,
    /// Deployer salting the EVM to Starknet address derivation.
    pub account_deployer: Address,
    /// Initial allocation, if any.
    pub genesis: Option<TokenGenesis>,
}

impl Default for DualVmTokenConfig {
    fn default() -> Self {
        Self {
            address: DUAL_VM_TOKEN_PRECOMPILE_ADDR,
            name: "Dual VM Token".to_string(),
            symbol: "DVT".to_string(),
            decimals: 18,
            account_deployer: DEFAULT_ACCOUNT_DEPLOYER,
            genesis: None,
        }
    }
}

impl DualVmTokenConfig {
    /// Sets the genesis allocation.
    pub fn with_genesis(mut self, holder: impl Into<RawAddress>, supply: U256) -> Self {
        self.genesis = Some(TokenGenesis {
            holder: holder.into(),
            supply,
        });
        self
    }

    /// Address mapper for this installation.
    pub const fn mapper(&self) -> AddressMapper {
        AddressMapper::new(self.account_deployer)
    }

    /// Checks the configuration for values the precompile cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.address.is_zero() {
            return Err(ConfigError::ZeroAddress);
        }
        if self.symbol.trim().is_empty() {
            return Err(ConfigError::EmptySymbol);
        }
        if let Some(genesis) = &self.genesis {
            let holder = self.mapper().resolve(genesis.holder)?;
            if holder.is_zero() {
                return Err(AddressError::Zero.into());
            }
        }
        Ok(())
    }

    /// Loads the configuration from the environment.
    ///
    /// Unset variables keep their default. The genesis allocation is only
    /// configured when both holder and supply are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let address = optional_env(ENV_TOKEN_ADDR)?
            .map(|raw| parse_address(ENV_TOKEN_ADDR, &raw))
            .transpose()?
            .unwrap_or(defaults.address);
        let account_deployer = optional_env(ENV_ACCOUNT_DEPLOYER)?
            .map(|raw| parse_address(ENV_ACCOUNT_DEPLOYER, &raw))
            .transpose()?
            .unwrap_or(defaults.account_deployer);
        let name = optional_env(ENV_TOKEN_NAME)?.unwrap_or(defaults.name);
        let symbol = optional_env(ENV_TOKEN_SYMBOL)?.unwrap_or(defaults.symbol);
        let decimals = optional_env(ENV_TOKEN_DECIMALS)?
            .map(|raw| {
                raw.parse::<u8>().map_err(|err| ConfigError::InvalidValue {
                    var: ENV_TOKEN_DECIMALS.into(),
                    reason: err.to_string(),
                })
            })
            .transpose()?
            .unwrap_or(defaults.decimals);

        let genesis = match (
            optional_env(ENV_GENESIS_HOLDER)?,
            optional_env(ENV_GENESIS_SUPPLY)?,
        ) {
            (Some(holder), Some(supply)) => Some(TokenGenesis {
                holder: RawAddress::from_str(&holder).map_err(|reason| {
                    ConfigError::InvalidValue {
                        var: ENV_GENESIS_HOLDER.into(),
                        reason,
                    }
                })?,
                supply: U256::from_str(&supply).map_err(|err| ConfigError::InvalidValue {
                    var: ENV_GENESIS_SUPPLY.into(),
                    reason: err.to_string(),
                })?,
            }),
            (None, None) => None,
            (Some(_), None) => {
                return Err(ConfigError::MissingEnv {
                    var: ENV_GENESIS_SUPPLY.into(),
                })
            }
            (None, Some(_)) => {
                return Err(ConfigError::MissingEnv {
                    var: ENV_GENESIS_HOLDER.into(),
                })
            }
        };

        let config = Self {
            address,
            name,
            symbol,
            decimals,
            account_deployer,
            genesis,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Errors that can occur while building a [`DualVmTokenConfig`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable required by another one was not set.
    #[error("environment variable {var} is not set")]
    MissingEnv {
        /// Name of the missing variable.
        var: String,
    },
    /// A variable was set to an empty or whitespace string.
    #[error("environment variable {var} is empty")]
    EmptyEnv {
        /// Name of the empty variable.
        var: String,
    },
    /// A variable could not be parsed.
    #[error("invalid value for {var}: {reason}")]
    InvalidValue {
        /// Name of the variable.
        var: String,
        /// Parser message.
        reason: String,
    },
    /// The installation address is zero.
    #[error("token address cannot be the zero address")]
    ZeroAddress,
    /// The symbol is empty.
    #[error("token symbol cannot be empty")]
    EmptySymbol,
    /// The genesis holder is not a valid address in its space.
    #[error("invalid genesis holder: {0}")]
    InvalidHolder(#[from] AddressError),
}

fn optional_env(var: &str) -> Result<Option<String>, ConfigError> {
    match env::var(var) {
        Ok(raw) if raw.trim().is_empty() => Err(ConfigError::EmptyEnv { var: var.into() }),
        Ok(raw) => Ok(Some(raw.trim().to_string())),
        Err(_) => Ok(None),
    }
}

fn parse_address(var: &str, value: &str) -> Result<Address, ConfigError> {
    Address::from_str(value).map_err(|err| ConfigError::InvalidValue {
        var: var.into(),
        reason: err.to_string(),
    })
}
