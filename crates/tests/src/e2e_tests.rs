//! End-to-end tests of the dual-VM token against delegated-call wrappers.
//!
//! Each attack scenario has the token owner call a wrapper contract that
//! forwards the token calldata through `DELEGATECALL`. Inside the token the
//! owner is still `msg.sender`, so without the call-origin guard every one of
//! these calls would move the owner's funds to the wrapper.

use crate::{
    common::{test_supply, DualVmHarness, HarnessConfig, TEST_OWNER},
    contracts::Contract,
};
use alloy_primitives::{Address, U256};
use alloy_sol_types::SolCall;
use dualvm_precompiles::abi::IDualVmToken;
use eyre::Result;

/// Deployed token, wrapper and a harness with the owner holding the supply.
struct AttackFixture {
    harness: DualVmHarness,
    token: Address,
    hack: Address,
    owner: Address,
}

impl AttackFixture {
    fn new() -> Result<Self> {
        let mut harness = DualVmHarness::new(HarnessConfig::default())?;
        let token = harness.deploy(Contract::DualVmToken)?;
        let hack = harness.deploy(Contract::DualVmTokenHack { target: token })?;
        let owner = harness.owner();
        Ok(Self {
            harness,
            token,
            hack,
            owner,
        })
    }

    /// Self-approval so that, absent the guard, every `transferFrom` run with
    /// the owner as spender would succeed.
    fn with_self_allowance(mut self) -> Result<Self> {
        let calldata = IDualVmToken::approve_0Call {
            spender: self.owner,
            amount: test_supply(),
        }
        .abi_encode();
        let receipt = self.harness.invoke(self.owner, self.token, calldata)?;
        assert_eq!(receipt.returned_word()?, U256::from(1), "direct approve");
        Ok(self)
    }

    fn hack_felt(&self) -> U256 {
        self.harness.starknet_address_of(self.hack)
    }

    fn owner_felt(&self) -> U256 {
        self.harness.starknet_address_of(self.owner)
    }

    /// Sends `calldata` from the owner through the wrapper and returns the
    /// wrapper's success word.
    fn attack(&mut self, calldata: Vec<u8>) -> Result<U256> {
        let receipt = self.harness.invoke(self.owner, self.hack, calldata)?;
        assert!(receipt.success, "wrapper itself does not revert");
        assert!(receipt.logs.is_empty(), "no token events under delegation");
        receipt.returned_word()
    }

    fn balance_of(&mut self, account: Address) -> Result<U256> {
        self.harness
            .read(self.token, &IDualVmToken::balanceOf_0Call { account })
    }

    fn allowance(&mut self, owner: Address, spender: Address) -> Result<U256> {
        self.harness
            .read(self.token, &IDualVmToken::allowance_0Call { owner, spender })
    }

    fn assert_untouched(&mut self) -> Result<()> {
        assert_eq!(self.balance_of(self.hack)?, U256::ZERO);
        assert_eq!(self.balance_of(self.owner)?, test_supply());
        Ok(())
    }
}

// === Test: Approve Through Delegation ===

#[test]
fn test_should_approve_evm_fail() -> Result<()> {
    reth_tracing::init_test_tracing();
    let mut fixture = AttackFixture::new()?;
    let amount = U256::from(1u64);

    let word = fixture.attack(
        IDualVmToken::approve_0Call {
            spender: fixture.hack,
            amount,
        }
        .abi_encode(),
    )?;

    assert_eq!(word, U256::ZERO);
    assert_eq!(fixture.allowance(fixture.owner, fixture.hack)?, U256::ZERO);
    Ok(())
}

#[test]
fn test_should_approve_starknet_fail() -> Result<()> {
    reth_tracing::init_test_tracing();
    let mut fixture = AttackFixture::new()?;
    let amount = U256::from(1u64);

    let word = fixture.attack(
        IDualVmToken::approve_1Call {
            spender: fixture.hack_felt(),
            amount,
        }
        .abi_encode(),
    )?;

    assert_eq!(word, U256::ZERO);
    assert_eq!(fixture.allowance(fixture.owner, fixture.hack)?, U256::ZERO);
    let via_felt = fixture.harness.read(
        fixture.token,
        &IDualVmToken::allowance_1Call {
            owner: fixture.owner,
            spender: fixture.hack_felt(),
        },
    )?;
    assert_eq!(via_felt, U256::ZERO);
    Ok(())
}

// === Test: Transfer Through Delegation ===

#[test]
fn test_should_transfer_evm_fail() -> Result<()> {
    reth_tracing::init_test_tracing();
    let mut fixture = AttackFixture::new()?;
    let amount = U256::from(1u64);

    let word = fixture.attack(
        IDualVmToken::transfer_0Call {
            to: fixture.hack,
            amount,
        }
        .abi_encode(),
    )?;

    assert_eq!(word, U256::ZERO);
    fixture.assert_untouched()
}

#[test]
fn test_should_transfer_starknet_fail() -> Result<()> {
    reth_tracing::init_test_tracing();
    let mut fixture = AttackFixture::new()?;
    let amount = U256::from(1u64);

    let word = fixture.attack(
        IDualVmToken::transfer_1Call {
            to: fixture.hack_felt(),
            amount,
        }
        .abi_encode(),
    )?;

    assert_eq!(word, U256::ZERO);
    fixture.assert_untouched()
}

// === Test: TransferFrom Through Delegation ===

#[test]
fn test_should_transfer_from_evm_evm_fail() -> Result<()> {
    reth_tracing::init_test_tracing();
    let mut fixture = AttackFixture::new()?.with_self_allowance()?;
    let amount = U256::from(1u64);

    let word = fixture.attack(
        IDualVmToken::transferFrom_0Call {
            from: fixture.owner,
            to: fixture.hack,
            amount,
        }
        .abi_encode(),
    )?;

    assert_eq!(word, U256::ZERO);
    fixture.assert_untouched()
}

#[test]
fn test_should_transfer_from_starknet_evm_fail() -> Result<()> {
    reth_tracing::init_test_tracing();
    let mut fixture = AttackFixture::new()?.with_self_allowance()?;
    let amount = U256::from(1u64);

    let word = fixture.attack(
        IDualVmToken::transferFrom_1Call {
            from: fixture.owner_felt(),
            to: fixture.hack,
            amount,
        }
        .abi_encode(),
    )?;

    assert_eq!(word, U256::ZERO);
    fixture.assert_untouched()
}

#[test]
fn test_should_transfer_from_evm_starknet_fail() -> Result<()> {
    reth_tracing::init_test_tracing();
    let mut fixture = AttackFixture::new()?.with_self_allowance()?;
    let amount = U256::from(1u64);

    let word = fixture.attack(
        IDualVmToken::transferFrom_2Call {
            from: fixture.owner,
            to: fixture.hack_felt(),
            amount,
        }
        .abi_encode(),
    )?;

    assert_eq!(word, U256::ZERO);
    fixture.assert_untouched()
}

#[test]
fn test_should_transfer_from_starknet_starknet_fail() -> Result<()> {
    reth_tracing::init_test_tracing();
    let mut fixture = AttackFixture::new()?.with_self_allowance()?;
    let amount = U256::from(1u64);

    let word = fixture.attack(
        IDualVmToken::transferFrom_3Call {
            from: fixture.owner_felt(),
            to: fixture.hack_felt(),
            amount,
        }
        .abi_encode(),
    )?;

    assert_eq!(word, U256::ZERO);
    fixture.assert_untouched()
}

// === Test: Direct Paths Still Work ===

#[test]
fn test_self_allowance_enables_direct_transfer_from() -> Result<()> {
    reth_tracing::init_test_tracing();
    let mut fixture = AttackFixture::new()?.with_self_allowance()?;
    let amount = U256::from(5u64);

    // The same call the wrapper forwarded succeeds when the owner sends it.
    let receipt = fixture.harness.invoke(
        fixture.owner,
        fixture.token,
        IDualVmToken::transferFrom_0Call {
            from: fixture.owner,
            to: fixture.hack,
            amount,
        }
        .abi_encode(),
    )?;

    assert_eq!(receipt.returned_word()?, U256::from(1));
    assert_eq!(receipt.logs.len(), 1, "transfer event");
    assert_eq!(fixture.balance_of(fixture.hack)?, amount);
    assert_eq!(
        fixture.allowance(fixture.owner, fixture.owner)?,
        test_supply() - amount
    );
    Ok(())
}

#[test]
fn test_forwarder_moves_its_own_funds() -> Result<()> {
    reth_tracing::init_test_tracing();
    let mut fixture = AttackFixture::new()?;
    let token = fixture.token;
    let forwarder = fixture
        .harness
        .deploy(Contract::DualVmTokenForwarder { target: token })?;
    let recipient = Address::with_last_byte(0x42);

    let funding = fixture.harness.invoke(
        fixture.owner,
        token,
        IDualVmToken::transfer_0Call {
            to: forwarder,
            amount: U256::from(100u64),
        }
        .abi_encode(),
    )?;
    assert_eq!(funding.returned_word()?, U256::from(1));

    let receipt = fixture.harness.invoke(
        fixture.owner,
        forwarder,
        IDualVmToken::transfer_1Call {
            to: fixture.harness.starknet_address_of(recipient),
            amount: U256::from(40u64),
        }
        .abi_encode(),
    )?;
    assert_eq!(receipt.returned_word()?, U256::from(1), "CALL path succeeds");

    assert_eq!(fixture.balance_of(forwarder)?, U256::from(60u64));
    assert_eq!(fixture.balance_of(recipient)?, U256::from(40u64));
    assert_eq!(
        fixture.balance_of(fixture.owner)?,
        test_supply() - U256::from(100u64)
    );
    Ok(())
}

#[test]
fn test_direct_calls_conserve_supply() -> Result<()> {
    reth_tracing::init_test_tracing();
    let mut fixture = AttackFixture::new()?;
    let token = fixture.token;
    let owner = fixture.owner;
    let alice = Address::with_last_byte(0xa1);
    let bob = Address::with_last_byte(0xb0);

    fixture.harness.invoke(
        owner,
        token,
        IDualVmToken::transfer_0Call {
            to: alice,
            amount: U256::from(1_000u64),
        }
        .abi_encode(),
    )?;
    fixture.harness.invoke(
        alice,
        token,
        IDualVmToken::approve_1Call {
            spender: fixture.harness.starknet_address_of(bob),
            amount: U256::from(600u64),
        }
        .abi_encode(),
    )?;
    let spend = fixture.harness.invoke(
        bob,
        token,
        IDualVmToken::transferFrom_2Call {
            from: alice,
            to: fixture.harness.starknet_address_of(bob),
            amount: U256::from(250u64),
        }
        .abi_encode(),
    )?;
    assert_eq!(spend.returned_word()?, U256::from(1));

    let overspend = fixture.harness.invoke(
        bob,
        token,
        IDualVmToken::transferFrom_0Call {
            from: alice,
            to: bob,
            amount: U256::from(351u64),
        }
        .abi_encode(),
    )?;
    assert_eq!(overspend.returned_word()?, U256::ZERO, "allowance exhausted");

    let total: U256 = [owner, alice, bob]
        .into_iter()
        .map(|account| fixture.balance_of(account))
        .sum::<Result<U256>>()?;
    let supply = fixture
        .harness
        .read(token, &IDualVmToken::totalSupplyCall {})?;
    assert_eq!(total, supply);
    assert_eq!(fixture.balance_of(bob)?, U256::from(250u64));
    assert_eq!(fixture.allowance(alice, bob)?, U256::from(350u64));

    let registered = fixture.harness.read(
        token,
        &IDualVmToken::evmAddressOfCall {
            starknetAccount: fixture.harness.starknet_address_of(bob),
        },
    )?;
    assert_eq!(registered, bob);
    Ok(())
}

// === Test: Static Frames ===

#[test]
fn test_static_call_cannot_move_funds() -> Result<()> {
    reth_tracing::init_test_tracing();
    let mut fixture = AttackFixture::new()?;
    let token = fixture.token;
    let caller = fixture
        .harness
        .deploy(Contract::DualVmTokenStaticCaller { target: token })?;
    let recipient = Address::with_last_byte(0x43);

    let funding = fixture.harness.invoke(
        fixture.owner,
        token,
        IDualVmToken::transfer_0Call {
            to: caller,
            amount: U256::from(100u64),
        }
        .abi_encode(),
    )?;
    assert_eq!(funding.returned_word()?, U256::from(1));

    let receipt = fixture.harness.invoke(
        fixture.owner,
        caller,
        IDualVmToken::transfer_0Call {
            to: recipient,
            amount: U256::from(40u64),
        }
        .abi_encode(),
    )?;
    assert!(receipt.success, "wrapper itself does not revert");
    assert!(receipt.logs.is_empty(), "no token events in a static frame");
    assert_eq!(receipt.returned_word()?, U256::ZERO);

    assert_eq!(fixture.balance_of(caller)?, U256::from(100u64));
    assert_eq!(fixture.balance_of(recipient)?, U256::ZERO);
    Ok(())
}

// === Test: Harness Configuration ===

#[test]
fn test_overridden_owner_holds_supply() -> Result<()> {
    reth_tracing::init_test_tracing();
    let owner = Address::with_last_byte(0x0e);
    let mut harness = DualVmHarness::new(HarnessConfig {
        owner,
        ..Default::default()
    })?;
    let token = harness.deploy(Contract::DualVmToken)?;

    assert_eq!(harness.owner(), owner);
    let balance = harness.read(token, &IDualVmToken::balanceOf_0Call { account: owner })?;
    assert_eq!(balance, test_supply());
    let default_owner = harness.read(
        token,
        &IDualVmToken::balanceOf_0Call {
            account: TEST_OWNER,
        },
    )?;
    assert_eq!(default_owner, U256::ZERO);
    Ok(())
}
