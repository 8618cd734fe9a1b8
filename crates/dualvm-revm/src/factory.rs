//! Helpers for wrapping Reth EVM factories with the dual-VM token precompile.

use alloy_evm::{
    eth::{EthBlockExecutorFactory, EthEvm, EthEvmContext, EthEvmFactory},
    precompiles::{DynPrecompile, Precompile, PrecompilesMap},
    Database, EvmEnv, EvmFactory,
};
use dualvm_precompiles::DualVmTokenPrecompile;
use reth_evm_ethereum::EthEvmConfig;
use reth_revm::{
    inspector::NoOpInspector,
    revm::{
        context::{
            result::{EVMError, HaltReason},
            BlockEnv, TxEnv,
        },
        context_interface::result::InvalidTransaction,
        primitives::hardfork::SpecId,
        Inspector,
    },
};
use std::sync::Arc;

/// Wrapper around an existing `EvmFactory` that installs the dual-VM token
/// into every EVM it creates.
#[derive(Debug, Clone)]
pub struct DualVmEvmFactory<F> {
    inner: F,
    token: Option<Arc<DualVmTokenPrecompile>>,
}

impl<F> DualVmEvmFactory<F> {
    /// Creates a new factory wrapper. With `token` unset the wrapper is
    /// transparent.
    pub fn new(inner: F, token: Option<DualVmTokenPrecompile>) -> Self {
        Self {
            inner,
            token: token.map(Arc::new),
        }
    }

    /// The installed token precompile, if any.
    pub fn token(&self) -> Option<&DualVmTokenPrecompile> {
        self.token.as_deref()
    }

    fn install_dual_vm_token(&self, precompiles: &mut PrecompilesMap) {
        let Some(token) = &self.token else { return };

        let token = Arc::clone(token);
        let address = token.address();
        let id = DualVmTokenPrecompile::id().clone();

        tracing::debug!(target: "dualvm_revm", %address, "installing dual-VM token precompile");

        precompiles.apply_precompile(&address, move |_| {
            let token_for_call = Arc::clone(&token);
            Some(DynPrecompile::new_stateful(id, move |input| {
                token_for_call.call(input)
            }))
        });
    }

    fn wrap<DB, I>(
        &self,
        evm: EthEvm<DB, I, PrecompilesMap>,
        inspect: bool,
    ) -> EthEvm<DB, I, PrecompilesMap>
    where
        DB: Database,
        I: Inspector<EthEvmContext<DB>>,
    {
        let mut inner = evm.into_inner();
        self.install_dual_vm_token(&mut inner.precompiles);
        EthEvm::new(inner, inspect)
    }
}

impl EvmFactory for DualVmEvmFactory<EthEvmFactory> {
    type Evm<DB: Database, I: Inspector<Self::Context<DB>>> = EthEvm<DB, I, PrecompilesMap>;
    type Context<DB: Database> = EthEvmContext<DB>;
    type Tx = TxEnv;
    type Error<DBError: std::error::Error + Send + Sync + 'static> =
        EVMError<DBError, InvalidTransaction>;
    type HaltReason = HaltReason;
    type Spec = SpecId;
    type BlockEnv = BlockEnv;
    type Precompiles = PrecompilesMap;

    fn create_evm<DB: Database>(
        &self,
        db: DB,
        evm_env: EvmEnv<Self::Spec, Self::BlockEnv>,
    ) -> Self::Evm<DB, NoOpInspector> {
        let evm = self.inner.create_evm(db, evm_env);
        self.wrap(evm, false)
    }

    fn create_evm_with_inspector<DB: Database, I: Inspector<Self::Context<DB>>>(
        &self,
        db: DB,
        input: EvmEnv<Self::Spec, Self::BlockEnv>,
        inspector: I,
    ) -> Self::Evm<DB, I> {
        let evm = self.inner.create_evm_with_inspector(db, input, inspector);
        self.wrap(evm, true)
    }
}

/// Wraps an [`EthEvmConfig`] so that its EVMs carry the dual-VM token.
pub fn with_dual_vm_token<ChainSpec>(
    config: EthEvmConfig<ChainSpec, EthEvmFactory>,
    token: Option<DualVmTokenPrecompile>,
) -> EthEvmConfig<ChainSpec, DualVmEvmFactory<EthEvmFactory>> {
    let EthEvmConfig {
        executor_factory,
        block_assembler,
    } = config;
    let wrapped_factory = DualVmEvmFactory::new(*executor_factory.evm_factory(), token);
    let new_executor_factory = EthBlockExecutorFactory::new(
        *executor_factory.receipt_builder(),
        executor_factory.spec().clone(),
        wrapped_factory,
    );

    EthEvmConfig {
        executor_factory: new_executor_factory,
        block_assembler,
    }
}
