mod rpc;
mod synthetic;

pub use rpc::JsonRpcChain;
pub use synthetic::SyntheticChain;

use async_trait::async_trait;
use std::{collections::BTreeMap, sync::Arc};

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("rpc request failed: {0}")]
    Rpc(String),
    #[error("rpc returned an invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionInfo {
    pub block_number: i64,
    pub from: Vec<u8>,
}

/// Everything needed to reconstruct the creation side of a deployment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractCreation {
    pub creation_code: Vec<u8>,
    pub block_number: i64,
    pub transaction_index: i64,
    pub deployer: Vec<u8>,
    /// Address the transaction actually created; a creator-tx hash pointing
    /// at a different address yields no creation match.
    pub created_address: Vec<u8>,
}

/// Minimal chain access the engine needs. Implemented by the JSON-RPC client
/// and by the database-backed [`SyntheticChain`], so that the similarity and
/// replace paths run through the same verifier unchanged.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Chain: Send + Sync {
    /// Runtime bytecode currently stored at the address; empty for
    /// non-contract accounts.
    async fn get_bytecode(&self, address: &[u8]) -> Result<Vec<u8>, ChainError>;

    async fn get_transaction(
        &self,
        transaction_hash: &[u8],
    ) -> Result<Option<TransactionInfo>, ChainError>;

    /// Creation bytecode and receipt data of the deployment transaction, or
    /// `None` when the transaction does not exist or did not create a
    /// contract.
    async fn get_contract_creation(
        &self,
        transaction_hash: &[u8],
    ) -> Result<Option<ContractCreation>, ChainError>;
}

/// The configured chains, keyed by chain id.
#[derive(Clone, Default)]
pub struct Chains {
    inner: BTreeMap<i64, Arc<dyn Chain>>,
}

impl Chains {
    pub fn new(inner: BTreeMap<i64, Arc<dyn Chain>>) -> Self {
        Self { inner }
    }

    pub fn get(&self, chain_id: i64) -> Option<Arc<dyn Chain>> {
        self.inner.get(&chain_id).cloned()
    }

    pub fn contains(&self, chain_id: i64) -> bool {
        self.inner.contains_key(&chain_id)
    }
}
