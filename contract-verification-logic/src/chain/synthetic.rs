use super::{Chain, ChainError, ContractCreation, TransactionInfo};
use async_trait::async_trait;

/// A [`Chain`] materialized from stored deployment evidence. Lets the
/// verifier run against the database exactly as it would against a live
/// node, so similarity and replace verifications are indistinguishable from
/// fresh ones in the canonical store.
#[derive(Clone, Debug, Default)]
pub struct SyntheticChain {
    runtime_code: Vec<u8>,
    creation: Option<ContractCreation>,
}

impl SyntheticChain {
    pub fn new(runtime_code: Vec<u8>) -> Self {
        Self {
            runtime_code,
            creation: None,
        }
    }

    pub fn with_creation(mut self, creation: ContractCreation) -> Self {
        self.creation = Some(creation);
        self
    }
}

#[async_trait]
impl Chain for SyntheticChain {
    async fn get_bytecode(&self, _address: &[u8]) -> Result<Vec<u8>, ChainError> {
        Ok(self.runtime_code.clone())
    }

    async fn get_transaction(
        &self,
        _transaction_hash: &[u8],
    ) -> Result<Option<TransactionInfo>, ChainError> {
        Ok(self.creation.as_ref().map(|creation| TransactionInfo {
            block_number: creation.block_number,
            from: creation.deployer.clone(),
        }))
    }

    async fn get_contract_creation(
        &self,
        _transaction_hash: &[u8],
    ) -> Result<Option<ContractCreation>, ChainError> {
        Ok(self.creation.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn synthetic_chain_replays_stored_evidence() {
        let creation = ContractCreation {
            creation_code: vec![0x60, 0x80],
            block_number: 42,
            transaction_index: 7,
            deployer: vec![0x11; 20],
            created_address: vec![0xab; 20],
        };
        let chain = SyntheticChain::new(vec![0xfe]).with_creation(creation.clone());

        assert_eq!(chain.get_bytecode(&[0xab; 20]).await.unwrap(), vec![0xfe]);
        assert_eq!(
            chain.get_contract_creation(&[0xca; 32]).await.unwrap(),
            Some(creation)
        );
        let transaction = chain.get_transaction(&[0xca; 32]).await.unwrap().unwrap();
        assert_eq!(transaction.block_number, 42);
    }

    #[tokio::test]
    async fn synthetic_chain_without_creation_data_has_no_transaction() {
        let chain = SyntheticChain::new(vec![0xfe]);
        assert_eq!(chain.get_transaction(&[0xca; 32]).await.unwrap(), None);
        assert_eq!(chain.get_contract_creation(&[0xca; 32]).await.unwrap(), None);
    }
}
