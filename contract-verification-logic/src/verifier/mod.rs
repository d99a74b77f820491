use crate::{
    chain::{Chain, ChainError},
    types::{CompilationReady, DeploymentInfo},
};
use async_trait::async_trait;
use contract_verification_database::VerifiedContractMatches;
use verification_common::{verify_creation_code, verify_runtime_code};

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("neither creation nor runtime bytecode matched")]
    NoMatch,
    #[error("contract is not deployed")]
    ContractNotDeployed,
    #[error("failed to fetch bytecode: {0}")]
    GetBytecode(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<ChainError> for VerifyError {
    fn from(error: ChainError) -> Self {
        VerifyError::GetBytecode(error.to_string())
    }
}

/// A verification that produced at least one match, along with the on-chain
/// evidence it was checked against.
#[derive(Clone, Debug)]
pub struct VerificationSuccess {
    pub matches: VerifiedContractMatches,
    pub deployment: DeploymentInfo,
}

/// Opaque verifier collaborator: compares one compilation against the chain
/// state at an address and reports the match, if any.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(
        &self,
        chain_id: i64,
        compilation: &CompilationReady,
        chain: &dyn Chain,
        address: &[u8],
        creator_transaction_hash: Option<&[u8]>,
    ) -> Result<VerificationSuccess, VerifyError>;
}

/// Production verifier built on the transformation-based match builder.
#[derive(Clone, Copy, Debug, Default)]
pub struct BytecodeVerifier;

#[async_trait]
impl Verifier for BytecodeVerifier {
    async fn verify(
        &self,
        chain_id: i64,
        compilation: &CompilationReady,
        chain: &dyn Chain,
        address: &[u8],
        creator_transaction_hash: Option<&[u8]>,
    ) -> Result<VerificationSuccess, VerifyError> {
        let on_chain_runtime_code = chain.get_bytecode(address).await?;
        if on_chain_runtime_code.is_empty() {
            return Err(VerifyError::ContractNotDeployed);
        }

        let runtime_match = verify_runtime_code(
            &on_chain_runtime_code,
            compilation.runtime_code.clone(),
            &compilation.runtime_code_artifacts,
        )
        .map_err(VerifyError::Internal)?;

        let mut deployment = DeploymentInfo {
            chain_id,
            address: address.to_vec(),
            runtime_code: Some(on_chain_runtime_code),
            ..Default::default()
        };

        let mut creation_match = None;
        if let Some(transaction_hash) = creator_transaction_hash {
            match chain.get_contract_creation(transaction_hash).await {
                Ok(Some(creation)) if creation.created_address == address => {
                    creation_match = verify_creation_code(
                        &creation.creation_code,
                        compilation.creation_code.clone(),
                        &compilation.creation_code_artifacts,
                        &compilation.compilation_artifacts,
                    )
                    .map_err(VerifyError::Internal)?;

                    deployment.transaction_hash = Some(transaction_hash.to_vec());
                    deployment.block_number = Some(creation.block_number);
                    deployment.transaction_index = Some(creation.transaction_index);
                    deployment.deployer = Some(creation.deployer);
                    deployment.creation_code = Some(creation.creation_code);
                }
                Ok(Some(_)) | Ok(None) => {
                    // The transaction exists but did not create this
                    // contract: the creation side stays unmatched while the
                    // runtime match is preserved.
                }
                Err(error) => {
                    tracing::warn!(
                        error = %error,
                        "failed to fetch creation data, proceeding with runtime-only verification"
                    );
                }
            }
        }

        let matches = match (runtime_match, creation_match) {
            (Some(runtime_match), Some(creation_match)) => VerifiedContractMatches::Complete {
                runtime_match,
                creation_match,
            },
            (Some(runtime_match), None) => VerifiedContractMatches::OnlyRuntime { runtime_match },
            (None, Some(creation_match)) => {
                VerifiedContractMatches::OnlyCreation { creation_match }
            }
            (None, None) => return Err(VerifyError::NoMatch),
        };

        Ok(VerificationSuccess {
            matches,
            deployment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ContractCreation, MockChain};
    use contract_verification_database::{CompiledContractCompiler, CompiledContractLanguage};
    use std::collections::BTreeMap;
    use verification_common::{
        CompilationArtifacts, CreationCodeArtifacts, MatchStatus, RuntimeCodeArtifacts,
    };

    fn compilation(runtime_code: Vec<u8>, creation_code: Vec<u8>) -> CompilationReady {
        CompilationReady {
            compiler: CompiledContractCompiler::Solc,
            language: CompiledContractLanguage::Solidity,
            version: "0.8.20+commit.a1b79de6".to_string(),
            name: "Storage".to_string(),
            fully_qualified_name: "contracts/Storage.sol:Storage".to_string(),
            sources: BTreeMap::from([(
                "contracts/Storage.sol".to_string(),
                "contract Storage {}".to_string(),
            )]),
            compiler_settings: serde_json::json!({"optimizer": {"enabled": false}}),
            compilation_artifacts: CompilationArtifacts::default(),
            creation_code,
            creation_code_artifacts: CreationCodeArtifacts::default(),
            runtime_code,
            runtime_code_artifacts: RuntimeCodeArtifacts::default(),
        }
    }

    #[tokio::test]
    async fn empty_on_chain_code_means_not_deployed() {
        let mut chain = MockChain::new();
        chain.expect_get_bytecode().returning(|_| Ok(vec![]));

        let result = BytecodeVerifier
            .verify(
                1337,
                &compilation(vec![0x60], vec![0x60, 0x60]),
                &chain,
                &[0xab; 20],
                None,
            )
            .await;
        assert!(matches!(result, Err(VerifyError::ContractNotDeployed)));
    }

    #[tokio::test]
    async fn runtime_only_verification_matches_identical_code() {
        let runtime_code = vec![0x60, 0x80, 0x60, 0x40];
        let mut chain = MockChain::new();
        let on_chain = runtime_code.clone();
        chain
            .expect_get_bytecode()
            .returning(move |_| Ok(on_chain.clone()));

        let success = BytecodeVerifier
            .verify(
                1337,
                &compilation(runtime_code.clone(), vec![0xfe]),
                &chain,
                &[0xab; 20],
                None,
            )
            .await
            .unwrap();

        assert_eq!(
            success.matches.status_pair(),
            (Some(MatchStatus::Partial), None)
        );
        assert_eq!(success.deployment.runtime_code, Some(runtime_code));
        assert_eq!(success.deployment.creation_code, None);
    }

    #[tokio::test]
    async fn creation_transaction_for_a_different_address_keeps_runtime_match() {
        let runtime_code = vec![0x60, 0x80];
        let mut chain = MockChain::new();
        let on_chain = runtime_code.clone();
        chain
            .expect_get_bytecode()
            .returning(move |_| Ok(on_chain.clone()));
        chain.expect_get_contract_creation().returning(|_| {
            Ok(Some(ContractCreation {
                creation_code: vec![0x60, 0x80, 0x60],
                block_number: 1,
                transaction_index: 0,
                deployer: vec![0x11; 20],
                created_address: vec![0xcd; 20],
            }))
        });

        let success = BytecodeVerifier
            .verify(
                1337,
                &compilation(runtime_code, vec![0x60, 0x80, 0x60]),
                &chain,
                &[0xab; 20],
                Some(&[0xca; 32]),
            )
            .await
            .unwrap();

        assert_eq!(
            success.matches.status_pair(),
            (Some(MatchStatus::Partial), None)
        );
        assert_eq!(success.deployment.transaction_hash, None);
    }

    #[tokio::test]
    async fn complete_verification_records_creation_evidence() {
        let runtime_code = vec![0x60, 0x80];
        let creation_code = vec![0x60, 0x80, 0x60];
        let address = vec![0xab; 20];

        let mut chain = MockChain::new();
        let on_chain_runtime = runtime_code.clone();
        chain
            .expect_get_bytecode()
            .returning(move |_| Ok(on_chain_runtime.clone()));
        let on_chain_creation = creation_code.clone();
        let created_address = address.clone();
        chain.expect_get_contract_creation().returning(move |_| {
            Ok(Some(ContractCreation {
                creation_code: on_chain_creation.clone(),
                block_number: 7,
                transaction_index: 3,
                deployer: vec![0x11; 20],
                created_address: created_address.clone(),
            }))
        });

        let success = BytecodeVerifier
            .verify(
                1337,
                &compilation(runtime_code, creation_code.clone()),
                &chain,
                &address,
                Some(&[0xca; 32]),
            )
            .await
            .unwrap();

        assert_eq!(
            success.matches.status_pair(),
            (Some(MatchStatus::Partial), Some(MatchStatus::Partial))
        );
        assert_eq!(success.deployment.block_number, Some(7));
        assert_eq!(success.deployment.transaction_index, Some(3));
        assert_eq!(success.deployment.creation_code, Some(creation_code));
    }

    #[tokio::test]
    async fn mismatching_code_is_a_no_match() {
        let mut chain = MockChain::new();
        chain
            .expect_get_bytecode()
            .returning(|_| Ok(vec![0xde, 0xad]));

        let result = BytecodeVerifier
            .verify(
                1337,
                &compilation(vec![0x60, 0x80], vec![0xfe]),
                &chain,
                &[0xab; 20],
                None,
            )
            .await;
        assert!(matches!(result, Err(VerifyError::NoMatch)));
    }
}
