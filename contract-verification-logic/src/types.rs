use contract_verification_database::{
    CompiledContract, CompiledContractCompiler, CompiledContractLanguage,
    InsertContractDeployment, VerifiedContractMatches,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use verification_common::{
    normalize_library_placeholders, CompilationArtifacts, CreationCodeArtifacts, LinkReferences,
    MatchStatus, RuntimeCodeArtifacts,
};

/// Which submission endpoint admitted a job. Persisted on the job row.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::EnumString, Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VerificationEndpoint {
    VerifyFromJsonInput,
    VerifyFromMetadata,
    VerifyFromExplorerResult,
    VerifySimilarity,
}

/// On-chain facts about the deployment being verified, collected from the
/// chain (real or synthetic) during verification.
#[derive(Clone, Debug, Default)]
pub struct DeploymentInfo {
    pub chain_id: i64,
    pub address: Vec<u8>,
    pub runtime_code: Option<Vec<u8>>,
    pub transaction_hash: Option<Vec<u8>>,
    pub block_number: Option<i64>,
    pub transaction_index: Option<i64>,
    pub deployer: Option<Vec<u8>>,
    pub creation_code: Option<Vec<u8>>,
}

impl DeploymentInfo {
    pub fn has_any_code(&self) -> bool {
        self.runtime_code.is_some() || self.creation_code.is_some()
    }

    /// The canonical-store deployment row this info corresponds to.
    /// Deployments without any creation transaction data are stored the way
    /// genesis contracts are.
    pub fn to_insert_contract_deployment(&self) -> Option<InsertContractDeployment> {
        let runtime_code = self.runtime_code.clone()?;
        match (
            self.transaction_hash.clone(),
            self.block_number,
            self.transaction_index,
            self.deployer.clone(),
            self.creation_code.clone(),
        ) {
            (
                Some(transaction_hash),
                Some(block_number),
                Some(transaction_index),
                Some(deployer),
                Some(creation_code),
            ) => Some(InsertContractDeployment::Regular {
                chain_id: self.chain_id,
                address: self.address.clone(),
                transaction_hash,
                block_number,
                transaction_index,
                deployer,
                creation_code,
                runtime_code,
            }),
            _ => Some(InsertContractDeployment::Genesis {
                chain_id: self.chain_id,
                address: self.address.clone(),
                runtime_code,
            }),
        }
    }
}

/// One compiled contract as the verifier consumes it: raw recompiled codes
/// plus every artifact table required to apply transformations. Built either
/// from a fresh compiler invocation or rebuilt from stored rows
/// (pre-run compilations of the similarity and replace paths).
#[derive(Clone, Debug)]
pub struct CompilationReady {
    pub compiler: CompiledContractCompiler,
    pub language: CompiledContractLanguage,
    pub version: String,
    pub name: String,
    pub fully_qualified_name: String,
    pub sources: BTreeMap<String, String>,
    pub compiler_settings: Value,
    pub compilation_artifacts: CompilationArtifacts,
    pub creation_code: Vec<u8>,
    pub creation_code_artifacts: CreationCodeArtifacts,
    pub runtime_code: Vec<u8>,
    pub runtime_code_artifacts: RuntimeCodeArtifacts,
}

impl CompilationReady {
    pub fn abi(&self) -> Option<&Value> {
        self.compilation_artifacts.abi.as_ref()
    }

    /// Converts into the storable compilation, normalizing both codes so
    /// that builds differing only in linked library addresses share a row.
    pub fn into_compiled_contract(self) -> CompiledContract {
        let parse_link_references = |value: Option<&Value>| -> LinkReferences {
            value
                .and_then(|value| LinkReferences::deserialize(value).ok())
                .unwrap_or_default()
        };

        let creation_links = parse_link_references(self.creation_code_artifacts.link_references.as_ref());
        let runtime_links = parse_link_references(self.runtime_code_artifacts.link_references.as_ref());

        CompiledContract {
            compiler: self.compiler,
            version: self.version,
            language: self.language,
            name: self.name,
            fully_qualified_name: self.fully_qualified_name,
            sources: self.sources,
            compiler_settings: self.compiler_settings,
            compilation_artifacts: self.compilation_artifacts,
            creation_code: normalize_library_placeholders(self.creation_code, &creation_links),
            creation_code_artifacts: self.creation_code_artifacts,
            runtime_code: normalize_library_placeholders(self.runtime_code, &runtime_links),
            runtime_code_artifacts: self.runtime_code_artifacts,
        }
    }
}

/// The canonical verification result handed to every write sink.
#[derive(Clone, Debug)]
pub struct VerificationResult {
    pub deployment: DeploymentInfo,
    pub compilation: CompilationReady,
    pub matches: VerifiedContractMatches,
}

impl VerificationResult {
    pub fn status_pair(&self) -> (Option<MatchStatus>, Option<MatchStatus>) {
        self.matches.status_pair()
    }

    /// The user-facing metadata blob recorded on the sourcify match and in
    /// the repository layout.
    pub fn match_metadata(&self) -> Value {
        serde_json::json!({
            "compiler": self.compilation.compiler.to_string(),
            "version": self.compilation.version,
            "language": self.compilation.language.to_string(),
            "name": self.compilation.name,
            "fullyQualifiedName": self.compilation.fully_qualified_name,
        })
    }
}

/// Successful worker return value; a plain value, like [`crate::errors::ErrorExport`].
#[derive(Clone, Debug)]
pub struct VerificationExport {
    pub verified_contract_id: i64,
    pub runtime_status: Option<MatchStatus>,
    pub creation_status: Option<MatchStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deployment_without_runtime_code_produces_no_row() {
        let info = DeploymentInfo {
            chain_id: 1337,
            address: vec![0xab; 20],
            ..Default::default()
        };
        assert!(info.to_insert_contract_deployment().is_none());
    }

    #[test]
    fn deployment_with_partial_creation_data_falls_back_to_genesis_shape() {
        let info = DeploymentInfo {
            chain_id: 1337,
            address: vec![0xab; 20],
            runtime_code: Some(vec![0x60, 0x80]),
            transaction_hash: Some(vec![0xca; 32]),
            ..Default::default()
        };
        match info.to_insert_contract_deployment().unwrap() {
            InsertContractDeployment::Genesis { chain_id, .. } => assert_eq!(chain_id, 1337),
            other => panic!("expected genesis deployment, got {other:?}"),
        }
    }

    #[test]
    fn endpoint_names_are_snake_case() {
        assert_eq!(
            VerificationEndpoint::VerifyFromJsonInput.to_string(),
            "verify_from_json_input"
        );
        assert_eq!(
            VerificationEndpoint::VerifySimilarity.to_string(),
            "verify_similarity"
        );
    }
}
