use contract_verification_entity::{contract_deployments, sea_orm_active_enums, verified_contracts};
use sea_orm::prelude::Uuid;
use serde_json::Value;
use std::collections::BTreeMap;
use verification_common::{
    CompilationArtifacts, CreationCodeArtifacts, Match, MatchStatus, MatchStatusPair,
    RuntimeCodeArtifacts,
};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ContractCode {
    OnlyRuntimeCode {
        code: Vec<u8>,
    },
    CompleteCode {
        creation_code: Vec<u8>,
        runtime_code: Vec<u8>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum InsertContractDeployment {
    Genesis {
        chain_id: i64,
        address: Vec<u8>,
        runtime_code: Vec<u8>,
    },
    Regular {
        chain_id: i64,
        address: Vec<u8>,
        transaction_hash: Vec<u8>,
        block_number: i64,
        transaction_index: i64,
        deployer: Vec<u8>,
        creation_code: Vec<u8>,
        runtime_code: Vec<u8>,
    },
}

impl InsertContractDeployment {
    pub fn chain_id(&self) -> i64 {
        match self {
            InsertContractDeployment::Genesis { chain_id, .. } => *chain_id,
            InsertContractDeployment::Regular { chain_id, .. } => *chain_id,
        }
    }

    pub fn address(&self) -> &[u8] {
        match self {
            InsertContractDeployment::Genesis { address, .. } => address,
            InsertContractDeployment::Regular { address, .. } => address,
        }
    }

    pub fn runtime_code(&self) -> &[u8] {
        match self {
            InsertContractDeployment::Genesis { runtime_code, .. } => runtime_code,
            InsertContractDeployment::Regular { runtime_code, .. } => runtime_code,
        }
    }

    pub fn creation_code(&self) -> Option<&[u8]> {
        match self {
            InsertContractDeployment::Genesis { .. } => None,
            InsertContractDeployment::Regular { creation_code, .. } => Some(creation_code),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RetrieveContractDeployment {
    pub(crate) chain_id: i64,
    pub(crate) address: Vec<u8>,
    pub(crate) transaction_hash: Option<Vec<u8>>,
    pub(crate) runtime_code: Option<Vec<u8>>,
}

impl RetrieveContractDeployment {
    pub fn regular(chain_id: i64, address: Vec<u8>, transaction_hash: Vec<u8>) -> Self {
        Self {
            chain_id,
            address,
            transaction_hash: Some(transaction_hash),
            runtime_code: None,
        }
    }

    pub fn genesis(chain_id: i64, address: Vec<u8>, runtime_code: Vec<u8>) -> Self {
        Self {
            chain_id,
            address,
            transaction_hash: None,
            runtime_code: Some(runtime_code),
        }
    }

    pub fn chain_id(&self) -> i64 {
        self.chain_id
    }

    pub fn address(&self) -> &[u8] {
        &self.address
    }
}

/// A deployment row together with the on-chain codes it references.
#[derive(Clone, Debug)]
pub struct ContractDeployment {
    pub id: Uuid,
    pub chain_id: i64,
    pub address: Vec<u8>,
    pub runtime_code: Vec<u8>,
    pub creation_code: Option<Vec<u8>>,
    pub model: contract_deployments::Model,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum CompiledContractCompiler {
    Solc,
    Vyper,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum CompiledContractLanguage {
    Solidity,
    Yul,
    Vyper,
}

/// One compiler invocation's outputs, ready for storage. The creation and
/// runtime codes must already be normalized (library placeholder windows
/// zeroed), so that builds differing only in linked addresses deduplicate
/// into one row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledContract {
    pub compiler: CompiledContractCompiler,
    pub version: String,
    pub language: CompiledContractLanguage,
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

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerifiedContractMatches {
    OnlyRuntime {
        runtime_match: Match,
    },
    OnlyCreation {
        creation_match: Match,
    },
    Complete {
        runtime_match: Match,
        creation_match: Match,
    },
}

impl VerifiedContractMatches {
    pub fn runtime_match(&self) -> Option<&Match> {
        match self {
            VerifiedContractMatches::OnlyRuntime { runtime_match } => Some(runtime_match),
            VerifiedContractMatches::OnlyCreation { .. } => None,
            VerifiedContractMatches::Complete { runtime_match, .. } => Some(runtime_match),
        }
    }

    pub fn creation_match(&self) -> Option<&Match> {
        match self {
            VerifiedContractMatches::OnlyRuntime { .. } => None,
            VerifiedContractMatches::OnlyCreation { creation_match } => Some(creation_match),
            VerifiedContractMatches::Complete { creation_match, .. } => Some(creation_match),
        }
    }

    /// `(runtime, creation)` statuses implied by the matches.
    pub fn status_pair(&self) -> MatchStatusPair {
        (
            self.runtime_match().map(MatchStatus::from_match),
            self.creation_match().map(MatchStatus::from_match),
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedContract {
    pub contract_deployment_id: Uuid,
    pub compiled_contract: CompiledContract,
    pub matches: VerifiedContractMatches,
}

/// A complete verification to be committed in one transaction: the deployment
/// (found or created), the compilation, the match, the user-facing pointer
/// metadata and the extracted signatures.
#[derive(Clone, Debug)]
pub struct NewVerification {
    pub deployment: InsertContractDeployment,
    pub compiled_contract: CompiledContract,
    pub matches: VerifiedContractMatches,
    pub match_metadata: Value,
    pub signatures: Vec<SignatureRecord>,
}

#[derive(Clone, Debug)]
pub struct StoredVerification {
    pub deployment_id: Uuid,
    pub compilation_id: Uuid,
    pub verified_contract_id: i64,
    pub runtime_status: Option<MatchStatus>,
    pub creation_status: Option<MatchStatus>,
}

#[derive(Clone, Debug)]
pub struct RetrievedVerifiedContract {
    pub verified_contract: verified_contracts::Model,
    pub compiled_contract: CompiledContract,
    pub deployment: ContractDeployment,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum SignatureKind {
    Function,
    Event,
    Error,
}

impl From<SignatureKind> for sea_orm_active_enums::SignatureType {
    fn from(value: SignatureKind) -> Self {
        match value {
            SignatureKind::Function => sea_orm_active_enums::SignatureType::Function,
            SignatureKind::Event => sea_orm_active_enums::SignatureType::Event,
            SignatureKind::Error => sea_orm_active_enums::SignatureType::Error,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SignatureRecord {
    pub signature: String,
    /// keccak256 of the signature text; the 4-byte selector is its prefix.
    pub signature_hash: Vec<u8>,
    pub kind: SignatureKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignatureView {
    pub signature: String,
    pub signature_hash: Vec<u8>,
    pub signature_hash_4: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct SourcifyMatchView {
    pub deployment_id: Uuid,
    pub verified_contract_id: i64,
    pub runtime_status: Option<MatchStatus>,
    pub creation_status: Option<MatchStatus>,
    pub metadata: Value,
}

#[derive(Clone, Debug)]
pub struct VerificationJobError {
    pub code: String,
    pub error_id: Uuid,
    pub data: Option<Value>,
}

#[derive(Clone, Debug)]
pub struct VerificationJobView {
    pub id: Uuid,
    pub chain_id: i64,
    pub contract_address: Vec<u8>,
    pub is_completed: bool,
    pub verified_contract_id: Option<i64>,
    pub error: Option<VerificationJobError>,
    pub verification_endpoint: String,
    pub external_verification: Value,
    pub runtime_status: Option<MatchStatus>,
    pub creation_status: Option<MatchStatus>,
}

/// A previously verified compilation retrieved as a similarity candidate,
/// carrying everything required to rebuild the compilation without invoking
/// the compiler.
#[derive(Clone, Debug)]
pub struct SimilarityCandidate {
    pub compiled_contract: contract_verification_entity::compiled_contracts::Model,
    pub creation_code: Option<Vec<u8>>,
    pub runtime_code: Vec<u8>,
    pub sources: BTreeMap<String, String>,
    pub shared_prefix_len: usize,
    pub last_verified_at: sea_orm::prelude::DateTimeWithTimeZone,
}
