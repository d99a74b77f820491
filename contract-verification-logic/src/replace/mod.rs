use crate::{
    chain::{Chain, Chains, SyntheticChain},
    compiler::{Compiler, DetailedVersion, Language},
    engine::tasks::{extract_compilation, split_contract_identifier, ExtractError},
    signatures::extract_signatures,
    types::CompilationReady,
    verifier::Verifier,
};
use contract_verification_database::{
    NewVerification, RetrievedVerifiedContract, VerifiedContractMatches,
};
use sea_orm::DatabaseConnection;
use serde_json::Value;
use std::{str::FromStr, sync::Arc};

/// Enumerated registry of maintainer replace methods.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, strum::Display, strum::EnumString, serde::Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ReplaceMethod {
    /// Deletes the stored match and inserts a freshly computed one.
    FullReplace,
    /// Rewrites only the creation-side columns, preserving the runtime side.
    ReplaceCreationInformation,
}

/// Caller-supplied compilation used with `force_compilation = true`.
#[derive(Clone, Debug)]
pub struct ForcedCompilation {
    pub compiler_version: String,
    pub std_json_input: Value,
    pub contract_identifier: String,
}

#[derive(Clone, Debug)]
pub struct ReplaceRequest {
    pub verified_contract_id: i64,
    pub method: ReplaceMethod,
    /// `None` rebuilds the compilation from the stored standard JSON input,
    /// output artifacts and auxdata tables, skipping the compiler entirely.
    pub force_compilation: Option<ForcedCompilation>,
    /// With `false` the chain is synthesized from stored deployment data;
    /// with `true` the live chain is consulted.
    pub force_rpc_request: bool,
}

#[derive(Clone, Debug)]
pub struct ReplaceOutcome {
    pub verified_contract_id: i64,
    /// Whether creation bytecode could be fetched from RPC during the
    /// replacement.
    pub creation_code_fetched_from_rpc: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ReplaceEngineError {
    #[error("verified contract was not found: id={0}")]
    NotFound(i64),
    #[error("chain is not supported: {0}")]
    UnsupportedChain(i64),
    #[error("replacement produced no match")]
    NoMatch,
    #[error(transparent)]
    Database(#[from] contract_verification_database::ReplaceError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Maintainer-only flow that rebuilds a verification from stored data and
/// replaces or patches the stored match in one transaction.
pub struct ReplaceEngine {
    database_connection: Arc<DatabaseConnection>,
    compiler: Arc<dyn Compiler>,
    verifier: Arc<dyn Verifier>,
    chains: Chains,
}

impl ReplaceEngine {
    pub fn new(
        database_connection: Arc<DatabaseConnection>,
        compiler: Arc<dyn Compiler>,
        verifier: Arc<dyn Verifier>,
        chains: Chains,
    ) -> Self {
        Self {
            database_connection,
            compiler,
            verifier,
            chains,
        }
    }

    pub async fn replace(
        &self,
        request: ReplaceRequest,
    ) -> Result<ReplaceOutcome, ReplaceEngineError> {
        let stored = contract_verification_database::retrieve_verified_contract_full(
            self.database_connection.as_ref(),
            request.verified_contract_id,
        )
        .await?
        .ok_or(ReplaceEngineError::NotFound(request.verified_contract_id))?;

        let compilation = match &request.force_compilation {
            Some(forced) => self.compile_fresh(forced).await?,
            None => stored_compilation(&stored),
        };

        let (chain, using_live_rpc): (Arc<dyn Chain>, bool) = if request.force_rpc_request {
            let chain = self
                .chains
                .get(stored.deployment.chain_id)
                .ok_or(ReplaceEngineError::UnsupportedChain(stored.deployment.chain_id))?;
            (chain, true)
        } else {
            let mut synthetic = SyntheticChain::new(stored.deployment.runtime_code.clone());
            if let Some(creation_code) = stored.deployment.creation_code.clone() {
                let model = &stored.deployment.model;
                synthetic = synthetic.with_creation(crate::chain::ContractCreation {
                    creation_code,
                    block_number: decimal_i64(model.block_number),
                    transaction_index: decimal_i64(model.transaction_index),
                    deployer: model.deployer.clone(),
                    created_address: stored.deployment.address.clone(),
                });
            }
            (Arc::new(synthetic), false)
        };

        let creation_transaction_hash = stored.deployment.model.transaction_hash.clone();
        let success = self
            .verifier
            .verify(
                stored.deployment.chain_id,
                &compilation,
                chain.as_ref(),
                &stored.deployment.address,
                Some(creation_transaction_hash.as_slice()),
            )
            .await
            .map_err(|error| match error {
                crate::verifier::VerifyError::NoMatch => ReplaceEngineError::NoMatch,
                other => ReplaceEngineError::Internal(anyhow::anyhow!("{other}")),
            })?;

        let creation_code_fetched =
            using_live_rpc && success.deployment.creation_code.is_some();

        let verified_contract_id = match request.method {
            ReplaceMethod::FullReplace => {
                let signatures = compilation
                    .abi()
                    .map(extract_signatures)
                    .transpose()
                    .unwrap_or_else(|error| {
                        tracing::warn!(error = %error, "failed to extract signatures during replace");
                        None
                    })
                    .unwrap_or_default();

                let deployment = success
                    .deployment
                    .to_insert_contract_deployment()
                    .ok_or_else(|| anyhow::anyhow!("replacement carries no runtime bytecode"))?;

                let replacement = NewVerification {
                    deployment,
                    compiled_contract: compilation.into_compiled_contract(),
                    matches: success.matches,
                    match_metadata: serde_json::json!({
                        "replaced": true,
                    }),
                    signatures,
                };

                contract_verification_database::replace_verified_contract(
                    self.database_connection.as_ref(),
                    request.verified_contract_id,
                    replacement,
                )
                .await?
                .verified_contract_id
            }
            ReplaceMethod::ReplaceCreationInformation => {
                let creation_match = match success.matches {
                    VerifiedContractMatches::OnlyCreation { creation_match } => Some(creation_match),
                    VerifiedContractMatches::Complete { creation_match, .. } => {
                        Some(creation_match)
                    }
                    VerifiedContractMatches::OnlyRuntime { .. } => None,
                };
                contract_verification_database::patch_verified_contract_creation(
                    self.database_connection.as_ref(),
                    request.verified_contract_id,
                    creation_match,
                )
                .await?
                .id
            }
        };

        Ok(ReplaceOutcome {
            verified_contract_id,
            creation_code_fetched_from_rpc: creation_code_fetched,
        })
    }

    async fn compile_fresh(
        &self,
        forced: &ForcedCompilation,
    ) -> Result<CompilationReady, ReplaceEngineError> {
        let version = DetailedVersion::from_str(&forced.compiler_version)
            .map_err(|error| anyhow::anyhow!(error))?;
        let language = forced
            .std_json_input
            .get("language")
            .and_then(Value::as_str)
            .and_then(Language::from_standard_json)
            .ok_or_else(|| anyhow::anyhow!("forced compilation carries an unsupported language"))?;
        let (file_name, contract_name) = split_contract_identifier(&forced.contract_identifier)
            .ok_or_else(|| anyhow::anyhow!("invalid contract identifier"))?;

        let json_output = self
            .compiler
            .compile(language, &version, &forced.std_json_input)
            .await
            .map_err(|error| anyhow::anyhow!("forced compilation failed: {error}"))?;

        extract_compilation(
            language,
            &version,
            &forced.std_json_input,
            &json_output,
            &file_name,
            &contract_name,
        )
        .map_err(|error| match error {
            ExtractError::MissingContract => ReplaceEngineError::Internal(anyhow::anyhow!(
                "contract {} is not present in the forced compilation output",
                forced.contract_identifier
            )),
            ExtractError::Malformed(message) => {
                ReplaceEngineError::Internal(anyhow::anyhow!(message))
            }
        })
    }
}

/// Rebuilds the verifier-ready compilation from stored rows, skipping the
/// compiler. The stored codes are normalized, which is fine for re-running:
/// the transformation tables still describe every window that may differ.
fn stored_compilation(stored: &RetrievedVerifiedContract) -> CompilationReady {
    let compiled = &stored.compiled_contract;
    CompilationReady {
        compiler: compiled.compiler,
        language: compiled.language,
        version: compiled.version.clone(),
        name: compiled.name.clone(),
        fully_qualified_name: compiled.fully_qualified_name.clone(),
        sources: compiled.sources.clone(),
        compiler_settings: compiled.compiler_settings.clone(),
        compilation_artifacts: compiled.compilation_artifacts.clone(),
        creation_code: compiled.creation_code.clone(),
        creation_code_artifacts: compiled.creation_code_artifacts.clone(),
        runtime_code: compiled.runtime_code.clone(),
        runtime_code_artifacts: compiled.runtime_code_artifacts.clone(),
    }
}

fn decimal_i64(value: sea_orm::prelude::Decimal) -> i64 {
    i64::try_from(value).unwrap_or_default()
}
