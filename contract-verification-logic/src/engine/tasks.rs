use crate::{
    chain::{Chain, SyntheticChain},
    compiler::{Compiler, CompilerError, DetailedVersion, Language},
    errors::{ErrorCode, ErrorExport},
    explorer::ExplorerResult,
    metrics,
    pool::TaskExport,
    sinks::{JobContext, SinkError},
    storage::StorageFanout,
    types::{CompilationReady, VerificationExport, VerificationResult},
    verifier::{Verifier, VerifyError},
    ToHex,
};
use contract_verification_database::{
    CompiledContractLanguage, SimilarityCandidate,
};
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use serde_json::Value;
use std::{collections::BTreeMap, str::FromStr, sync::Arc};
use verification_common::{
    CompilationArtifacts, CreationCodeArtifacts, RuntimeCodeArtifacts,
};

pub(crate) const SIMILARITY_CANDIDATE_LIMIT: usize = 20;

/// Everything a worker task needs, cloned out of the engine before dispatch.
#[derive(Clone)]
pub(crate) struct TaskDependencies {
    pub database_connection: Arc<DatabaseConnection>,
    pub storage: Arc<StorageFanout>,
    pub compiler: Arc<dyn Compiler>,
    pub verifier: Arc<dyn Verifier>,
}

pub(crate) struct VerifyCompilationContext {
    pub chain_id: i64,
    pub contract_address: Vec<u8>,
    pub chain: Arc<dyn Chain>,
    pub creation_transaction_hash: Option<Vec<u8>>,
    pub job: JobContext,
}

/// Splits a `path:ContractName` identifier. The last `:` separates the
/// contract name, so paths containing colons keep working.
pub(crate) fn split_contract_identifier(identifier: &str) -> Option<(String, String)> {
    let (file, name) = identifier.rsplit_once(':')?;
    if file.is_empty() || name.is_empty() {
        return None;
    }
    Some((file.to_string(), name.to_string()))
}

/// Decodes a compiler `bytecode.object` hex string, zeroing the
/// `__$...$__`/`__lib__` library placeholder windows the compiler leaves in
/// unlinked code.
pub(crate) fn decode_bytecode_object(object: &str) -> Result<Vec<u8>, String> {
    const PLACEHOLDER_HEX_LENGTH: usize = 40;

    let mut object = object.trim_start_matches("0x").to_string();
    while let Some(position) = object.find("__") {
        if position + PLACEHOLDER_HEX_LENGTH > object.len() {
            return Err("truncated library placeholder in bytecode object".to_string());
        }
        object.replace_range(
            position..position + PLACEHOLDER_HEX_LENGTH,
            &"0".repeat(PLACEHOLDER_HEX_LENGTH),
        );
    }

    hex::decode(&object).map_err(|err| format!("invalid bytecode object hex: {err}"))
}

/// Derives the cbor-auxdata artifact of a code blob from its trailing
/// length-prefixed metadata section, when one is plausibly present.
pub(crate) fn cbor_auxdata_artifact(code: &[u8]) -> Option<Value> {
    if code.len() < 4 {
        return None;
    }
    let length_bytes = &code[code.len() - 2..];
    let cbor_length = u16::from_be_bytes([length_bytes[0], length_bytes[1]]) as usize;
    let auxdata_length = cbor_length + 2;
    if cbor_length == 0 || auxdata_length > code.len() {
        return None;
    }
    let offset = code.len() - auxdata_length;
    // cbor maps start with 0xa1..=0xb7 for the sizes compilers emit
    if !(0xa1..=0xb7).contains(&code[offset]) {
        return None;
    }
    Some(serde_json::json!({
        "1": {
            "offset": offset,
            "value": code[offset..].to_hex(),
        }
    }))
}

#[derive(Debug)]
pub(crate) enum ExtractError {
    MissingContract,
    Malformed(String),
}

/// Pulls one contract's artifacts out of a standard JSON output and builds
/// the verifier-ready compilation.
pub(crate) fn extract_compilation(
    language: Language,
    version: &DetailedVersion,
    json_input: &Value,
    json_output: &Value,
    file_name: &str,
    contract_name: &str,
) -> Result<CompilationReady, ExtractError> {
    let contract = json_output
        .get("contracts")
        .and_then(|contracts| contracts.get(file_name))
        .and_then(|file| file.get(contract_name))
        .ok_or(ExtractError::MissingContract)?;

    let creation_object = contract
        .pointer("/evm/bytecode/object")
        .and_then(Value::as_str)
        .ok_or_else(|| ExtractError::Malformed("creation bytecode is missing".to_string()))?;
    let runtime_object = contract
        .pointer("/evm/deployedBytecode/object")
        .and_then(Value::as_str)
        .ok_or_else(|| ExtractError::Malformed("runtime bytecode is missing".to_string()))?;

    let creation_code = decode_bytecode_object(creation_object).map_err(ExtractError::Malformed)?;
    let runtime_code = decode_bytecode_object(runtime_object).map_err(ExtractError::Malformed)?;

    let sources: BTreeMap<String, String> = json_input
        .get("sources")
        .and_then(Value::as_object)
        .map(|sources| {
            sources
                .iter()
                .filter_map(|(path, source)| {
                    source
                        .get("content")
                        .and_then(Value::as_str)
                        .map(|content| (path.clone(), content.to_string()))
                })
                .collect()
        })
        .unwrap_or_default();

    let mut compiler_settings = json_input
        .get("settings")
        .cloned()
        .unwrap_or_else(|| serde_json::json!({}));
    // output selection does not affect the produced bytecode and would break
    // compilation dedup
    if let Some(settings) = compiler_settings.as_object_mut() {
        settings.remove("outputSelection");
    }

    let compilation_artifacts = CompilationArtifacts {
        abi: contract.get("abi").cloned(),
        devdoc: contract.get("devdoc").cloned(),
        userdoc: contract.get("userdoc").cloned(),
        storage_layout: contract.get("storageLayout").cloned(),
        sources: json_output.get("sources").cloned(),
    };

    let creation_code_artifacts = CreationCodeArtifacts {
        source_map: contract.pointer("/evm/bytecode/sourceMap").cloned(),
        link_references: contract.pointer("/evm/bytecode/linkReferences").cloned(),
        cbor_auxdata: cbor_auxdata_artifact(&creation_code),
    };

    let runtime_code_artifacts = RuntimeCodeArtifacts {
        cbor_auxdata: cbor_auxdata_artifact(&runtime_code),
        immutable_references: contract
            .pointer("/evm/deployedBytecode/immutableReferences")
            .cloned(),
        link_references: contract
            .pointer("/evm/deployedBytecode/linkReferences")
            .cloned(),
        source_map: contract.pointer("/evm/deployedBytecode/sourceMap").cloned(),
    };

    let database_language = match language {
        Language::Solidity => CompiledContractLanguage::Solidity,
        Language::Yul => CompiledContractLanguage::Yul,
        Language::Vyper => CompiledContractLanguage::Vyper,
    };

    Ok(CompilationReady {
        compiler: language.compiler(),
        language: database_language,
        version: version.to_string(),
        name: contract_name.to_string(),
        fully_qualified_name: format!("{file_name}:{contract_name}"),
        sources,
        compiler_settings,
        compilation_artifacts,
        creation_code,
        creation_code_artifacts,
        runtime_code,
        runtime_code_artifacts,
    })
}

fn compiler_error_export(error: CompilerError) -> ErrorExport {
    match error {
        CompilerError::Diagnostics(diagnostics) => {
            ErrorExport::new(ErrorCode::CompilerError, "compilation failed").with_data(
                serde_json::json!({
                    "compilerErrors": diagnostics,
                }),
            )
        }
        CompilerError::UnsupportedVersion(version) => ErrorExport::new(
            ErrorCode::UnsupportedCompilerVersion,
            format!("compiler version is not supported: {version}"),
        ),
        CompilerError::UnsupportedLanguage(language) => ErrorExport::new(
            ErrorCode::UnsupportedLanguage,
            format!("language is not supported: {language}"),
        ),
        CompilerError::Internal(error) => {
            ErrorExport::new(ErrorCode::InternalError, format!("{error:#}"))
        }
    }
}

fn verify_error_export(error: VerifyError) -> ErrorExport {
    match error {
        VerifyError::NoMatch => ErrorExport::new(
            ErrorCode::BytecodeMismatch,
            "deployed and recompiled bytecode do not match",
        ),
        VerifyError::ContractNotDeployed => ErrorExport::new(
            ErrorCode::ContractNotDeployed,
            "no bytecode is deployed at the address",
        ),
        VerifyError::GetBytecode(message) => {
            ErrorExport::new(ErrorCode::CannotFetchBytecode, message)
        }
        VerifyError::Internal(error) => {
            ErrorExport::new(ErrorCode::InternalError, format!("{error:#}"))
        }
    }
}

/// Fans a verified result out to every sink and converts the receipt into
/// the worker export.
async fn store_and_export(
    dependencies: &TaskDependencies,
    job: &JobContext,
    result: &VerificationResult,
) -> TaskExport {
    match dependencies.storage.store_verification(result, Some(job)).await {
        Ok(receipt) => match receipt.verified_contract_id {
            Some(verified_contract_id) => {
                TaskExport::Verification(Box::new(VerificationExport {
                    verified_contract_id,
                    runtime_status: receipt.runtime_status,
                    creation_status: receipt.creation_status,
                }))
            }
            None => TaskExport::Error {
                export: ErrorExport::new(
                    ErrorCode::InternalError,
                    "no sink produced a canonical verification record",
                ),
                failed_sink_write: true,
            },
        },
        Err(SinkError::AlreadyVerified) => TaskExport::Error {
            export: ErrorExport::new(
                ErrorCode::AlreadyVerified,
                "contract is already verified with an equal or better match",
            ),
            failed_sink_write: true,
        },
        Err(error) => TaskExport::Error {
            export: ErrorExport::new(ErrorCode::InternalError, format!("{error:#}")),
            failed_sink_write: true,
        },
    }
}

/// Runs the verifier against the chain and fans the result out to every
/// sink. This is the shared tail of all four task kinds.
pub(crate) async fn verify_and_store(
    dependencies: &TaskDependencies,
    context: &VerifyCompilationContext,
    compilation: CompilationReady,
) -> TaskExport {
    let verified = dependencies
        .verifier
        .verify(
            context.chain_id,
            &compilation,
            context.chain.as_ref(),
            &context.contract_address,
            context.creation_transaction_hash.as_deref(),
        )
        .await;

    let success = match verified {
        Ok(success) => success,
        Err(error) => return TaskExport::error(verify_error_export(error)),
    };

    let result = VerificationResult {
        deployment: success.deployment,
        compilation,
        matches: success.matches,
    };

    store_and_export(dependencies, &context.job, &result).await
}

pub(crate) async fn run_json_input_task(
    dependencies: TaskDependencies,
    context: VerifyCompilationContext,
    std_json_input: Value,
    compiler_version: String,
    contract_identifier: String,
) -> TaskExport {
    let version = match DetailedVersion::from_str(&compiler_version) {
        Ok(version) => version,
        Err(error) => {
            return TaskExport::error(ErrorExport::new(
                ErrorCode::UnsupportedCompilerVersion,
                error,
            ))
        }
    };

    let language = match std_json_input
        .get("language")
        .and_then(Value::as_str)
        .and_then(Language::from_standard_json)
    {
        Some(language) => language,
        None => {
            return TaskExport::error(ErrorExport::new(
                ErrorCode::UnsupportedLanguage,
                "standard json input carries an unsupported language",
            ))
        }
    };

    let (file_name, contract_name) = match split_contract_identifier(&contract_identifier) {
        Some(split) => split,
        None => {
            return TaskExport::error(ErrorExport::new(
                ErrorCode::InvalidParameter,
                "contract identifier must look like 'path:ContractName'",
            ))
        }
    };

    let json_output = match dependencies
        .compiler
        .compile(language, &version, &std_json_input)
        .await
    {
        Ok(json_output) => json_output,
        Err(error) => return TaskExport::error(compiler_error_export(error)),
    };

    let compilation = match extract_compilation(
        language,
        &version,
        &std_json_input,
        &json_output,
        &file_name,
        &contract_name,
    ) {
        Ok(compilation) => compilation,
        Err(ExtractError::MissingContract) => {
            return TaskExport::error(ErrorExport::new(
                ErrorCode::InvalidParameter,
                format!("contract {file_name}:{contract_name} is not present in the compilation output"),
            ))
        }
        Err(ExtractError::Malformed(message)) => {
            return TaskExport::error(ErrorExport::new(ErrorCode::InternalError, message))
        }
    };

    verify_and_store(&dependencies, &context, compilation).await
}

#[derive(Debug, Deserialize)]
struct MetadataCompiler {
    version: String,
}

#[derive(Debug, Deserialize)]
struct SolidityMetadata {
    compiler: MetadataCompiler,
    #[serde(default)]
    language: Option<String>,
    settings: Value,
    #[serde(default)]
    sources: BTreeMap<String, Value>,
}

/// Builds a standard JSON input from a solidity metadata file plus the
/// submitted source files. The metadata lists which sources take part in the
/// compilation; with `use_all_sources` every submitted file is included
/// instead, which is the workaround for the compiler's extra-file-input bug.
pub(crate) fn metadata_to_standard_json(
    metadata: &Value,
    provided_sources: &BTreeMap<String, String>,
    use_all_sources: bool,
) -> Result<(Language, String, Value, String), ErrorExport> {
    let metadata: SolidityMetadata = serde_json::from_value(metadata.clone()).map_err(|err| {
        ErrorExport::new(ErrorCode::InvalidJson, format!("invalid metadata: {err}"))
    })?;

    let language = metadata.language.as_deref().unwrap_or("Solidity");
    let language = Language::from_standard_json(language).ok_or_else(|| {
        ErrorExport::new(
            ErrorCode::UnsupportedLanguage,
            format!("metadata carries an unsupported language: {language}"),
        )
    })?;

    let mut settings = metadata.settings.clone();
    let compilation_target = settings
        .as_object_mut()
        .and_then(|settings| settings.remove("compilationTarget"))
        .ok_or_else(|| {
            ErrorExport::new(
                ErrorCode::InvalidJson,
                "metadata settings miss the compilation target",
            )
        })?;
    let (target_file, target_name) = compilation_target
        .as_object()
        .and_then(|target| target.iter().next())
        .and_then(|(file, name)| name.as_str().map(|name| (file.clone(), name.to_string())))
        .ok_or_else(|| {
            ErrorExport::new(
                ErrorCode::InvalidJson,
                "metadata compilation target is malformed",
            )
        })?;

    let mut sources = serde_json::Map::new();
    if use_all_sources {
        for (path, content) in provided_sources {
            sources.insert(
                path.clone(),
                serde_json::json!({ "content": content }),
            );
        }
    } else {
        for (path, descriptor) in &metadata.sources {
            let content = descriptor
                .get("content")
                .and_then(Value::as_str)
                .map(ToString::to_string)
                .or_else(|| provided_sources.get(path).cloned())
                .ok_or_else(|| {
                    ErrorExport::new(
                        ErrorCode::InvalidParameter,
                        format!("source content is missing for {path}"),
                    )
                })?;
            sources.insert(path.clone(), serde_json::json!({ "content": content }));
        }
    }

    let json_input = serde_json::json!({
        "language": match language {
            Language::Solidity => "Solidity",
            Language::Yul => "Yul",
            Language::Vyper => "Vyper",
        },
        "sources": sources,
        "settings": settings,
    });

    Ok((
        language,
        metadata.compiler.version,
        json_input,
        format!("{target_file}:{target_name}"),
    ))
}

pub(crate) async fn run_metadata_task(
    dependencies: TaskDependencies,
    context: VerifyCompilationContext,
    metadata: Value,
    provided_sources: BTreeMap<String, String>,
) -> TaskExport {
    let (language, compiler_version, json_input, contract_identifier) =
        match metadata_to_standard_json(&metadata, &provided_sources, false) {
            Ok(prepared) => prepared,
            Err(export) => return TaskExport::error(export),
        };

    let version = match DetailedVersion::from_str(&compiler_version) {
        Ok(version) => version,
        Err(error) => {
            return TaskExport::error(ErrorExport::new(
                ErrorCode::UnsupportedCompilerVersion,
                error,
            ))
        }
    };

    let (file_name, contract_name) = match split_contract_identifier(&contract_identifier) {
        Some(split) => split,
        None => {
            return TaskExport::error(ErrorExport::new(
                ErrorCode::InvalidJson,
                "metadata compilation target is malformed",
            ))
        }
    };

    let first_attempt = match dependencies
        .compiler
        .compile(language, &version, &json_input)
        .await
    {
        Ok(json_output) => extract_compilation(
            language,
            &version,
            &json_input,
            &json_output,
            &file_name,
            &contract_name,
        ),
        Err(error) => return TaskExport::error(compiler_error_export(error)),
    };

    let compilation = match first_attempt {
        Ok(compilation) => compilation,
        // The target contract vanished from the output: the compiler
        // dropped it because of the extra-file-input bug. Retry once with
        // every submitted source file.
        Err(ExtractError::MissingContract) => {
            tracing::warn!(
                contract = contract_identifier,
                "target contract missing from the compilation output, retrying with all sources"
            );
            let (_, _, json_input, _) =
                match metadata_to_standard_json(&metadata, &provided_sources, true) {
                    Ok(prepared) => prepared,
                    Err(export) => return TaskExport::error(export),
                };
            let retry = match dependencies
                .compiler
                .compile(language, &version, &json_input)
                .await
            {
                Ok(json_output) => extract_compilation(
                    language,
                    &version,
                    &json_input,
                    &json_output,
                    &file_name,
                    &contract_name,
                ),
                Err(error) => return TaskExport::error(compiler_error_export(error)),
            };
            match retry {
                Ok(compilation) => compilation,
                Err(_) => {
                    return TaskExport::error(ErrorExport::new(
                        ErrorCode::ExtraFileInputBug,
                        "target contract is missing from the compilation output even with all sources",
                    ))
                }
            }
        }
        Err(ExtractError::Malformed(message)) => {
            return TaskExport::error(ErrorExport::new(ErrorCode::InternalError, message))
        }
    };

    verify_and_store(&dependencies, &context, compilation).await
}

pub(crate) async fn run_explorer_result_task(
    dependencies: TaskDependencies,
    context: VerifyCompilationContext,
    explorer_result: ExplorerResult,
) -> TaskExport {
    let contract_identifier = format!(
        "{}:{}",
        explorer_result.file_name(),
        explorer_result.contract_name()
    );
    let compiler_version = explorer_result.compiler_version().to_string();
    let std_json_input = explorer_result.standard_json_input().clone();

    run_json_input_task(
        dependencies,
        context,
        std_json_input,
        compiler_version,
        contract_identifier,
    )
    .await
}

fn candidate_compilation(candidate: &SimilarityCandidate) -> Option<CompilationReady> {
    let model = &candidate.compiled_contract;
    let compiler = model.compiler.parse().ok()?;
    let language = model.language.parse().ok()?;
    Some(CompilationReady {
        compiler,
        language,
        version: model.version.clone(),
        name: model.name.clone(),
        fully_qualified_name: model.fully_qualified_name.clone(),
        sources: candidate.sources.clone(),
        compiler_settings: model.compiler_settings.clone(),
        compilation_artifacts: serde_json::from_value(model.compilation_artifacts.clone()).ok()?,
        creation_code: candidate.creation_code.clone()?,
        creation_code_artifacts: serde_json::from_value(model.creation_code_artifacts.clone())
            .ok()?,
        runtime_code: candidate.runtime_code.clone(),
        runtime_code_artifacts: serde_json::from_value(model.runtime_code_artifacts.clone())
            .ok()?,
    })
}

/// The similarity path: rank previously verified compilations by shared
/// runtime-bytecode prefix and trial-verify them against a synthetic chain
/// until one matches.
pub(crate) async fn run_similarity_task(
    dependencies: TaskDependencies,
    context: VerifyCompilationContext,
    runtime_code: Vec<u8>,
) -> TaskExport {
    let candidates = match contract_verification_database::find_similarity_candidates(
        dependencies.database_connection.as_ref(),
        &runtime_code,
        SIMILARITY_CANDIDATE_LIMIT,
    )
    .await
    {
        Ok(candidates) => candidates,
        Err(error) => {
            return TaskExport::error(ErrorExport::new(
                ErrorCode::InternalError,
                format!("retrieving similarity candidates: {error:#}"),
            ))
        }
    };

    // Materialize creation evidence from the live chain when a creator
    // transaction is known, so a candidate can produce a creation match too.
    let mut synthetic = SyntheticChain::new(runtime_code);
    if let Some(transaction_hash) = &context.creation_transaction_hash {
        match context.chain.get_contract_creation(transaction_hash).await {
            Ok(Some(creation)) if creation.created_address == context.contract_address => {
                synthetic = synthetic.with_creation(creation);
            }
            Ok(_) => {}
            Err(error) => {
                tracing::warn!(error = %error, "failed to fetch creation data for similarity verification");
            }
        }
    }
    let synthetic_chain: Arc<dyn Chain> = Arc::new(synthetic);

    let candidate_count = candidates.len();
    tracing::debug!(candidates = candidate_count, "retrieved similarity candidates");

    for candidate in &candidates {
        let compilation = match candidate_compilation(candidate) {
            Some(compilation) => compilation,
            None => {
                tracing::warn!(
                    compilation_id = %candidate.compiled_contract.id,
                    "skipping similarity candidate with unparsable stored artifacts"
                );
                continue;
            }
        };

        match dependencies
            .verifier
            .verify(
                context.chain_id,
                &compilation,
                synthetic_chain.as_ref(),
                &context.contract_address,
                context.creation_transaction_hash.as_deref(),
            )
            .await
        {
            Ok(success) => {
                metrics::SIMILARITY_CANDIDATES_COUNT
                    .with_label_values(&["matched"])
                    .observe(candidate_count as f64);

                let result = VerificationResult {
                    deployment: success.deployment,
                    compilation,
                    matches: success.matches,
                };
                return store_and_export(&dependencies, &context.job, &result).await;
            }
            Err(VerifyError::NoMatch) => continue,
            Err(error) => {
                tracing::debug!(
                    compilation_id = %candidate.compiled_contract.id,
                    error = %error,
                    "similarity candidate failed to verify"
                );
                continue;
            }
        }
    }

    metrics::SIMILARITY_CANDIDATES_COUNT
        .with_label_values(&["unmatched"])
        .observe(candidate_count as f64);

    TaskExport::error(ErrorExport::new(
        ErrorCode::NoSimilarMatchFound,
        "no stored compilation matches the deployed bytecode",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn contract_identifiers_split_on_the_last_colon() {
        assert_eq!(
            split_contract_identifier("contracts/Storage.sol:Storage"),
            Some(("contracts/Storage.sol".to_string(), "Storage".to_string()))
        );
        assert_eq!(
            split_contract_identifier("c:/work/Storage.sol:Storage"),
            Some(("c:/work/Storage.sol".to_string(), "Storage".to_string()))
        );
        assert_eq!(split_contract_identifier("Storage"), None);
        assert_eq!(split_contract_identifier(":Storage"), None);
        assert_eq!(split_contract_identifier("file.sol:"), None);
    }

    #[test]
    fn bytecode_objects_with_placeholders_decode_to_zeroed_windows() {
        let object = format!(
            "6080{}6040",
            "__$4d3f2a7b1c9e8d6f5a4b3c2d1e0f9a8b7c$__"
        );
        // placeholder is 40 chars; decoded window must be 20 zero bytes
        let decoded = decode_bytecode_object(&object).unwrap();
        assert_eq!(decoded.len(), 2 + 20 + 2);
        assert_eq!(&decoded[2..22], &[0u8; 20]);

        assert_eq!(decode_bytecode_object("0x6080").unwrap(), vec![0x60, 0x80]);
        assert!(decode_bytecode_object("60__$abc").is_err());
        assert!(decode_bytecode_object("zz").is_err());
    }

    #[test]
    fn cbor_auxdata_is_derived_from_the_trailing_length() {
        // 4 bytes of code followed by a 4-byte cbor map and the 0x0004 length
        let mut code = vec![0x60, 0x80, 0x60, 0x40];
        code.extend([0xa2, 0x64, 0x69, 0x70]);
        code.extend([0x00, 0x04]);

        let artifact = cbor_auxdata_artifact(&code).unwrap();
        assert_eq!(
            artifact,
            serde_json::json!({
                "1": { "offset": 4, "value": "0xa26469700004" }
            })
        );

        // implausible trailer lengths produce no artifact
        assert_eq!(cbor_auxdata_artifact(&[0x60, 0x80, 0xff, 0xff]), None);
        assert_eq!(cbor_auxdata_artifact(&[0x00, 0x00]), None);
    }

    #[test]
    fn metadata_builds_a_standard_json_input() {
        let metadata = serde_json::json!({
            "compiler": { "version": "0.8.20+commit.a1b79de6" },
            "language": "Solidity",
            "settings": {
                "optimizer": { "enabled": true, "runs": 200 },
                "compilationTarget": { "contracts/Storage.sol": "Storage" },
            },
            "sources": {
                "contracts/Storage.sol": { "keccak256": "0xabcd" },
            },
        });
        let provided = BTreeMap::from([
            (
                "contracts/Storage.sol".to_string(),
                "contract Storage {}".to_string(),
            ),
            (
                "contracts/Unused.sol".to_string(),
                "contract Unused {}".to_string(),
            ),
        ]);

        let (language, version, json_input, identifier) =
            metadata_to_standard_json(&metadata, &provided, false).unwrap();
        assert_eq!(language, Language::Solidity);
        assert_eq!(version, "0.8.20+commit.a1b79de6");
        assert_eq!(identifier, "contracts/Storage.sol:Storage");
        let sources = json_input.get("sources").unwrap().as_object().unwrap();
        assert_eq!(sources.len(), 1);
        assert!(json_input
            .get("settings")
            .unwrap()
            .get("compilationTarget")
            .is_none());

        // the retry includes every submitted source
        let (_, _, json_input, _) =
            metadata_to_standard_json(&metadata, &provided, true).unwrap();
        let sources = json_input.get("sources").unwrap().as_object().unwrap();
        assert_eq!(sources.len(), 2);
    }

    #[test]
    fn metadata_without_a_compilation_target_is_rejected() {
        let metadata = serde_json::json!({
            "compiler": { "version": "0.8.20" },
            "settings": {},
        });
        let error = metadata_to_standard_json(&metadata, &BTreeMap::new(), false).unwrap_err();
        assert_eq!(error.code, ErrorCode::InvalidJson);
    }

    #[test]
    fn extracting_a_missing_contract_reports_it() {
        let version: DetailedVersion = "0.8.20+commit.a1b79de6".parse().unwrap();
        let json_input = serde_json::json!({ "sources": {}, "settings": {} });
        let json_output = serde_json::json!({ "contracts": {} });
        let result = extract_compilation(
            Language::Solidity,
            &version,
            &json_input,
            &json_output,
            "contracts/Storage.sol",
            "Storage",
        );
        assert!(matches!(result, Err(ExtractError::MissingContract)));
    }

    #[test]
    fn extraction_builds_verifier_ready_artifacts() {
        let version: DetailedVersion = "0.8.20+commit.a1b79de6".parse().unwrap();
        let json_input = serde_json::json!({
            "sources": {
                "contracts/Storage.sol": { "content": "contract Storage {}" },
            },
            "settings": {
                "optimizer": { "enabled": false },
                "outputSelection": { "*": { "*": ["*"] } },
            },
        });
        let json_output = serde_json::json!({
            "contracts": {
                "contracts/Storage.sol": {
                    "Storage": {
                        "abi": [],
                        "evm": {
                            "bytecode": { "object": "608060", "linkReferences": {} },
                            "deployedBytecode": {
                                "object": "6080",
                                "linkReferences": {},
                                "immutableReferences": {},
                            },
                        },
                    },
                },
            },
            "sources": { "contracts/Storage.sol": { "id": 0 } },
        });

        let compilation = extract_compilation(
            Language::Solidity,
            &version,
            &json_input,
            &json_output,
            "contracts/Storage.sol",
            "Storage",
        )
        .unwrap();

        assert_eq!(compilation.creation_code, vec![0x60, 0x80, 0x60]);
        assert_eq!(compilation.runtime_code, vec![0x60, 0x80]);
        assert_eq!(
            compilation.fully_qualified_name,
            "contracts/Storage.sol:Storage"
        );
        assert!(compilation
            .compiler_settings
            .get("outputSelection")
            .is_none());
        assert_eq!(compilation.sources.len(), 1);
    }
}
