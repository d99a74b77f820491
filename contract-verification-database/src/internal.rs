use crate::{
    helpers::insert_then_select,
    types::{
        CompiledContract, ContractCode, InsertContractDeployment, RetrieveContractDeployment,
        VerifiedContractMatches,
    },
};
use anyhow::{Context, Error};
use contract_verification_entity::{
    code, compiled_contracts, compiled_contracts_sources, contract_deployments, contracts,
    sources, verified_contracts,
};
use sea_orm::{
    prelude::{Decimal, Uuid},
    ActiveValue::Set,
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
};
use std::collections::BTreeMap;
use verification_common::{keccak256, sha256, Match};

#[derive(Clone, Debug)]
pub(crate) struct InternalContractDeploymentData {
    pub chain_id: Decimal,
    pub address: Vec<u8>,
    pub transaction_hash: Vec<u8>,
    pub block_number: Decimal,
    pub transaction_index: Decimal,
    pub deployer: Vec<u8>,
    pub contract_code: ContractCode,
}

impl From<InsertContractDeployment> for InternalContractDeploymentData {
    fn from(value: InsertContractDeployment) -> Self {
        match value {
            InsertContractDeployment::Genesis {
                chain_id,
                address,
                runtime_code,
            } => {
                let transaction_hash =
                    calculate_genesis_contract_deployment_transaction_hash(&runtime_code);
                Self {
                    chain_id: Decimal::from(chain_id),
                    address,
                    transaction_hash,
                    block_number: Decimal::from(-1),
                    transaction_index: Decimal::from(-1),
                    deployer: vec![],
                    contract_code: ContractCode::OnlyRuntimeCode { code: runtime_code },
                }
            }
            InsertContractDeployment::Regular {
                chain_id,
                address,
                transaction_hash,
                block_number,
                transaction_index,
                deployer,
                creation_code,
                runtime_code,
            } => Self {
                chain_id: Decimal::from(chain_id),
                address,
                transaction_hash,
                block_number: Decimal::from(block_number),
                transaction_index: Decimal::from(transaction_index),
                deployer,
                contract_code: ContractCode::CompleteCode {
                    creation_code,
                    runtime_code,
                },
            },
        }
    }
}

#[derive(Clone, Debug, Default)]
struct InternalMatchData {
    does_match: bool,
    metadata_match: Option<bool>,
    values: Option<serde_json::Value>,
    transformations: Option<serde_json::Value>,
}

fn parse_match_data(r#match: Match) -> InternalMatchData {
    InternalMatchData {
        does_match: true,
        metadata_match: Some(r#match.metadata_match),
        values: Some(r#match.values.into()),
        transformations: Some(
            serde_json::to_value(r#match.transformations)
                .expect("transformations serialization must succeed"),
        ),
    }
}

pub(crate) fn calculate_genesis_contract_deployment_transaction_hash(
    runtime_code: &[u8],
) -> Vec<u8> {
    keccak256(runtime_code)
}

pub(crate) fn decimal_to_i64(value: Decimal) -> Result<i64, Error> {
    i64::try_from(value).map_err(|err| anyhow::anyhow!("numeric column out of i64 range: {err}"))
}

pub(crate) async fn insert_code<C: ConnectionTrait>(
    database_connection: &C,
    code: Vec<u8>,
) -> Result<code::Model, Error> {
    let code_hash = sha256(&code);
    let code_hash_keccak = keccak256(&code);

    let active_model = code::ActiveModel {
        code_hash: Set(code_hash.clone()),
        code_hash_keccak: Set(code_hash_keccak),
        code: Set(Some(code)),
        created_at: Default::default(),
        updated_at: Default::default(),
        created_by: Default::default(),
        updated_by: Default::default(),
    };

    let (model, _inserted) = insert_then_select(
        database_connection,
        code::Entity,
        active_model,
        [(code::Column::CodeHash, code_hash.into())],
    )
    .await?;

    Ok(model)
}

/// Inserts a contract defined by its runtime and creation code into the
/// `contracts` table. Only creation code is optional; runtime code always
/// exists, though it may be empty in case creation code execution resulted
/// in empty code. Creation code may be missed for genesis contracts.
pub(crate) async fn insert_contract<C: ConnectionTrait>(
    database_connection: &C,
    contract_code: ContractCode,
) -> Result<contracts::Model, Error> {
    let (creation_code_hash, runtime_code_hash) = match contract_code {
        ContractCode::OnlyRuntimeCode { code } => {
            let runtime_code_hash = insert_code(database_connection, code)
                .await
                .context("insert runtime code")?
                .code_hash;
            (vec![], runtime_code_hash)
        }
        ContractCode::CompleteCode {
            creation_code,
            runtime_code,
        } => {
            let creation_code_hash = insert_code(database_connection, creation_code)
                .await
                .context("insert creation code")?
                .code_hash;
            let runtime_code_hash = insert_code(database_connection, runtime_code)
                .await
                .context("insert runtime code")?
                .code_hash;
            (creation_code_hash, runtime_code_hash)
        }
    };

    let active_model = contracts::ActiveModel {
        id: Default::default(),
        creation_code_hash: Set(creation_code_hash.clone()),
        runtime_code_hash: Set(runtime_code_hash.clone()),
        created_at: Default::default(),
        updated_at: Default::default(),
        created_by: Default::default(),
        updated_by: Default::default(),
    };

    let (model, _inserted) = insert_then_select(
        database_connection,
        contracts::Entity,
        active_model,
        [
            (contracts::Column::CreationCodeHash, creation_code_hash.into()),
            (contracts::Column::RuntimeCodeHash, runtime_code_hash.into()),
        ],
    )
    .await?;

    Ok(model)
}

pub(crate) async fn insert_contract_deployment<C: ConnectionTrait>(
    database_connection: &C,
    data: InternalContractDeploymentData,
    contract_id: Uuid,
) -> Result<contract_deployments::Model, Error> {
    let active_model = contract_deployments::ActiveModel {
        id: Default::default(),
        chain_id: Set(data.chain_id),
        address: Set(data.address.clone()),
        transaction_hash: Set(data.transaction_hash.clone()),
        block_number: Set(data.block_number),
        transaction_index: Set(data.transaction_index),
        deployer: Set(data.deployer),
        contract_id: Set(contract_id),
        created_at: Default::default(),
        updated_at: Default::default(),
        created_by: Default::default(),
        updated_by: Default::default(),
    };

    let (model, _inserted) = insert_then_select(
        database_connection,
        contract_deployments::Entity,
        active_model,
        [
            (contract_deployments::Column::ChainId, data.chain_id.into()),
            (contract_deployments::Column::Address, data.address.into()),
            (
                contract_deployments::Column::TransactionHash,
                data.transaction_hash.into(),
            ),
        ],
    )
    .await?;

    Ok(model)
}

pub(crate) async fn retrieve_contract_deployment<C: ConnectionTrait>(
    database_connection: &C,
    contract_deployment: RetrieveContractDeployment,
) -> Result<Option<contract_deployments::Model>, Error> {
    let transaction_hash = contract_deployment.transaction_hash.unwrap_or_else(|| {
        let runtime_code = contract_deployment
            .runtime_code
            .expect("either transaction hash or runtime code must contain value");
        calculate_genesis_contract_deployment_transaction_hash(&runtime_code)
    });

    contract_deployments::Entity::find()
        .filter(
            contract_deployments::Column::ChainId.eq(Decimal::from(contract_deployment.chain_id)),
        )
        .filter(contract_deployments::Column::Address.eq(contract_deployment.address))
        .filter(contract_deployments::Column::TransactionHash.eq(transaction_hash))
        .one(database_connection)
        .await
        .context("select from \"contract_deployments\"")
}

pub(crate) async fn retrieve_contract_deployments_by_chain_id_and_address<C: ConnectionTrait>(
    database_connection: &C,
    chain_id: i64,
    address: Vec<u8>,
) -> Result<Vec<contract_deployments::Model>, Error> {
    contract_deployments::Entity::find()
        .filter(contract_deployments::Column::ChainId.eq(Decimal::from(chain_id)))
        .filter(contract_deployments::Column::Address.eq(address))
        .all(database_connection)
        .await
        .context("select from \"contract_deployments\" by chain id and address")
}

pub(crate) async fn retrieve_contract_by_id<C: ConnectionTrait>(
    database_connection: &C,
    contract_id: Uuid,
) -> Result<contracts::Model, Error> {
    contracts::Entity::find_by_id(contract_id)
        .one(database_connection)
        .await
        .context("select from \"contracts\" by id")?
        .ok_or(anyhow::anyhow!(
            "contract was not found, though referenced by a deployment: id={contract_id}"
        ))
}

pub(crate) async fn retrieve_code_by_id<C: ConnectionTrait>(
    database_connection: &C,
    code_hash: Vec<u8>,
) -> Result<code::Model, Error> {
    code::Entity::find_by_id(code_hash.clone())
        .one(database_connection)
        .await
        .context("select from \"code\" by hash")?
        .ok_or(anyhow::anyhow!(
            "code was not found, though referenced: hash={}",
            hex::encode(code_hash)
        ))
}

pub(crate) async fn insert_compiled_contract<C: ConnectionTrait>(
    database_connection: &C,
    compiled_contract: CompiledContract,
) -> Result<compiled_contracts::Model, Error> {
    let creation_code_hash = insert_code(database_connection, compiled_contract.creation_code)
        .await
        .context("insert creation code")?
        .code_hash;
    let runtime_code_hash = insert_code(database_connection, compiled_contract.runtime_code)
        .await
        .context("insert runtime code")?
        .code_hash;

    let active_model = compiled_contracts::ActiveModel {
        id: Default::default(),
        compiler: Set(compiled_contract.compiler.to_string()),
        version: Set(compiled_contract.version),
        language: Set(compiled_contract.language.to_string()),
        name: Set(compiled_contract.name),
        fully_qualified_name: Set(compiled_contract.fully_qualified_name),
        compiler_settings: Set(compiled_contract.compiler_settings),
        compilation_artifacts: Set(compiled_contract.compilation_artifacts.into()),
        creation_code_hash: Set(creation_code_hash.clone()),
        creation_code_artifacts: Set(compiled_contract.creation_code_artifacts.into()),
        runtime_code_hash: Set(runtime_code_hash.clone()),
        runtime_code_artifacts: Set(compiled_contract.runtime_code_artifacts.into()),
        created_at: Default::default(),
        updated_at: Default::default(),
        created_by: Default::default(),
        updated_by: Default::default(),
    };

    let (model, _inserted) = insert_then_select(
        database_connection,
        compiled_contracts::Entity,
        active_model,
        [
            (
                compiled_contracts::Column::Compiler,
                compiled_contract.compiler.to_string().into(),
            ),
            (
                compiled_contracts::Column::Language,
                compiled_contract.language.to_string().into(),
            ),
            (
                compiled_contracts::Column::CreationCodeHash,
                creation_code_hash.into(),
            ),
            (
                compiled_contracts::Column::RuntimeCodeHash,
                runtime_code_hash.into(),
            ),
        ],
    )
    .await?;

    Ok(model)
}

pub(crate) fn precalculate_source_hashes(
    sources: &BTreeMap<String, String>,
) -> BTreeMap<String, Vec<u8>> {
    sources
        .iter()
        .map(|(path, content)| (path.clone(), sha256(content.as_bytes())))
        .collect()
}

pub(crate) async fn insert_sources<C: ConnectionTrait>(
    database_connection: &C,
    sources: BTreeMap<String, String>,
) -> Result<Vec<sources::Model>, Error> {
    let mut models = Vec::with_capacity(sources.len());
    for (_path, content) in sources {
        let source_hash = sha256(content.as_bytes());
        let source_hash_keccak = keccak256(content.as_bytes());

        let active_model = sources::ActiveModel {
            source_hash: Set(source_hash.clone()),
            source_hash_keccak: Set(source_hash_keccak),
            content: Set(content),
            created_at: Default::default(),
            updated_at: Default::default(),
            created_by: Default::default(),
            updated_by: Default::default(),
        };

        let (model, _inserted) = insert_then_select(
            database_connection,
            sources::Entity,
            active_model,
            [(sources::Column::SourceHash, source_hash.into())],
        )
        .await?;
        models.push(model);
    }

    Ok(models)
}

pub(crate) async fn insert_compiled_contract_sources<C: ConnectionTrait>(
    database_connection: &C,
    source_hashes: BTreeMap<String, Vec<u8>>,
    compilation_id: Uuid,
) -> Result<Vec<compiled_contracts_sources::Model>, Error> {
    let mut models = Vec::with_capacity(source_hashes.len());
    for (path, source_hash) in source_hashes {
        let active_model = compiled_contracts_sources::ActiveModel {
            id: Default::default(),
            compilation_id: Set(compilation_id),
            source_hash: Set(source_hash),
            path: Set(path.clone()),
        };

        let (model, _inserted) = insert_then_select(
            database_connection,
            compiled_contracts_sources::Entity,
            active_model,
            [
                (
                    compiled_contracts_sources::Column::CompilationId,
                    compilation_id.into(),
                ),
                (compiled_contracts_sources::Column::Path, path.into()),
            ],
        )
        .await?;
        models.push(model);
    }

    Ok(models)
}

pub(crate) async fn insert_verified_contract<C: ConnectionTrait>(
    database_connection: &C,
    contract_deployment_id: Uuid,
    compilation_id: Uuid,
    matches: VerifiedContractMatches,
) -> Result<verified_contracts::Model, Error> {
    let (runtime_match_data, creation_match_data) = match matches {
        VerifiedContractMatches::OnlyRuntime { runtime_match } => {
            (parse_match_data(runtime_match), InternalMatchData::default())
        }
        VerifiedContractMatches::OnlyCreation { creation_match } => (
            InternalMatchData::default(),
            parse_match_data(creation_match),
        ),
        VerifiedContractMatches::Complete {
            runtime_match,
            creation_match,
        } => (
            parse_match_data(runtime_match),
            parse_match_data(creation_match),
        ),
    };

    let active_model = verified_contracts::ActiveModel {
        id: Default::default(),
        deployment_id: Set(contract_deployment_id),
        compilation_id: Set(compilation_id),
        creation_match: Set(creation_match_data.does_match),
        creation_values: Set(creation_match_data.values),
        creation_transformations: Set(creation_match_data.transformations),
        creation_metadata_match: Set(creation_match_data.metadata_match),
        runtime_match: Set(runtime_match_data.does_match),
        runtime_values: Set(runtime_match_data.values),
        runtime_transformations: Set(runtime_match_data.transformations),
        runtime_metadata_match: Set(runtime_match_data.metadata_match),
        created_at: Default::default(),
        updated_at: Default::default(),
        created_by: Default::default(),
        updated_by: Default::default(),
    };

    let (model, _inserted) = insert_then_select(
        database_connection,
        verified_contracts::Entity,
        active_model,
        [
            (
                verified_contracts::Column::CompilationId,
                compilation_id.into(),
            ),
            (
                verified_contracts::Column::DeploymentId,
                contract_deployment_id.into(),
            ),
        ],
    )
    .await?;

    Ok(model)
}

pub(crate) async fn retrieve_verified_contracts_by_deployment_id<C: ConnectionTrait>(
    database_connection: &C,
    deployment_id: Uuid,
) -> Result<Vec<verified_contracts::Model>, Error> {
    verified_contracts::Entity::find()
        .filter(verified_contracts::Column::DeploymentId.eq(deployment_id))
        .all(database_connection)
        .await
        .context("select from \"verified_contracts\" by deployment id")
}

pub(crate) async fn retrieve_compiled_contract_by_id<C: ConnectionTrait>(
    database_connection: &C,
    compilation_id: Uuid,
) -> Result<Option<compiled_contracts::Model>, Error> {
    compiled_contracts::Entity::find_by_id(compilation_id)
        .one(database_connection)
        .await
        .context("select from \"compiled_contracts\" by id")
}

pub(crate) async fn retrieve_sources_by_compilation_id<C: ConnectionTrait>(
    database_connection: &C,
    compilation_id: Uuid,
) -> Result<BTreeMap<String, String>, Error> {
    let joined = compiled_contracts_sources::Entity::find()
        .filter(compiled_contracts_sources::Column::CompilationId.eq(compilation_id))
        .find_also_related(sources::Entity)
        .all(database_connection)
        .await
        .context("select from \"compiled_contracts_sources\" joined with \"sources\"")?;

    let mut result = BTreeMap::new();
    for (compiled_contract_source, source) in joined {
        let source = source.ok_or(anyhow::anyhow!(
            "source was not found, though referenced: hash={}",
            hex::encode(&compiled_contract_source.source_hash)
        ))?;
        result.insert(compiled_contract_source.path, source.content);
    }

    Ok(result)
}
