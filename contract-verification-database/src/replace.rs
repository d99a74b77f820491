use crate::{
    internal,
    types::{
        CompiledContract, CompiledContractCompiler, CompiledContractLanguage, ContractDeployment,
        NewVerification, RetrievedVerifiedContract, StoredVerification,
    },
};
use anyhow::Context;
use contract_verification_entity::{
    compiled_contracts, contract_deployments, sourcify_matches, verified_contracts,
};
use sea_orm::{
    ActiveModelTrait,
    ActiveValue::Set,
    ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, ModelTrait, QueryFilter,
    TransactionTrait,
};
use serde::Deserialize;
use verification_common::{Match, MatchStatus};

#[derive(Debug, thiserror::Error)]
pub enum ReplaceError {
    #[error("verified contract was not found: id={0}")]
    NotFound(i64),
    #[error("the replaced match still has dangling references: {0}")]
    DanglingReferences(String),
    #[error(transparent)]
    Db(#[from] anyhow::Error),
}

/// Loads a stored verified contract together with everything needed to re-run
/// its verification: the compilation (with sources and normalized codes) and
/// the deployment (with on-chain codes).
pub async fn retrieve_verified_contract_full(
    database_connection: &DatabaseConnection,
    verified_contract_id: i64,
) -> Result<Option<RetrievedVerifiedContract>, anyhow::Error> {
    let verified_contract =
        match verified_contracts::Entity::find_by_id(verified_contract_id)
            .one(database_connection)
            .await
            .context("select from \"verified_contracts\" by id")?
        {
            Some(model) => model,
            None => return Ok(None),
        };

    let compiled_model = internal::retrieve_compiled_contract_by_id(
        database_connection,
        verified_contract.compilation_id,
    )
    .await?
    .ok_or(anyhow::anyhow!(
        "compiled contract does not exist: compilation_id={}",
        verified_contract.compilation_id
    ))?;

    let compiled_contract =
        compiled_contract_from_model(database_connection, compiled_model).await?;

    let deployment_model = contract_deployments::Entity::find_by_id(verified_contract.deployment_id)
        .one(database_connection)
        .await
        .context("select from \"contract_deployments\" by id")?
        .ok_or(anyhow::anyhow!(
            "contract deployment does not exist: deployment_id={}",
            verified_contract.deployment_id
        ))?;
    let deployment = deployment_from_model(database_connection, deployment_model).await?;

    Ok(Some(RetrievedVerifiedContract {
        verified_contract,
        compiled_contract,
        deployment,
    }))
}

/// Replaces a stored match in one transaction: the replacement rows are
/// inserted, the sourcify-match pointer is rewritten unconditionally (the
/// maintainer is trusted to downgrade), and the replaced row is deleted.
/// Rows still referenced from elsewhere (e.g. verification jobs) make the
/// delete fail and the whole replacement roll back.
pub async fn replace_verified_contract(
    database_connection: &DatabaseConnection,
    replaced_verified_contract_id: i64,
    replacement: NewVerification,
) -> Result<StoredVerification, ReplaceError> {
    let txn = database_connection
        .begin()
        .await
        .context("begin transaction")?;

    let replaced = verified_contracts::Entity::find_by_id(replaced_verified_contract_id)
        .one(&txn)
        .await
        .context("select replaced verified contract")?
        .ok_or(ReplaceError::NotFound(replaced_verified_contract_id))?;
    let deployment_id = replaced.deployment_id;

    let sources = replacement.compiled_contract.sources.clone();
    let source_hashes = internal::precalculate_source_hashes(&sources);

    let compiled_model =
        internal::insert_compiled_contract(&txn, replacement.compiled_contract)
            .await
            .context("insert compiled contract")?;
    internal::insert_sources(&txn, sources)
        .await
        .context("insert sources")?;
    internal::insert_compiled_contract_sources(&txn, source_hashes, compiled_model.id)
        .await
        .context("insert compiled contract sources")?;

    let status_pair = replacement.matches.status_pair();
    let verified_model = internal::insert_verified_contract(
        &txn,
        deployment_id,
        compiled_model.id,
        replacement.matches,
    )
    .await
    .context("insert verified contract")?;

    // repoint unconditionally before the delete so the FK is released
    let pointers = sourcify_matches::Entity::find()
        .filter(sourcify_matches::Column::VerifiedContractId.eq(replaced.id))
        .all(&txn)
        .await
        .context("select sourcify matches referencing the replaced row")?;
    for pointer in pointers {
        let mut active_model = pointer.into_active_model();
        active_model.verified_contract_id = Set(verified_model.id);
        active_model.runtime_match = Set(status_pair.0.map(|status| status.to_string()));
        active_model.creation_match = Set(status_pair.1.map(|status| status.to_string()));
        active_model.metadata = Set(replacement.match_metadata.clone());
        active_model
            .update(&txn)
            .await
            .context("repoint sourcify match")?;
    }

    crate::signatures::insert_signatures(&txn, compiled_model.id, &replacement.signatures)
        .await
        .context("insert signatures")?;

    if replaced.id != verified_model.id {
        replaced
            .delete(&txn)
            .await
            .map_err(|err| ReplaceError::DanglingReferences(err.to_string()))?;
    }

    txn.commit().await.context("commit transaction")?;

    Ok(StoredVerification {
        deployment_id,
        compilation_id: compiled_model.id,
        verified_contract_id: verified_model.id,
        runtime_status: status_pair.0,
        creation_status: status_pair.1,
    })
}

/// Rewrites only the creation-side columns of a stored match, preserving the
/// runtime side, and refreshes the pointer status accordingly.
pub async fn patch_verified_contract_creation(
    database_connection: &DatabaseConnection,
    verified_contract_id: i64,
    creation_match: Option<Match>,
) -> Result<verified_contracts::Model, ReplaceError> {
    let txn = database_connection
        .begin()
        .await
        .context("begin transaction")?;

    let model = verified_contracts::Entity::find_by_id(verified_contract_id)
        .one(&txn)
        .await
        .context("select verified contract")?
        .ok_or(ReplaceError::NotFound(verified_contract_id))?;

    let creation_status = creation_match.as_ref().map(MatchStatus::from_match);

    let mut active_model = model.into_active_model();
    match creation_match {
        Some(creation_match) => {
            active_model.creation_match = Set(true);
            active_model.creation_metadata_match = Set(Some(creation_match.metadata_match));
            active_model.creation_values = Set(Some(creation_match.values.into()));
            active_model.creation_transformations = Set(Some(
                serde_json::to_value(creation_match.transformations)
                    .expect("transformations serialization must succeed"),
            ));
        }
        None => {
            active_model.creation_match = Set(false);
            active_model.creation_metadata_match = Set(None);
            active_model.creation_values = Set(None);
            active_model.creation_transformations = Set(None);
        }
    }
    let model = active_model
        .update(&txn)
        .await
        .context("update verified contract creation columns")?;

    let pointers = sourcify_matches::Entity::find()
        .filter(sourcify_matches::Column::VerifiedContractId.eq(model.id))
        .all(&txn)
        .await
        .context("select sourcify matches referencing the patched row")?;
    for pointer in pointers {
        let mut active_model = pointer.into_active_model();
        active_model.creation_match = Set(creation_status.map(|status| status.to_string()));
        active_model
            .update(&txn)
            .await
            .context("refresh sourcify match creation status")?;
    }

    txn.commit().await.context("commit transaction")?;

    Ok(model)
}

pub(crate) async fn compiled_contract_from_model<C: sea_orm::ConnectionTrait>(
    database_connection: &C,
    model: compiled_contracts::Model,
) -> Result<CompiledContract, anyhow::Error> {
    let creation_code =
        internal::retrieve_code_by_id(database_connection, model.creation_code_hash.clone())
            .await?
            .code
            .ok_or(anyhow::anyhow!("compiled contract does not have creation code"))?;
    let runtime_code =
        internal::retrieve_code_by_id(database_connection, model.runtime_code_hash.clone())
            .await?
            .code
            .ok_or(anyhow::anyhow!("compiled contract does not have runtime code"))?;
    let sources =
        internal::retrieve_sources_by_compilation_id(database_connection, model.id).await?;

    let compiler = model
        .compiler
        .parse::<CompiledContractCompiler>()
        .map_err(|_| anyhow::anyhow!("stored compiler is unknown: {}", model.compiler))?;
    let language = model
        .language
        .parse::<CompiledContractLanguage>()
        .map_err(|_| anyhow::anyhow!("stored language is unknown: {}", model.language))?;

    Ok(CompiledContract {
        compiler,
        version: model.version,
        language,
        name: model.name,
        fully_qualified_name: model.fully_qualified_name,
        sources,
        compiler_settings: model.compiler_settings,
        compilation_artifacts: Deserialize::deserialize(&model.compilation_artifacts)
            .context("parsing stored compilation artifacts")?,
        creation_code,
        creation_code_artifacts: Deserialize::deserialize(&model.creation_code_artifacts)
            .context("parsing stored creation code artifacts")?,
        runtime_code,
        runtime_code_artifacts: Deserialize::deserialize(&model.runtime_code_artifacts)
            .context("parsing stored runtime code artifacts")?,
    })
}

pub(crate) async fn deployment_from_model<C: sea_orm::ConnectionTrait>(
    database_connection: &C,
    model: contract_deployments::Model,
) -> Result<ContractDeployment, anyhow::Error> {
    let contract =
        internal::retrieve_contract_by_id(database_connection, model.contract_id).await?;

    let creation_code = if contract.creation_code_hash.is_empty() {
        None
    } else {
        internal::retrieve_code_by_id(database_connection, contract.creation_code_hash.clone())
            .await?
            .code
    };
    let runtime_code =
        internal::retrieve_code_by_id(database_connection, contract.runtime_code_hash.clone())
            .await?
            .code
            .ok_or(anyhow::anyhow!("contract does not have runtime code"))?;

    let chain_id = internal::decimal_to_i64(model.chain_id)?;

    Ok(ContractDeployment {
        id: model.id,
        chain_id,
        address: model.address.clone(),
        runtime_code,
        creation_code,
        model,
    })
}
