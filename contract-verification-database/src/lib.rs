/// Provides access to internal functions to access the database.
/// They mostly do not provide transactions consistency, and require
/// users to be care of transactions themselves.
///
/// Are not recommended to be used directly.
/// Prefer methods exposed to the public instead.
mod internal;

mod helpers;
mod jobs;
mod matches;
mod replace;
mod signatures;
mod similarity;
mod types;

pub use jobs::{
    append_external_verification_receipt, find_verification_job, insert_verification_job,
    mark_verification_job_failed, mark_verification_job_succeeded,
};
pub use matches::get_sourcify_match;
pub use replace::{
    patch_verified_contract_creation, replace_verified_contract, retrieve_verified_contract_full,
    ReplaceError,
};
pub use signatures::{find_signatures, find_signatures_by_compilation, insert_signatures};
pub use similarity::{find_similarity_candidates, longest_common_prefix};
pub use types::{
    CompiledContract, CompiledContractCompiler, CompiledContractLanguage, ContractCode,
    ContractDeployment, InsertContractDeployment, NewVerification, RetrieveContractDeployment,
    RetrievedVerifiedContract, SignatureKind, SignatureRecord, SignatureView,
    SimilarityCandidate, SourcifyMatchView, StoredVerification, VerificationJobError,
    VerificationJobView, VerifiedContract, VerifiedContractMatches,
};

/************************ Public methods **************************/

use anyhow::{anyhow, Context, Error};
use sea_orm::{DatabaseConnection, TransactionTrait};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("contract is already verified with an equal or better match")]
    AlreadyVerified,
    #[error(transparent)]
    Db(#[from] anyhow::Error),
}

pub async fn insert_contract_deployment(
    database_connection: &DatabaseConnection,
    to_insert: InsertContractDeployment,
) -> Result<ContractDeployment, Error> {
    let chain_id = to_insert.chain_id();
    let address = to_insert.address().to_owned();
    let creation_code = to_insert.creation_code().map(ToOwned::to_owned);
    let runtime_code = to_insert.runtime_code().to_owned();

    let transaction = database_connection
        .begin()
        .await
        .context("begin transaction")?;

    let internal_data = internal::InternalContractDeploymentData::from(to_insert);
    let contract_model =
        internal::insert_contract(&transaction, internal_data.contract_code.clone()).await?;
    let contract_deployment_model =
        internal::insert_contract_deployment(&transaction, internal_data, contract_model.id)
            .await?;

    transaction.commit().await.context("commit transaction")?;

    Ok(ContractDeployment {
        id: contract_deployment_model.id,
        chain_id,
        address,
        runtime_code,
        creation_code,
        model: contract_deployment_model,
    })
}

/// Inserts the compilation (with sources) and the verified-contract row for
/// an existing deployment, without touching the sourcify match pointer or the
/// signature index. This is the write shape shared databases expect.
pub async fn insert_verified_contract(
    database_connection: &DatabaseConnection,
    mut verified_contract: VerifiedContract,
) -> Result<(), Error> {
    let transaction = database_connection
        .begin()
        .await
        .context("begin transaction")?;

    let sources = std::mem::take(&mut verified_contract.compiled_contract.sources);
    let source_hashes = internal::precalculate_source_hashes(&sources);

    let compiled_contract_model =
        internal::insert_compiled_contract(&transaction, verified_contract.compiled_contract)
            .await?;
    let compiled_contract_id = compiled_contract_model.id;

    let _source_models = internal::insert_sources(&transaction, sources).await?;
    let _compiled_contract_source_models = internal::insert_compiled_contract_sources(
        &transaction,
        source_hashes,
        compiled_contract_id,
    )
    .await?;
    let _verified_contract_model = internal::insert_verified_contract(
        &transaction,
        verified_contract.contract_deployment_id,
        compiled_contract_id,
        verified_contract.matches,
    )
    .await?;

    transaction.commit().await.context("commit transaction")?;

    Ok(())
}

pub async fn find_contract_deployment(
    database_connection: &DatabaseConnection,
    to_retrieve: RetrieveContractDeployment,
) -> Result<Option<ContractDeployment>, Error> {
    let contract_deployment_model =
        internal::retrieve_contract_deployment(database_connection, to_retrieve).await?;
    if let Some(contract_deployment_model) = contract_deployment_model {
        let contract_deployment =
            replace::deployment_from_model(database_connection, contract_deployment_model).await?;
        return Ok(Some(contract_deployment));
    }

    Ok(None)
}

/// All verified contracts recorded for the most recently touched deployment
/// of the given address.
pub async fn find_verified_contracts(
    database_connection: &DatabaseConnection,
    chain_id: i64,
    contract_address: Vec<u8>,
) -> Result<Vec<RetrievedVerifiedContract>, Error> {
    let mut contract_deployment_models =
        internal::retrieve_contract_deployments_by_chain_id_and_address(
            database_connection,
            chain_id,
            contract_address,
        )
        .await?;
    contract_deployment_models.sort_by_key(|model| model.updated_at);

    let mut verified_contracts = Vec::new();
    if let Some(contract_deployment_model) = contract_deployment_models.pop() {
        let deployment =
            replace::deployment_from_model(database_connection, contract_deployment_model).await?;
        let verified_contract_models =
            internal::retrieve_verified_contracts_by_deployment_id(
                database_connection,
                deployment.id,
            )
            .await?;
        for verified_contract_model in verified_contract_models {
            let compiled_contract_model = internal::retrieve_compiled_contract_by_id(
                database_connection,
                verified_contract_model.compilation_id,
            )
            .await?
            .ok_or_else(|| {
                anyhow!(
                    "compiled contract does not exist in the database; verified_contracts.id={}, compiled_contracts.id={}",
                    verified_contract_model.id,
                    verified_contract_model.compilation_id
                )
            })?;

            let compiled_contract = replace::compiled_contract_from_model(
                database_connection,
                compiled_contract_model,
            )
            .await?;

            verified_contracts.push(RetrievedVerifiedContract {
                verified_contract: verified_contract_model,
                compiled_contract,
                deployment: deployment.clone(),
            });
        }
    }

    Ok(verified_contracts)
}

/// Commits one verification atomically, in the canonical write order:
/// codes, contracts, deployments, compiled contracts (with sources),
/// verified contracts, sourcify match, signatures. Either every row is
/// visible afterwards or none is.
///
/// Returns [`StoreError::AlreadyVerified`] when the deployment already holds
/// a match that the new one does not strictly improve upon.
pub async fn store_verification(
    database_connection: &DatabaseConnection,
    new_verification: NewVerification,
) -> Result<StoredVerification, StoreError> {
    let transaction = database_connection
        .begin()
        .await
        .context("begin transaction")?;

    let internal_data =
        internal::InternalContractDeploymentData::from(new_verification.deployment);
    let contract_model =
        internal::insert_contract(&transaction, internal_data.contract_code.clone()).await?;
    let contract_deployment_model =
        internal::insert_contract_deployment(&transaction, internal_data, contract_model.id)
            .await?;
    let deployment_id = contract_deployment_model.id;

    let status_pair = new_verification.matches.status_pair();

    // Cheap pre-check so a not-better submission does not write compilation
    // rows that would only be rolled back.
    if let Some(existing) =
        matches::retrieve_sourcify_match_by_deployment_id(&transaction, deployment_id).await?
    {
        let existing_pair = (
            existing
                .runtime_match
                .as_deref()
                .and_then(|status| status.parse().ok()),
            existing
                .creation_match
                .as_deref()
                .and_then(|status| status.parse().ok()),
        );
        if !verification_common::is_status_upgrade(&existing_pair, &status_pair) {
            transaction
                .rollback()
                .await
                .context("rollback transaction")?;
            return Err(StoreError::AlreadyVerified);
        }
    }

    let sources = new_verification.compiled_contract.sources.clone();
    let source_hashes = internal::precalculate_source_hashes(&sources);

    let compiled_contract_model =
        internal::insert_compiled_contract(&transaction, new_verification.compiled_contract)
            .await?;
    let compilation_id = compiled_contract_model.id;

    internal::insert_sources(&transaction, sources).await?;
    internal::insert_compiled_contract_sources(&transaction, source_hashes, compilation_id)
        .await?;

    let verified_contract_model = internal::insert_verified_contract(
        &transaction,
        deployment_id,
        compilation_id,
        new_verification.matches,
    )
    .await?;

    let upsert_result = matches::upsert_sourcify_match(
        &transaction,
        deployment_id,
        verified_contract_model.id,
        status_pair,
        new_verification.match_metadata,
    )
    .await;
    if let Err(err) = upsert_result {
        transaction
            .rollback()
            .await
            .context("rollback transaction")?;
        return Err(err);
    }

    signatures::insert_signatures(&transaction, compilation_id, &new_verification.signatures)
        .await?;

    transaction.commit().await.context("commit transaction")?;

    Ok(StoredVerification {
        deployment_id,
        compilation_id,
        verified_contract_id: verified_contract_model.id,
        runtime_status: status_pair.0,
        creation_status: status_pair.1,
    })
}
