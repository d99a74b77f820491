use crate::{
    internal,
    types::{VerificationJobError, VerificationJobView},
};
use anyhow::Context;
use contract_verification_entity::{sourcify_matches, verification_jobs, verified_contracts};
use sea_orm::{
    prelude::{DateTimeWithTimeZone, Decimal, Uuid},
    ActiveModelTrait,
    ActiveValue::Set,
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
};
use verification_common::MatchStatus;

fn now() -> DateTimeWithTimeZone {
    chrono::Utc::now().into()
}

pub async fn insert_verification_job<C: ConnectionTrait>(
    database_connection: &C,
    chain_id: i64,
    contract_address: Vec<u8>,
    verification_endpoint: &str,
) -> Result<verification_jobs::Model, anyhow::Error> {
    let active_model = verification_jobs::ActiveModel {
        id: Set(Uuid::new_v4()),
        chain_id: Set(Decimal::from(chain_id)),
        contract_address: Set(contract_address),
        started_at: Set(now()),
        completed_at: Set(None),
        verified_contract_id: Set(None),
        error_code: Set(None),
        error_id: Set(None),
        error_data: Set(None),
        verification_endpoint: Set(verification_endpoint.to_string()),
        external_verification: Set(serde_json::json!({})),
    };

    verification_jobs::Entity::insert(active_model)
        .exec_with_returning(database_connection)
        .await
        .context("insert into \"verification_jobs\"")
}

pub async fn mark_verification_job_succeeded<C: ConnectionTrait>(
    database_connection: &C,
    job_id: Uuid,
    verified_contract_id: i64,
) -> Result<(), anyhow::Error> {
    let active_model = verification_jobs::ActiveModel {
        id: Set(job_id),
        completed_at: Set(Some(now())),
        verified_contract_id: Set(Some(verified_contract_id)),
        ..Default::default()
    };
    active_model
        .update(database_connection)
        .await
        .context("update \"verification_jobs\" with success")?;
    Ok(())
}

pub async fn mark_verification_job_failed<C: ConnectionTrait>(
    database_connection: &C,
    job_id: Uuid,
    error: &VerificationJobError,
) -> Result<(), anyhow::Error> {
    let active_model = verification_jobs::ActiveModel {
        id: Set(job_id),
        completed_at: Set(Some(now())),
        error_code: Set(Some(error.code.clone())),
        error_id: Set(Some(error.error_id)),
        error_data: Set(error.data.clone()),
        ..Default::default()
    };
    active_model
        .update(database_connection)
        .await
        .context("update \"verification_jobs\" with error")?;
    Ok(())
}

/// Records a receipt returned by an external explorer submitter, keyed by the
/// sink identifier. The receipts are written sequentially within one
/// verification's fan-out, so a read-modify-write is sufficient.
pub async fn append_external_verification_receipt<C: ConnectionTrait>(
    database_connection: &C,
    job_id: Uuid,
    sink_identifier: &str,
    receipt: serde_json::Value,
) -> Result<(), anyhow::Error> {
    let job = verification_jobs::Entity::find_by_id(job_id)
        .one(database_connection)
        .await
        .context("select from \"verification_jobs\" by id")?
        .ok_or(anyhow::anyhow!("verification job was not found: id={job_id}"))?;

    let mut external_verification = job.external_verification.clone();
    match external_verification.as_object_mut() {
        Some(map) => {
            map.insert(sink_identifier.to_string(), receipt);
        }
        None => {
            external_verification =
                serde_json::json!({ sink_identifier.to_string(): receipt });
        }
    }

    let active_model = verification_jobs::ActiveModel {
        id: Set(job_id),
        external_verification: Set(external_verification),
        ..Default::default()
    };
    active_model
        .update(database_connection)
        .await
        .context("update \"verification_jobs\" external verification")?;
    Ok(())
}

pub async fn find_verification_job<C: ConnectionTrait>(
    database_connection: &C,
    job_id: Uuid,
) -> Result<Option<VerificationJobView>, anyhow::Error> {
    let job = match verification_jobs::Entity::find_by_id(job_id)
        .one(database_connection)
        .await
        .context("select from \"verification_jobs\" by id")?
    {
        Some(job) => job,
        None => return Ok(None),
    };

    let mut runtime_status = None;
    let mut creation_status = None;
    if let Some(verified_contract_id) = job.verified_contract_id {
        let verified_contract = verified_contracts::Entity::find_by_id(verified_contract_id)
            .one(database_connection)
            .await
            .context("select from \"verified_contracts\" by id")?;
        if let Some(verified_contract) = verified_contract {
            let sourcify_match = sourcify_matches::Entity::find()
                .filter(
                    sourcify_matches::Column::DeploymentId.eq(verified_contract.deployment_id),
                )
                .one(database_connection)
                .await
                .context("select from \"sourcify_matches\" by deployment id")?;
            if let Some(sourcify_match) = sourcify_match {
                let parse = |value: Option<String>| {
                    value.and_then(|status| status.parse::<MatchStatus>().ok())
                };
                runtime_status = parse(sourcify_match.runtime_match);
                creation_status = parse(sourcify_match.creation_match);
            }
        }
    }

    let error = match (job.error_code, job.error_id) {
        (Some(code), Some(error_id)) => Some(VerificationJobError {
            code,
            error_id,
            data: job.error_data,
        }),
        _ => None,
    };

    let chain_id = internal::decimal_to_i64(job.chain_id)?;

    Ok(Some(VerificationJobView {
        id: job.id,
        chain_id,
        contract_address: job.contract_address,
        is_completed: job.completed_at.is_some(),
        verified_contract_id: job.verified_contract_id,
        error,
        verification_endpoint: job.verification_endpoint,
        external_verification: job.external_verification,
        runtime_status,
        creation_status,
    }))
}
