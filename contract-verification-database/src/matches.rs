use crate::{types::SourcifyMatchView, StoreError};
use anyhow::Context;
use contract_verification_entity::{contract_deployments, sourcify_matches};
use sea_orm::{
    prelude::{Decimal, Uuid},
    ActiveModelTrait,
    ActiveValue::Set,
    ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, QueryFilter,
};
use verification_common::{is_status_upgrade, status_pair_rank, MatchStatus, MatchStatusPair};

fn model_status_pair(model: &sourcify_matches::Model) -> MatchStatusPair {
    let parse = |value: &Option<String>| {
        value
            .as_deref()
            .and_then(|status| status.parse::<MatchStatus>().ok())
    };
    (parse(&model.runtime_match), parse(&model.creation_match))
}

fn view_from_model(model: sourcify_matches::Model) -> SourcifyMatchView {
    let (runtime_status, creation_status) = model_status_pair(&model);
    SourcifyMatchView {
        deployment_id: model.deployment_id,
        verified_contract_id: model.verified_contract_id,
        runtime_status,
        creation_status,
        metadata: model.metadata,
    }
}

pub(crate) async fn retrieve_sourcify_match_by_deployment_id<C: ConnectionTrait>(
    database_connection: &C,
    deployment_id: Uuid,
) -> Result<Option<sourcify_matches::Model>, anyhow::Error> {
    sourcify_matches::Entity::find()
        .filter(sourcify_matches::Column::DeploymentId.eq(deployment_id))
        .one(database_connection)
        .await
        .context("select from \"sourcify_matches\" by deployment id")
}

/// Points the deployment's sourcify match at the given verified contract.
/// The pointer is repointed only when the new status pair is at least as good
/// on both axes and strictly better on at least one; otherwise the existing
/// match wins and [`StoreError::AlreadyVerified`] is returned.
pub(crate) async fn upsert_sourcify_match<C: ConnectionTrait>(
    database_connection: &C,
    deployment_id: Uuid,
    verified_contract_id: i64,
    status_pair: MatchStatusPair,
    metadata: serde_json::Value,
) -> Result<sourcify_matches::Model, StoreError> {
    let existing =
        retrieve_sourcify_match_by_deployment_id(database_connection, deployment_id).await?;

    let (runtime_status, creation_status) = status_pair;
    match existing {
        None => {
            let active_model = sourcify_matches::ActiveModel {
                id: Default::default(),
                deployment_id: Set(deployment_id),
                verified_contract_id: Set(verified_contract_id),
                runtime_match: Set(runtime_status.map(|status| status.to_string())),
                creation_match: Set(creation_status.map(|status| status.to_string())),
                metadata: Set(metadata),
                created_at: Default::default(),
                updated_at: Default::default(),
            };
            let (model, _inserted) = crate::helpers::insert_then_select(
                database_connection,
                sourcify_matches::Entity,
                active_model,
                [(sourcify_matches::Column::DeploymentId, deployment_id.into())],
            )
            .await?;
            Ok(model)
        }
        Some(model) => {
            let existing_pair = model_status_pair(&model);
            if !is_status_upgrade(&existing_pair, &status_pair) {
                return Err(StoreError::AlreadyVerified);
            }

            let mut active_model = model.into_active_model();
            active_model.verified_contract_id = Set(verified_contract_id);
            active_model.runtime_match = Set(runtime_status.map(|status| status.to_string()));
            active_model.creation_match = Set(creation_status.map(|status| status.to_string()));
            active_model.metadata = Set(metadata);
            let model = active_model
                .update(database_connection)
                .await
                .context("update \"sourcify_matches\" pointer")?;
            Ok(model)
        }
    }
}

/// Returns the best sourcify match for the address, preferring
/// `(perfect, perfect) > (perfect, partial) > (partial, perfect) >
/// (partial, partial)`. With `only_perfect` rows without a perfect axis are
/// filtered out.
pub async fn get_sourcify_match<C: ConnectionTrait>(
    database_connection: &C,
    chain_id: i64,
    contract_address: Vec<u8>,
    only_perfect: bool,
) -> Result<Option<SourcifyMatchView>, anyhow::Error> {
    let deployments = contract_deployments::Entity::find()
        .filter(contract_deployments::Column::ChainId.eq(Decimal::from(chain_id)))
        .filter(contract_deployments::Column::Address.eq(contract_address))
        .all(database_connection)
        .await
        .context("select from \"contract_deployments\" by chain id and address")?;

    let mut views = Vec::new();
    for deployment in deployments {
        if let Some(model) =
            retrieve_sourcify_match_by_deployment_id(database_connection, deployment.id).await?
        {
            views.push(view_from_model(model));
        }
    }

    if only_perfect {
        views.retain(|view| {
            view.runtime_status == Some(MatchStatus::Perfect)
                || view.creation_status == Some(MatchStatus::Perfect)
        });
    }

    views.sort_by_key(|view| status_pair_rank(&(view.runtime_status, view.creation_status)));
    Ok(views.pop())
}
