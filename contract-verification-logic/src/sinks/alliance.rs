use super::{JobContext, SinkError, SinkIdentifier, SinkReceipt, WriteSink};
use crate::types::VerificationResult;
use async_trait::async_trait;
use contract_verification_database::VerifiedContract;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// Writes into the shared allied database. The schema matches the canonical
/// one, but the allied store only accepts verifications proven against the
/// deployment transaction, so results without a creation match are rejected.
#[derive(Clone)]
pub struct AllianceDatabaseSink {
    database_connection: Arc<DatabaseConnection>,
}

impl AllianceDatabaseSink {
    pub fn new(database_connection: Arc<DatabaseConnection>) -> Self {
        Self {
            database_connection,
        }
    }
}

#[async_trait]
impl WriteSink for AllianceDatabaseSink {
    fn identifier(&self) -> SinkIdentifier {
        SinkIdentifier::AllianceDatabase
    }

    async fn store_verification(
        &self,
        result: &VerificationResult,
        _job: Option<&JobContext>,
    ) -> Result<SinkReceipt, SinkError> {
        if result.matches.creation_match().is_none() {
            return Err(SinkError::Rejected(
                "allied database only accepts verifications with a creation match".to_string(),
            ));
        }

        let deployment = result
            .deployment
            .to_insert_contract_deployment()
            .ok_or_else(|| {
                SinkError::Rejected("verification carries no runtime bytecode".to_string())
            })?;

        let contract_deployment = contract_verification_database::insert_contract_deployment(
            &self.database_connection,
            deployment,
        )
        .await?;

        let verified_contract = VerifiedContract {
            contract_deployment_id: contract_deployment.id,
            compiled_contract: result.compilation.clone().into_compiled_contract(),
            matches: result.matches.clone(),
        };
        contract_verification_database::insert_verified_contract(
            &self.database_connection,
            verified_contract,
        )
        .await?;

        Ok(SinkReceipt::default())
    }
}
