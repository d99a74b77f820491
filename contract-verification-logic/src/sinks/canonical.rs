use super::{ContractView, FilesView, JobContext, ReadSink, SinkError, SinkIdentifier, SinkReceipt, WriteSink};
use crate::{signatures::extract_signatures, types::VerificationResult, ToHex};
use async_trait::async_trait;
use contract_verification_database::{NewVerification, StoreError};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// The authoritative sink. Persists the full normalized record in one
/// transaction, including the signature index, and is the only sink that
/// produces row ids.
#[derive(Clone)]
pub struct CanonicalStoreSink {
    database_connection: Arc<DatabaseConnection>,
    fail_on_signature_errors: bool,
}

impl CanonicalStoreSink {
    pub fn new(database_connection: Arc<DatabaseConnection>) -> Self {
        Self {
            database_connection,
            fail_on_signature_errors: false,
        }
    }

    pub fn with_fail_on_signature_errors(mut self, fail: bool) -> Self {
        self.fail_on_signature_errors = fail;
        self
    }

    pub fn database_connection(&self) -> &Arc<DatabaseConnection> {
        &self.database_connection
    }
}

#[async_trait]
impl WriteSink for CanonicalStoreSink {
    fn identifier(&self) -> SinkIdentifier {
        SinkIdentifier::SourcifyDatabase
    }

    async fn store_verification(
        &self,
        result: &VerificationResult,
        _job: Option<&JobContext>,
    ) -> Result<SinkReceipt, SinkError> {
        if !result.deployment.has_any_code() {
            return Err(SinkError::Rejected(
                "verification carries neither runtime nor creation bytecode".to_string(),
            ));
        }

        let deployment = result
            .deployment
            .to_insert_contract_deployment()
            .ok_or_else(|| {
                SinkError::Rejected("verification carries no runtime bytecode".to_string())
            })?;

        let signatures = match result.compilation.abi() {
            Some(abi) => match extract_signatures(abi) {
                Ok(signatures) => signatures,
                Err(error) if self.fail_on_signature_errors => {
                    return Err(SinkError::Internal(
                        error.context("extracting signatures from the abi"),
                    ))
                }
                Err(error) => {
                    tracing::warn!(
                        error = %error,
                        contract_address = result.deployment.address.to_hex(),
                        "failed to extract signatures, storing the verification without them"
                    );
                    vec![]
                }
            },
            None => vec![],
        };

        let new_verification = NewVerification {
            deployment,
            compiled_contract: result.compilation.clone().into_compiled_contract(),
            matches: result.matches.clone(),
            match_metadata: result.match_metadata(),
            signatures,
        };

        let stored = contract_verification_database::store_verification(
            &self.database_connection,
            new_verification,
        )
        .await
        .map_err(|error| match error {
            StoreError::AlreadyVerified => SinkError::AlreadyVerified,
            StoreError::Db(error) => SinkError::Internal(error),
        })?;

        Ok(SinkReceipt {
            verified_contract_id: Some(stored.verified_contract_id),
            runtime_status: stored.runtime_status,
            creation_status: stored.creation_status,
        })
    }
}

#[async_trait]
impl ReadSink for CanonicalStoreSink {
    async fn get_contract(
        &self,
        chain_id: i64,
        address: &[u8],
    ) -> Result<Option<ContractView>, anyhow::Error> {
        let sourcify_match = contract_verification_database::get_sourcify_match(
            self.database_connection.as_ref(),
            chain_id,
            address.to_vec(),
            false,
        )
        .await?;

        Ok(sourcify_match.map(|sourcify_match| ContractView {
            chain_id,
            address: address.to_hex(),
            runtime_match: sourcify_match.runtime_status,
            creation_match: sourcify_match.creation_status,
            metadata: sourcify_match.metadata,
        }))
    }

    async fn get_files(
        &self,
        chain_id: i64,
        address: &[u8],
    ) -> Result<Option<FilesView>, anyhow::Error> {
        let verified_contracts = contract_verification_database::find_verified_contracts(
            &self.database_connection,
            chain_id,
            address.to_vec(),
        )
        .await?;

        let latest = match verified_contracts
            .into_iter()
            .max_by_key(|contract| contract.verified_contract.id)
        {
            Some(latest) => latest,
            None => return Ok(None),
        };

        let files = latest
            .compiled_contract
            .sources
            .into_iter()
            .collect();
        Ok(Some(FilesView { files }))
    }
}
