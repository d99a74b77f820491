mod alliance;
mod canonical;
mod explorers;
mod object_store;
mod repository;

pub use alliance::AllianceDatabaseSink;
pub use canonical::CanonicalStoreSink;
pub use explorers::{ExplorerFamily, ExplorerVerifySink};
pub use object_store::{
    dump_failed_verification_input, ObjectStorage, ObjectStorageSettings, S3RepositorySink,
};
pub use repository::{
    sanitize_relative_path, verification_files, RepositoryLayout, RepositorySink,
};

use crate::types::VerificationResult;
use async_trait::async_trait;
use sea_orm::prelude::Uuid;
use serde::{Deserialize, Serialize};
use verification_common::MatchStatus;

/// Stable identifiers of the configured write backends. Configuration refers
/// to sinks by these strings.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::EnumString, Serialize,
    Deserialize,
)]
pub enum SinkIdentifier {
    SourcifyDatabase,
    AllianceDatabase,
    RepositoryV1,
    RepositoryV2,
    S3Repository,
    EtherscanVerify,
    BlockscoutVerify,
    RoutescanVerify,
}

/// Job-scoped context passed down to sinks, so receipts and warnings can be
/// correlated with the admitting request.
#[derive(Clone, Debug)]
pub struct JobContext {
    pub verification_id: Uuid,
    pub trace_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("contract is already verified with an equal or better match")]
    AlreadyVerified,
    #[error("verification is not storable by this sink: {0}")]
    Rejected(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// What a sink reports back after a successful store. Only the canonical
/// store produces row ids; other sinks return an empty receipt.
#[derive(Clone, Debug, Default)]
pub struct SinkReceipt {
    pub verified_contract_id: Option<i64>,
    pub runtime_status: Option<MatchStatus>,
    pub creation_status: Option<MatchStatus>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WriteSink: Send + Sync {
    fn identifier(&self) -> SinkIdentifier;

    /// One-time initialization (directory resolution, bucket checks).
    async fn init(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }

    async fn store_verification(
        &self,
        result: &VerificationResult,
        job: Option<&JobContext>,
    ) -> Result<SinkReceipt, SinkError>;
}

/// A stored contract as the read surface returns it.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractView {
    pub chain_id: i64,
    pub address: String,
    pub runtime_match: Option<MatchStatus>,
    pub creation_match: Option<MatchStatus>,
    pub metadata: serde_json::Value,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesView {
    pub files: std::collections::BTreeMap<String, String>,
}

/// Read surface; exactly one read sink is active per service.
#[async_trait]
pub trait ReadSink: Send + Sync {
    async fn get_contract(
        &self,
        chain_id: i64,
        address: &[u8],
    ) -> Result<Option<ContractView>, anyhow::Error>;

    async fn get_files(
        &self,
        chain_id: i64,
        address: &[u8],
    ) -> Result<Option<FilesView>, anyhow::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_identifiers_round_trip_through_configuration_strings() {
        for (identifier, text) in [
            (SinkIdentifier::SourcifyDatabase, "SourcifyDatabase"),
            (SinkIdentifier::AllianceDatabase, "AllianceDatabase"),
            (SinkIdentifier::RepositoryV1, "RepositoryV1"),
            (SinkIdentifier::RepositoryV2, "RepositoryV2"),
            (SinkIdentifier::S3Repository, "S3Repository"),
            (SinkIdentifier::EtherscanVerify, "EtherscanVerify"),
            (SinkIdentifier::BlockscoutVerify, "BlockscoutVerify"),
            (SinkIdentifier::RoutescanVerify, "RoutescanVerify"),
        ] {
            assert_eq!(identifier.to_string(), text);
            assert_eq!(text.parse::<SinkIdentifier>().unwrap(), identifier);
        }
    }
}
