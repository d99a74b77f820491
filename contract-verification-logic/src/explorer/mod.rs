mod etherscan;

pub use etherscan::EtherscanImporter;

use crate::errors::ErrorCode;
use async_trait::async_trait;
use serde_json::Value;

/// What an external explorer knows about a verified contract, as returned by
/// its source-code API. Solidity and vyper results differ enough (version
/// mapping, settings availability) to be separate variants.
#[derive(Clone, Debug)]
pub enum ExplorerResult {
    Solidity {
        contract_name: String,
        file_name: String,
        compiler_version: String,
        standard_json_input: Value,
        constructor_arguments: Option<Vec<u8>>,
    },
    Vyper {
        contract_name: String,
        file_name: String,
        compiler_version: String,
        standard_json_input: Value,
        constructor_arguments: Option<Vec<u8>>,
    },
}

impl ExplorerResult {
    pub fn contract_name(&self) -> &str {
        match self {
            ExplorerResult::Solidity { contract_name, .. } => contract_name,
            ExplorerResult::Vyper { contract_name, .. } => contract_name,
        }
    }

    pub fn file_name(&self) -> &str {
        match self {
            ExplorerResult::Solidity { file_name, .. } => file_name,
            ExplorerResult::Vyper { file_name, .. } => file_name,
        }
    }

    pub fn compiler_version(&self) -> &str {
        match self {
            ExplorerResult::Solidity { compiler_version, .. } => compiler_version,
            ExplorerResult::Vyper { compiler_version, .. } => compiler_version,
        }
    }

    pub fn standard_json_input(&self) -> &Value {
        match self {
            ExplorerResult::Solidity { standard_json_input, .. } => standard_json_input,
            ExplorerResult::Vyper { standard_json_input, .. } => standard_json_input,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExplorerImportError {
    #[error("explorer rate limit reached")]
    RateLimit,
    #[error("contract is not verified on the explorer")]
    NotVerified,
    #[error("explorer request failed: {0}")]
    Http(String),
    #[error("explorer api returned an error: {0}")]
    Api(String),
    #[error("explorer response does not contain the requested contract")]
    MissingContractInJson,
    #[error("explorer vyper version could not be mapped: {0}")]
    VyperVersionMappingFailed(String),
    #[error("explorer response misses vyper settings")]
    MissingVyperSettings,
}

impl ExplorerImportError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ExplorerImportError::RateLimit => ErrorCode::EtherscanRateLimit,
            ExplorerImportError::NotVerified => ErrorCode::EtherscanNotVerified,
            ExplorerImportError::Http(_) => ErrorCode::EtherscanHttpError,
            ExplorerImportError::Api(_) => ErrorCode::EtherscanApiError,
            ExplorerImportError::MissingContractInJson => {
                ErrorCode::EtherscanMissingContractInJson
            }
            ExplorerImportError::VyperVersionMappingFailed(_) => {
                ErrorCode::EtherscanVyperVersionMappingFailed
            }
            ExplorerImportError::MissingVyperSettings => ErrorCode::EtherscanMissingVyperSettings,
        }
    }
}

/// Opaque import collaborator for the "import from explorer" flow.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExplorerImporter: Send + Sync {
    async fn fetch(
        &self,
        chain_id: i64,
        address: &[u8],
        api_key: Option<&str>,
    ) -> Result<ExplorerResult, ExplorerImportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_errors_map_to_their_sub_codes() {
        assert_eq!(
            ExplorerImportError::RateLimit.error_code(),
            ErrorCode::EtherscanRateLimit
        );
        assert_eq!(
            ExplorerImportError::MissingVyperSettings.error_code(),
            ErrorCode::EtherscanMissingVyperSettings
        );
    }
}
