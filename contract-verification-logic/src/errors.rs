use sea_orm::prelude::Uuid;
use serde::{Deserialize, Serialize};

/// Typed error codes persisted on job rows and surfaced through the API.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCode {
    InvalidParameter,
    InvalidJson,
    UnsupportedLanguage,
    UnsupportedCompilerVersion,
    UnsupportedChain,
    CompilerError,
    CannotFetchBytecode,
    ContractNotDeployed,
    EtherscanRateLimit,
    EtherscanNotVerified,
    EtherscanHttpError,
    EtherscanApiError,
    EtherscanMissingContractInJson,
    EtherscanVyperVersionMappingFailed,
    EtherscanMissingVyperSettings,
    ExtraFileInputBug,
    BytecodeMismatch,
    ContractBeingVerified,
    AlreadyVerified,
    NoSimilarMatchFound,
    InternalError,
}

/// Structured error value returned across the worker boundary. Worker tasks
/// must never let native error types cross to the dispatcher, as the thread
/// boundary does not preserve them; everything is carried as plain values and
/// re-raised on the dispatcher side.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorExport {
    pub code: ErrorCode,
    /// Fresh per-error uuid, persisted on the job row so operators can
    /// correlate the response with the logs.
    pub error_id: Uuid,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ErrorExport {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            error_id: Uuid::new_v4(),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Errors returned synchronously from the submission calls, before any job
/// row exists.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("contract is already being verified")]
    ContractIsAlreadyBeingVerified,
    #[error("chain is not supported: {0}")]
    UnsupportedChain(i64),
    #[error("contract is not deployed")]
    ContractNotDeployed,
    #[error("failed to fetch contract bytecode: {0}")]
    GetBytecode(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("engine is shutting down")]
    ShuttingDown,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl SubmissionError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            SubmissionError::ContractIsAlreadyBeingVerified => ErrorCode::ContractBeingVerified,
            SubmissionError::UnsupportedChain(_) => ErrorCode::UnsupportedChain,
            SubmissionError::ContractNotDeployed => ErrorCode::ContractNotDeployed,
            SubmissionError::GetBytecode(_) => ErrorCode::CannotFetchBytecode,
            SubmissionError::InvalidParameter(_) => ErrorCode::InvalidParameter,
            SubmissionError::ShuttingDown | SubmissionError::Internal(_) => {
                ErrorCode::InternalError
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_serialize_snake_case() {
        assert_eq!(ErrorCode::CompilerError.to_string(), "compiler_error");
        assert_eq!(
            ErrorCode::ContractBeingVerified.to_string(),
            "contract_being_verified"
        );
        assert_eq!(
            "no_similar_match_found".parse::<ErrorCode>().unwrap(),
            ErrorCode::NoSimilarMatchFound
        );
        assert_eq!(
            serde_json::to_value(ErrorCode::UnsupportedCompilerVersion).unwrap(),
            serde_json::json!("unsupported_compiler_version")
        );
    }

    #[test]
    fn each_export_gets_its_own_error_id() {
        let first = ErrorExport::new(ErrorCode::InternalError, "boom");
        let second = ErrorExport::new(ErrorCode::InternalError, "boom");
        assert_ne!(first.error_id, second.error_id);
    }
}
