use super::{JobContext, SinkError, SinkIdentifier, SinkReceipt, WriteSink};
use crate::{to_checksum_address, types::VerificationResult};
use anyhow::Context;
use async_trait::async_trait;
use contract_verification_database::CompiledContractLanguage;
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use std::{collections::BTreeMap, sync::Arc};
use url::Url;

/// Reserved receipt recorded when the remote backend reports the contract as
/// verified by somebody else earlier, so the presentation layer can
/// distinguish it from a fresh acceptance.
pub const ALREADY_VERIFIED_RECEIPT: &str = "already-verified";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExplorerFamily {
    Etherscan,
    Blockscout,
    Routescan,
}

impl ExplorerFamily {
    pub fn sink_identifier(&self) -> SinkIdentifier {
        match self {
            ExplorerFamily::Etherscan => SinkIdentifier::EtherscanVerify,
            ExplorerFamily::Blockscout => SinkIdentifier::BlockscoutVerify,
            ExplorerFamily::Routescan => SinkIdentifier::RoutescanVerify,
        }
    }

    fn supports_vyper(&self) -> bool {
        matches!(self, ExplorerFamily::Blockscout)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExplorerEndpoints {
    pub api_url: Url,
    pub explorer_url: Option<Url>,
}

/// How the remote backend answered a submission.
#[derive(Clone, Debug, PartialEq, Eq)]
enum SubmissionReceipt {
    Accepted(String),
    AlreadyVerified,
    Rejected(String),
}

impl SubmissionReceipt {
    fn to_receipt_json(&self) -> serde_json::Value {
        match self {
            SubmissionReceipt::Accepted(receipt_id) => {
                serde_json::json!({ "receiptId": receipt_id })
            }
            SubmissionReceipt::AlreadyVerified => {
                serde_json::json!({ "receiptId": ALREADY_VERIFIED_RECEIPT })
            }
            SubmissionReceipt::Rejected(error) => serde_json::json!({ "error": error }),
        }
    }
}

fn classify_response(status: &str, message: &str, result: &str) -> SubmissionReceipt {
    let haystack = format!("{message} {result}").to_lowercase();
    if haystack.contains("already verified") {
        return SubmissionReceipt::AlreadyVerified;
    }
    if status == "1" {
        return SubmissionReceipt::Accepted(result.to_string());
    }
    let error = if result.is_empty() { message } else { result };
    SubmissionReceipt::Rejected(error.to_string())
}

/// Submits verified artifacts to an external explorer verification API.
/// Per-chain endpoints are resolved once at `init()` from the family's
/// published chain directory.
pub struct ExplorerVerifySink {
    family: ExplorerFamily,
    directory_url: Url,
    api_keys: BTreeMap<i64, String>,
    default_api_key: Option<String>,
    client: ClientWithMiddleware,
    endpoints: tokio::sync::RwLock<BTreeMap<i64, ExplorerEndpoints>>,
    database_connection: Arc<DatabaseConnection>,
}

impl ExplorerVerifySink {
    pub fn new(
        family: ExplorerFamily,
        directory_url: Url,
        api_keys: BTreeMap<i64, String>,
        default_api_key: Option<String>,
        database_connection: Arc<DatabaseConnection>,
    ) -> Self {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let client = reqwest_middleware::ClientBuilder::new(reqwest::Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();
        Self {
            family,
            directory_url,
            api_keys,
            default_api_key,
            client,
            endpoints: tokio::sync::RwLock::new(BTreeMap::new()),
            database_connection,
        }
    }

    fn api_key(&self, chain_id: i64) -> Option<&String> {
        self.api_keys
            .get(&chain_id)
            .or(self.default_api_key.as_ref())
    }

    async fn resolve_directory(&self) -> Result<BTreeMap<i64, ExplorerEndpoints>, anyhow::Error> {
        let response = self
            .client
            .get(self.directory_url.clone())
            .send()
            .await
            .context("fetching the explorer chain directory")?;
        let body = response
            .text()
            .await
            .context("reading the explorer chain directory")?;

        match self.family {
            ExplorerFamily::Etherscan => parse_etherscan_directory(&body),
            ExplorerFamily::Blockscout => parse_blockscout_directory(&body),
            ExplorerFamily::Routescan => parse_routescan_directory(&self.directory_url, &body),
        }
    }

    fn compiler_version_parameter(result: &VerificationResult) -> String {
        match result.compilation.language {
            CompiledContractLanguage::Vyper => format!("vyper:{}", result.compilation.version),
            _ => format!("v{}", result.compilation.version),
        }
    }

    fn constructor_arguments_parameter(result: &VerificationResult) -> Option<String> {
        result
            .matches
            .creation_match()
            .and_then(|creation_match| creation_match.values.constructor_arguments.as_ref())
            .map(hex::encode)
    }

    fn standard_json_input(result: &VerificationResult) -> serde_json::Value {
        let language = match result.compilation.language {
            CompiledContractLanguage::Solidity => "Solidity",
            CompiledContractLanguage::Yul => "Yul",
            CompiledContractLanguage::Vyper => "Vyper",
        };
        serde_json::json!({
            "language": language,
            "sources": result
                .compilation
                .sources
                .iter()
                .map(|(path, content)| (path.clone(), serde_json::json!({ "content": content })))
                .collect::<serde_json::Map<String, serde_json::Value>>(),
            "settings": result.compilation.compiler_settings,
        })
    }

    async fn submit_solidity(
        &self,
        endpoints: &ExplorerEndpoints,
        result: &VerificationResult,
    ) -> Result<SubmissionReceipt, anyhow::Error> {
        let mut form = vec![
            ("module".to_string(), "contract".to_string()),
            ("action".to_string(), "verifysourcecode".to_string()),
            (
                "codeformat".to_string(),
                "solidity-standard-json-input".to_string(),
            ),
            (
                "contractaddress".to_string(),
                to_checksum_address(&result.deployment.address),
            ),
            (
                "contractname".to_string(),
                result.compilation.fully_qualified_name.clone(),
            ),
            (
                "compilerversion".to_string(),
                Self::compiler_version_parameter(result),
            ),
            (
                "sourceCode".to_string(),
                Self::standard_json_input(result).to_string(),
            ),
        ];
        if let Some(arguments) = Self::constructor_arguments_parameter(result) {
            form.push(("constructorArguements".to_string(), arguments));
        }
        if let Some(api_key) = self.api_key(result.deployment.chain_id) {
            form.push(("apikey".to_string(), api_key.clone()));
        }

        #[derive(Deserialize)]
        struct ExplorerResponse {
            status: String,
            #[serde(default)]
            message: String,
            #[serde(default)]
            result: String,
        }

        let response: ExplorerResponse = self
            .client
            .post(endpoints.api_url.clone())
            .form(&form)
            .send()
            .await
            .context("submitting the verification form")?
            .json()
            .await
            .context("parsing the submission response")?;

        Ok(classify_response(
            &response.status,
            &response.message,
            &response.result,
        ))
    }

    /// Blockscout verifies vyper through a dedicated endpoint rather than
    /// the etherscan-compatible form surface.
    async fn submit_vyper_blockscout(
        &self,
        endpoints: &ExplorerEndpoints,
        result: &VerificationResult,
    ) -> Result<SubmissionReceipt, anyhow::Error> {
        let url = endpoints
            .api_url
            .join(&format!(
                "v2/smart-contracts/{}/verification/via/vyper-standard-input",
                to_checksum_address(&result.deployment.address)
            ))
            .context("building the vyper verification url")?;

        let body = serde_json::json!({
            "compiler_version": result.compilation.version,
            "input": Self::standard_json_input(result),
        });

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .context("submitting the vyper verification")?;

        if response.status().is_success() {
            return Ok(SubmissionReceipt::Accepted(
                to_checksum_address(&result.deployment.address),
            ));
        }
        let error = response
            .text()
            .await
            .unwrap_or_else(|_| "unreadable response".to_string());
        Ok(SubmissionReceipt::Rejected(error))
    }

    async fn record_receipt(&self, job: Option<&JobContext>, receipt: &SubmissionReceipt) {
        if let Some(job) = job {
            let identifier = self.identifier().to_string();
            if let Err(error) = contract_verification_database::append_external_verification_receipt(
                self.database_connection.as_ref(),
                job.verification_id,
                &identifier,
                receipt.to_receipt_json(),
            )
            .await
            {
                tracing::warn!(
                    error = %error,
                    verification_id = %job.verification_id,
                    sink = identifier,
                    "failed to record external verification receipt"
                );
            }
        }
    }
}

#[async_trait]
impl WriteSink for ExplorerVerifySink {
    fn identifier(&self) -> SinkIdentifier {
        self.family.sink_identifier()
    }

    async fn init(&self) -> Result<(), anyhow::Error> {
        let resolved = self.resolve_directory().await?;
        tracing::info!(
            sink = %self.identifier(),
            chains = resolved.len(),
            "resolved explorer chain directory"
        );
        *self.endpoints.write().await = resolved;
        Ok(())
    }

    async fn store_verification(
        &self,
        result: &VerificationResult,
        job: Option<&JobContext>,
    ) -> Result<SinkReceipt, SinkError> {
        let chain_id = result.deployment.chain_id;
        let endpoints = self
            .endpoints
            .read()
            .await
            .get(&chain_id)
            .cloned()
            .ok_or_else(|| {
                SinkError::Rejected(format!(
                    "chain {chain_id} is not present in the explorer directory"
                ))
            })?;

        let is_vyper = result.compilation.language == CompiledContractLanguage::Vyper;
        if is_vyper && !self.family.supports_vyper() {
            return Err(SinkError::Rejected(
                "vyper contracts are not supported by this explorer family".to_string(),
            ));
        }

        let receipt = if is_vyper {
            self.submit_vyper_blockscout(&endpoints, result)
                .await
                .map_err(SinkError::Internal)?
        } else {
            self.submit_solidity(&endpoints, result)
                .await
                .map_err(SinkError::Internal)?
        };

        self.record_receipt(job, &receipt).await;

        Ok(SinkReceipt::default())
    }
}

fn parse_etherscan_directory(
    body: &str,
) -> Result<BTreeMap<i64, ExplorerEndpoints>, anyhow::Error> {
    #[derive(Deserialize)]
    struct Directory {
        result: Vec<DirectoryEntry>,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct DirectoryEntry {
        #[serde(alias = "chainid")]
        chain_id: serde_json::Value,
        #[serde(alias = "apiurl")]
        api_url: String,
        #[serde(default, alias = "blockexplorer")]
        block_explorer: Option<String>,
    }

    let directory: Directory =
        serde_json::from_str(body).context("parsing etherscan chain directory")?;

    let mut endpoints = BTreeMap::new();
    for entry in directory.result {
        let chain_id = match parse_flexible_chain_id(&entry.chain_id) {
            Some(chain_id) => chain_id,
            None => continue,
        };
        let api_url = match Url::parse(&entry.api_url) {
            Ok(api_url) => api_url,
            Err(_) => continue,
        };
        endpoints.insert(
            chain_id,
            ExplorerEndpoints {
                api_url,
                explorer_url: entry
                    .block_explorer
                    .and_then(|explorer| Url::parse(&explorer).ok()),
            },
        );
    }
    Ok(endpoints)
}

fn parse_blockscout_directory(
    body: &str,
) -> Result<BTreeMap<i64, ExplorerEndpoints>, anyhow::Error> {
    #[derive(Deserialize)]
    struct ChainEntry {
        #[serde(default)]
        explorers: Vec<ExplorerEntry>,
    }

    #[derive(Deserialize)]
    struct ExplorerEntry {
        url: String,
    }

    let directory: std::collections::HashMap<i64, ChainEntry> =
        serde_json::from_str(body).context("parsing blockscout chain directory")?;

    let mut endpoints = BTreeMap::new();
    for (chain_id, entry) in directory {
        let explorer = match entry.explorers.first() {
            Some(explorer) => explorer,
            None => continue,
        };
        let explorer_url = match Url::parse(&explorer.url) {
            Ok(explorer_url) => explorer_url,
            Err(_) => continue,
        };
        let api_url = match explorer_url.join("api") {
            Ok(api_url) => api_url,
            Err(_) => continue,
        };
        endpoints.insert(
            chain_id,
            ExplorerEndpoints {
                api_url,
                explorer_url: Some(explorer_url),
            },
        );
    }
    Ok(endpoints)
}

fn parse_routescan_directory(
    directory_url: &Url,
    body: &str,
) -> Result<BTreeMap<i64, ExplorerEndpoints>, anyhow::Error> {
    #[derive(Deserialize)]
    struct Directory {
        items: Vec<DirectoryEntry>,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct DirectoryEntry {
        chain_id: serde_json::Value,
    }

    let directory: Directory =
        serde_json::from_str(body).context("parsing routescan chain directory")?;

    let base = format!(
        "{}://{}",
        directory_url.scheme(),
        directory_url
            .host_str()
            .ok_or(anyhow::anyhow!("directory url has no host"))?
    );

    let mut endpoints = BTreeMap::new();
    for entry in directory.items {
        let chain_id = match parse_flexible_chain_id(&entry.chain_id) {
            Some(chain_id) => chain_id,
            None => continue,
        };
        let api_url = Url::parse(&format!(
            "{base}/v2/network/mainnet/evm/{chain_id}/etherscan/api"
        ))
        .context("building routescan api url")?;
        endpoints.insert(
            chain_id,
            ExplorerEndpoints {
                api_url,
                explorer_url: None,
            },
        );
    }
    Ok(endpoints)
}

fn parse_flexible_chain_id(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(number) => number.as_i64(),
        serde_json::Value::String(text) => text.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn accepted_submissions_carry_the_receipt_guid() {
        let receipt = classify_response("1", "OK", "abcdef1234567890");
        assert_eq!(
            receipt,
            SubmissionReceipt::Accepted("abcdef1234567890".to_string())
        );
        assert_eq!(
            receipt.to_receipt_json(),
            serde_json::json!({ "receiptId": "abcdef1234567890" })
        );
    }

    #[test]
    fn already_verified_maps_to_the_sentinel_receipt() {
        let receipt =
            classify_response("0", "NOTOK", "Contract source code already verified");
        assert_eq!(receipt, SubmissionReceipt::AlreadyVerified);
        assert_eq!(
            receipt.to_receipt_json(),
            serde_json::json!({ "receiptId": ALREADY_VERIFIED_RECEIPT })
        );
    }

    #[test]
    fn rejections_record_the_error_string() {
        let receipt = classify_response("0", "NOTOK", "Invalid API key");
        assert_eq!(
            receipt,
            SubmissionReceipt::Rejected("Invalid API key".to_string())
        );
        assert_eq!(
            receipt.to_receipt_json(),
            serde_json::json!({ "error": "Invalid API key" })
        );
    }

    #[test]
    fn etherscan_directory_accepts_numeric_and_string_chain_ids() {
        let body = serde_json::json!({
            "result": [
                { "chainid": 1, "apiurl": "https://api.etherscan.io/api", "blockexplorer": "https://etherscan.io" },
                { "chainid": "10", "apiurl": "https://api-optimistic.etherscan.io/api" },
                { "chainid": "not-a-chain", "apiurl": "https://example.com/api" },
            ]
        })
        .to_string();

        let endpoints = parse_etherscan_directory(&body).unwrap();
        assert_eq!(endpoints.len(), 2);
        assert_eq!(
            endpoints.get(&1).unwrap().api_url.as_str(),
            "https://api.etherscan.io/api"
        );
        assert!(endpoints.contains_key(&10));
    }

    #[test]
    fn blockscout_directory_derives_api_urls_from_explorer_urls() {
        let body = serde_json::json!({
            "1": { "explorers": [{ "url": "https://eth.blockscout.com/", "hosted_by": "blockscout" }] },
            "100": { "explorers": [] },
        })
        .to_string();

        let endpoints = parse_blockscout_directory(&body).unwrap();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(
            endpoints.get(&1).unwrap().api_url.as_str(),
            "https://eth.blockscout.com/api"
        );
    }

    #[test]
    fn routescan_directory_builds_per_chain_api_urls() {
        let directory_url = Url::parse("https://api.routescan.io/v2/chains").unwrap();
        let body = serde_json::json!({ "items": [{ "chainId": 43114 }] }).to_string();

        let endpoints = parse_routescan_directory(&directory_url, &body).unwrap();
        assert_eq!(
            endpoints.get(&43114).unwrap().api_url.as_str(),
            "https://api.routescan.io/v2/network/mainnet/evm/43114/etherscan/api"
        );
    }
}
