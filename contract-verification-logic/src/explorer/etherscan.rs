use super::{ExplorerImportError, ExplorerImporter, ExplorerResult};
use crate::ToHex;
use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

/// Imports verified sources through the etherscan `getsourcecode` API.
pub struct EtherscanImporter {
    api_url: Url,
    client: ClientWithMiddleware,
    default_api_key: Option<String>,
}

impl EtherscanImporter {
    pub fn new(api_url: Url, default_api_key: Option<String>) -> Self {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let client = reqwest_middleware::ClientBuilder::new(reqwest::Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();
        Self {
            api_url,
            client,
            default_api_key,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EtherscanResponse {
    status: String,
    #[serde(default)]
    message: String,
    result: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EtherscanSourceEntry {
    #[serde(default)]
    source_code: String,
    #[serde(default)]
    contract_name: String,
    #[serde(default)]
    compiler_version: String,
    #[serde(default)]
    constructor_arguments: String,
    #[serde(default)]
    compiler_type: String,
}

impl EtherscanSourceEntry {
    fn is_vyper(&self) -> bool {
        self.compiler_type.eq_ignore_ascii_case("vyper")
            || self.compiler_version.starts_with("vyper")
    }
}

/// Etherscan wraps standard JSON in an extra pair of braces; plain single
/// files come through verbatim.
pub(crate) fn parse_source_code_field(
    source_code: &str,
    contract_name: &str,
) -> Result<(Value, String), ExplorerImportError> {
    let trimmed = source_code.trim();

    if trimmed.starts_with("{{") && trimmed.ends_with("}}") {
        let inner = &trimmed[1..trimmed.len() - 1];
        let std_json: Value = serde_json::from_str(inner).map_err(|err| {
            ExplorerImportError::Api(format!("invalid doubly-wrapped standard json: {err}"))
        })?;
        let file_name = find_file_declaring_contract(&std_json, contract_name)
            .ok_or(ExplorerImportError::MissingContractInJson)?;
        return Ok((std_json, file_name));
    }

    if trimmed.starts_with('{') {
        // either a standard json input or a bare sources object
        let parsed: Value = serde_json::from_str(trimmed)
            .map_err(|err| ExplorerImportError::Api(format!("invalid source json: {err}")))?;
        if parsed.get("sources").is_some() {
            let file_name = find_file_declaring_contract(&parsed, contract_name)
                .ok_or(ExplorerImportError::MissingContractInJson)?;
            return Ok((parsed, file_name));
        }
        let std_json = serde_json::json!({
            "language": "Solidity",
            "sources": parsed,
            "settings": {},
        });
        let file_name = find_file_declaring_contract(&std_json, contract_name)
            .ok_or(ExplorerImportError::MissingContractInJson)?;
        return Ok((std_json, file_name));
    }

    // single flattened source
    let file_name = format!("{contract_name}.sol");
    let mut sources = serde_json::Map::new();
    sources.insert(
        file_name.clone(),
        serde_json::json!({ "content": trimmed }),
    );
    let std_json = serde_json::json!({
        "language": "Solidity",
        "sources": sources,
        "settings": {},
    });
    Ok((std_json, file_name))
}

fn find_file_declaring_contract(std_json: &Value, contract_name: &str) -> Option<String> {
    let sources = std_json.get("sources")?.as_object()?;

    let declaration_markers = [
        format!("contract {contract_name}"),
        format!("library {contract_name}"),
        format!("interface {contract_name}"),
        format!("abstract contract {contract_name}"),
    ];
    for (path, source) in sources {
        let content = source.get("content").and_then(Value::as_str)?;
        if declaration_markers
            .iter()
            .any(|marker| content.contains(marker.as_str()))
        {
            return Some(path.clone());
        }
    }

    // fall back to the only file when the declaration is not found textually
    if sources.len() == 1 {
        return sources.keys().next().cloned();
    }
    None
}

/// Maps the etherscan vyper version spelling (`vyper:0.3.7`) onto the plain
/// version the compiler registry understands.
pub(crate) fn map_vyper_version(compiler_version: &str) -> Result<String, ExplorerImportError> {
    let version = compiler_version
        .strip_prefix("vyper:")
        .unwrap_or(compiler_version);
    if version.is_empty() || !version.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        return Err(ExplorerImportError::VyperVersionMappingFailed(
            compiler_version.to_string(),
        ));
    }
    Ok(version.to_string())
}

#[async_trait]
impl ExplorerImporter for EtherscanImporter {
    async fn fetch(
        &self,
        chain_id: i64,
        address: &[u8],
        api_key: Option<&str>,
    ) -> Result<ExplorerResult, ExplorerImportError> {
        let mut url = self.api_url.clone();
        url.query_pairs_mut()
            .append_pair("chainid", &chain_id.to_string())
            .append_pair("module", "contract")
            .append_pair("action", "getsourcecode")
            .append_pair("address", &address.to_hex());
        if let Some(api_key) = api_key.or(self.default_api_key.as_deref()) {
            url.query_pairs_mut().append_pair("apikey", api_key);
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| ExplorerImportError::Http(err.to_string()))?;
        let response: EtherscanResponse = response
            .json()
            .await
            .map_err(|err| ExplorerImportError::Http(err.to_string()))?;

        if response.status != "1" {
            let detail = response
                .result
                .as_str()
                .unwrap_or(&response.message)
                .to_string();
            if detail.to_lowercase().contains("rate limit") {
                return Err(ExplorerImportError::RateLimit);
            }
            return Err(ExplorerImportError::Api(detail));
        }

        let entries: Vec<EtherscanSourceEntry> = serde_json::from_value(response.result)
            .map_err(|err| ExplorerImportError::Api(format!("invalid result entries: {err}")))?;
        let entry = entries
            .into_iter()
            .next()
            .ok_or(ExplorerImportError::NotVerified)?;
        if entry.source_code.is_empty() {
            return Err(ExplorerImportError::NotVerified);
        }

        let constructor_arguments = if entry.constructor_arguments.is_empty() {
            None
        } else {
            hex::decode(entry.constructor_arguments.trim_start_matches("0x")).ok()
        };

        if entry.is_vyper() {
            let compiler_version = map_vyper_version(&entry.compiler_version)?;
            let (standard_json_input, file_name) =
                parse_source_code_field(&entry.source_code, &entry.contract_name)?;
            if standard_json_input.get("settings").is_none() {
                return Err(ExplorerImportError::MissingVyperSettings);
            }
            return Ok(ExplorerResult::Vyper {
                contract_name: entry.contract_name,
                file_name,
                compiler_version,
                standard_json_input,
                constructor_arguments,
            });
        }

        let (standard_json_input, file_name) =
            parse_source_code_field(&entry.source_code, &entry.contract_name)?;
        Ok(ExplorerResult::Solidity {
            contract_name: entry.contract_name,
            file_name,
            compiler_version: entry.compiler_version.trim_start_matches('v').to_string(),
            standard_json_input,
            constructor_arguments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn doubly_wrapped_standard_json_is_unwrapped() {
        let source_code = r#"{{"language":"Solidity","sources":{"contracts/Storage.sol":{"content":"contract Storage {}"}},"settings":{}}}"#;
        let (std_json, file_name) = parse_source_code_field(source_code, "Storage").unwrap();
        assert_eq!(file_name, "contracts/Storage.sol");
        assert_eq!(
            std_json.get("language").and_then(Value::as_str),
            Some("Solidity")
        );
    }

    #[test]
    fn flattened_sources_become_a_single_file_input() {
        let (std_json, file_name) =
            parse_source_code_field("contract Storage {}", "Storage").unwrap();
        assert_eq!(file_name, "Storage.sol");
        assert!(std_json
            .get("sources")
            .and_then(|sources| sources.get("Storage.sol"))
            .is_some());
    }

    #[test]
    fn missing_declaration_across_multiple_files_is_reported() {
        let source_code = r#"{{"language":"Solidity","sources":{"a.sol":{"content":"contract A {}"},"b.sol":{"content":"contract B {}"}},"settings":{}}}"#;
        let error = parse_source_code_field(source_code, "Storage").unwrap_err();
        assert!(matches!(
            error,
            ExplorerImportError::MissingContractInJson
        ));
    }

    #[test]
    fn vyper_versions_are_mapped_from_the_explorer_spelling() {
        assert_eq!(map_vyper_version("vyper:0.3.7").unwrap(), "0.3.7");
        assert_eq!(map_vyper_version("0.3.7").unwrap(), "0.3.7");
        assert!(map_vyper_version("vyper:").is_err());
        assert!(map_vyper_version("unknown").is_err());
    }
}
