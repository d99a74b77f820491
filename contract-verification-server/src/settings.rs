use blockscout_service_launcher::{
    launcher::{ConfigSettings, MetricsSettings, ServerSettings},
    tracing::{JaegerSettings, TracingSettings},
};
use contract_verification_logic::{
    pool::WorkerPoolSettings,
    sinks::{ObjectStorageSettings, SinkIdentifier},
};
use serde::{de, Deserialize};
use std::{collections::BTreeMap, path::PathBuf, str::FromStr};

/// Wrapper under [`serde::de::IgnoredAny`] which implements
/// [`PartialEq`] and [`Eq`] for fields to be ignored.
#[derive(Copy, Clone, Debug, Default, Deserialize)]
struct IgnoredAny(de::IgnoredAny);

impl PartialEq for IgnoredAny {
    fn eq(&self, _other: &Self) -> bool {
        // We ignore that values, so they should not impact the equality
        true
    }
}

impl Eq for IgnoredAny {}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub metrics: MetricsSettings,
    #[serde(default)]
    pub tracing: TracingSettings,
    #[serde(default)]
    pub jaeger: JaegerSettings,

    pub database: DatabaseSettings,
    #[serde(default)]
    pub alliance_database: AllianceDatabaseSettings,
    #[serde(default)]
    pub repository: RepositorySettings,
    #[serde(default)]
    pub s3_repository: Option<ObjectStorageSettings>,
    #[serde(default)]
    pub debug_data_store: Option<ObjectStorageSettings>,
    #[serde(default)]
    pub worker_pool: WorkerPoolSettings,
    #[serde(default)]
    pub storage: StoragePolicySettings,
    #[serde(default)]
    pub external_verifiers: ExternalVerifiersSettings,
    #[serde(default)]
    pub etherscan_import: EtherscanImportSettings,
    #[serde(default)]
    pub chains: BTreeMap<i64, ChainSettings>,
    #[serde(default)]
    pub compilers: CompilersSettings,
    #[serde(default)]
    pub fail_on_signature_errors: bool,

    // Is required as we deny unknown fields, but allow users provide
    // path to config through PREFIX__CONFIG env variable. If removed,
    // the setup would fail with `unknown field `config`, expected one of...`
    #[serde(default, rename = "config")]
    config_path: IgnoredAny,
}

impl ConfigSettings for Settings {
    const SERVICE_NAME: &'static str = "CONTRACT_VERIFICATION";
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DatabaseSettings {
    pub url: String,
    #[serde(default)]
    pub create_database: bool,
    #[serde(default)]
    pub run_migrations: bool,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AllianceDatabaseSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub url: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RepositorySettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_repository_root")]
    pub root_path: PathBuf,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            root_path: default_repository_root(),
        }
    }
}

fn default_repository_root() -> PathBuf {
    PathBuf::from("repository")
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct StoragePolicySettings {
    #[serde(default = "default_read_sink")]
    pub read: SinkIdentifier,
    #[serde(default = "default_write_or_err")]
    pub write_or_err: Vec<SinkIdentifier>,
    #[serde(default)]
    pub write_or_warn: Vec<SinkIdentifier>,
}

impl Default for StoragePolicySettings {
    fn default() -> Self {
        Self {
            read: default_read_sink(),
            write_or_err: default_write_or_err(),
            write_or_warn: vec![],
        }
    }
}

fn default_read_sink() -> SinkIdentifier {
    SinkIdentifier::SourcifyDatabase
}

fn default_write_or_err() -> Vec<SinkIdentifier> {
    vec![SinkIdentifier::SourcifyDatabase]
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ExternalVerifiersSettings {
    #[serde(default = "etherscan_verifier_defaults")]
    pub etherscan: ExplorerVerifierSettings,
    #[serde(default = "blockscout_verifier_defaults")]
    pub blockscout: ExplorerVerifierSettings,
    #[serde(default = "routescan_verifier_defaults")]
    pub routescan: ExplorerVerifierSettings,
}

impl Default for ExternalVerifiersSettings {
    fn default() -> Self {
        Self {
            etherscan: etherscan_verifier_defaults(),
            blockscout: blockscout_verifier_defaults(),
            routescan: routescan_verifier_defaults(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ExplorerVerifierSettings {
    #[serde(default)]
    pub enabled: bool,
    pub directory_url: url::Url,
    #[serde(default)]
    pub api_keys: BTreeMap<i64, String>,
    #[serde(default)]
    pub default_api_key: Option<String>,
}

fn etherscan_verifier_defaults() -> ExplorerVerifierSettings {
    ExplorerVerifierSettings {
        enabled: false,
        directory_url: url::Url::from_str("https://api.etherscan.io/v2/chainlist").unwrap(),
        api_keys: BTreeMap::new(),
        default_api_key: None,
    }
}

fn blockscout_verifier_defaults() -> ExplorerVerifierSettings {
    ExplorerVerifierSettings {
        enabled: false,
        directory_url: url::Url::from_str("https://chains.blockscout.com/api/chains").unwrap(),
        api_keys: BTreeMap::new(),
        default_api_key: None,
    }
}

fn routescan_verifier_defaults() -> ExplorerVerifierSettings {
    ExplorerVerifierSettings {
        enabled: false,
        directory_url: url::Url::from_str("https://api.routescan.io/v2/chains").unwrap(),
        api_keys: BTreeMap::new(),
        default_api_key: None,
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EtherscanImportSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_etherscan_api_url")]
    pub api_url: url::Url,
    #[serde(default)]
    pub default_api_key: Option<String>,
}

impl Default for EtherscanImportSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: default_etherscan_api_url(),
            default_api_key: None,
        }
    }
}

fn default_etherscan_api_url() -> url::Url {
    url::Url::from_str("https://api.etherscan.io/v2/api").unwrap()
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ChainSettings {
    pub rpc_url: url::Url,
    #[serde(default = "default_rpc_max_retries")]
    pub max_retries: u32,
}

fn default_rpc_max_retries() -> u32 {
    3
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CompilersSettings {
    #[serde(default = "default_compilers_dir")]
    pub dir: PathBuf,
}

impl Default for CompilersSettings {
    fn default() -> Self {
        Self {
            dir: default_compilers_dir(),
        }
    }
}

fn default_compilers_dir() -> PathBuf {
    PathBuf::from("compilers")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn storage_policy_defaults_to_the_canonical_store() {
        let policy = StoragePolicySettings::default();
        assert_eq!(policy.read, SinkIdentifier::SourcifyDatabase);
        assert_eq!(policy.write_or_err, vec![SinkIdentifier::SourcifyDatabase]);
        assert!(policy.write_or_warn.is_empty());
    }

    #[test]
    fn sink_identifiers_deserialize_from_configuration_strings() {
        let policy: StoragePolicySettings = serde_json::from_value(serde_json::json!({
            "read": "SourcifyDatabase",
            "write_or_err": ["SourcifyDatabase", "AllianceDatabase"],
            "write_or_warn": ["RepositoryV1", "EtherscanVerify"],
        }))
        .unwrap();
        assert_eq!(
            policy.write_or_err,
            vec![
                SinkIdentifier::SourcifyDatabase,
                SinkIdentifier::AllianceDatabase
            ]
        );
        assert_eq!(
            policy.write_or_warn,
            vec![SinkIdentifier::RepositoryV1, SinkIdentifier::EtherscanVerify]
        );
    }
}
