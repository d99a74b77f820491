use super::{ContractView, FilesView, JobContext, ReadSink, SinkError, SinkIdentifier, SinkReceipt, WriteSink};
use crate::{to_checksum_address, types::VerificationResult, ToHex};
use anyhow::Context;
use async_trait::async_trait;
use sea_orm::prelude::Uuid;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};
use verification_common::{keccak256, MatchStatus};

const FULL_MATCH_DIR: &str = "full_match";
const PARTIAL_MATCH_DIR: &str = "partial_match";

/// Which on-disk source layout the sink writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepositoryLayout {
    /// Sources stored under their sanitized compilation paths.
    V1,
    /// Sources stored under content-hash file names, immune to path quirks.
    V2,
}

/// Filesystem repository of verified contracts:
/// `contracts/{full|partial}_match/{chainId}/{checksumAddress}/...`.
#[derive(Clone, Debug)]
pub struct RepositorySink {
    root: PathBuf,
    layout: RepositoryLayout,
}

impl RepositorySink {
    pub fn v1(root: PathBuf) -> Self {
        Self {
            root,
            layout: RepositoryLayout::V1,
        }
    }

    pub fn v2(root: PathBuf) -> Self {
        Self {
            root,
            layout: RepositoryLayout::V2,
        }
    }

    fn contract_dir(&self, match_dir: &str, chain_id: i64, address: &[u8]) -> PathBuf {
        self.root
            .join("contracts")
            .join(match_dir)
            .join(chain_id.to_string())
            .join(to_checksum_address(address))
    }
}

/// Strips `..` segments, absolute roots and newlines so a hostile source
/// path cannot escape the repository directory.
pub fn sanitize_relative_path(path: &str) -> String {
    let cleaned: String = path.chars().filter(|c| *c != '\n' && *c != '\r').collect();
    let segments: Vec<&str> = cleaned
        .split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .map(|segment| segment.trim_end_matches(':'))
        .filter(|segment| !segment.is_empty())
        .collect();
    segments.join("/")
}

fn is_full_match(result: &VerificationResult) -> bool {
    let (runtime, creation) = result.status_pair();
    runtime == Some(MatchStatus::Perfect) || creation == Some(MatchStatus::Perfect)
}

/// The relative file set one verification materializes into, shared by the
/// filesystem and the object-storage repositories.
pub fn verification_files(
    result: &VerificationResult,
    layout: RepositoryLayout,
) -> Vec<(String, Vec<u8>)> {
    let mut files = Vec::new();

    let metadata = serde_json::json!({
        "compiler": { "version": result.compilation.version },
        "language": result.compilation.language.to_string(),
        "settings": result.compilation.compiler_settings,
        "output": { "abi": result.compilation.abi() },
        "sources": result
            .compilation
            .sources
            .keys()
            .map(|path| {
                (
                    path.clone(),
                    serde_json::json!({
                        "keccak256": keccak256(result.compilation.sources[path].as_bytes()).to_hex(),
                    }),
                )
            })
            .collect::<serde_json::Map<String, serde_json::Value>>(),
    });
    files.push((
        "metadata.json".to_string(),
        serde_json::to_vec_pretty(&metadata).expect("metadata serialization must succeed"),
    ));

    for (path, content) in &result.compilation.sources {
        let file_name = match layout {
            RepositoryLayout::V1 => sanitize_relative_path(path),
            RepositoryLayout::V2 => format!("{}.sol", hex::encode(keccak256(content.as_bytes()))),
        };
        if file_name.is_empty() {
            continue;
        }
        files.push((format!("sources/{file_name}"), content.clone().into_bytes()));
    }

    if let Some(transaction_hash) = &result.deployment.transaction_hash {
        files.push((
            "creator-tx-hash.txt".to_string(),
            transaction_hash.to_hex().into_bytes(),
        ));
    }

    if let Some(creation_match) = result.matches.creation_match() {
        if let Some(arguments) = &creation_match.values.constructor_arguments {
            files.push((
                "constructor-args.txt".to_string(),
                arguments.to_hex().into_bytes(),
            ));
        }
    }

    let mut libraries: BTreeMap<String, String> = BTreeMap::new();
    for r#match in [result.matches.runtime_match(), result.matches.creation_match()]
        .into_iter()
        .flatten()
    {
        for (id, address) in &r#match.values.libraries {
            libraries.insert(id.clone(), address.to_hex());
        }
    }
    if !libraries.is_empty() {
        files.push((
            "library-map.json".to_string(),
            serde_json::to_vec_pretty(&libraries).expect("library map serialization must succeed"),
        ));
    }

    if let Some(immutable_references) = &result
        .compilation
        .runtime_code_artifacts
        .immutable_references
    {
        files.push((
            "immutable-references.json".to_string(),
            serde_json::to_vec_pretty(immutable_references)
                .expect("immutable references serialization must succeed"),
        ));
    }

    files
}

async fn write_file_atomically(path: &Path, content: &[u8]) -> Result<(), anyhow::Error> {
    let parent = path
        .parent()
        .ok_or(anyhow::anyhow!("file path has no parent directory"))?;
    tokio::fs::create_dir_all(parent)
        .await
        .with_context(|| format!("creating directory {}", parent.display()))?;

    let temporary = parent.join(format!(
        ".{}.{}",
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
        Uuid::new_v4()
    ));
    tokio::fs::write(&temporary, content)
        .await
        .with_context(|| format!("writing {}", temporary.display()))?;
    tokio::fs::rename(&temporary, path)
        .await
        .with_context(|| format!("renaming into {}", path.display()))?;
    Ok(())
}

#[async_trait]
impl WriteSink for RepositorySink {
    fn identifier(&self) -> SinkIdentifier {
        match self.layout {
            RepositoryLayout::V1 => SinkIdentifier::RepositoryV1,
            RepositoryLayout::V2 => SinkIdentifier::RepositoryV2,
        }
    }

    async fn store_verification(
        &self,
        result: &VerificationResult,
        _job: Option<&JobContext>,
    ) -> Result<SinkReceipt, SinkError> {
        let chain_id = result.deployment.chain_id;
        let address = &result.deployment.address;

        let match_dir = if is_full_match(result) {
            FULL_MATCH_DIR
        } else {
            PARTIAL_MATCH_DIR
        };
        let contract_dir = self.contract_dir(match_dir, chain_id, address);

        for (relative_path, content) in verification_files(result, self.layout) {
            let target = contract_dir.join(&relative_path);
            write_file_atomically(&target, &content)
                .await
                .map_err(SinkError::Internal)?;
        }

        // An upgrade to a full match supersedes the partial directory; each
        // file above was moved into place by rename, so consumers never see
        // a half-written contract.
        if match_dir == FULL_MATCH_DIR {
            let partial_dir = self.contract_dir(PARTIAL_MATCH_DIR, chain_id, address);
            match tokio::fs::remove_dir_all(&partial_dir).await {
                Ok(()) => {}
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
                Err(error) => {
                    return Err(SinkError::Internal(anyhow::Error::from(error).context(
                        format!("removing superseded {}", partial_dir.display()),
                    )))
                }
            }
        }

        Ok(SinkReceipt::default())
    }
}

#[async_trait]
impl ReadSink for RepositorySink {
    async fn get_contract(
        &self,
        chain_id: i64,
        address: &[u8],
    ) -> Result<Option<ContractView>, anyhow::Error> {
        for (match_dir, status) in [
            (FULL_MATCH_DIR, MatchStatus::Perfect),
            (PARTIAL_MATCH_DIR, MatchStatus::Partial),
        ] {
            let metadata_path = self
                .contract_dir(match_dir, chain_id, address)
                .join("metadata.json");
            match tokio::fs::read(&metadata_path).await {
                Ok(content) => {
                    let metadata = serde_json::from_slice(&content)
                        .context("parsing stored metadata.json")?;
                    return Ok(Some(ContractView {
                        chain_id,
                        address: address.to_hex(),
                        runtime_match: Some(status),
                        creation_match: None,
                        metadata,
                    }));
                }
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => continue,
                Err(error) => {
                    return Err(anyhow::Error::from(error)
                        .context(format!("reading {}", metadata_path.display())))
                }
            }
        }
        Ok(None)
    }

    async fn get_files(
        &self,
        chain_id: i64,
        address: &[u8],
    ) -> Result<Option<FilesView>, anyhow::Error> {
        for match_dir in [FULL_MATCH_DIR, PARTIAL_MATCH_DIR] {
            let sources_dir = self
                .contract_dir(match_dir, chain_id, address)
                .join("sources");
            let mut entries = match tokio::fs::read_dir(&sources_dir).await {
                Ok(entries) => entries,
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => continue,
                Err(error) => {
                    return Err(anyhow::Error::from(error)
                        .context(format!("reading {}", sources_dir.display())))
                }
            };

            let mut files = BTreeMap::new();
            while let Some(entry) = entries.next_entry().await? {
                if entry.file_type().await?.is_file() {
                    let content = tokio::fs::read_to_string(entry.path()).await?;
                    files.insert(entry.file_name().to_string_lossy().into_owned(), content);
                }
            }
            return Ok(Some(FilesView { files }));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CompilationReady, DeploymentInfo};
    use contract_verification_database::{
        CompiledContractCompiler, CompiledContractLanguage, VerifiedContractMatches,
    };
    use pretty_assertions::assert_eq;
    use verification_common::{
        CompilationArtifacts, CreationCodeArtifacts, Match, MatchValues, RuntimeCodeArtifacts,
    };

    fn result(metadata_match: bool) -> VerificationResult {
        let compilation = CompilationReady {
            compiler: CompiledContractCompiler::Solc,
            language: CompiledContractLanguage::Solidity,
            version: "0.8.20+commit.a1b79de6".to_string(),
            name: "Storage".to_string(),
            fully_qualified_name: "contracts/Storage.sol:Storage".to_string(),
            sources: BTreeMap::from([(
                "contracts/Storage.sol".to_string(),
                "contract Storage {}".to_string(),
            )]),
            compiler_settings: serde_json::json!({}),
            compilation_artifacts: CompilationArtifacts::default(),
            creation_code: vec![0x60, 0x80, 0x60],
            creation_code_artifacts: CreationCodeArtifacts::default(),
            runtime_code: vec![0x60, 0x80],
            runtime_code_artifacts: RuntimeCodeArtifacts::default(),
        };
        VerificationResult {
            deployment: DeploymentInfo {
                chain_id: 1337,
                address: vec![0xab; 20],
                runtime_code: Some(vec![0x60, 0x80]),
                transaction_hash: Some(vec![0xca; 32]),
                ..Default::default()
            },
            compilation,
            matches: VerifiedContractMatches::OnlyRuntime {
                runtime_match: Match {
                    metadata_match,
                    transformations: vec![],
                    values: MatchValues::default(),
                },
            },
        }
    }

    #[test]
    fn hostile_paths_are_sanitized() {
        assert_eq!(
            sanitize_relative_path("../../etc/passwd"),
            "etc/passwd"
        );
        assert_eq!(sanitize_relative_path("/etc/passwd"), "etc/passwd");
        assert_eq!(
            sanitize_relative_path("contracts/./Storage.sol"),
            "contracts/Storage.sol"
        );
        assert_eq!(
            sanitize_relative_path("contracts/Sto\nrage.sol"),
            "contracts/Storage.sol"
        );
        assert_eq!(sanitize_relative_path("C:\\temp\\Storage.sol"), "C/temp/Storage.sol");
        assert_eq!(sanitize_relative_path(".."), "");
    }

    #[tokio::test]
    async fn partial_match_is_written_under_the_partial_directory() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RepositorySink::v1(dir.path().to_path_buf());

        sink.store_verification(&result(false), None).await.unwrap();

        let contract_dir = dir
            .path()
            .join("contracts")
            .join(PARTIAL_MATCH_DIR)
            .join("1337")
            .join(to_checksum_address(&[0xab; 20]));
        assert!(contract_dir.join("metadata.json").exists());
        assert!(contract_dir
            .join("sources")
            .join("contracts")
            .join("Storage.sol")
            .exists());
        assert!(contract_dir.join("creator-tx-hash.txt").exists());
    }

    #[tokio::test]
    async fn full_match_supersedes_the_partial_directory() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RepositorySink::v1(dir.path().to_path_buf());

        sink.store_verification(&result(false), None).await.unwrap();
        sink.store_verification(&result(true), None).await.unwrap();

        let contracts = dir.path().join("contracts");
        let address = to_checksum_address(&[0xab; 20]);
        assert!(contracts
            .join(FULL_MATCH_DIR)
            .join("1337")
            .join(&address)
            .join("metadata.json")
            .exists());
        assert!(!contracts
            .join(PARTIAL_MATCH_DIR)
            .join("1337")
            .join(&address)
            .exists());
    }

    #[tokio::test]
    async fn files_are_readable_back_through_the_read_surface() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RepositorySink::v2(dir.path().to_path_buf());

        sink.store_verification(&result(true), None).await.unwrap();

        let contract = sink.get_contract(1337, &[0xab; 20]).await.unwrap().unwrap();
        assert_eq!(contract.runtime_match, Some(MatchStatus::Perfect));

        let files = sink.get_files(1337, &[0xab; 20]).await.unwrap().unwrap();
        assert_eq!(files.files.len(), 1);
        assert_eq!(
            files.files.values().next().unwrap(),
            "contract Storage {}"
        );
    }
}
