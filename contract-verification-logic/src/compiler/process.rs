use super::{check_output_diagnostics, Compiler, CompilerError, DetailedVersion, Language};
use anyhow::Context;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::{io::AsyncWriteExt, process::Command};

/// Runs pre-fetched `solc`/`vyper` release binaries in standard-json mode.
/// Binaries are expected under the compilers directory as
/// `solc-v{version}` and `vyper-v{version}`; a missing binary maps to an
/// unsupported-version error.
#[derive(Clone, Debug)]
pub struct ProcessCompiler {
    compilers_dir: PathBuf,
}

impl ProcessCompiler {
    pub fn new(compilers_dir: PathBuf) -> Self {
        Self { compilers_dir }
    }

    fn binary_path(
        &self,
        language: Language,
        version: &DetailedVersion,
    ) -> Result<PathBuf, CompilerError> {
        let prefix = match language {
            Language::Solidity | Language::Yul => "solc",
            Language::Vyper => "vyper",
        };
        let file_name = format!("{prefix}-v{version}");

        // Version strings are validated at parse time; re-checked here so a
        // spawned binary can never live outside the compilers directory.
        if file_name.contains(['/', '\\']) || file_name.contains("..") {
            return Err(CompilerError::UnsupportedVersion(version.to_string()));
        }

        Ok(self.compilers_dir.join(file_name))
    }
}

#[async_trait]
impl Compiler for ProcessCompiler {
    async fn compile(
        &self,
        language: Language,
        version: &DetailedVersion,
        json_input: &serde_json::Value,
    ) -> Result<serde_json::Value, CompilerError> {
        let binary = self.binary_path(language, version)?;
        if !binary.exists() {
            return Err(CompilerError::UnsupportedVersion(version.to_string()));
        }

        let mut child = Command::new(&binary)
            .arg("--standard-json")
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning compiler binary {}", binary.display()))?;

        let input =
            serde_json::to_vec(json_input).context("serializing compiler standard json input")?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or(anyhow::anyhow!("compiler stdin is not piped"))?;
        stdin
            .write_all(&input)
            .await
            .context("writing compiler standard json input")?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .context("waiting for the compiler to finish")?;

        if !output.status.success() && output.stdout.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CompilerError::Internal(anyhow::anyhow!(
                "compiler exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let json_output: serde_json::Value = serde_json::from_slice(&output.stdout)
            .context("parsing compiler standard json output")?;

        check_output_diagnostics(json_output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_maps_to_unsupported_version() {
        let compiler = ProcessCompiler::new(std::env::temp_dir().join("no-such-compilers-dir"));
        let version: DetailedVersion = "0.8.20+commit.a1b79de6".parse().unwrap();
        let result = compiler
            .compile(Language::Solidity, &version, &serde_json::json!({}))
            .await;
        assert!(matches!(result, Err(CompilerError::UnsupportedVersion(_))));
    }

    #[test]
    fn binary_paths_follow_the_release_naming() {
        let compiler = ProcessCompiler::new(PathBuf::from("/opt/compilers"));
        let version: DetailedVersion = "0.8.20+commit.a1b79de6".parse().unwrap();
        assert_eq!(
            compiler.binary_path(Language::Solidity, &version).unwrap(),
            PathBuf::from("/opt/compilers/solc-v0.8.20+commit.a1b79de6")
        );
        assert_eq!(
            compiler.binary_path(Language::Vyper, &version).unwrap(),
            PathBuf::from("/opt/compilers/vyper-v0.8.20+commit.a1b79de6")
        );
    }
}
