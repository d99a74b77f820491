mod process;

pub use process::ProcessCompiler;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Source language of a verification request.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::EnumString, Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Solidity,
    Yul,
    Vyper,
}

impl Language {
    /// The compiler binary family responsible for the language.
    pub fn compiler(&self) -> contract_verification_database::CompiledContractCompiler {
        match self {
            Language::Solidity | Language::Yul => {
                contract_verification_database::CompiledContractCompiler::Solc
            }
            Language::Vyper => contract_verification_database::CompiledContractCompiler::Vyper,
        }
    }

    pub fn from_standard_json(value: &str) -> Option<Self> {
        match value {
            "Solidity" => Some(Language::Solidity),
            "Yul" => Some(Language::Yul),
            "Vyper" => Some(Language::Vyper),
            _ => None,
        }
    }
}

/// A fully qualified compiler version, e.g. `0.8.20+commit.a1b79de6`.
/// The commit part is optional on parse but kept verbatim for display, as
/// explorers and the store key compilations by the full string.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DetailedVersion {
    raw: String,
    version: semver::Version,
}

impl DetailedVersion {
    pub fn version(&self) -> &semver::Version {
        &self.version
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// `v`-prefixed representation used by etherscan-family APIs.
    pub fn to_v_prefixed(&self) -> String {
        format!("v{}", self.raw)
    }
}

impl fmt::Display for DetailedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for DetailedVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim().trim_start_matches('v').to_string();

        // The version string comes straight from request bodies and ends up
        // in compiler-registry paths and explorer form fields, so the commit
        // part is constrained as strictly as the semver part: no separators,
        // no parent-directory sequences, nothing outside the release naming
        // alphabet.
        let is_allowed =
            |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '+' | '-' | '_');
        if raw.is_empty() || raw.contains("..") || !raw.chars().all(is_allowed) {
            return Err(format!("invalid compiler version '{s}'"));
        }

        let semver_part = raw.split('+').next().unwrap_or_default();
        let version = semver::Version::parse(semver_part)
            .map_err(|err| format!("invalid compiler version '{s}': {err}"))?;
        Ok(Self { raw, version })
    }
}

/// One entry of the compiler's `errors` output array.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerDiagnostic {
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub formatted_message: String,
}

impl CompilerDiagnostic {
    pub fn is_error(&self) -> bool {
        self.severity == "error"
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CompilerError {
    #[error("compiler version is not supported: {0}")]
    UnsupportedVersion(String),
    #[error("language is not supported: {0}")]
    UnsupportedLanguage(String),
    #[error("compilation failed with {} diagnostics", .0.len())]
    Diagnostics(Vec<CompilerDiagnostic>),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Opaque compiler collaborator: takes a standard JSON input, returns the
/// standard JSON output. Implementations are expected to surface compiler
/// diagnostics of severity `error` as [`CompilerError::Diagnostics`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Compiler: Send + Sync {
    async fn compile(
        &self,
        language: Language,
        version: &DetailedVersion,
        json_input: &serde_json::Value,
    ) -> Result<serde_json::Value, CompilerError>;
}

/// Splits the compiler output's `errors` array into a hard failure or passes
/// the output through when only warnings are present.
pub fn check_output_diagnostics(
    output: serde_json::Value,
) -> Result<serde_json::Value, CompilerError> {
    let diagnostics: Vec<CompilerDiagnostic> = output
        .get("errors")
        .and_then(|errors| serde_json::from_value(errors.clone()).ok())
        .unwrap_or_default();

    if diagnostics.iter().any(CompilerDiagnostic::is_error) {
        return Err(CompilerError::Diagnostics(
            diagnostics
                .into_iter()
                .filter(CompilerDiagnostic::is_error)
                .collect(),
        ));
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn detailed_version_parses_with_and_without_commit() {
        let version: DetailedVersion = "0.8.20+commit.a1b79de6".parse().unwrap();
        assert_eq!(version.version(), &semver::Version::new(0, 8, 20));
        assert_eq!(version.to_string(), "0.8.20+commit.a1b79de6");
        assert_eq!(version.to_v_prefixed(), "v0.8.20+commit.a1b79de6");

        let version: DetailedVersion = "v0.4.26".parse().unwrap();
        assert_eq!(version.version(), &semver::Version::new(0, 4, 26));
        assert_eq!(version.as_str(), "0.4.26");

        assert!("latest".parse::<DetailedVersion>().is_err());
    }

    #[test]
    fn path_breaking_versions_are_rejected() {
        for hostile in [
            "0.8.20+../../../../../../bin/sh",
            "0.8.20+commit/evil",
            "0.8.20+commit\\evil",
            "0.8.20+..",
            "0.8.20+commit.a1b7\n9de6",
            "",
        ] {
            assert!(
                hostile.parse::<DetailedVersion>().is_err(),
                "version '{hostile}' must not parse"
            );
        }
    }

    #[test]
    fn output_with_only_warnings_passes_through() {
        let output = serde_json::json!({
            "errors": [
                { "severity": "warning", "message": "unused variable", "formattedMessage": "Warning: unused variable" }
            ],
            "contracts": {},
        });
        let checked = check_output_diagnostics(output.clone()).unwrap();
        assert_eq!(checked, output);
    }

    #[test]
    fn output_with_errors_is_rejected_with_diagnostics() {
        let output = serde_json::json!({
            "errors": [
                { "severity": "warning", "message": "w", "formattedMessage": "Warning: w" },
                { "severity": "error", "message": "Expected ';'", "formattedMessage": "ParserError: Expected ';'" }
            ],
        });
        match check_output_diagnostics(output).unwrap_err() {
            CompilerError::Diagnostics(diagnostics) => {
                assert_eq!(diagnostics.len(), 1);
                assert_eq!(
                    diagnostics[0].formatted_message,
                    "ParserError: Expected ';'"
                );
            }
            other => panic!("expected diagnostics, got {other:?}"),
        }
    }
}
