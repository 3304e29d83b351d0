//! Version probe for the external tool
//!
//! `terraform version -json` is tried first. Releases that predate the JSON
//! output print a free-text banner instead, which is parsed with two
//! patterns: one for the tool itself and a repeated one for every bundled
//! provider. Either way the result normalizes to a [`semver::Version`] for
//! the capability table in [`capability`].

pub mod capability;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{BenchError, BenchResult};
use crate::runner::{args, CommandRunner};

pub use capability::{Capabilities, Capability};

const SIMPLE_VERSION: &str = r"v?(?P<version>[0-9]+(?:\.[0-9]+)*(?:-[A-Za-z0-9\.]+)?)";

static VERSION_OUTPUT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^Terraform {SIMPLE_VERSION}")).expect("valid version regex")
});

static PROVIDER_VERSION_OUTPUT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"\n\+ provider[\. ](?P<name>\S+) {SIMPLE_VERSION}"))
        .expect("valid provider version regex")
});

/// Tool version and the provider versions selected in the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub terraform_version: String,
    #[serde(default)]
    pub provider_selections: BTreeMap<String, String>,
}

impl VersionInfo {
    /// The tool version as a comparable semantic version.
    pub fn semver(&self) -> BenchResult<semver::Version> {
        normalize_version(&self.terraform_version)
    }

    /// Parse `terraform version` output, structured or free-text.
    pub fn parse(output: &str) -> BenchResult<Self> {
        match serde_json::from_str::<VersionInfo>(output) {
            Ok(info) => Ok(info),
            Err(err) => {
                tracing::debug!(error = %err, "version output is not JSON, parsing banner");
                parse_banner(output)
            }
        }
    }
}

/// Run the version query in `dir`.
pub async fn detect_version(runner: &dyn CommandRunner, dir: &Path) -> BenchResult<VersionInfo> {
    let out = runner
        .run(dir, &args(["version", "-json"]))
        .await
        .map_err(|e| BenchError::command("running terraform version -json command", e))?;
    VersionInfo::parse(&String::from_utf8_lossy(&out))
}

/// Parse the banner printed by releases without `-json` support.
pub fn parse_banner(output: &str) -> BenchResult<VersionInfo> {
    let output = output.trim();

    let caps = VERSION_OUTPUT_RE.captures(output).ok_or_else(|| {
        BenchError::Version(format!("unexpected version output: {output}"))
    })?;
    let terraform_version = normalize_version(&caps["version"])?.to_string();

    let mut provider_selections = BTreeMap::new();
    for caps in PROVIDER_VERSION_OUTPUT_RE.captures_iter(output) {
        let version = normalize_version(&caps["version"])?;
        provider_selections.insert(caps["name"].to_string(), version.to_string());
    }

    Ok(VersionInfo {
        terraform_version,
        provider_selections,
    })
}

/// Normalize loose version strings (`v0.15`, `1.0.0-beta1`) to semver.
///
/// Missing minor/patch components are filled with zeros; components beyond
/// the third are dropped.
pub fn normalize_version(raw: &str) -> BenchResult<semver::Version> {
    let raw = raw.trim().trim_start_matches('v');
    let (core, pre) = match raw.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (raw, None),
    };

    let mut parts = [0u64; 3];
    for (i, piece) in core.split('.').enumerate() {
        let value = piece
            .parse::<u64>()
            .map_err(|_| BenchError::Version(format!("unable to parse version {raw:?}")))?;
        if let Some(slot) = parts.get_mut(i) {
            *slot = value;
        }
    }

    let mut version = semver::Version::new(parts[0], parts[1], parts[2]);
    if let Some(pre) = pre {
        version.pre = semver::Prerelease::new(pre)
            .map_err(|e| BenchError::Version(format!("unable to parse version {raw:?}: {e}")))?;
    }
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_structured_version() {
        let info =
            VersionInfo::parse(r#"{"terraform_version":"1.0.0","provider_selections":{"a":"1.2.3"}}"#)
                .unwrap();
        assert_eq!(
            info,
            VersionInfo {
                terraform_version: "1.0.0".to_string(),
                provider_selections: [("a".to_string(), "1.2.3".to_string())]
                    .into_iter()
                    .collect(),
            }
        );
    }

    #[test]
    fn test_parse_structured_version_ignores_extra_fields() {
        let info = VersionInfo::parse(
            r#"{"terraform_version":"1.5.7","platform":"linux_amd64","provider_selections":{},"terraform_outdated":true}"#,
        )
        .unwrap();
        assert_eq!(info.terraform_version, "1.5.7");
        assert!(info.provider_selections.is_empty());
    }

    #[test]
    fn test_parse_banner() {
        let info = VersionInfo::parse("Terraform v0.12.5\n+ provider.aws v2.3.0\n").unwrap();
        assert_eq!(info.terraform_version, "0.12.5");
        assert_eq!(info.provider_selections.len(), 1);
        assert_eq!(info.provider_selections["aws"], "2.3.0");
    }

    #[test]
    fn test_parse_banner_multiple_providers() {
        let banner = "Terraform v0.13.7\n\
                      + provider registry.terraform.io/hashicorp/aws v3.10.0\n\
                      + provider registry.terraform.io/hashicorp/random v2.3.1\n\n\
                      Your version of Terraform is out of date!";
        let info = parse_banner(banner).unwrap();
        assert_eq!(info.terraform_version, "0.13.7");
        assert_eq!(
            info.provider_selections["registry.terraform.io/hashicorp/aws"],
            "3.10.0"
        );
        assert_eq!(
            info.provider_selections["registry.terraform.io/hashicorp/random"],
            "2.3.1"
        );
    }

    #[test]
    fn test_parse_banner_rejects_garbage() {
        assert!(matches!(
            parse_banner("command not found"),
            Err(BenchError::Version(_))
        ));
    }

    #[test]
    fn test_normalize_version() {
        assert_eq!(normalize_version("v0.15").unwrap(), semver::Version::new(0, 15, 0));
        assert_eq!(normalize_version("1").unwrap(), semver::Version::new(1, 0, 0));
        assert_eq!(normalize_version("0.15.4").unwrap(), semver::Version::new(0, 15, 4));
        assert_eq!(
            normalize_version("1.0.0-beta1").unwrap().pre.as_str(),
            "beta1"
        );
        assert!(normalize_version("").is_err());
        assert!(normalize_version("x.y").is_err());
    }

    #[test]
    fn test_prerelease_sorts_before_release() {
        let pre = normalize_version("0.15.4-rc1").unwrap();
        let release = normalize_version("0.15.4").unwrap();
        assert!(pre < release);
    }
}
