//! Version-gated capabilities, evaluated once per run.

use std::sync::LazyLock;

use serde::Serialize;

use super::VersionInfo;

/// Behavior that depends on the tool version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// `plan -refresh-only -json` emits `refresh_start` / `refresh_complete` events.
    EventStream,
    /// Provider attributes are redacted in ways that require literal substitution
    /// when building an isolated configuration.
    ProviderRewrite,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EventStream => write!(f, "event log"),
            Self::ProviderRewrite => write!(f, "provider rewrite"),
        }
    }
}

/// Minimum tool version for each capability.
static CAPABILITY_TABLE: LazyLock<[(Capability, semver::Version); 2]> = LazyLock::new(|| {
    [
        (Capability::EventStream, semver::Version::new(0, 15, 4)),
        (Capability::ProviderRewrite, semver::Version::new(0, 15, 0)),
    ]
});

/// Minimum version required for `capability`.
pub fn minimum_version(capability: Capability) -> semver::Version {
    CAPABILITY_TABLE
        .iter()
        .find(|(c, _)| *c == capability)
        .map(|(_, v)| v.clone())
        .unwrap_or_else(|| semver::Version::new(0, 0, 0))
}

/// Capabilities resolved for one detected (or undetectable) tool version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    version: Option<semver::Version>,
    event_stream: bool,
    provider_rewrite: bool,
}

impl Capabilities {
    /// Resolve capabilities from a probe result.
    ///
    /// With no usable version the event stream stays allowed (it cannot be
    /// shown to be unsupported) and provider rewriting is disabled.
    pub fn resolve(info: Option<&VersionInfo>) -> Self {
        let version = info.and_then(|info| match info.semver() {
            Ok(v) => Some(v),
            Err(err) => {
                tracing::warn!(error = %err, "could not parse terraform version, assuming an old release");
                None
            }
        });
        match version {
            Some(version) => Self {
                event_stream: version >= minimum_version(Capability::EventStream),
                provider_rewrite: version >= minimum_version(Capability::ProviderRewrite),
                version: Some(version),
            },
            None => Self {
                version: None,
                event_stream: true,
                provider_rewrite: false,
            },
        }
    }

    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::EventStream => self.event_stream,
            Capability::ProviderRewrite => self.provider_rewrite,
        }
    }

    pub fn version(&self) -> Option<&semver::Version> {
        self.version.as_ref()
    }
}
