//! Controller version lookup for report enrichment
//!
//! The controller exposes a form-based API at `https://<ip>/v1/api`: a
//! `login` action returns a session id (`CID`) and `list_version_info`
//! returns the running release as `UserConnect-<major>.<minor>.<build>`.
//! Failures here never stop a benchmark.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ControllerCredentials;
use crate::error::{BenchError, BenchResult};

static CONTROLLER_VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<major>\d+)\.(?P<minor>\d+)(?:\.(?P<build>\d+))?")
        .expect("valid controller version regex")
});

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Release of the controller the workspace talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerVersion {
    pub major: u64,
    pub minor: u64,
    pub build: u64,
}

impl std::fmt::Display for ControllerVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.build)
    }
}

/// Parse `UserConnect-6.5.2608` (or a bare `6.5.2608`).
pub fn parse_controller_version(raw: &str) -> BenchResult<ControllerVersion> {
    let caps = CONTROLLER_VERSION_RE.captures(raw).ok_or_else(|| {
        BenchError::Controller(format!("unexpected controller version {raw:?}"))
    })?;
    let number = |name: &str| -> BenchResult<u64> {
        match caps.name(name) {
            Some(m) => m.as_str().parse().map_err(|e| {
                BenchError::Controller(format!("invalid {name} in controller version {raw:?}: {e}"))
            }),
            None => Ok(0),
        }
    };
    Ok(ControllerVersion {
        major: number("major")?,
        minor: number("minor")?,
        build: number("build")?,
    })
}

/// Anything that can report the controller version.
#[async_trait]
pub trait ControllerVersionSource: Send + Sync {
    async fn controller_version(&self) -> BenchResult<ControllerVersion>;
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(rename = "return", default)]
    ok: bool,
    #[serde(default)]
    results: Value,
    #[serde(rename = "CID", default)]
    cid: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

impl ApiResponse {
    fn into_result(self, action: &str) -> BenchResult<Self> {
        if self.ok {
            return Ok(self);
        }
        let reason = self
            .reason
            .clone()
            .or_else(|| self.results.as_str().map(str::to_string))
            .unwrap_or_else(|| "no reason given".to_string());
        Err(BenchError::Controller(format!("{action} failed: {reason}")))
    }
}

/// HTTP client for the controller API.
pub struct AviatrixClient {
    http: reqwest::Client,
    endpoint: String,
    credentials: ControllerCredentials,
}

impl AviatrixClient {
    /// Controllers commonly run with self-signed certificates, which are accepted.
    pub fn new(credentials: ControllerCredentials) -> BenchResult<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BenchError::Controller(format!("could not build HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint: format!("https://{}/v1/api", credentials.controller_ip),
            credentials,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn login(&self) -> BenchResult<String> {
        let response: ApiResponse = self
            .http
            .post(&self.endpoint)
            .form(&[
                ("action", "login"),
                ("username", self.credentials.username.as_str()),
                ("password", self.credentials.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| BenchError::Controller(format!("login request: {e}")))?
            .json()
            .await
            .map_err(|e| BenchError::Controller(format!("login response: {e}")))?;
        response
            .into_result("login")?
            .cid
            .ok_or_else(|| BenchError::Controller("login response carried no CID".to_string()))
    }
}

#[async_trait]
impl ControllerVersionSource for AviatrixClient {
    async fn controller_version(&self) -> BenchResult<ControllerVersion> {
        let cid = self.login().await?;
        let response: ApiResponse = self
            .http
            .get(&self.endpoint)
            .query(&[("action", "list_version_info"), ("CID", cid.as_str())])
            .send()
            .await
            .map_err(|e| BenchError::Controller(format!("version request: {e}")))?
            .json()
            .await
            .map_err(|e| BenchError::Controller(format!("version response: {e}")))?;
        let response = response.into_result("list_version_info")?;
        let current = response
            .results
            .get("current_version")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                BenchError::Controller("version response carried no current_version".to_string())
            })?;
        tracing::debug!(current_version = current, "controller version");
        parse_controller_version(current)
    }
}
