//! Run configuration and environment requirements

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, BenchResult};

/// Default `-parallelism` passed to refresh operations.
pub const DEFAULT_PARALLELISM: u32 = 10;

/// Default number of timed measurements per target.
pub const DEFAULT_ITERATIONS: u32 = 3;

/// Environment variables needed to look up the controller version.
pub const CONTROLLER_ENV_VARS: [&str; 3] = [
    "AVIATRIX_CONTROLLER_IP",
    "AVIATRIX_USERNAME",
    "AVIATRIX_PASSWORD",
];

/// Configuration of one benchmark run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Leave the controller version out of the report
    pub skip_controller_version: bool,
    /// Timed measurements per target (warm-up runs are not counted)
    pub iterations: u32,
    /// `-var-file` passed to every tool invocation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub var_file: Option<PathBuf>,
    /// Use the event-stream strategy instead of isolated workspaces
    pub event_log: bool,
    /// Refresh parallelism for whole-workspace runs and the upper bound for per-type runs
    pub parallelism: u32,
    /// Deadline for any single tool invocation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_timeout: Option<Duration>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            skip_controller_version: false,
            iterations: DEFAULT_ITERATIONS,
            var_file: None,
            event_log: true,
            parallelism: DEFAULT_PARALLELISM,
            command_timeout: None,
        }
    }
}

impl BenchConfig {
    /// Reject values no strategy can work with.
    pub fn validate(&self) -> BenchResult<()> {
        if self.iterations == 0 {
            return Err(BenchError::Config(
                "iterations must be at least 1".to_string(),
            ));
        }
        if self.parallelism == 0 {
            return Err(BenchError::Config(
                "parallelism must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// `-var-file=<path>` argument, when a var-file is configured.
    pub fn var_file_arg(&self) -> Option<String> {
        self.var_file
            .as_ref()
            .map(|path| format!("-var-file={}", path.display()))
    }
}

impl std::fmt::Display for BenchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{SkipControllerVersion:{} Iterations:{} VarFile:{} EventLog:{} Parallelism:{}}}",
            self.skip_controller_version,
            self.iterations,
            self.var_file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            self.event_log,
            self.parallelism
        )
    }
}

/// Credentials for the controller version lookup.
#[derive(Clone)]
pub struct ControllerCredentials {
    pub controller_ip: String,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for ControllerCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerCredentials")
            .field("controller_ip", &self.controller_ip)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl ControllerCredentials {
    /// Read credentials from the process environment.
    pub fn from_env() -> BenchResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read credentials through `lookup`; empty values count as missing.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> BenchResult<Self> {
        let mut values = Vec::with_capacity(CONTROLLER_ENV_VARS.len());
        for name in CONTROLLER_ENV_VARS {
            match lookup(name).filter(|v| !v.is_empty()) {
                Some(value) => values.push(value),
                None => {
                    return Err(BenchError::Environment(format!(
                        "environment variable {name} is not set.\n\
                         The environment variables {} must be set to include the controller version in the generated report.\n\
                         Set --skip-controller-version flag to skip including controller version in the report.",
                        CONTROLLER_ENV_VARS.join(", ")
                    )))
                }
            }
        }
        let password = values.pop().unwrap_or_default();
        let username = values.pop().unwrap_or_default();
        let controller_ip = values.pop().unwrap_or_default();
        Ok(Self {
            controller_ip,
            username,
            password,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = BenchConfig::default();
        assert_eq!(config.iterations, 3);
        assert!(config.event_log);
        assert!(!config.skip_controller_version);
        assert_eq!(config.parallelism, DEFAULT_PARALLELISM);
        assert!(config.var_file.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let config = BenchConfig {
            iterations: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(BenchError::Config(_))));
    }

    #[test]
    fn test_var_file_arg() {
        let config = BenchConfig {
            var_file: Some(PathBuf::from("prod.tfvars")),
            ..Default::default()
        };
        assert_eq!(config.var_file_arg().as_deref(), Some("-var-file=prod.tfvars"));
        assert_eq!(BenchConfig::default().var_file_arg(), None);
    }

    #[test]
    fn test_credentials_from_lookup() {
        let env: HashMap<&str, &str> = [
            ("AVIATRIX_CONTROLLER_IP", "10.1.2.3"),
            ("AVIATRIX_USERNAME", "admin"),
            ("AVIATRIX_PASSWORD", "hunter2"),
        ]
        .into_iter()
        .collect();
        let creds =
            ControllerCredentials::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(creds.controller_ip, "10.1.2.3");
        assert_eq!(creds.username, "admin");
        assert_eq!(creds.password, "hunter2");
        assert!(!format!("{creds:?}").contains("hunter2"));
    }

    #[test]
    fn test_missing_credential_names_all_variables() {
        let err = ControllerCredentials::from_lookup(|k| {
            (k == "AVIATRIX_CONTROLLER_IP").then(|| "10.1.2.3".to_string())
        })
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("AVIATRIX_USERNAME is not set"));
        for name in CONTROLLER_ENV_VARS {
            assert!(msg.contains(name), "message should name {name}");
        }
        assert!(msg.contains("--skip-controller-version"));
    }

    #[test]
    fn test_empty_credential_counts_as_missing() {
        let result = ControllerCredentials::from_lookup(|_| Some(String::new()));
        assert!(matches!(result, Err(BenchError::Environment(_))));
    }
}
