//! State Accessor: managed-resource inventory
//!
//! Pulls the state document with `terraform state pull`, groups managed
//! resource instances by type and offers a structural filter that narrows a
//! state copy to a single type for isolated measurements.
//!
//! Data sources (`mode = "data"`) are read-only lookups that are not
//! refreshed like managed resources, so they are excluded from every
//! grouping and from filtered state copies.

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{BenchError, BenchResult};
use crate::runner::{args, CommandRunner};

/// Mode tag of read-only data lookups.
pub const DATA_MODE: &str = "data";

/// Parsed state document. Only the fields the engine needs are kept.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StateDocument {
    #[serde(default)]
    pub resources: Vec<ResourceRecord>,
}

/// One resource block recorded in state.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceRecord {
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default = "managed_mode")]
    pub mode: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub instances: Vec<InstanceRecord>,
}

fn managed_mode() -> String {
    "managed".to_string()
}

/// One deployed copy of a resource.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstanceRecord {
    /// `count` index (number) or `for_each` key (string)
    #[serde(default)]
    pub index_key: Option<Value>,
}

impl ResourceRecord {
    pub fn is_data(&self) -> bool {
        self.mode == DATA_MODE
    }

    /// Address of the resource block, without an instance key.
    pub fn address(&self) -> String {
        let mut addr = String::new();
        if let Some(module) = self.module.as_deref().filter(|m| !m.is_empty()) {
            addr.push_str(module);
            addr.push('.');
        }
        if self.is_data() {
            addr.push_str("data.");
        }
        addr.push_str(&self.resource_type);
        addr.push('.');
        addr.push_str(&self.name);
        addr
    }

    /// Addresses of every instance, in state order.
    pub fn instance_addresses(&self) -> Vec<String> {
        let base = self.address();
        self.instances
            .iter()
            .map(|instance| match &instance.index_key {
                Some(Value::Number(n)) => format!("{base}[{n}]"),
                Some(Value::String(key)) => format!("{base}[{key:?}]"),
                _ => base.clone(),
            })
            .collect()
    }
}

/// Managed instances of one resource type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceTypeGroup {
    pub name: String,
    pub instances: Vec<String>,
}

impl ResourceTypeGroup {
    pub fn count(&self) -> usize {
        self.instances.len()
    }
}

/// Raw state bytes together with their parsed form.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    pub raw: Vec<u8>,
    pub document: StateDocument,
}

impl StateSnapshot {
    pub fn parse(raw: Vec<u8>) -> BenchResult<Self> {
        let document = serde_json::from_slice(&raw).map_err(BenchError::StateParse)?;
        Ok(Self { raw, document })
    }

    /// Group managed instances by type, in order of first appearance.
    pub fn groups(&self) -> Vec<ResourceTypeGroup> {
        let mut groups: Vec<ResourceTypeGroup> = Vec::new();
        let mut skipped_data = 0usize;
        for record in &self.document.resources {
            if record.is_data() {
                skipped_data += record.instances.len();
                continue;
            }
            let addresses = record.instance_addresses();
            match groups.iter_mut().find(|g| g.name == record.resource_type) {
                Some(group) => group.instances.extend(addresses),
                None => groups.push(ResourceTypeGroup {
                    name: record.resource_type.clone(),
                    instances: addresses,
                }),
            }
        }
        if skipped_data > 0 {
            tracing::debug!(count = skipped_data, "excluded data source instances from inventory");
        }
        groups
    }

    /// Total managed instances across all groups.
    pub fn managed_instance_count(&self) -> usize {
        self.document
            .resources
            .iter()
            .filter(|r| !r.is_data())
            .map(|r| r.instances.len())
            .sum()
    }
}

/// Pulls state from the workspace through the command runner.
pub struct StateAccessor<'a> {
    runner: &'a dyn CommandRunner,
    workspace: &'a Path,
}

impl<'a> StateAccessor<'a> {
    pub fn new(runner: &'a dyn CommandRunner, workspace: &'a Path) -> Self {
        Self { runner, workspace }
    }

    /// Pull and parse the current state. Any failure here is fatal.
    pub async fn fetch(&self) -> BenchResult<StateSnapshot> {
        let raw = self
            .runner
            .run(self.workspace, &args(["state", "pull"]))
            .await
            .map_err(BenchError::StatePull)?;
        StateSnapshot::parse(raw)
    }
}

/// Copy of `raw` keeping only managed resources of `resource_type`.
///
/// Every other top-level field of the document (version, serial, lineage,
/// outputs) is preserved so the tool accepts the result as a state file.
pub fn filter_to_type(raw: &[u8], resource_type: &str) -> BenchResult<Vec<u8>> {
    let mut state: Value = serde_json::from_slice(raw)?;
    if let Some(resources) = state.get_mut("resources").and_then(Value::as_array_mut) {
        resources.retain(|record| {
            record.get("type").and_then(Value::as_str) == Some(resource_type)
                && record.get("mode").and_then(Value::as_str) != Some(DATA_MODE)
        });
    }
    Ok(serde_json::to_vec(&state)?)
}
