//! Node identity and the leased presence record written to the registry.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::Url;

/// A node's presence record: stored as JSON under
/// `services:<name>:<id>` while the node is alive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeInfo {
  /// Unique per process instance.
  pub id: String,
  pub name: String,
  pub version: String,
  #[serde(default)]
  pub metadata: HashMap<String, String>,
  /// Absolute URLs, e.g. `grpc://10.0.0.5:7000`.
  #[serde(default)]
  pub endpoints: Vec<Url>,
}

impl NodeInfo {
  pub fn new(id: impl Into<String>, name: impl Into<String>) -> NodeInfo {
    NodeInfo {
      id: id.into(),
      name: name.into(),
      ..NodeInfo::default()
    }
  }

  pub fn with_version(mut self, version: impl Into<String>) -> NodeInfo {
    self.version = version.into();
    self
  }

  pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> NodeInfo {
    self.metadata.insert(key.into(), value.into());
    self
  }

  /// Register an endpoint for `scheme` at `ip:port`.
  pub fn with_endpoint(mut self, scheme: &str, ip: &str, port: u16) -> NodeInfo {
    if let Ok(url) = Url::parse(&format!("{scheme}://{ip}:{port}")) {
      self.endpoints.push(url);
    }
    self
  }

  /// Registry key for this node.
  pub fn key(&self) -> String {
    format!("services:{}:{}", self.name, self.id)
  }

  /// Key pattern matching every node of a service.
  pub fn service_pattern(service: &str) -> String {
    format!("services:{service}:*")
  }

  /// JSON value stored under [`NodeInfo::key`].
  pub fn value(&self) -> String {
    serde_json::to_string(self).unwrap_or_default()
  }
}
