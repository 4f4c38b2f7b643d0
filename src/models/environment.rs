//! Deployment environment model.

use crate::models::node::DeployEnvironment;
use serde::{Deserialize, Serialize};

/// A deployment target that releases can be rolled out to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub env_type: DeployEnvironment,
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub requires_approval: bool,
    #[serde(default)]
    pub approvers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_url: Option<String>,
    /// Free-form per-environment settings.
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
    /// Last reported health, e.g. `healthy`.
    #[serde(default = "default_health")]
    pub status: String,
}

fn default_health() -> String {
    "healthy".to_string()
}
