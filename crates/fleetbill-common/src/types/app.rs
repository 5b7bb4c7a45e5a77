//! Deployed application identity across metric key spaces

use serde::{Deserialize, Serialize};

/// An application to be cost-estimated, with the identifier it carries
/// in each metric source
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppTarget {
    /// Human app name
    pub app_name: String,
    /// Worker script identifier
    pub script_id: String,
    /// Durable Object namespace (if the app has one)
    #[serde(default)]
    pub namespace_id: Option<String>,
    /// Container application (if the app ever deployed a container)
    #[serde(default)]
    pub application_id: Option<String>,
}

impl AppTarget {
    pub fn new(app_name: impl Into<String>, script_id: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            script_id: script_id.into(),
            namespace_id: None,
            application_id: None,
        }
    }

    /// Derive the app from a prefixed script id, e.g. `flarepilot-api` → `api`
    pub fn from_script_id(script_id: &str, prefix: &str) -> Option<Self> {
        script_id
            .strip_prefix(prefix)
            .filter(|name| !name.is_empty())
            .map(|name| Self::new(name, script_id))
    }

    pub fn with_namespace(mut self, namespace_id: impl Into<String>) -> Self {
        self.namespace_id = Some(namespace_id.into());
        self
    }

    pub fn with_application(mut self, application_id: impl Into<String>) -> Self {
        self.application_id = Some(application_id.into());
        self
    }
}

/// Identifier lists per key space, in target order, skipping absent ids
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetKeys {
    pub script_ids: Vec<String>,
    pub namespace_ids: Vec<String>,
    pub application_ids: Vec<String>,
}

impl TargetKeys {
    pub fn from_targets(targets: &[AppTarget]) -> Self {
        Self {
            script_ids: targets.iter().map(|t| t.script_id.clone()).collect(),
            namespace_ids: targets.iter().filter_map(|t| t.namespace_id.clone()).collect(),
            application_ids: targets
                .iter()
                .filter_map(|t| t.application_id.clone())
                .collect(),
        }
    }
}
