//! App discovery
//!
//! Resolves the fleet to estimate: every worker script carrying the app
//! prefix is an app, joined with its Durable Object namespace and its
//! container application (either may be absent).

use crate::config::{DEFAULT_DO_CLASS, DEFAULT_SCRIPT_PREFIX};
use async_trait::async_trait;
use fleetbill_common::{AppTarget, FleetBillError, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, instrument};

const INVENTORY_SOURCE: &str = "inventory";

/// Supplier of the deployed app list
#[async_trait]
pub trait AppDirectory: Send + Sync {
    /// All deployed apps, sorted by name
    async fn list_apps(&self) -> Result<Vec<AppTarget>>;
}

/// Narrow the fleet to one app, or keep it whole.
///
/// An empty fleet is `NoApps`; an unknown app name is `AppNotFound`.
pub fn select_targets(apps: Vec<AppTarget>, app: Option<&str>) -> Result<Vec<AppTarget>> {
    if apps.is_empty() {
        return Err(FleetBillError::NoApps);
    }
    match app {
        None => Ok(apps),
        Some(name) => apps
            .into_iter()
            .find(|t| t.app_name == name)
            .map(|t| vec![t])
            .ok_or_else(|| FleetBillError::AppNotFound(name.to_string())),
    }
}

/// Fixed app list
#[derive(Debug, Clone, Default)]
pub struct StaticAppDirectory {
    apps: Vec<AppTarget>,
}

impl StaticAppDirectory {
    pub fn new(mut apps: Vec<AppTarget>) -> Self {
        apps.sort_by(|a, b| a.app_name.cmp(&b.app_name));
        Self { apps }
    }
}

#[async_trait]
impl AppDirectory for StaticAppDirectory {
    async fn list_apps(&self) -> Result<Vec<AppTarget>> {
        Ok(self.apps.clone())
    }
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    #[serde(default = "Vec::new")]
    result: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ScriptEntry {
    id: String,
}

#[derive(Debug, Deserialize)]
struct NamespaceEntry {
    id: String,
    script: Option<String>,
    class: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContainerAppEntry {
    id: String,
    name: String,
}

/// REST-backed directory over the account API
pub struct ApiAppDirectory {
    client: reqwest::Client,
    api_base: String,
    account_id: String,
    api_token: String,
    script_prefix: String,
    do_class: String,
}

impl fmt::Debug for ApiAppDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiAppDirectory")
            .field("api_base", &self.api_base)
            .field("account_id", &self.account_id)
            .field("script_prefix", &self.script_prefix)
            .field("do_class", &self.do_class)
            .finish_non_exhaustive()
    }
}

impl ApiAppDirectory {
    pub fn new(
        api_base: impl Into<String>,
        account_id: impl Into<String>,
        api_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("fleetbill/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| FleetBillError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            account_id: account_id.into(),
            api_token: api_token.into(),
            script_prefix: DEFAULT_SCRIPT_PREFIX.to_string(),
            do_class: DEFAULT_DO_CLASS.to_string(),
        })
    }

    /// Prefix identifying managed worker scripts
    pub fn with_script_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.script_prefix = prefix.into();
        self
    }

    /// Durable Object class bound by every app
    pub fn with_do_class(mut self, class: impl Into<String>) -> Self {
        self.do_class = class.into();
        self
    }

    async fn get_list<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let url = format!("{}/accounts/{}{}", self.api_base, self.account_id, path);
        let upstream = |reason: String| {
            FleetBillError::upstream(INVENTORY_SOURCE, format!("GET {}: {}", path, reason))
        };

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| upstream(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(upstream(format!("HTTP {} {}", status.as_u16(), text)));
        }

        let envelope: ApiEnvelope<T> = response
            .json()
            .await
            .map_err(|e| upstream(format!("invalid response body: {}", e)))?;
        Ok(envelope.result)
    }

    fn join(
        &self,
        scripts: Vec<ScriptEntry>,
        namespaces: Vec<NamespaceEntry>,
        containers: Vec<ContainerAppEntry>,
    ) -> Vec<AppTarget> {
        let namespace_by_script: HashMap<String, String> = namespaces
            .into_iter()
            .filter(|ns| ns.class.as_deref() == Some(self.do_class.as_str()))
            .filter_map(|ns| ns.script.map(|script| (script, ns.id)))
            .collect();
        let container_by_name: HashMap<String, String> =
            containers.into_iter().map(|c| (c.name, c.id)).collect();

        let mut apps: Vec<AppTarget> = scripts
            .into_iter()
            .filter_map(|s| AppTarget::from_script_id(&s.id, &self.script_prefix))
            .map(|mut app| {
                app.namespace_id = namespace_by_script.get(&app.script_id).cloned();
                app.application_id = container_by_name.get(&app.script_id).cloned();
                app
            })
            .collect();
        apps.sort_by(|a, b| a.app_name.cmp(&b.app_name));
        apps
    }
}

#[async_trait]
impl AppDirectory for ApiAppDirectory {
    #[instrument(skip(self), fields(prefix = %self.script_prefix))]
    async fn list_apps(&self) -> Result<Vec<AppTarget>> {
        let (scripts, namespaces, containers) = tokio::try_join!(
            self.get_list::<ScriptEntry>("/workers/scripts"),
            self.get_list::<NamespaceEntry>("/workers/durable_objects/namespaces"),
            self.get_list::<ContainerAppEntry>("/containers/applications"),
        )?;
        debug!(
            scripts = scripts.len(),
            namespaces = namespaces.len(),
            containers = containers.len(),
            "Listed account resources"
        );

        let apps = self.join(scripts, namespaces, containers);
        info!(apps = apps.len(), "Discovered apps");
        Ok(apps)
    }
}
