//! FleetBill configuration

use crate::metering::AggregatorConfig;
use fleetbill_common::{FleetBillError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

/// Default account API base
pub const DEFAULT_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default managed-script prefix
pub const DEFAULT_SCRIPT_PREFIX: &str = "flarepilot-";

/// Default Durable Object class bound by each app
pub const DEFAULT_DO_CLASS: &str = "AppContainer";

/// FleetBill service configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct FleetBillConfig {
    /// Account API base URL (GraphQL lives at `{api_base}/graphql`)
    pub api_base: String,
    /// Account identifier
    pub account_id: String,
    /// API bearer token
    #[serde(skip_serializing)]
    pub api_token: String,
    /// Worker script prefix identifying managed apps
    pub script_prefix: String,
    /// Durable Object class name bound by each app
    pub do_class: String,
    /// Period selector (`Nd`, `YYYY-MM-DD`, or month-to-date when absent)
    pub since: Option<String>,
    /// Restrict the estimate to one app
    pub app: Option<String>,
    /// Optional JSON pricing overrides
    pub pricing_file: Option<PathBuf>,
    /// Billing constants for aggregation
    pub aggregator: AggregatorConfig,
    /// HTTP request timeout for the transport
    pub request_timeout_secs: u64,
}

impl std::fmt::Debug for FleetBillConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetBillConfig")
            .field("api_base", &self.api_base)
            .field("account_id", &self.account_id)
            .field("api_token", &"[redacted]")
            .field("script_prefix", &self.script_prefix)
            .field("do_class", &self.do_class)
            .field("since", &self.since)
            .field("app", &self.app)
            .field("pricing_file", &self.pricing_file)
            .field("aggregator", &self.aggregator)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Default for FleetBillConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            account_id: String::new(),
            api_token: String::new(),
            script_prefix: DEFAULT_SCRIPT_PREFIX.to_string(),
            do_class: DEFAULT_DO_CLASS.to_string(),
            since: None,
            app: None,
            pricing_file: None,
            aggregator: AggregatorConfig::default(),
            request_timeout_secs: 30,
        }
    }
}

/// Stored credentials (`{"accountId": ..., "apiToken": ...}`)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredCredentials {
    account_id: Option<String>,
    api_token: Option<String>,
}

impl FleetBillConfig {
    /// Load configuration from `.env`, the environment and stored credentials
    pub fn load() -> Result<Self> {
        // Try to load .env file
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an explicit variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut cfg = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(base) = non_empty("FLEETBILL_API_BASE") {
            cfg.api_base = base.trim_end_matches('/').to_string();
        }
        if let Some(account) = non_empty("FLEETBILL_ACCOUNT_ID") {
            cfg.account_id = account;
        }
        if let Some(token) = non_empty("FLEETBILL_API_TOKEN") {
            cfg.api_token = token;
        }
        if let Some(prefix) = non_empty("FLEETBILL_SCRIPT_PREFIX") {
            cfg.script_prefix = prefix;
        }
        if let Some(class) = non_empty("FLEETBILL_DO_CLASS") {
            cfg.do_class = class;
        }
        cfg.since = non_empty("FLEETBILL_SINCE");
        cfg.app = non_empty("FLEETBILL_APP");
        cfg.pricing_file = non_empty("FLEETBILL_PRICING_FILE").map(PathBuf::from);

        if let Some(val) = non_empty("FLEETBILL_MESSAGES_PER_REQUEST") {
            cfg.aggregator.messages_per_request = parse_number("FLEETBILL_MESSAGES_PER_REQUEST", &val)?;
        }
        if let Some(val) = non_empty("FLEETBILL_DO_MEMORY_MIB") {
            cfg.aggregator.do_memory_mib = parse_number("FLEETBILL_DO_MEMORY_MIB", &val)?;
        }
        if let Some(val) = non_empty("FLEETBILL_REQUEST_TIMEOUT_SECS") {
            cfg.request_timeout_secs = val.trim().parse().map_err(|_| {
                FleetBillError::Config(format!("FLEETBILL_REQUEST_TIMEOUT_SECS is not an integer: {}", val))
            })?;
        }

        if cfg.account_id.is_empty() || cfg.api_token.is_empty() {
            let path = non_empty("FLEETBILL_CREDENTIALS_FILE")
                .map(PathBuf::from)
                .or_else(|| non_empty("HOME").map(|home| PathBuf::from(home).join(".flarepilot/config.json")));
            if let Some(path) = path {
                cfg.apply_credentials_file(&path)?;
            }
        }

        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_credentials_file(&mut self, path: &std::path::Path) -> Result<()> {
        if !path.exists() {
            debug!(path = %path.display(), "No stored credentials");
            return Ok(());
        }
        let content = std::fs::read_to_string(path)?;
        let stored: StoredCredentials = serde_json::from_str(&content).map_err(|e| {
            FleetBillError::Config(format!("Invalid credentials file {}: {}", path.display(), e))
        })?;
        if self.account_id.is_empty() {
            self.account_id = stored.account_id.unwrap_or_default();
        }
        if self.api_token.is_empty() {
            self.api_token = stored.api_token.unwrap_or_default();
        }
        debug!(path = %path.display(), "Loaded stored credentials");
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.account_id.is_empty() || self.api_token.is_empty() {
            return Err(FleetBillError::Config(
                "Not authenticated: set FLEETBILL_ACCOUNT_ID and FLEETBILL_API_TOKEN".into(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(FleetBillError::Config("request timeout must be positive".into()));
        }
        self.aggregator.validate()
    }

    /// Analytics GraphQL endpoint
    pub fn graphql_endpoint(&self) -> String {
        format!("{}/graphql", self.api_base)
    }
}

fn parse_number(key: &str, value: &str) -> Result<f64> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| FleetBillError::Config(format!("{} is not a number: {}", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_load_from_variables() {
        let cfg = FleetBillConfig::from_lookup(lookup(&[
            ("FLEETBILL_ACCOUNT_ID", "acct"),
            ("FLEETBILL_API_TOKEN", "tok"),
            ("FLEETBILL_API_BASE", "http://localhost:9000/"),
            ("FLEETBILL_SINCE", "7d"),
            ("FLEETBILL_MESSAGES_PER_REQUEST", "25"),
        ]))
        .unwrap();

        assert_eq!(cfg.account_id, "acct");
        assert_eq!(cfg.graphql_endpoint(), "http://localhost:9000/graphql");
        assert_eq!(cfg.since.as_deref(), Some("7d"));
        assert_eq!(cfg.app, None);
        assert_eq!(cfg.aggregator.messages_per_request, 25.0);
        assert_eq!(cfg.aggregator.do_memory_mib, 128.0);
        assert_eq!(cfg.script_prefix, DEFAULT_SCRIPT_PREFIX);
    }

    #[test]
    fn test_missing_credentials_is_config_error() {
        let err = FleetBillConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, FleetBillError::Config(_)));
    }

    #[test]
    fn test_invalid_number_is_config_error() {
        let err = FleetBillConfig::from_lookup(lookup(&[
            ("FLEETBILL_ACCOUNT_ID", "acct"),
            ("FLEETBILL_API_TOKEN", "tok"),
            ("FLEETBILL_DO_MEMORY_MIB", "lots"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("FLEETBILL_DO_MEMORY_MIB"));
    }

    #[test]
    fn test_credentials_file_fallback() {
        let dir = std::env::temp_dir().join(format!("fleetbill-cfg-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, r#"{"accountId":"file-acct","apiToken":"file-tok"}"#).unwrap();

        let cfg = FleetBillConfig::from_lookup(lookup(&[
            ("FLEETBILL_CREDENTIALS_FILE", path.to_str().unwrap()),
            ("FLEETBILL_ACCOUNT_ID", "env-acct"),
        ]))
        .unwrap();

        assert_eq!(cfg.account_id, "env-acct");
        assert_eq!(cfg.api_token, "file-tok");
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_debug_redacts_token() {
        let cfg = FleetBillConfig {
            api_token: "hunter2".into(),
            ..Default::default()
        };
        assert!(!format!("{:?}", cfg).contains("hunter2"));
    }
}
