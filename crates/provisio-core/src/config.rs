//! provisio.toml configuration parser with environment overlay.
//!
//! The file is optional. Every key can also come from the process
//! environment, using the names existing deployments already set
//! (`dbName`, `maxAllowedThroughput`, ...). Environment
//! values win over the file. The resolved [`AutoscaleConfig`] is built
//! once at startup and handed to the engine by reference.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AutoscaleError, AutoscaleResult};
use crate::types::{ResourceId, SignalResolution, ThroughputPolicy};
use crate::window::WindowConfig;

/// Metric monitored when none is configured.
pub const DEFAULT_METRIC: &str = "Max RUs Per Second";

/// Scheduler interval when none is configured (every five minutes).
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawConfig {
    pub resource: Option<ResourceSection>,
    pub azure: Option<AzureSection>,
    pub policy: Option<PolicySection>,
    pub window: Option<WindowSection>,
    pub schedule: Option<ScheduleSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceSection {
    pub account: Option<String>,
    pub account_uri: Option<String>,
    pub auth_key: Option<String>,
    pub database: Option<String>,
    pub collection: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AzureSection {
    pub subscription_id: Option<String>,
    pub tenant_id: Option<String>,
    pub resource_group: Option<String>,
    pub application_id: Option<String>,
    pub application_secret: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicySection {
    pub min_throughput: Option<Setting>,
    pub max_throughput: Option<Setting>,
    pub throughput_step: Option<Setting>,
    pub resolution: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WindowSection {
    pub metric: Option<String>,
    pub lookback: Option<String>,
    pub offset: Option<String>,
    pub granularity: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleSection {
    pub interval: Option<String>,
}

/// A numeric setting that may arrive as a TOML integer or as text
/// (environment variables are always text).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Setting {
    Number(i64),
    Text(String),
}

impl Setting {
    fn as_u64(&self, name: &str) -> AutoscaleResult<u64> {
        let parsed = match self {
            Setting::Number(n) => u64::try_from(*n).ok(),
            Setting::Text(s) => s.trim().parse::<u64>().ok(),
        };
        parsed.ok_or_else(|| AutoscaleError::ConfigurationMissing(name.to_string()))
    }
}

/// Everything the control loop needs for one resource.
#[derive(Debug, Clone, PartialEq)]
pub struct AutoscaleConfig {
    pub resource: ResourceId,
    pub policy: ThroughputPolicy,
    pub window: WindowConfig,
    pub resolution: SignalResolution,
    pub metric: String,
    pub interval: Duration,
}

impl AutoscaleConfig {
    /// Config with default window, metric, resolution, and interval.
    pub fn new(resource: ResourceId, policy: ThroughputPolicy) -> Self {
        Self {
            resource,
            policy,
            window: WindowConfig::default(),
            resolution: SignalResolution::default(),
            metric: DEFAULT_METRIC.to_string(),
            interval: DEFAULT_INTERVAL,
        }
    }
}

/// Credentials and addresses for the cloud collaborators.
#[derive(Clone, PartialEq)]
pub struct AzureSettings {
    pub subscription_id: String,
    pub tenant_id: String,
    pub resource_group: String,
    pub application_id: String,
    pub application_secret: String,
    pub account_uri: String,
    pub auth_key: String,
}

impl fmt::Debug for AzureSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureSettings")
            .field("subscription_id", &self.subscription_id)
            .field("tenant_id", &self.tenant_id)
            .field("resource_group", &self.resource_group)
            .field("application_id", &self.application_id)
            .field("application_secret", &"<redacted>")
            .field("account_uri", &self.account_uri)
            .field("auth_key", &"<redacted>")
            .finish()
    }
}

impl RawConfig {
    pub fn from_file(path: &Path) -> AutoscaleResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AutoscaleError::ConfigurationMissing(format!("{}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> AutoscaleResult<Self> {
        toml::from_str(content)
            .map_err(|e| AutoscaleError::InvalidConfiguration(format!("provisio.toml: {e}")))
    }

    pub fn to_toml_string(&self) -> AutoscaleResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| AutoscaleError::InvalidConfiguration(e.to_string()))
    }

    /// Overlay environment values onto the file values.
    ///
    /// `lookup` is usually `|k| std::env::var(k).ok()`. Empty values count
    /// as unset.
    pub fn overlay_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let resource = self.resource.get_or_insert_with(Default::default);
        set(&mut resource.account, get("accountName"));
        set(&mut resource.account_uri, get("accountUri"));
        set(&mut resource.auth_key, get("authKey"));
        set(&mut resource.database, get("dbName"));
        set(&mut resource.collection, get("collName"));

        let azure = self.azure.get_or_insert_with(Default::default);
        set(&mut azure.subscription_id, get("subscriptionId"));
        set(&mut azure.tenant_id, get("tenantId"));
        set(&mut azure.resource_group, get("resourceGroupName"));
        set(&mut azure.application_id, get("applicationId"));
        set(&mut azure.application_secret, get("applicationPwd"));

        let policy = self.policy.get_or_insert_with(Default::default);
        set(&mut policy.min_throughput, get("minAllowedThroughput").map(Setting::Text));
        set(&mut policy.max_throughput, get("maxAllowedThroughput").map(Setting::Text));
        set(&mut policy.throughput_step, get("throughputStep").map(Setting::Text));
        set(&mut policy.resolution, get("signalResolution"));

        let window = self.window.get_or_insert_with(Default::default);
        set(&mut window.metric, get("metricName"));
        set(&mut window.lookback, get("lookback"));
        set(&mut window.offset, get("lagOffset"));
        set(&mut window.granularity, get("granularity"));

        let schedule = self.schedule.get_or_insert_with(Default::default);
        set(&mut schedule.interval, get("runInterval"));

        self
    }

    /// Resolve the control-loop settings, failing fast on anything
    /// missing, non-numeric, or inconsistent.
    pub fn resolve(&self) -> AutoscaleResult<AutoscaleConfig> {
        let resource = self.resource.clone().unwrap_or_default();
        let id = ResourceId {
            account: required(resource.account, "accountName")?,
            database: required(resource.database, "dbName")?,
            collection: required(resource.collection, "collName")?,
        };

        let policy_section = self.policy.clone().unwrap_or_default();
        let min = required(policy_section.min_throughput, "minAllowedThroughput")?
            .as_u64("minAllowedThroughput")?;
        let max = required(policy_section.max_throughput, "maxAllowedThroughput")?
            .as_u64("maxAllowedThroughput")?;
        let step = required(policy_section.throughput_step, "throughputStep")?
            .as_u64("throughputStep")?;
        let policy = ThroughputPolicy::new(min, max, step)?;

        let resolution = match policy_section.resolution.as_deref() {
            Some(s) => s.parse()?,
            None => SignalResolution::default(),
        };

        let window_section = self.window.clone().unwrap_or_default();
        let defaults = WindowConfig::default();
        let window = WindowConfig {
            lookback: duration_or(window_section.lookback.as_deref(), "lookback", defaults.lookback)?,
            offset: duration_or(window_section.offset.as_deref(), "lagOffset", defaults.offset)?,
            granularity: duration_or(
                window_section.granularity.as_deref(),
                "granularity",
                defaults.granularity,
            )?,
        };
        window.validate()?;

        let interval = duration_or(
            self.schedule.as_ref().and_then(|s| s.interval.as_deref()),
            "runInterval",
            DEFAULT_INTERVAL,
        )?;
        if interval.is_zero() {
            return Err(AutoscaleError::InvalidConfiguration(
                "runInterval must be greater than zero".to_string(),
            ));
        }

        Ok(AutoscaleConfig {
            resource: id,
            policy,
            window,
            resolution,
            metric: window_section.metric.unwrap_or_else(|| DEFAULT_METRIC.to_string()),
            interval,
        })
    }

    /// Resolve the cloud credentials. Only needed when talking to the
    /// real services.
    pub fn azure_settings(&self) -> AutoscaleResult<AzureSettings> {
        let resource = self.resource.clone().unwrap_or_default();
        let azure = self.azure.clone().unwrap_or_default();
        Ok(AzureSettings {
            subscription_id: required(azure.subscription_id, "subscriptionId")?,
            tenant_id: required(azure.tenant_id, "tenantId")?,
            resource_group: required(azure.resource_group, "resourceGroupName")?,
            application_id: required(azure.application_id, "applicationId")?,
            application_secret: required(azure.application_secret, "applicationPwd")?,
            account_uri: required(resource.account_uri, "accountUri")?,
            auth_key: required(resource.auth_key, "authKey")?,
        })
    }

    /// Scaffold a provisio.toml with the non-secret keys filled in.
    /// Secrets are left for the environment.
    pub fn scaffold(account: &str, database: &str, collection: &str) -> Self {
        RawConfig {
            resource: Some(ResourceSection {
                account: Some(account.to_string()),
                account_uri: Some(format!("https://{account}.documents.azure.com:443/")),
                auth_key: None,
                database: Some(database.to_string()),
                collection: Some(collection.to_string()),
            }),
            azure: Some(AzureSection::default()),
            policy: Some(PolicySection {
                min_throughput: Some(Setting::Number(400)),
                max_throughput: Some(Setting::Number(10_000)),
                throughput_step: Some(Setting::Number(100)),
                resolution: Some("independent".to_string()),
            }),
            window: Some(WindowSection {
                metric: Some(DEFAULT_METRIC.to_string()),
                lookback: Some("1h".to_string()),
                offset: Some("10m".to_string()),
                granularity: Some("1h".to_string()),
            }),
            schedule: Some(ScheduleSection {
                interval: Some("5m".to_string()),
            }),
        }
    }
}

fn set<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

fn required<T>(value: Option<T>, name: &str) -> AutoscaleResult<T> {
    value.ok_or_else(|| AutoscaleError::ConfigurationMissing(name.to_string()))
}

fn duration_or(value: Option<&str>, name: &str, default: Duration) -> AutoscaleResult<Duration> {
    match value {
        Some(s) => parse_duration(s).ok_or_else(|| {
            AutoscaleError::InvalidConfiguration(format!("{name}: cannot parse duration {s:?}"))
        }),
        None => Ok(default),
    }
}

/// Parse `"30s"`, `"10m"`, `"1h"`, `"2d"`, bare seconds, or a simple
/// ISO-8601 duration such as `"PT1H"`.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(iso) = s.strip_prefix("PT").or_else(|| s.strip_prefix("pt")) {
        return parse_duration(iso);
    }
    let (digits, unit) = match s.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
        Some((idx, _)) => s.split_at(idx),
        None => (s, ""),
    };
    let value: u64 = digits.parse().ok()?;
    let multiplier = match unit.to_ascii_lowercase().as_str() {
        "" | "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86_400,
        _ => return None,
    };
    value.checked_mul(multiplier).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    fn full_env() -> Vec<(&'static str, &'static str)> {
        vec![
            ("subscriptionId", "sub-1"),
            ("tenantId", "tenant-1"),
            ("applicationId", "app-1"),
            ("applicationPwd", "hunter2"),
            ("resourceGroupName", "rg"),
            ("accountName", "acct"),
            ("accountUri", "https://acct.documents.azure.com:443/"),
            ("authKey", "a2V5"),
            ("dbName", "db"),
            ("collName", "coll"),
            ("maxAllowedThroughput", "10000"),
            ("minAllowedThroughput", "400"),
            ("throughputStep", "100"),
        ]
    }

    #[test]
    fn resolve_from_env_only() {
        let raw = RawConfig::default().overlay_env(env(&full_env()));
        let config = raw.resolve().unwrap();

        assert_eq!(config.resource, ResourceId::new("acct", "db", "coll"));
        assert_eq!(config.policy, ThroughputPolicy { min: 400, max: 10_000, step: 100 });
        assert_eq!(config.window, WindowConfig::default());
        assert_eq!(config.interval, DEFAULT_INTERVAL);
        assert_eq!(config.metric, DEFAULT_METRIC);
        assert_eq!(config.resolution, SignalResolution::Independent);

        let azure = raw.azure_settings().unwrap();
        assert_eq!(azure.tenant_id, "tenant-1");
        assert!(!format!("{azure:?}").contains("hunter2"));
    }

    #[test]
    fn missing_policy_value_fails_fast() {
        let vars: Vec<_> = full_env()
            .into_iter()
            .filter(|(k, _)| *k != "throughputStep")
            .collect();
        let err = RawConfig::default().overlay_env(env(&vars)).resolve().unwrap_err();
        assert!(matches!(err, AutoscaleError::ConfigurationMissing(ref n) if n == "throughputStep"));
    }

    #[test]
    fn non_numeric_policy_value_fails_fast() {
        let mut vars = full_env();
        vars.retain(|(k, _)| *k != "maxAllowedThroughput");
        vars.push(("maxAllowedThroughput", "lots"));
        let err = RawConfig::default().overlay_env(env(&vars)).resolve().unwrap_err();
        assert!(matches!(err, AutoscaleError::ConfigurationMissing(ref n) if n == "maxAllowedThroughput"));
    }

    #[test]
    fn empty_env_value_counts_as_unset() {
        let mut vars = full_env();
        vars.retain(|(k, _)| *k != "dbName");
        vars.push(("dbName", "  "));
        let err = RawConfig::default().overlay_env(env(&vars)).resolve().unwrap_err();
        assert!(matches!(err, AutoscaleError::ConfigurationMissing(ref n) if n == "dbName"));
    }

    #[test]
    fn inverted_bounds_rejected() {
        let mut vars = full_env();
        vars.retain(|(k, _)| *k != "minAllowedThroughput");
        vars.push(("minAllowedThroughput", "20000"));
        let err = RawConfig::default().overlay_env(env(&vars)).resolve().unwrap_err();
        assert!(matches!(err, AutoscaleError::InvalidConfiguration(_)));
    }

    #[test]
    fn parse_file_with_env_override() {
        let toml_str = r#"
[resource]
account = "acct"
database = "db"
collection = "orders"

[policy]
min_throughput = 400
max_throughput = 4000
throughput_step = 200
resolution = "busy-wins"

[window]
lookback = "30m"
offset = "5m"
granularity = "PT5M"

[schedule]
interval = "2m"
"#;
        let raw = RawConfig::from_toml_str(toml_str)
            .unwrap()
            .overlay_env(env(&[("maxAllowedThroughput", "8000")]));
        let config = raw.resolve().unwrap();

        assert_eq!(config.resource.collection, "orders");
        assert_eq!(config.policy.max, 8000);
        assert_eq!(config.policy.step, 200);
        assert_eq!(config.resolution, SignalResolution::BusyWins);
        assert_eq!(config.window.lookback, Duration::from_secs(1800));
        assert_eq!(config.window.offset, Duration::from_secs(300));
        assert_eq!(config.window.granularity, Duration::from_secs(300));
        assert_eq!(config.interval, Duration::from_secs(120));
    }

    #[test]
    fn file_round_trip_via_tempfile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("provisio.toml");
        let scaffold = RawConfig::scaffold("acct", "db", "coll");
        std::fs::write(&path, scaffold.to_toml_string().unwrap()).unwrap();

        let config = RawConfig::from_file(&path).unwrap().resolve().unwrap();
        assert_eq!(config.policy, ThroughputPolicy { min: 400, max: 10_000, step: 100 });
        assert_eq!(config.window, WindowConfig::default());
    }

    #[test]
    fn missing_file_is_configuration_missing() {
        let err = RawConfig::from_file(Path::new("/nonexistent/provisio.toml")).unwrap_err();
        assert!(matches!(err, AutoscaleError::ConfigurationMissing(_)));
    }

    #[test]
    fn zero_offset_rejected_at_resolve() {
        let mut vars = full_env();
        vars.push(("lagOffset", "0s"));
        let err = RawConfig::default().overlay_env(env(&vars)).resolve().unwrap_err();
        assert!(matches!(err, AutoscaleError::InvalidConfiguration(_)));
    }

    #[test]
    fn parse_duration_values() {
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("PT1H"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("90"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("invalid"), None);
        assert_eq!(parse_duration("5w"), None);
    }
}
