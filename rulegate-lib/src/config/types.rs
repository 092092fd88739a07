use serde::Deserialize;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use crate::net::{AccessLists, CidrBlock};
use crate::rules::RuleId;

/// Root configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Action returned when no rule matches
    /// Default: "accept"
    #[serde(default = "default_action")]
    pub default_action: String,
    /// Rules in evaluation order
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
    /// Named CIDR lists for `IP in <name>` predicates
    /// Supports CIDR notation: { office = ["192.168.0.0/16", "::1/128"] }
    #[serde(default)]
    #[serde(deserialize_with = "deserialize_access_lists")]
    pub access_lists: AccessLists,
    #[serde(default)]
    pub hit_table: HitTableConfig,
    #[serde(default)]
    pub parser_pool: ParserPoolConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// One rule as written by the operator
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RuleConfig {
    /// Caller assigned identifier, unique within the file
    pub id: RuleId,
    /// Rule text, e.g. `IP ~ 10.0.0.0/8 && Hits > 100 => reject`
    pub rule: String,
}

/// Hit table eviction
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct HitTableConfig {
    /// Entries without a hit for this long are removed by a sweep
    /// Default: 3600
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Seconds between sweeps, 0 disables the background sweeper
    /// Default: 60
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl HitTableConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

impl Default for HitTableConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Rule parser pool
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ParserPoolConfig {
    /// Maximum number of parser instances
    /// Default: 4
    #[serde(default = "default_pool_capacity")]
    pub capacity: usize,
    /// Milliseconds to wait for a parser when all are busy
    /// Default: none (wait indefinitely)
    #[serde(default)]
    pub acquire_timeout_ms: Option<u64>,
}

impl ParserPoolConfig {
    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for ParserPoolConfig {
    fn default() -> Self {
        Self { capacity: default_pool_capacity(), acquire_timeout_ms: None }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    /// Default: "info"
    /// Can be overridden at runtime via RUST_LOG environment variable
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Show module path (target) in log messages
    /// Default: false
    #[serde(default = "default_false")]
    pub show_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), show_target: default_false() }
    }
}

fn default_action() -> String {
    "accept".to_string()
}

fn default_idle_timeout_secs() -> u64 {
    3600
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_pool_capacity() -> usize {
    crate::rules::DEFAULT_POOL_CAPACITY
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_false() -> bool {
    false
}

/// Parse every list entry as a CIDR block, failing on the first bad one
fn deserialize_access_lists<'de, D>(deserializer: D) -> Result<AccessLists, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: BTreeMap<String, Vec<String>> = BTreeMap::deserialize(deserializer)?;
    let mut lists = AccessLists::new();

    for (name, entries) in raw {
        let mut blocks = Vec::with_capacity(entries.len());
        for s in entries {
            match CidrBlock::from_str(&s) {
                Ok(block) => blocks.push(block),
                Err(e) => {
                    return Err(serde::de::Error::custom(format!(
                        "Invalid CIDR block '{s}' in access list '{name}': {e}"
                    )));
                }
            }
        }
        lists.insert(name, blocks);
    }

    Ok(lists)
}
