//! Region configuration
//!
//! Values are read once per process and cached; every key has a fixed
//! fallback so a node with no configuration at all runs as a single
//! `local` region that is also the primary.

use std::fs;
use std::path::Path;
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::Region;

/// Region used when none is configured
pub const DEFAULT_REGION: &str = "local";
/// Default timeout for routed calls
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(5000);
/// Timeout for the capability probe sent to joining members
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(3000);

pub const ENV_REGION: &str = "REAM_REGION";
pub const ENV_PRIMARY_REGION: &str = "REAM_PRIMARY_REGION";
pub const ENV_VERBOSE: &str = "REAM_REGION_VERBOSE";
pub const ENV_CALL_TIMEOUT_MS: &str = "REAM_REGION_CALL_TIMEOUT_MS";

static GLOBAL: OnceCell<RegionConfig> = OnceCell::new();

/// Region settings of this process
#[derive(Debug, Clone, PartialEq)]
pub struct RegionConfig {
    /// Region this process runs in
    pub region: Region,
    /// Region designated as primary
    pub primary_region: Region,
    /// Log every routed call
    pub verbose: bool,
    /// Timeout for routed calls without an explicit one
    pub call_timeout: Duration,
    /// Timeout for the capability probe
    pub probe_timeout: Duration,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            region: Region::new(DEFAULT_REGION),
            primary_region: Region::new(DEFAULT_REGION),
            verbose: false,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            probe_timeout: PROBE_TIMEOUT,
        }
    }
}

/// On-disk shape of the config file
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    region: Option<String>,
    primary_region: Option<String>,
    verbose: Option<bool>,
    call_timeout_ms: Option<u64>,
    probe_timeout_ms: Option<u64>,
}

impl RegionConfig {
    /// Config for a node in `region` with the given primary
    pub fn new(region: impl Into<Region>, primary_region: impl Into<Region>) -> Self {
        Self {
            region: region.into(),
            primary_region: primary_region.into(),
            ..Self::default()
        }
    }

    /// Enable or disable per-call logging
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Set the default timeout for routed calls
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set the capability probe timeout
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Read the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Blank values fall back.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();
        if let Some(region) = read(ENV_REGION) {
            config.region = Region::new(region);
        }
        if let Some(primary) = read(ENV_PRIMARY_REGION) {
            config.primary_region = Region::new(primary);
        }
        if let Some(flag) = read(ENV_VERBOSE) {
            config.verbose = parse_flag(&flag);
        }
        if let Some(raw) = read(ENV_CALL_TIMEOUT_MS) {
            match raw.parse::<u64>() {
                Ok(ms) => config.call_timeout = Duration::from_millis(ms),
                Err(_) => tracing::warn!(
                    key = ENV_CALL_TIMEOUT_MS,
                    value = %raw,
                    "ignoring unparsable call timeout"
                ),
            }
        }
        config
    }

    /// Parse a TOML document; missing keys fall back
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(content)?;
        let defaults = Self::default();

        Ok(Self {
            region: file.region.map(Region::new).unwrap_or(defaults.region),
            primary_region: file
                .primary_region
                .map(Region::new)
                .unwrap_or(defaults.primary_region),
            verbose: file.verbose.unwrap_or(defaults.verbose),
            call_timeout: file
                .call_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.call_timeout),
            probe_timeout: file
                .probe_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.probe_timeout),
        })
    }

    /// Load a TOML config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Process-wide config, read from the environment on first use
    pub fn global() -> &'static RegionConfig {
        GLOBAL.get_or_init(Self::from_env)
    }

    /// Install the process-wide config. Returns the rejected value if the
    /// config was already read.
    pub fn init_global(config: RegionConfig) -> Result<(), RegionConfig> {
        GLOBAL.set(config)
    }

    /// Whether this process runs in the primary region
    pub fn is_own_region_primary(&self) -> bool {
        self.region == self.primary_region
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_fallbacks() {
        let config = RegionConfig::from_lookup(|_| None);
        assert_eq!(config.region, Region::new("local"));
        assert_eq!(config.primary_region, Region::new("local"));
        assert!(!config.verbose);
        assert_eq!(config.call_timeout, Duration::from_millis(5000));
        assert_eq!(config.probe_timeout, Duration::from_millis(3000));
        assert!(config.is_own_region_primary());
    }

    #[test]
    fn test_env_values() {
        let config = RegionConfig::from_lookup(lookup_from(&[
            (ENV_REGION, "hkg"),
            (ENV_PRIMARY_REGION, "ams"),
            (ENV_VERBOSE, "TRUE"),
            (ENV_CALL_TIMEOUT_MS, "750"),
        ]));
        assert_eq!(config.region, Region::new("hkg"));
        assert_eq!(config.primary_region, Region::new("ams"));
        assert!(config.verbose);
        assert_eq!(config.call_timeout, Duration::from_millis(750));
        assert!(!config.is_own_region_primary());
    }

    #[test]
    fn test_blank_and_bad_values_fall_back() {
        let config = RegionConfig::from_lookup(lookup_from(&[
            (ENV_REGION, "  "),
            (ENV_VERBOSE, "nope"),
            (ENV_CALL_TIMEOUT_MS, "soon"),
        ]));
        assert_eq!(config.region, Region::new("local"));
        assert!(!config.verbose);
        assert_eq!(config.call_timeout, DEFAULT_CALL_TIMEOUT);
    }

    #[test]
    fn test_toml_partial() {
        let config = RegionConfig::from_toml_str("region = \"sin\"\nverbose = true\n").unwrap();
        assert_eq!(config.region, Region::new("sin"));
        assert_eq!(config.primary_region, Region::new("local"));
        assert!(config.verbose);
    }

    #[test]
    fn test_toml_rejects_garbage() {
        assert!(RegionConfig::from_toml_str("region = [").is_err());
        assert!(RegionConfig::from_toml_str("colour = \"blue\"").is_err());
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "region = \"fra\"\nprimary_region = \"fra\"").unwrap();
        writeln!(file, "call_timeout_ms = 1200\nprobe_timeout_ms = 800").unwrap();

        let config = RegionConfig::load(file.path()).unwrap();
        assert_eq!(config.region, Region::new("fra"));
        assert!(config.is_own_region_primary());
        assert_eq!(config.call_timeout, Duration::from_millis(1200));
        assert_eq!(config.probe_timeout, Duration::from_millis(800));
    }

    #[test]
    fn test_missing_file() {
        let err = RegionConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
