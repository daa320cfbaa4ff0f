//! Configuration loading and validation.
//!
//! The core consumes a resolved [`Config`] handed in at startup: listen port,
//! upstream resolver, and the declarative rule list. File values can be
//! overridden by CLI flags and the `REWIRE_PORT` environment variable.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use hickory_proto::rr::RecordType;
use serde::Deserialize;
use tracing::info;

use crate::dns::{Rule, RuleSet};
use crate::error::{ConfigError, Result};

/// Default port to serve DNS queries on.
pub const DEFAULT_PORT: u16 = 53;

/// Default upstream resolver for forwarded queries.
pub const DEFAULT_RESOLVER: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)), 53);

/// Config file looked up in the working directory and the home directory.
pub const CONFIG_FILE_NAME: &str = ".rewire.toml";

/// Pattern installed when `always` is set: matches any name that starts with
/// an alphanumeric character, i.e. effectively every real query.
pub const ALWAYS_PATTERN: &str = "^[a-z0-9]";

const fn default_port() -> u16 {
    DEFAULT_PORT
}

const fn default_resolver() -> SocketAddr {
    DEFAULT_RESOLVER
}

const fn default_upstream_timeout_ms() -> u64 {
    5000
}

/// Main configuration for the rewire DNS server.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Port to bind the UDP listener on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Upstream DNS resolver address (e.g., "1.1.1.1:53").
    #[serde(
        default = "default_resolver",
        deserialize_with = "deserialize_socket_addr"
    )]
    pub resolver: SocketAddr,

    /// Deadline for a single upstream exchange, in milliseconds.
    #[serde(default = "default_upstream_timeout_ms")]
    pub upstream_timeout_ms: u64,

    /// Ordered override rules; earlier rules win.
    #[serde(default)]
    pub rules: Vec<RuleConfig>,

    /// When set, replaces the rule list with a single always-matching rule
    /// answering with this address.
    #[serde(default)]
    pub always: Option<IpAddr>,
}

/// Declarative form of one override rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    /// Regular expression matched anywhere in the queried name.
    pub pattern: String,

    /// Address to answer with when the pattern matches.
    pub address: IpAddr,

    /// Reserved per-rule record type; accepted and validated but not yet
    /// consulted by matching.
    #[serde(default)]
    pub qtype: Option<String>,
}

/// Values taken from CLI flags or the environment that beat file values.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub resolver: Option<SocketAddr>,
    pub always: Option<IpAddr>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            resolver: default_resolver(),
            upstream_timeout_ms: default_upstream_timeout_ms(),
            rules: Vec::new(),
            always: None,
        }
    }
}

fn deserialize_socket_addr<'de, D>(deserializer: D) -> std::result::Result<SocketAddr, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Locate and load the configuration file.
    ///
    /// An explicit path must exist; otherwise the working directory is
    /// checked first, then the home directory, then built-in defaults apply.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            info!(path = %path.display(), "using config file");
            return Self::load(path);
        }

        let candidates = [
            Some(PathBuf::from(CONFIG_FILE_NAME)),
            std::env::var_os("HOME").map(|home| PathBuf::from(home).join(CONFIG_FILE_NAME)),
        ];

        for path in candidates.into_iter().flatten() {
            if path.is_file() {
                info!(path = %path.display(), "using config file");
                return Self::load(path);
            }
        }

        info!("no config file found, using defaults");
        Ok(Self::default())
    }

    /// Apply CLI/environment overrides on top of file values.
    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(resolver) = overrides.resolver {
            self.resolver = resolver;
        }
        if let Some(always) = overrides.always {
            self.always = Some(always);
        }
    }

    /// Build the compiled rule set.
    ///
    /// `always` collapses the configured rules to a single always-matching
    /// rule. Pattern compilation failures are fatal here, before serving
    /// starts.
    pub fn rule_set(&self) -> Result<RuleSet> {
        if let Some(address) = self.always {
            let rule = Rule::new(ALWAYS_PATTERN, address, None)?;
            return Ok(RuleSet::new(vec![rule]));
        }

        let mut rules = Vec::with_capacity(self.rules.len());
        for rule in &self.rules {
            let qtype = match rule.qtype.as_deref() {
                Some(qtype) => Some(RecordType::from_str(qtype).map_err(|err| {
                    ConfigError::Validation(format!("invalid qtype {qtype:?}: {err}"))
                })?),
                None => None,
            };
            rules.push(Rule::new(&rule.pattern, rule.address, qtype)?);
        }

        Ok(RuleSet::new(rules))
    }

    /// Deadline for one upstream exchange.
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<()> {
        if self.upstream_timeout_ms == 0 {
            return Err(ConfigError::Validation("upstream_timeout_ms must be > 0".into()).into());
        }

        for rule in &self.rules {
            if rule.pattern.is_empty() {
                return Err(ConfigError::Validation("empty rule pattern".into()).into());
            }
        }

        Ok(())
    }
}
