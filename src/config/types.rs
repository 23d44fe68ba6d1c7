//! Configuration types for pathwarden
//!
//! This module defines the configuration structure that can be loaded from
//! TOML files and/or environment variables.

use crate::access_control::expression::DEFAULT_ROLE_PREFIX;
use crate::access_control::types::Decision;
use serde::Deserialize;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Engine defaults
    pub engine: EngineConfig,

    /// Role implications
    pub role_hierarchy: RoleHierarchyConfig,

    /// Ordered access rules, first match wins
    pub rules: Vec<RuleConfig>,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Engine-wide settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Decision when no rule matches. Unset means deny, but then at least
    /// one rule must be configured.
    pub default_decision: Option<Decision>,

    /// Prefix `hasRole` adds to bare role names
    pub role_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_decision: None,
            role_prefix: DEFAULT_ROLE_PREFIX.to_string(),
        }
    }
}

/// Role hierarchy, in text form, as explicit edges, or both
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RoleHierarchyConfig {
    /// `ROLE_A > ROLE_B` relations, one per line or `;`-separated
    pub hierarchy: String,

    /// `[superior, subordinate]` pairs
    pub edges: Vec<(String, String)>,
}

impl RoleHierarchyConfig {
    pub fn is_empty(&self) -> bool {
        self.hierarchy.trim().is_empty() && self.edges.is_empty()
    }
}

/// One `[[rules]]` entry
#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    /// Path pattern; omitted matches any request
    #[serde(default)]
    pub pattern: Option<String>,

    /// HTTP method the rule is restricted to
    #[serde(default)]
    pub method: Option<String>,

    /// Access expression, e.g. `hasRole('ADMIN')`
    pub access: String,

    #[serde(default = "default_case_sensitive")]
    pub case_sensitive: bool,

    #[serde(default)]
    pub scheme: Option<String>,

    #[serde(default)]
    pub host: Option<String>,
}

fn default_case_sensitive() -> bool {
    true
}

impl RuleConfig {
    /// A rule for `pattern` with everything else defaulted
    pub fn new(pattern: impl Into<String>, access: impl Into<String>) -> Self {
        Self {
            pattern: Some(pattern.into()),
            method: None,
            access: access.into(),
            case_sensitive: true,
            scheme: None,
            host: None,
        }
    }

    /// A catch-all rule
    pub fn any_request(access: impl Into<String>) -> Self {
        Self {
            pattern: None,
            ..Self::new("", access)
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_sensitive = false;
        self
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Output format (pretty, json)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output
    #[default]
    Pretty,
    /// JSON structured output
    Json,
}
