//! Access control resolver
//!
//! Walks the rule registry in registration order:
//! 1. Rules restricted to another HTTP method are skipped without touching the path
//! 2. Scheme and host constraints, then the path pattern
//! 3. The first matching rule's expression decides, evaluated against the
//!    hierarchy-expanded authorities and the captured path variables
//! 4. Nothing matched: the registry's default decision (deny unless configured)

use crate::access_control::expression::{AccessExpression, EvaluationContext, DEFAULT_ROLE_PREFIX};
use crate::access_control::hierarchy::RoleHierarchy;
use crate::access_control::patterns::PathPattern;
use crate::access_control::registry::{AccessRule, RequestMatcher, RuleRegistry};
use crate::access_control::types::{Decision, GrantedAuthorities, HttpMethod, RequestDescriptor};
use crate::config::{AppConfig, RuleConfig};
use crate::error::{AccessDeniedError, ConfigError};
use std::collections::HashMap;
use tracing::{debug, info, trace};

/// Access control resolver
///
/// Built once at startup and shared (`Arc<AccessResolver>`); every check
/// takes `&self` and never blocks.
#[derive(Debug, Clone)]
pub struct AccessResolver {
    registry: RuleRegistry,
    hierarchy: RoleHierarchy,
    role_prefix: String,
}

/// Result of one check with the details behind it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessOutcome {
    pub decision: Decision,
    /// Index of the rule that decided; `None` when the default applied
    pub rule: Option<usize>,
    /// Path variables captured by that rule
    pub variables: HashMap<String, String>,
}

impl AccessResolver {
    pub fn new(registry: RuleRegistry, hierarchy: RoleHierarchy) -> Self {
        Self {
            registry,
            hierarchy,
            role_prefix: DEFAULT_ROLE_PREFIX.to_string(),
        }
    }

    pub fn with_role_prefix(mut self, role_prefix: impl Into<String>) -> Self {
        self.role_prefix = role_prefix.into();
        self
    }

    /// Create a new resolver from configuration
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        let mut hierarchy = RoleHierarchy::parse(&config.role_hierarchy.hierarchy)?;
        for (superior, subordinate) in &config.role_hierarchy.edges {
            hierarchy.add_edge(superior, subordinate)?;
        }

        let rules = config
            .rules
            .iter()
            .enumerate()
            .map(|(index, rule)| Self::compile_rule(index, rule))
            .collect::<Result<Vec<_>, _>>()?;

        let registry = RuleRegistry::from_rules(rules, config.engine.default_decision)?;

        info!(
            rules = registry.len(),
            hierarchy_edges = hierarchy.edges().count(),
            default_decision = %registry.default_decision(),
            "Built access rules"
        );

        Ok(Self::new(registry, hierarchy).with_role_prefix(config.engine.role_prefix.clone()))
    }

    fn compile_rule(index: usize, config: &RuleConfig) -> Result<AccessRule, ConfigError> {
        let method = match &config.method {
            Some(name) => Some(HttpMethod::try_parse(name).ok_or_else(|| ConfigError::Invalid {
                message: format!("Unknown HTTP method in rule #{}: {}", index, name),
            })?),
            None => None,
        };

        let mut matcher = match &config.pattern {
            Some(pattern) => RequestMatcher::path(
                PathPattern::compile(pattern, config.case_sensitive)
                    .map_err(|source| ConfigError::Pattern { rule: index, source })?,
            ),
            None => RequestMatcher::any(),
        };
        if let Some(scheme) = &config.scheme {
            matcher = matcher.with_scheme(scheme);
        }
        if let Some(host) = &config.host {
            matcher = matcher.with_host(host);
        }

        let expression = AccessExpression::parse(&config.access)
            .map_err(|source| ConfigError::Expression { rule: index, source })?;

        Ok(AccessRule::new(matcher, method, expression))
    }

    /// Decide one request
    pub fn authorize(
        &self,
        request: &RequestDescriptor,
        authorities: &GrantedAuthorities,
    ) -> Decision {
        self.evaluate(request, authorities).decision
    }

    /// Decide one request and report which rule did it
    pub fn evaluate(
        &self,
        request: &RequestDescriptor,
        authorities: &GrantedAuthorities,
    ) -> AccessOutcome {
        let Some((index, rule, variables)) = self.registry.find_match(request) else {
            let decision = self.registry.default_decision();
            debug!(
                method = %request.method,
                path = %request.path,
                decision = %decision,
                "No rule matched, applying default"
            );
            return AccessOutcome {
                decision,
                rule: None,
                variables: HashMap::new(),
            };
        };

        let expanded = self.hierarchy.expand(authorities.iter());
        trace!(authorities = ?expanded, "Expanded authorities");

        let ctx = EvaluationContext::new(&expanded, &variables).with_role_prefix(&self.role_prefix);
        let decision = Decision::from(rule.expression().evaluate(&ctx));

        debug!(
            method = %request.method,
            path = %request.path,
            rule = index,
            access = %rule.expression(),
            decision = %decision,
            "Evaluated access rule"
        );

        AccessOutcome {
            decision,
            rule: Some(index),
            variables,
        }
    }

    /// Check a request, returning an error if denied
    pub fn require(
        &self,
        request: &RequestDescriptor,
        authorities: &GrantedAuthorities,
    ) -> Result<(), AccessDeniedError> {
        let outcome = self.evaluate(request, authorities);
        match (outcome.decision, outcome.rule) {
            (Decision::Allow, _) => Ok(()),
            (Decision::Deny, Some(rule)) => Err(AccessDeniedError::denied_by_rule(
                &request.method,
                &request.path,
                rule,
            )),
            (Decision::Deny, None) => Err(AccessDeniedError::no_matching_rule(
                &request.method,
                &request.path,
            )),
        }
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    pub fn hierarchy(&self) -> &RoleHierarchy {
        &self.hierarchy
    }

    pub fn role_prefix(&self) -> &str {
        &self.role_prefix
    }

    /// Create a permissive resolver that allows everything (for testing)
    pub fn allow_all() -> Self {
        Self::new(RuleRegistry::new(Decision::Allow), RoleHierarchy::new())
    }

    /// Create a restrictive resolver that denies everything
    pub fn deny_all() -> Self {
        Self::new(RuleRegistry::new(Decision::Deny), RoleHierarchy::new())
    }
}
