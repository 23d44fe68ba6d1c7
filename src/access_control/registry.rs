//! Rule registry
//!
//! An ordered table of access rules plus the decision applied when none of
//! them matches. Rules are immutable once registered.

use crate::access_control::expression::AccessExpression;
use crate::access_control::patterns::{MatchResult, PathPattern};
use crate::access_control::types::{Decision, HttpMethod, RequestDescriptor};
use crate::error::ConfigError;
use std::collections::HashMap;
use std::fmt;

/// Which requests a rule applies to, apart from the method
#[derive(Debug, Clone, Default)]
pub struct RequestMatcher {
    /// `None` matches every path
    pattern: Option<PathPattern>,
    scheme: Option<String>,
    host: Option<String>,
}

impl RequestMatcher {
    /// Matches every request
    pub fn any() -> Self {
        Self::default()
    }

    pub fn path(pattern: PathPattern) -> Self {
        Self {
            pattern: Some(pattern),
            ..Default::default()
        }
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into().to_ascii_lowercase());
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into().to_ascii_lowercase());
        self
    }

    pub fn pattern(&self) -> Option<&PathPattern> {
        self.pattern.as_ref()
    }

    /// Scheme and host are checked before the (more expensive) path pattern
    pub fn matches(&self, request: &RequestDescriptor) -> MatchResult {
        if let Some(scheme) = &self.scheme
            && !request
                .scheme
                .as_deref()
                .is_some_and(|s| s.eq_ignore_ascii_case(scheme))
        {
            return MatchResult::no_match();
        }

        if let Some(host) = &self.host
            && !request
                .host
                .as_deref()
                .map(strip_port)
                .is_some_and(|h| h.eq_ignore_ascii_case(host))
        {
            return MatchResult::no_match();
        }

        match &self.pattern {
            Some(pattern) => pattern.matches(&request.path),
            None => MatchResult::any(),
        }
    }
}

impl fmt::Display for RequestMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.scheme, &self.host) {
            (Some(scheme), Some(host)) => write!(f, "{}://{}", scheme, host)?,
            (Some(scheme), None) => write!(f, "{}://*", scheme)?,
            (None, Some(host)) => write!(f, "//{}", host)?,
            (None, None) => {}
        }
        match &self.pattern {
            Some(pattern) => write!(f, "{}", pattern),
            None => write!(f, "<any request>"),
        }
    }
}

fn strip_port(host: &str) -> &str {
    // Bracketed IPv6 literals keep their colons
    if let Some(end) = host.find(']') {
        return &host[..=end];
    }
    host.split(':').next().unwrap_or(host)
}

/// One access rule: matcher, optional method, expression
#[derive(Debug, Clone)]
pub struct AccessRule {
    matcher: RequestMatcher,
    method: Option<HttpMethod>,
    expression: AccessExpression,
}

impl AccessRule {
    pub fn new(
        matcher: RequestMatcher,
        method: Option<HttpMethod>,
        expression: AccessExpression,
    ) -> Self {
        Self {
            matcher,
            method,
            expression,
        }
    }

    /// Shorthand for `anyRequest()` style rules
    pub fn any_request(expression: AccessExpression) -> Self {
        Self::new(RequestMatcher::any(), None, expression)
    }

    pub fn matcher(&self) -> &RequestMatcher {
        &self.matcher
    }

    pub fn method(&self) -> Option<HttpMethod> {
        self.method
    }

    pub fn expression(&self) -> &AccessExpression {
        &self.expression
    }

    /// Method check first: a mismatch never reaches the path matcher
    pub fn matches(&self, request: &RequestDescriptor) -> MatchResult {
        if let Some(method) = self.method
            && !method.matches(&request.method)
        {
            return MatchResult::no_match();
        }
        self.matcher.matches(request)
    }
}

impl fmt::Display for AccessRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.method {
            Some(method) => write!(f, "{} {}", method, self.matcher)?,
            None => write!(f, "* {}", self.matcher)?,
        }
        write!(f, " -> {}", self.expression)
    }
}

/// Ordered rule table
#[derive(Debug, Clone)]
pub struct RuleRegistry {
    rules: Vec<AccessRule>,
    default_decision: Decision,
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new(Decision::Deny)
    }
}

impl RuleRegistry {
    pub fn new(default_decision: Decision) -> Self {
        Self {
            rules: Vec::new(),
            default_decision,
        }
    }

    /// Build from rules; without an explicit default the registry must not be
    /// empty, and falls back to deny
    pub fn from_rules(
        rules: Vec<AccessRule>,
        default_decision: Option<Decision>,
    ) -> Result<Self, ConfigError> {
        if rules.is_empty() && default_decision.is_none() {
            return Err(ConfigError::Invalid {
                message: "no access rules configured and no default decision set".to_string(),
            });
        }
        Ok(Self {
            rules,
            default_decision: default_decision.unwrap_or(Decision::Deny),
        })
    }

    /// Append a rule; registration order is evaluation order
    pub fn register(&mut self, rule: AccessRule) -> &mut Self {
        self.rules.push(rule);
        self
    }

    /// First rule matching the request, with the variables it captured
    pub fn find_match(
        &self,
        request: &RequestDescriptor,
    ) -> Option<(usize, &AccessRule, HashMap<String, String>)> {
        self.rules.iter().enumerate().find_map(|(index, rule)| {
            let result = rule.matches(request);
            result
                .is_match()
                .then(|| (index, rule, result.into_variables()))
        })
    }

    pub fn rules(&self) -> &[AccessRule] {
        &self.rules
    }

    pub fn default_decision(&self) -> Decision {
        self.default_decision
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }
}
