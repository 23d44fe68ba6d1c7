//! Access control module
//!
//! Request-based authorization: an ordered table of rules, each binding a
//! request matcher (path pattern, optional method, scheme and host) to an
//! access expression.
//!
//! ## Evaluation Model
//!
//! For every request the rules are tried in the order they were configured.
//! The first rule whose matcher accepts the request decides:
//!
//! - path variables captured by its pattern (`/user/{user}`) become
//!   available to the expression as `#user`
//! - the principal's authorities are expanded through the role hierarchy
//!   before `hasRole` / `hasAuthority` are checked
//!
//! When no rule matches the engine falls back to its default decision,
//! which is deny unless configured otherwise.
//!
//! ## Example Configuration
//!
//! ```toml
//! [role_hierarchy]
//! hierarchy = "ROLE_ADMIN > ROLE_USER"
//!
//! [[rules]]
//! method = "POST"
//! access = "denyAll"              # no writes at all
//!
//! [[rules]]
//! pattern = "/user/{user}"
//! access = "#user == 'user'"
//! case_sensitive = false
//!
//! [[rules]]
//! access = "hasRole('USER')"     # everything else
//! ```

pub mod expression;
pub mod hierarchy;
pub mod patterns;
pub mod registry;
pub mod resolver;
pub mod types;

pub use expression::{AccessExpression, EvaluationContext};
pub use hierarchy::RoleHierarchy;
pub use patterns::{MatchResult, PathPattern};
pub use registry::{AccessRule, RequestMatcher, RuleRegistry};
pub use resolver::{AccessOutcome, AccessResolver};
pub use types::{Decision, GrantedAuthorities, HttpMethod, RequestDescriptor};
