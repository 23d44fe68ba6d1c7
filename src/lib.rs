//! Request Authorization Engine
//!
//! Decides whether an HTTP request is allowed for a principal, from an ordered
//! table of path rules with access expressions.
//!
//! ## Features
//!
//! - **Ant-style path patterns** with `*`, trailing `**` and `{name}` captures
//! - **Access expressions** such as `hasRole('ADMIN') or #user == 'me'`
//! - **Role hierarchy** (`ROLE_ADMIN > ROLE_USER`) applied before role checks
//! - **Tower middleware** answering `403` for denied requests
//! - **Flexible configuration** via TOML files and environment variables
//!
//! ## Evaluation Model
//!
//! ```text
//! method → scheme/host → path pattern → expression   (first matching rule wins)
//! ```
//!
//! When nothing matches, the default decision applies (deny unless configured).
//!
//! ## Example Configuration
//!
//! ```toml
//! [role_hierarchy]
//! hierarchy = "ROLE_ADMIN > ROLE_USER"
//!
//! [[rules]]
//! pattern = "/admin/**"
//! access = "hasRole('ADMIN')"
//!
//! [[rules]]
//! pattern = "/user/{user}"
//! access = "#user == 'user' or hasRole('ADMIN')"
//!
//! [[rules]]
//! access = "hasRole('USER')"
//! ```

pub mod access_control;
pub mod config;
pub mod error;
pub mod middleware;

// Re-export main types
pub use access_control::{AccessResolver, Decision, GrantedAuthorities, RequestDescriptor};
pub use config::{AppConfig, load_config};
pub use error::{AppError, Result};
pub use middleware::{AuthorizationLayer, SchemeSource};
