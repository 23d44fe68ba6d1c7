//! pathwarden CLI
//!
//! Evaluates requests against a rule file offline.

use clap::{Parser, Subcommand};
use pathwarden::{
    access_control::{AccessResolver, GrantedAuthorities, RequestDescriptor},
    config::{AppConfig, LogFormat, load_config},
    error::{AppError, ConfigError},
};
use std::process::ExitCode;
use tracing::{debug, error};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// pathwarden - Request authorization rules, checked from the command line
#[derive(Parser, Debug)]
#[command(name = "pathwarden")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "PATHWARDEN_CONFIG")]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error); overrides logging.level
    #[arg(long, env = "PATHWARDEN_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decide a single request; exits 0 on allow, 1 on deny
    Check {
        /// HTTP method, sent as-is (methods are case-sensitive)
        #[arg(short, long, default_value = "GET")]
        method: String,

        /// Request path, e.g. /user/alice
        #[arg(short, long)]
        path: String,

        /// Granted authority; repeat or comma-separate (ROLE_USER,SCOPE_read)
        #[arg(short, long = "authority", value_delimiter = ',')]
        authorities: Vec<String>,

        /// Request scheme (http, https)
        #[arg(long)]
        scheme: Option<String>,

        /// Request host
        #[arg(long)]
        host: Option<String>,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Load and compile the configuration, then list the rules
    Validate,
}

fn init_logging(args: &Args, config: Option<&AppConfig>) {
    let level = args
        .log_level
        .clone()
        .or_else(|| config.map(|c| c.logging.level.clone()))
        .unwrap_or_else(|| "info".to_string());
    let format = config.map(|c| c.logging.format).unwrap_or_default();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

/// Compile the loaded configuration into a resolver
fn build_resolver(loaded: Result<AppConfig, ConfigError>) -> pathwarden::Result<AccessResolver> {
    let config = loaded?;
    let resolver = AccessResolver::from_config(&config)?;
    Ok(resolver)
}

fn main() -> anyhow::Result<ExitCode> {
    // Parse CLI arguments
    let args = Args::parse();

    // Logging settings may come from the file, so load it first
    let loaded = load_config(args.config.as_deref());
    init_logging(&args, loaded.as_ref().ok());

    let resolver = build_resolver(loaded).inspect_err(|e| match e {
        AppError::Config(ConfigError::Load(_)) => {
            error!(error = %e, "Failed to load configuration")
        }
        _ => error!(error = %e, "Failed to build access rules"),
    })?;

    match args.command {
        Command::Check {
            method,
            path,
            authorities,
            scheme,
            host,
            json,
        } => {
            let mut request = RequestDescriptor::new(method, path);
            if let Some(scheme) = scheme {
                request = request.with_scheme(scheme);
            }
            if let Some(host) = host {
                request = request.with_host(host);
            }
            let authorities: GrantedAuthorities = authorities.into_iter().collect();
            debug!(?request, ?authorities, "Checking request");

            let outcome = resolver.evaluate(&request, &authorities);

            if json {
                let body = serde_json::json!({
                    "decision": outcome.decision,
                    "rule": outcome.rule,
                    "variables": outcome.variables,
                });
                println!("{}", serde_json::to_string_pretty(&body)?);
            } else {
                match outcome.rule {
                    Some(index) => {
                        let rule = resolver
                            .registry()
                            .rules()
                            .get(index)
                            .map(ToString::to_string)
                            .unwrap_or_default();
                        println!("{} (rule #{}: {})", outcome.decision, index, rule);
                    }
                    None => println!("{} (default)", outcome.decision),
                }
            }

            Ok(if outcome.decision.is_allowed() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Validate => {
            let registry = resolver.registry();
            println!(
                "{} rule(s), default decision: {}",
                registry.len(),
                registry.default_decision()
            );
            for (index, rule) in registry.rules().iter().enumerate() {
                println!("  #{:<3} {}", index, rule);
            }

            let hierarchy = resolver.hierarchy();
            if !hierarchy.is_empty() {
                println!("role hierarchy:");
                for (superior, subordinate) in hierarchy.edges() {
                    println!("  {} > {}", superior, subordinate);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
