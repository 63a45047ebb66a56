//! Server configuration and CLI argument parsing
//!
//! This module handles all server configuration through a flexible system that supports:
//! - Command-line arguments
//! - Environment variables (with GATECRAB_ prefix)
//!
//! # Configuration Priority
//!
//! The configuration system follows this precedence order:
//! 1. CLI arguments (highest priority)
//! 2. Environment variables
//! 3. Default values (lowest priority)
//!
//! # Example Usage
//!
//! ```bash
//! # Using CLI arguments
//! gatecrab --http-port 9090 --quota export=5/3600
//!
//! # Using environment variables
//! export GATECRAB_HTTP_PORT=8080
//! export GATECRAB_TOKEN_TTL=120
//! gatecrab
//!
//! # Mixed (CLI overrides env)
//! export GATECRAB_HTTP_PORT=8080
//! gatecrab --http-port 9090  # Uses port 9090
//! ```

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use gatecrab::QuotaConfig;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

/// Upper bound for every duration setting: one year
const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

/// Main configuration structure for the server
///
/// Built from CLI arguments and environment variables, and holds every
/// setting needed to run the server.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub http: HttpConfig,
    pub store: StoreConfig,
    pub tokens: TokenConfig,
    /// Quota overrides and additions on top of the preset table
    pub quotas: Vec<QuotaOverride>,
    /// Logging level (error, warn, info, debug, trace)
    pub log_level: String,
}

/// HTTP transport configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Host address to bind to (e.g., "0.0.0.0")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

/// Entry store configuration, applied to every store the server creates
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Lock partitions per store; 0 picks four per CPU
    pub shards: usize,
    /// Expected number of live keys per store
    pub capacity: usize,
    /// Seconds between background sweeps
    pub sweep_interval: u64,
}

impl StoreConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval)
    }
}

/// Single-use token configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    /// Default token lifetime in seconds
    pub ttl: u64,
    /// Oldest accepted payload in seconds
    pub max_payload_age: u64,
}

/// `name=max/window_secs`, e.g. `export=5/3600`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QuotaOverride {
    pub name: String,
    pub max_requests: u64,
    pub window_secs: u64,
}

impl QuotaOverride {
    pub fn config(&self) -> Result<QuotaConfig> {
        QuotaConfig::new(self.max_requests, Duration::from_secs(self.window_secs))
            .with_context(|| format!("invalid quota '{}'", self.name))
    }
}

impl FromStr for QuotaOverride {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (name, budget) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("Invalid quota: {s}. Expected <name>=<max>/<window_secs>"))?;
        let (max, window) = budget
            .split_once('/')
            .ok_or_else(|| anyhow!("Invalid quota: {s}. Expected <name>=<max>/<window_secs>"))?;

        let name = name.trim();
        if name.is_empty() {
            return Err(anyhow!("Invalid quota: {s}. Name must not be empty"));
        }

        Ok(QuotaOverride {
            name: name.to_lowercase(),
            max_requests: max
                .trim()
                .parse()
                .with_context(|| format!("Invalid quota max in '{s}'"))?,
            window_secs: window
                .trim()
                .parse()
                .with_context(|| format!("Invalid quota window in '{s}'"))?,
        })
    }
}

/// Command-line arguments for the server
///
/// All arguments can also be set via environment variables with the
/// GATECRAB_ prefix. CLI arguments take precedence over environment variables.
///
/// # Examples
///
/// Custom port and token lifetime:
/// ```bash
/// gatecrab --http-port 8080 --token-ttl 120
/// ```
///
/// Tighter export quota with debug logging:
/// ```bash
/// gatecrab --quota export=1/3600 --log-level debug
/// ```
#[derive(Parser, Debug)]
#[command(
    name = "gatecrab",
    about = "Quota and single-use token server",
    long_about = "An HTTP service for fixed-window quotas and single-use anti-replay tokens.\n\nEnvironment variables with GATECRAB_ prefix are supported. CLI arguments take precedence over environment variables."
)]
pub struct Args {
    // HTTP Transport
    #[arg(
        long,
        value_name = "HOST",
        help = "HTTP host",
        default_value = "127.0.0.1",
        env = "GATECRAB_HTTP_HOST"
    )]
    pub http_host: String,
    #[arg(
        long,
        value_name = "PORT",
        help = "HTTP port",
        default_value_t = 8080,
        env = "GATECRAB_HTTP_PORT"
    )]
    pub http_port: u16,

    // Store Configuration
    #[arg(
        long,
        value_name = "N",
        help = "Lock partitions per store (0 = four per CPU)",
        default_value_t = 0,
        env = "GATECRAB_SHARDS"
    )]
    pub shards: usize,
    #[arg(
        long,
        value_name = "SIZE",
        help = "Initial store capacity",
        default_value_t = 100_000,
        env = "GATECRAB_STORE_CAPACITY"
    )]
    pub store_capacity: usize,
    #[arg(
        long,
        value_name = "SECS",
        help = "Background sweep interval (seconds)",
        default_value_t = 60,
        env = "GATECRAB_SWEEP_INTERVAL"
    )]
    pub sweep_interval: u64,

    // Token Configuration
    #[arg(
        long,
        value_name = "SECS",
        help = "Default token lifetime (seconds)",
        default_value_t = 300,
        env = "GATECRAB_TOKEN_TTL"
    )]
    pub token_ttl: u64,
    #[arg(
        long,
        value_name = "SECS",
        help = "Maximum accepted payload age (seconds)",
        default_value_t = 86_400,
        env = "GATECRAB_MAX_PAYLOAD_AGE"
    )]
    pub max_payload_age: u64,

    // Quota Configuration
    #[arg(
        long = "quota",
        value_name = "NAME=MAX/SECS",
        help = "Add or override a quota (repeatable)",
        env = "GATECRAB_QUOTAS",
        value_delimiter = ','
    )]
    pub quotas: Vec<QuotaOverride>,

    // General options
    #[arg(
        long,
        value_name = "LEVEL",
        help = "Log level: error, warn, info, debug, trace",
        default_value = "info",
        env = "GATECRAB_LOG_LEVEL"
    )]
    pub log_level: String,

    // Utility options
    #[arg(
        long,
        help = "List all environment variables and exit",
        action = clap::ArgAction::SetTrue
    )]
    pub list_env_vars: bool,
}

impl Config {
    /// Build configuration from environment variables and CLI arguments
    ///
    /// # Errors
    ///
    /// Returns an error if invalid configuration values are provided.
    pub fn from_env_and_args() -> Result<Self> {
        // Clap handles the CLI > env > default precedence
        let args = Args::parse();

        if args.list_env_vars {
            Self::print_env_vars();
            std::process::exit(0);
        }

        Self::from_args(args)
    }

    /// Build and validate configuration from already parsed arguments
    pub fn from_args(args: Args) -> Result<Self> {
        let config = Config {
            http: HttpConfig {
                host: args.http_host,
                port: args.http_port,
            },
            store: StoreConfig {
                shards: args.shards,
                capacity: args.store_capacity,
                sweep_interval: args.sweep_interval,
            },
            tokens: TokenConfig {
                ttl: args.token_ttl,
                max_payload_age: args.max_payload_age,
            },
            quotas: args.quotas,
            log_level: args.log_level,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.http.port == 0 {
            return Err(anyhow!("HTTP port must be greater than 0"));
        }
        if self.store.sweep_interval == 0 {
            return Err(anyhow!("Sweep interval must be greater than 0"));
        }
        if self.store.sweep_interval > MAX_DURATION_SECS {
            return Err(anyhow!(
                "Sweep interval ({}s) must not exceed {MAX_DURATION_SECS}s",
                self.store.sweep_interval
            ));
        }
        if self.tokens.ttl == 0 {
            return Err(anyhow!("Token TTL must be greater than 0"));
        }
        if self.tokens.max_payload_age > MAX_DURATION_SECS {
            return Err(anyhow!(
                "Maximum payload age ({}s) must not exceed {MAX_DURATION_SECS}s",
                self.tokens.max_payload_age
            ));
        }
        if self.tokens.ttl > self.tokens.max_payload_age {
            return Err(anyhow!(
                "Token TTL ({}s) must not exceed the maximum payload age ({}s)",
                self.tokens.ttl,
                self.tokens.max_payload_age
            ));
        }
        for quota in &self.quotas {
            quota.config()?;
        }

        Ok(())
    }

    /// Print all available environment variables and their descriptions
    ///
    /// This is called when the --list-env-vars flag is used.
    fn print_env_vars() {
        println!("GateCrab Environment Variables");
        println!("==============================");
        println!();
        println!("All environment variables use the GATECRAB_ prefix.");
        println!("CLI arguments take precedence over environment variables.");
        println!();

        println!("Transport Configuration:");
        println!("  GATECRAB_HTTP_HOST=<host>             HTTP host [default: 127.0.0.1]");
        println!("  GATECRAB_HTTP_PORT=<port>             HTTP port [default: 8080]");
        println!();

        println!("Store Configuration:");
        println!(
            "  GATECRAB_SHARDS=<n>                   Lock partitions per store, 0 = auto [default: 0]"
        );
        println!(
            "  GATECRAB_STORE_CAPACITY=<size>        Initial store capacity [default: 100000]"
        );
        println!(
            "  GATECRAB_SWEEP_INTERVAL=<secs>        Background sweep interval [default: 60]"
        );
        println!();

        println!("Token Configuration:");
        println!("  GATECRAB_TOKEN_TTL=<secs>             Default token lifetime [default: 300]");
        println!(
            "  GATECRAB_MAX_PAYLOAD_AGE=<secs>       Oldest accepted payload [default: 86400]"
        );
        println!();

        println!("Quota Configuration:");
        println!(
            "  GATECRAB_QUOTAS=<name=max/secs,...>   Add or override quotas [presets: login=5/900,"
        );
        println!(
            "                                        registration=3/3600, export=3/3600, search=30/60,"
        );
        println!("                                        upload=10/3600, api=100/60]");
        println!();

        println!("General Configuration:");
        println!(
            "  GATECRAB_LOG_LEVEL=<level>            Log level: error, warn, info, debug, trace [default: info]"
        );
        println!();

        println!("Examples:");
        println!("  # Serve on port 9000 with a stricter export quota");
        println!("  export GATECRAB_HTTP_PORT=9000");
        println!("  export GATECRAB_QUOTAS=export=1/3600");
        println!();
        println!("  # Run server (CLI args override env vars)");
        println!("  gatecrab --http-port 9090  # Will use port 9090, not 9000");
    }
}
