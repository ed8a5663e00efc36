use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::env;

/// Where object bytes and sidecars are kept.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Files below `root_dir`.
    Fs,
    /// Process memory; nothing survives a restart.
    Memory,
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub root_dir: String,
    pub backend: BackendKind,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Local filesystem-backed object store")]
pub struct Args {
    /// Host to bind to (overrides LOCAL_S3_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides LOCAL_S3_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where buckets and metadata are stored (overrides LOCAL_S3_ROOT_DIR)
    #[arg(long)]
    pub root_dir: Option<String>,

    /// Storage backend (overrides LOCAL_S3_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::resolve(Args::parse(), |name| env::var(name).ok())
    }

    /// Merge parsed CLI args over values from `lookup` (the environment),
    /// falling back to defaults.
    pub fn resolve(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_host = lookup("LOCAL_S3_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let env_port = match lookup("LOCAL_S3_PORT") {
            Some(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing LOCAL_S3_PORT value `{}`", value))?,
            None => 3000,
        };
        let env_root = lookup("LOCAL_S3_ROOT_DIR").unwrap_or_else(|| "./data/local-s3".into());
        let env_backend = match lookup("LOCAL_S3_BACKEND") {
            Some(value) => match BackendKind::from_str(&value, true) {
                Ok(kind) => kind,
                Err(_) => bail!("LOCAL_S3_BACKEND must be `fs` or `memory`, got `{}`", value),
            },
            None => BackendKind::Fs,
        };

        // --- Merge ---
        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            root_dir: args.root_dir.unwrap_or(env_root),
            backend: args.backend.unwrap_or(env_backend),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
