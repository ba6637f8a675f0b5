use anyhow::{Context, Result};
use clap::Parser;
use std::env;
use uuid::Uuid;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    /// Prefix for generated download links, e.g. "https://files.example.com".
    /// Empty means relative links, which is all the builtin UI needs.
    pub public_base_url: String,
    /// Secret used to sign download URLs. If none is configured a random
    /// one is generated, which invalidates outstanding links on restart.
    pub signing_secret: String,
    /// Lifetime of signed download URLs in seconds.
    pub url_ttl_secs: i64,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "File hosting service")]
pub struct Args {
    /// Host to bind to (overrides FILEHOST_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides FILEHOST_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where uploaded objects are stored (overrides FILEHOST_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides FILEHOST_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Public base URL for download links (overrides FILEHOST_PUBLIC_BASE_URL)
    #[arg(long)]
    pub public_base_url: Option<String>,

    /// Signed URL lifetime in seconds (overrides FILEHOST_URL_TTL_SECS)
    #[arg(long)]
    pub url_ttl_secs: Option<i64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("FILEHOST_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("FILEHOST_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing FILEHOST_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading FILEHOST_PORT"),
        };
        let env_storage =
            env::var("FILEHOST_STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into());
        let env_db = env::var("FILEHOST_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/filehost.db".into());
        let env_base_url = env::var("FILEHOST_PUBLIC_BASE_URL").unwrap_or_default();
        let env_ttl = match env::var("FILEHOST_URL_TTL_SECS") {
            Ok(value) => Some(
                value
                    .parse::<i64>()
                    .with_context(|| format!("parsing FILEHOST_URL_TTL_SECS value `{}`", value))?,
            ),
            Err(_) => None,
        };
        let signing_secret = match env::var("FILEHOST_SIGNING_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ => {
                tracing::warn!(
                    "FILEHOST_SIGNING_SECRET not set; using a random secret, \
                     existing download links will not survive a restart"
                );
                Uuid::new_v4().simple().to_string()
            }
        };

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            public_base_url: args.public_base_url.unwrap_or(env_base_url),
            signing_secret,
            url_ttl_secs: args.url_ttl_secs.or(env_ttl).unwrap_or(3600),
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
