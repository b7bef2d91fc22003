use crate::services::asset_service::OrphanPolicy;
use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, str::FromStr};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Root directory of the local object store backend.
    pub storage_dir: String,
    /// Base URL that signed object links are minted against.
    pub public_base_url: String,
    pub access_secret: Secret,
    pub refresh_secret: Secret,
    pub url_signing_secret: Secret,
    pub orphan_policy: OrphanPolicy,
    pub revoke_on_logout: bool,
    pub cookie_secure: bool,
    pub max_connections: u32,
    pub min_connections: u32,
    pub max_upload_bytes: usize,
    #[cfg(feature = "s3")]
    pub s3: Option<S3Config>,
}

/// Connection details for the S3 object store backend.
#[cfg(feature = "s3")]
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub endpoint_url: Option<String>,
}

/// A secret value that never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Categorized image catalog API")]
pub struct Args {
    /// Host to bind to (overrides CATALOG_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides CATALOG_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides CATALOG_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Directory where the local backend keeps objects (overrides CATALOG_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Public base URL for signed object links (overrides CATALOG_PUBLIC_BASE_URL)
    #[arg(long)]
    pub public_base_url: Option<String>,

    /// What to do with an uploaded object when the metadata commit fails:
    /// `compensate` or `retain` (overrides CATALOG_ORPHAN_POLICY)
    #[arg(long)]
    pub orphan_policy: Option<String>,

    /// Deny-list tokens server-side on logout (overrides CATALOG_REVOKE_ON_LOGOUT)
    #[arg(long)]
    pub revoke_on_logout: bool,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::from_sources(args, |name| env::var(name).ok())?;
        Ok((cfg, migrate))
    }

    /// Merge CLI arguments over values looked up through `lookup`.
    ///
    /// Secrets have no defaults: the process refuses to start without them,
    /// and the access and refresh secrets must differ.
    pub fn from_sources(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_or = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.into());

        let port = match args.port {
            Some(port) => port,
            None => parse_var(&lookup, "CATALOG_PORT", 3000)?,
        };
        let orphan_policy = match args.orphan_policy.or_else(|| lookup("CATALOG_ORPHAN_POLICY")) {
            Some(raw) => raw
                .parse::<OrphanPolicy>()
                .with_context(|| format!("parsing orphan policy `{}`", raw))?,
            None => OrphanPolicy::default(),
        };

        let access_secret = require_secret(&lookup, "CATALOG_ACCESS_SECRET")?;
        let refresh_secret = require_secret(&lookup, "CATALOG_REFRESH_SECRET")?;
        if access_secret == refresh_secret {
            bail!("CATALOG_ACCESS_SECRET and CATALOG_REFRESH_SECRET must differ");
        }
        let url_signing_secret = require_secret(&lookup, "CATALOG_URL_SIGNING_SECRET")?;

        let host = args.host.unwrap_or_else(|| env_or("CATALOG_HOST", "0.0.0.0"));
        let default_base = format!("http://127.0.0.1:{}", port);

        let cfg = Self {
            public_base_url: args
                .public_base_url
                .unwrap_or_else(|| env_or("CATALOG_PUBLIC_BASE_URL", &default_base))
                .trim_end_matches('/')
                .to_string(),
            host,
            port,
            database_url: args
                .database_url
                .unwrap_or_else(|| env_or("CATALOG_DATABASE_URL", "sqlite://./data/catalog.db")),
            storage_dir: args
                .storage_dir
                .unwrap_or_else(|| env_or("CATALOG_STORAGE_DIR", "./data/objects")),
            access_secret,
            refresh_secret,
            url_signing_secret,
            orphan_policy,
            revoke_on_logout: args.revoke_on_logout
                || parse_var(&lookup, "CATALOG_REVOKE_ON_LOGOUT", false)?,
            cookie_secure: parse_var(&lookup, "CATALOG_COOKIE_SECURE", false)?,
            max_connections: parse_var(&lookup, "CATALOG_MAX_CONNECTIONS", 25)?,
            min_connections: parse_var(&lookup, "CATALOG_MIN_CONNECTIONS", 5)?,
            max_upload_bytes: parse_var(&lookup, "CATALOG_MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,
            #[cfg(feature = "s3")]
            s3: lookup("CATALOG_S3_BUCKET").map(|bucket| S3Config {
                bucket,
                region: env_or("CATALOG_S3_REGION", "us-east-1"),
                endpoint_url: lookup("CATALOG_S3_ENDPOINT"),
            }),
        };

        if cfg.min_connections > cfg.max_connections {
            bail!(
                "min connections ({}) exceeds max connections ({})",
                cfg.min_connections,
                cfg.max_connections
            );
        }

        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        None => Ok(default),
    }
}

fn require_secret(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Secret> {
    match lookup(name) {
        Some(value) if !value.is_empty() => Ok(Secret::new(value)),
        _ => bail!("{} must be set to a non-empty value", name),
    }
}
