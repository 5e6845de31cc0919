use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr, time::Duration};
use uuid::Uuid;

const MIB: u64 = 1024 * 1024;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    /// Base URL embedded in signed object URLs.
    pub public_url: String,
    /// HMAC key for signed URLs; a random one is generated when unset.
    pub signing_secret: Option<String>,
    pub presign_ttl: Duration,
    pub multipart_threshold: u64,
    pub part_size: u64,
    /// Deployment environment name; `development` turns on debug logging.
    pub environment: String,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("storage_dir", &self.storage_dir)
            .field("database_url", &self.database_url)
            .field("public_url", &self.public_url)
            .field("presign_ttl", &self.presign_ttl)
            .field("multipart_threshold", &self.multipart_threshold)
            .field("part_size", &self.part_size)
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Post publishing service")]
pub struct Args {
    /// Host to bind to (overrides POST_SERVICE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides POST_SERVICE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where uploaded objects are stored (overrides POST_SERVICE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides POST_SERVICE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Public base URL used in signed links (overrides POST_SERVICE_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// Lifetime of signed links in seconds (overrides POST_SERVICE_PRESIGN_TTL_SECS)
    #[arg(long)]
    pub presign_ttl_secs: Option<u64>,

    /// Uploads larger than this many bytes are split into parts
    /// (overrides POST_SERVICE_MULTIPART_THRESHOLD)
    #[arg(long)]
    pub multipart_threshold: Option<u64>,

    /// Size of each multipart part in bytes (overrides POST_SERVICE_PART_SIZE)
    #[arg(long)]
    pub part_size: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

/// Read an optional env var, parsing it when present.
fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::from_args(args)?, migrate))
    }

    fn from_args(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = env::var("POST_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_parse::<u16>("POST_SERVICE_PORT")?.unwrap_or(3000);
        let env_storage =
            env::var("POST_SERVICE_STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into());
        let env_db = env::var("POST_SERVICE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/post_service.db".into());
        let env_ttl = env_parse::<u64>("POST_SERVICE_PRESIGN_TTL_SECS")?.unwrap_or(60);
        let env_threshold =
            env_parse::<u64>("POST_SERVICE_MULTIPART_THRESHOLD")?.unwrap_or(100 * MIB);
        let env_part_size = env_parse::<u64>("POST_SERVICE_PART_SIZE")?.unwrap_or(100 * MIB);

        // --- Merge ---
        let port = args.port.unwrap_or(env_port);
        let public_url = args
            .public_url
            .or_else(|| env::var("POST_SERVICE_PUBLIC_URL").ok())
            .unwrap_or_else(|| format!("http://127.0.0.1:{}", port));
        let signing_secret = env::var("POST_SERVICE_SIGNING_SECRET")
            .ok()
            .filter(|secret| !secret.is_empty());

        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port,
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            public_url,
            signing_secret,
            presign_ttl: Duration::from_secs(args.presign_ttl_secs.unwrap_or(env_ttl)),
            multipart_threshold: args.multipart_threshold.unwrap_or(env_threshold),
            part_size: args.part_size.unwrap_or(env_part_size),
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "production".into()),
        };

        if cfg.part_size == 0 {
            anyhow::bail!("multipart part size must be positive");
        }
        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Configured signing secret, or a fresh random one.
    pub fn signing_secret_or_random(&self) -> String {
        self.signing_secret
            .clone()
            .unwrap_or_else(|| format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple()))
    }

    /// Log level used when RUST_LOG is unset.
    pub fn default_log_level(&self) -> &'static str {
        if self.environment.eq_ignore_ascii_case("development") {
            "debug"
        } else {
            "info"
        }
    }
}
