//! Command line and file configuration for the janitor binary
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! command line flags and environment variables.

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use axum::http::HeaderValue;
use camino::{Utf8Path, Utf8PathBuf};
use eyre::{Context, Result};
use inventory::{ImageDetail, Inventory, MemoryRegistry, DEFAULT_CONCURRENCY, DEFAULT_STATS_TTL};
use serde::Deserialize;

/// Port the service listens on when none is configured.
pub const DEFAULT_PORT: u16 = 8081;

/// Origin allowed to make cross-origin requests when none are configured.
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";

/// Registry backend to serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    /// In-memory registry, optionally seeded from a JSON file
    Memory,

    /// Amazon ECR
    #[cfg(feature = "ecr")]
    Ecr,
}

impl Default for Backend {
    #[cfg(feature = "ecr")]
    fn default() -> Self {
        Backend::Ecr
    }

    #[cfg(not(feature = "ecr"))]
    fn default() -> Self {
        Backend::Memory
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human readable lines
    #[default]
    Text,

    /// One JSON object per event
    Json,
}

/// Command line arguments
#[derive(Debug, clap::Parser)]
#[command(name = "janitor", version, about = "Container registry inventory and pruning service")]
pub struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "JANITOR_CONFIG")]
    pub config: Option<Utf8PathBuf>,

    /// Address to listen on
    #[arg(long, env = "JANITOR_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Port to listen on, when no listen address is given
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Registry backend
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// AWS region of the registry
    #[arg(long, env = "AWS_REGION")]
    pub region: Option<String>,

    /// Seconds global stats stay cached
    #[arg(long = "stats-ttl")]
    pub stats_ttl: Option<u64>,

    /// Repositories fetched at once while computing global stats
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Origin allowed to make cross-origin requests (repeatable)
    #[arg(long = "cors-origin")]
    pub cors_origins: Vec<String>,

    /// JSON file of repositories to load into the memory backend
    #[arg(long)]
    pub seed: Option<Utf8PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Service configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JanitorConfig {
    /// Address to listen on
    pub listen: SocketAddr,

    /// Registry backend
    pub backend: Backend,

    /// AWS region of the registry
    pub region: String,

    /// Seconds global stats stay cached
    pub stats_ttl_secs: u64,

    /// Repositories fetched at once while computing global stats
    pub concurrency: usize,

    /// Origins allowed to make cross-origin requests
    pub cors_origins: Vec<String>,

    /// Items requested per listing page from the registry
    pub page_size: usize,

    /// JSON file of repositories to load into the memory backend
    pub seed: Option<Utf8PathBuf>,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            backend: Backend::default(),
            region: "us-east-1".into(),
            stats_ttl_secs: DEFAULT_STATS_TTL.as_secs(),
            concurrency: DEFAULT_CONCURRENCY,
            cors_origins: vec![DEFAULT_CORS_ORIGIN.into()],
            page_size: 100,
            seed: None,
        }
    }
}

impl JanitorConfig {
    /// Parse configuration from TOML.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml_edit::de::from_str(text).context("parsing janitor configuration")
    }

    /// Read configuration from a TOML file.
    pub fn from_file(path: &Utf8Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading configuration from {path}"))?;
        Self::from_toml(&text).with_context(|| format!("in {path}"))
    }

    /// Defaults, overlaid with the configuration file and then the arguments.
    pub fn load(args: &Args) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply(args);
        Ok(config)
    }

    fn apply(&mut self, args: &Args) {
        if let Some(listen) = args.listen {
            self.listen = listen;
        } else if let Some(port) = args.port {
            self.listen.set_port(port);
        }
        if let Some(backend) = args.backend {
            self.backend = backend;
        }
        if let Some(region) = &args.region {
            self.region.clone_from(region);
        }
        if let Some(ttl) = args.stats_ttl {
            self.stats_ttl_secs = ttl;
        }
        if let Some(concurrency) = args.concurrency {
            self.concurrency = concurrency;
        }
        if !args.cors_origins.is_empty() {
            self.cors_origins.clone_from(&args.cors_origins);
        }
        if let Some(seed) = &args.seed {
            self.seed = Some(seed.clone());
        }
    }

    /// Allowed origins as header values.
    pub fn cors_origins(&self) -> Result<Vec<HeaderValue>> {
        self.cors_origins
            .iter()
            .map(|origin| {
                origin
                    .parse::<HeaderValue>()
                    .with_context(|| format!("invalid CORS origin: {origin}"))
            })
            .collect()
    }

    /// Connect to the configured backend.
    #[tracing::instrument(skip(self), fields(backend = ?self.backend))]
    pub async fn inventory(&self) -> Result<Inventory> {
        let inventory = match self.backend {
            Backend::Memory => Inventory::new(self.memory_registry()?),
            #[cfg(feature = "ecr")]
            Backend::Ecr => Inventory::new(
                inventory::EcrDriver::from_region(self.region.clone())
                    .await
                    .with_page_size(self.page_size),
            ),
        };

        tracing::info!(driver = inventory.name(), region = %self.region, "Connected to registry");
        Ok(inventory
            .with_stats_ttl(Duration::from_secs(self.stats_ttl_secs))
            .with_concurrency(self.concurrency))
    }

    fn memory_registry(&self) -> Result<MemoryRegistry> {
        let Some(path) = &self.seed else {
            return Ok(MemoryRegistry::new());
        };

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading seed repositories from {path}"))?;
        let repositories: BTreeMap<String, Vec<ImageDetail>> =
            serde_json::from_str(&text).with_context(|| format!("parsing seed repositories in {path}"))?;
        tracing::debug!(repositories = repositories.len(), "Seeded memory registry");
        Ok(MemoryRegistry::with_repositories(repositories))
    }
}
