use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::{env, fmt, path::PathBuf, str::FromStr, time::Duration};

use crate::services::thumbnail_service::MAX_BULK_CONCURRENCY;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_BULK_CONCURRENCY: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageProvider {
    Gcs,
    S3,
}

impl FromStr for StorageProvider {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "gcs" | "gcp" | "google" => Ok(StorageProvider::Gcs),
            "s3" | "aws" => Ok(StorageProvider::S3),
            other => bail!("unknown storage provider `{other}` (expected `gcs` or `s3`)"),
        }
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments; flags win.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// URL prefix gate and gallery-stub key. Empty for commands that never
    /// build links.
    pub secret_key: String,
    pub bucket_name: String,
    pub storage_provider: StorageProvider,
    pub tmdb_api_key: Option<String>,
    pub scratch_dir: PathBuf,
    pub static_dir: PathBuf,
    pub cache_ttl: Duration,
    pub list_timeout: Duration,
    pub extract_timeout: Duration,
    pub bulk_concurrency: usize,
    pub ffmpeg_path: String,
    pub thumbnail_quality: u8,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secret_key", &"<redacted>")
            .field("bucket_name", &self.bucket_name)
            .field("storage_provider", &self.storage_provider)
            .field("tmdb_api_key", &self.tmdb_api_key.as_ref().map(|_| "<redacted>"))
            .field("scratch_dir", &self.scratch_dir)
            .field("static_dir", &self.static_dir)
            .field("cache_ttl", &self.cache_ttl)
            .field("list_timeout", &self.list_timeout)
            .field("extract_timeout", &self.extract_timeout)
            .field("bulk_concurrency", &self.bulk_concurrency)
            .field("ffmpeg_path", &self.ffmpeg_path)
            .field("thumbnail_quality", &self.thumbnail_quality)
            .finish()
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about = "Secret-gated video gallery over a cloud bucket")]
pub struct Args {
    /// Shared secret for URLs and gallery stubs (overrides SECRET_KEY)
    #[arg(short = 's', long, global = true)]
    pub secret_key: Option<String>,

    /// Bucket to serve (overrides BUCKET_NAME)
    #[arg(short = 'b', long, global = true)]
    pub bucket: Option<String>,

    /// Port to bind to (overrides PORT)
    #[arg(short = 'p', long, global = true)]
    pub port: Option<u16>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Print every category
    ListCategories,
    /// Print every gallery with its stub
    ListGalleries,
    /// Print the videos of one gallery
    ShowGallery {
        /// Gallery stub
        stub: String,
    },
    /// Dump the catalog
    Export {
        /// Output format
        #[arg(short, long, default_value = "json")]
        format: String,
    },
    /// Generate missing thumbnails for every video
    GenerateThumbnails {
        /// Regenerate existing thumbnails too
        #[arg(short, long)]
        force: bool,
        /// Frame offset in milliseconds
        #[arg(short, long, default_value_t = 1000)]
        time: u64,
        /// Skip videos larger than this many megabytes (0 for no limit)
        #[arg(short, long, default_value_t = 1024)]
        max_size: u64,
        /// Videos processed at once (overrides BULK_CONCURRENCY)
        #[arg(short, long)]
        concurrency: Option<usize>,
    },
    /// Delete every thumbnail image
    ClearThumbnails,
}

impl Command {
    /// Thumbnail maintenance never renders links, so it runs without the
    /// secret.
    pub fn requires_secret(&self) -> bool {
        !matches!(
            self,
            Command::GenerateThumbnails { .. } | Command::ClearThumbnails
        )
    }
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args(args: &Args, requires_secret: bool) -> Result<Self> {
        Self::from_lookup(args, requires_secret, |name| env::var(name).ok())
    }

    /// Same as [`AppConfig::from_env_and_args`] with an explicit variable
    /// source.
    pub fn from_lookup<F>(args: &Args, requires_secret: bool, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let secret_key = match args.secret_key.clone().or_else(|| var("SECRET_KEY")) {
            Some(secret) => secret,
            None if requires_secret => {
                bail!("SECRET_KEY is required (set it or pass --secret-key)")
            }
            None => String::new(),
        };
        let bucket_name = args
            .bucket
            .clone()
            .or_else(|| var("BUCKET_NAME"))
            .context("BUCKET_NAME is required (set it or pass --bucket)")?;

        let port = match args.port {
            Some(port) => port,
            None => parse_var(&var, "PORT")?.unwrap_or(DEFAULT_PORT),
        };
        let storage_provider = parse_var(&var, "STORAGE_PROVIDER")?.unwrap_or(StorageProvider::Gcs);
        let bulk_concurrency = parse_var::<usize>(&var, "BULK_CONCURRENCY")?
            .unwrap_or(DEFAULT_BULK_CONCURRENCY)
            .clamp(1, MAX_BULK_CONCURRENCY);

        Ok(Self {
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            secret_key,
            bucket_name,
            storage_provider,
            tmdb_api_key: var("TMDB_API_KEY"),
            scratch_dir: var("SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| env::temp_dir().join("video-gallery-thumbnails")),
            static_dir: var("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("public")),
            cache_ttl: Duration::from_secs(parse_var(&var, "CACHE_TTL_SECS")?.unwrap_or(300)),
            list_timeout: Duration::from_secs(parse_var(&var, "LIST_TIMEOUT_SECS")?.unwrap_or(30)),
            extract_timeout: Duration::from_secs(
                parse_var(&var, "EXTRACT_TIMEOUT_SECS")?.unwrap_or(120),
            ),
            bulk_concurrency,
            ffmpeg_path: var("FFMPEG_PATH").unwrap_or_else(|| "ffmpeg".into()),
            thumbnail_quality: parse_var(&var, "THUMBNAIL_QUALITY")?.unwrap_or(2),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T>(var: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match var(name) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|err| anyhow::anyhow!("parsing {name} value `{value}`: {err}")),
        None => Ok(None),
    }
}
