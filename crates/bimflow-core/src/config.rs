use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::storage_types::StorageBackend;

const SERVER_PORT: u16 = 8000;
const MAX_CONNECTIONS: u32 = 10;
const MAX_UPLOAD_SIZE_BYTES: u64 = 100 * 1024 * 1024;
const DEFAULT_ALLOWED_EXTENSIONS: &str = "ifc,dwg,rvt,step,obj,gltf,glb";
const DEFAULT_ALLOWED_CONTENT_TYPES: &str = "application/octet-stream,application/step,application/ifc,application/dwg,application/rvt,model/gltf-binary,model/gltf+json";
const STORAGE_MAX_RETRIES: u32 = 3;
const BREAKER_ERROR_THRESHOLD_PERCENT: f64 = 50.0;
const BREAKER_TIMEOUT_MS: u64 = 10_000;
const BREAKER_RESET_TIMEOUT_MS: u64 = 30_000;
const BREAKER_WINDOW_SIZE: usize = 10;
const BREAKER_MIN_CALLS: usize = 5;
const CACHE_TTL_MANIFEST_SECS: u64 = 300;
const CACHE_TTL_PROPERTIES_SECS: u64 = 3600;
const CACHE_TTL_QUANTITIES_SECS: u64 = 3600;
const CACHE_MAX_ENTRIES: usize = 10_000;
const JOB_MAX_ATTEMPTS: i32 = 3;
const JOB_BACKOFF_BASE_MS: u64 = 1000;
const JOB_MAX_BACKOFF_SECS: u64 = 300;
const JOB_MAX_WORKERS: usize = 5;
const JOB_POLL_INTERVAL_MS: u64 = 1000;
const JOB_TIMEOUT_SECS: u64 = 1800;
const JOB_LEASE_SECS: u64 = 2100;
const FORGE_BASE_URL: &str = "https://developer.api.autodesk.com";
const FORGE_BUCKET: &str = "bimflow-dev";
const FORGE_POLL_INITIAL_MS: u64 = 2000;
const FORGE_POLL_MAX_MS: u64 = 30_000;

/// All settings of the ingestion pipeline.
///
/// Fields are public so tests can start from [`Default`] and override what
/// they need; production code goes through [`Config::from_env`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub server_port: u16,
    pub environment: String,
    pub cors_origins: Vec<String>,

    pub database_url: Option<String>,
    pub db_max_connections: u32,

    pub storage_backend: StorageBackend,
    pub local_storage_path: PathBuf,
    pub s3_bucket: Option<String>,
    pub s3_region: String,
    pub s3_endpoint: Option<String>,
    pub storage_max_retries: u32,

    pub upload_temp_dir: PathBuf,
    pub max_upload_size_bytes: u64,
    pub allowed_extensions: Vec<String>,
    pub allowed_content_types: Vec<String>,

    pub breaker_error_threshold_percent: f64,
    pub breaker_timeout_ms: u64,
    pub breaker_reset_timeout_ms: u64,
    pub breaker_window_size: usize,
    pub breaker_min_calls: usize,

    pub cache_ttl_manifest_secs: u64,
    pub cache_ttl_properties_secs: u64,
    pub cache_ttl_quantities_secs: u64,
    pub cache_max_entries: usize,

    pub job_max_attempts: i32,
    pub job_backoff_base_ms: u64,
    pub job_max_backoff_secs: u64,
    pub job_max_workers: usize,
    pub job_poll_interval_ms: u64,
    pub job_timeout_secs: u64,
    pub job_lease_secs: u64,

    pub forge_base_url: String,
    pub forge_client_id: Option<String>,
    pub forge_client_secret: Option<String>,
    pub forge_bucket: String,
    pub forge_poll_initial_ms: u64,
    pub forge_poll_max_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            server_port: SERVER_PORT,
            environment: "development".to_string(),
            cors_origins: vec!["*".to_string()],
            database_url: None,
            db_max_connections: MAX_CONNECTIONS,
            storage_backend: StorageBackend::Local,
            local_storage_path: PathBuf::from("./uploads"),
            s3_bucket: None,
            s3_region: "us-east-1".to_string(),
            s3_endpoint: None,
            storage_max_retries: STORAGE_MAX_RETRIES,
            upload_temp_dir: PathBuf::from("./uploads/temp"),
            max_upload_size_bytes: MAX_UPLOAD_SIZE_BYTES,
            allowed_extensions: split_list(DEFAULT_ALLOWED_EXTENSIONS),
            allowed_content_types: split_list(DEFAULT_ALLOWED_CONTENT_TYPES),
            breaker_error_threshold_percent: BREAKER_ERROR_THRESHOLD_PERCENT,
            breaker_timeout_ms: BREAKER_TIMEOUT_MS,
            breaker_reset_timeout_ms: BREAKER_RESET_TIMEOUT_MS,
            breaker_window_size: BREAKER_WINDOW_SIZE,
            breaker_min_calls: BREAKER_MIN_CALLS,
            cache_ttl_manifest_secs: CACHE_TTL_MANIFEST_SECS,
            cache_ttl_properties_secs: CACHE_TTL_PROPERTIES_SECS,
            cache_ttl_quantities_secs: CACHE_TTL_QUANTITIES_SECS,
            cache_max_entries: CACHE_MAX_ENTRIES,
            job_max_attempts: JOB_MAX_ATTEMPTS,
            job_backoff_base_ms: JOB_BACKOFF_BASE_MS,
            job_max_backoff_secs: JOB_MAX_BACKOFF_SECS,
            job_max_workers: JOB_MAX_WORKERS,
            job_poll_interval_ms: JOB_POLL_INTERVAL_MS,
            job_timeout_secs: JOB_TIMEOUT_SECS,
            job_lease_secs: JOB_LEASE_SECS,
            forge_base_url: FORGE_BASE_URL.to_string(),
            forge_client_id: None,
            forge_client_secret: None,
            forge_bucket: FORGE_BUCKET.to_string(),
            forge_poll_initial_ms: FORGE_POLL_INITIAL_MS,
            forge_poll_max_ms: FORGE_POLL_MAX_MS,
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_start_matches('.').to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        let d = PipelineConfig::default();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| d.environment.clone());

        let cors_origins_str = env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string());
        let is_production =
            environment.to_lowercase() == "production" || environment.to_lowercase() == "prod";
        if is_production && cors_origins_str.trim() == "*" {
            return Err(anyhow::anyhow!(
                "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
            ));
        }
        let cors_origins = cors_origins_str
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        let storage_backend = match env::var("STORAGE_BACKEND") {
            Ok(raw) => raw.parse()?,
            // Object storage is implied when both endpoint and bucket are configured
            Err(_) if non_empty("S3_ENDPOINT").is_some() && non_empty("S3_BUCKET").is_some() => {
                StorageBackend::S3
            }
            Err(_) => StorageBackend::Local,
        };

        let local_storage_path = env::var("FILES_LOCAL_DIR")
            .map(PathBuf::from)
            .unwrap_or(d.local_storage_path);
        let upload_temp_dir = env::var("UPLOAD_TEMP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| local_storage_path.join("temp"));

        let config = PipelineConfig {
            server_port: env::var("PORT")
                .unwrap_or_else(|_| SERVER_PORT.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            environment,
            cors_origins,
            database_url: non_empty("DATABASE_URL"),
            db_max_connections: parse_or("DB_MAX_CONNECTIONS", MAX_CONNECTIONS),
            storage_backend,
            local_storage_path,
            s3_bucket: non_empty("S3_BUCKET"),
            s3_region: env::var("S3_REGION")
                .or_else(|_| env::var("AWS_REGION"))
                .unwrap_or(d.s3_region),
            s3_endpoint: non_empty("S3_ENDPOINT"),
            storage_max_retries: parse_or("STORAGE_MAX_RETRIES", STORAGE_MAX_RETRIES),
            upload_temp_dir,
            max_upload_size_bytes: parse_or("MAX_UPLOAD_SIZE_BYTES", MAX_UPLOAD_SIZE_BYTES),
            allowed_extensions: split_list(
                &env::var("ALLOWED_EXTENSIONS")
                    .unwrap_or_else(|_| DEFAULT_ALLOWED_EXTENSIONS.to_string()),
            ),
            allowed_content_types: split_list(
                &env::var("ALLOWED_CONTENT_TYPES")
                    .unwrap_or_else(|_| DEFAULT_ALLOWED_CONTENT_TYPES.to_string()),
            ),
            breaker_error_threshold_percent: parse_or(
                "CIRCUIT_BREAKER_ERROR_THRESHOLD",
                BREAKER_ERROR_THRESHOLD_PERCENT,
            ),
            breaker_timeout_ms: parse_or("CIRCUIT_BREAKER_TIMEOUT", BREAKER_TIMEOUT_MS),
            breaker_reset_timeout_ms: parse_or(
                "CIRCUIT_BREAKER_RESET_TIMEOUT",
                BREAKER_RESET_TIMEOUT_MS,
            ),
            breaker_window_size: parse_or("CIRCUIT_BREAKER_WINDOW_SIZE", BREAKER_WINDOW_SIZE),
            breaker_min_calls: parse_or("CIRCUIT_BREAKER_MIN_CALLS", BREAKER_MIN_CALLS),
            cache_ttl_manifest_secs: parse_or("CACHE_TTL_MANIFEST_SECS", CACHE_TTL_MANIFEST_SECS),
            cache_ttl_properties_secs: parse_or(
                "CACHE_TTL_PROPERTIES_SECS",
                CACHE_TTL_PROPERTIES_SECS,
            ),
            cache_ttl_quantities_secs: parse_or(
                "CACHE_TTL_QUANTITIES_SECS",
                CACHE_TTL_QUANTITIES_SECS,
            ),
            cache_max_entries: parse_or("CACHE_MAX_ENTRIES", CACHE_MAX_ENTRIES),
            job_max_attempts: parse_or("JOB_MAX_ATTEMPTS", JOB_MAX_ATTEMPTS),
            job_backoff_base_ms: parse_or("JOB_BACKOFF_BASE_MS", JOB_BACKOFF_BASE_MS),
            job_max_backoff_secs: parse_or("JOB_MAX_BACKOFF_SECS", JOB_MAX_BACKOFF_SECS),
            job_max_workers: parse_or("JOB_MAX_WORKERS", JOB_MAX_WORKERS),
            job_poll_interval_ms: parse_or("JOB_POLL_INTERVAL_MS", JOB_POLL_INTERVAL_MS),
            job_timeout_secs: parse_or("JOB_TIMEOUT_SECS", JOB_TIMEOUT_SECS),
            job_lease_secs: parse_or("JOB_LEASE_SECS", JOB_LEASE_SECS),
            forge_base_url: env::var("FORGE_BASE_URL")
                .unwrap_or(d.forge_base_url)
                .trim_end_matches('/')
                .to_string(),
            forge_client_id: non_empty("FORGE_CLIENT_ID"),
            forge_client_secret: non_empty("FORGE_CLIENT_SECRET"),
            forge_bucket: env::var("FORGE_BUCKET").unwrap_or(d.forge_bucket),
            forge_poll_initial_ms: parse_or("FORGE_POLL_INITIAL_MS", FORGE_POLL_INITIAL_MS),
            forge_poll_max_ms: parse_or("FORGE_POLL_MAX_MS", FORGE_POLL_MAX_MS),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.allowed_extensions.is_empty() {
            anyhow::bail!("ALLOWED_EXTENSIONS must list at least one extension");
        }
        if self.max_upload_size_bytes == 0 {
            anyhow::bail!("MAX_UPLOAD_SIZE_BYTES must be greater than zero");
        }
        if self.breaker_error_threshold_percent <= 0.0
            || self.breaker_error_threshold_percent > 100.0
        {
            anyhow::bail!("CIRCUIT_BREAKER_ERROR_THRESHOLD must be within (0, 100]");
        }
        if self.breaker_window_size == 0 || self.breaker_min_calls == 0 {
            anyhow::bail!("CIRCUIT_BREAKER_WINDOW_SIZE and CIRCUIT_BREAKER_MIN_CALLS must be positive");
        }
        if self.breaker_min_calls > self.breaker_window_size {
            anyhow::bail!("CIRCUIT_BREAKER_MIN_CALLS cannot exceed CIRCUIT_BREAKER_WINDOW_SIZE");
        }
        if self.job_max_attempts < 1 {
            anyhow::bail!("JOB_MAX_ATTEMPTS must be at least 1");
        }
        if self.job_max_workers == 0 {
            anyhow::bail!("JOB_MAX_WORKERS must be at least 1");
        }
        if self.job_lease_secs <= self.job_timeout_secs {
            anyhow::bail!("JOB_LEASE_SECS must be longer than JOB_TIMEOUT_SECS");
        }
        if self.storage_backend == StorageBackend::S3 && self.s3_bucket.is_none() {
            anyhow::bail!("S3_BUCKET must be set when STORAGE_BACKEND=s3");
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Config(pub Box<PipelineConfig>);

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        let config = PipelineConfig::from_env()?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.0.validate()
    }

    pub fn pipeline(&self) -> &PipelineConfig {
        &self.0
    }

    pub fn is_production(&self) -> bool {
        matches!(self.0.environment.to_lowercase().as_str(), "production" | "prod")
    }

    pub fn server_port(&self) -> u16 {
        self.0.server_port
    }

    pub fn environment(&self) -> &str {
        &self.0.environment
    }

    pub fn cors_origins(&self) -> &[String] {
        &self.0.cors_origins
    }

    pub fn database_url(&self) -> Option<&str> {
        self.0.database_url.as_deref()
    }

    pub fn db_max_connections(&self) -> u32 {
        self.0.db_max_connections
    }

    pub fn storage_backend(&self) -> StorageBackend {
        self.0.storage_backend
    }

    pub fn local_storage_path(&self) -> &PathBuf {
        &self.0.local_storage_path
    }

    pub fn s3_bucket(&self) -> Option<&str> {
        self.0.s3_bucket.as_deref()
    }

    pub fn s3_region(&self) -> &str {
        &self.0.s3_region
    }

    pub fn s3_endpoint(&self) -> Option<&str> {
        self.0.s3_endpoint.as_deref()
    }

    pub fn storage_max_retries(&self) -> u32 {
        self.0.storage_max_retries
    }

    pub fn upload_temp_dir(&self) -> &PathBuf {
        &self.0.upload_temp_dir
    }

    pub fn max_upload_size_bytes(&self) -> u64 {
        self.0.max_upload_size_bytes
    }

    pub fn allowed_extensions(&self) -> &[String] {
        &self.0.allowed_extensions
    }

    pub fn allowed_content_types(&self) -> &[String] {
        &self.0.allowed_content_types
    }

    pub fn breaker_error_threshold_percent(&self) -> f64 {
        self.0.breaker_error_threshold_percent
    }

    pub fn breaker_timeout(&self) -> Duration {
        Duration::from_millis(self.0.breaker_timeout_ms)
    }

    pub fn breaker_reset_timeout(&self) -> Duration {
        Duration::from_millis(self.0.breaker_reset_timeout_ms)
    }

    pub fn breaker_window_size(&self) -> usize {
        self.0.breaker_window_size
    }

    pub fn breaker_min_calls(&self) -> usize {
        self.0.breaker_min_calls
    }

    pub fn cache_ttl_manifest(&self) -> Duration {
        Duration::from_secs(self.0.cache_ttl_manifest_secs)
    }

    pub fn cache_ttl_properties(&self) -> Duration {
        Duration::from_secs(self.0.cache_ttl_properties_secs)
    }

    pub fn cache_ttl_quantities(&self) -> Duration {
        Duration::from_secs(self.0.cache_ttl_quantities_secs)
    }

    pub fn cache_max_entries(&self) -> usize {
        self.0.cache_max_entries
    }

    pub fn job_max_attempts(&self) -> i32 {
        self.0.job_max_attempts
    }

    pub fn job_backoff_base(&self) -> Duration {
        Duration::from_millis(self.0.job_backoff_base_ms)
    }

    pub fn job_max_backoff(&self) -> Duration {
        Duration::from_secs(self.0.job_max_backoff_secs)
    }

    pub fn job_max_workers(&self) -> usize {
        self.0.job_max_workers
    }

    pub fn job_poll_interval_ms(&self) -> u64 {
        self.0.job_poll_interval_ms
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.0.job_timeout_secs)
    }

    pub fn job_lease(&self) -> Duration {
        Duration::from_secs(self.0.job_lease_secs)
    }

    pub fn forge_base_url(&self) -> &str {
        &self.0.forge_base_url
    }

    pub fn forge_client_id(&self) -> Option<&str> {
        self.0.forge_client_id.as_deref()
    }

    pub fn forge_client_secret(&self) -> Option<&str> {
        self.0.forge_client_secret.as_deref()
    }

    pub fn forge_bucket(&self) -> &str {
        &self.0.forge_bucket
    }

    pub fn forge_poll_initial(&self) -> Duration {
        Duration::from_millis(self.0.forge_poll_initial_ms)
    }

    pub fn forge_poll_max(&self) -> Duration {
        Duration::from_millis(self.0.forge_poll_max_ms)
    }
}

impl From<PipelineConfig> for Config {
    fn from(config: PipelineConfig) -> Self {
        Config(Box::new(config))
    }
}
