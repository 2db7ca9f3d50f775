use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix for environment-variable configuration
pub const ENV_PREFIX: &str = "TARGET_MATTERBEAM_HTTP_";

pub const DEFAULT_USER_AGENT: &str = "matterbeam-tap/0.0.0";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BATCH_SIZE_ROWS: usize = 10_000;

/// Sink configuration, loaded once at startup.
#[derive(Clone, Deserialize)]
pub struct SinkConfig {
    pub api_token: String,
    pub api_url: String,
    #[serde(default = "default_true")]
    pub api_batching: bool,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_extra_retry_statuses")]
    pub extra_retry_statuses: Vec<u16>,
    #[serde(default = "default_batch_size")]
    pub batch_size_rows: usize,
    #[serde(default)]
    pub allow_redirects: bool,
    #[serde(default)]
    pub debug_requests: bool,
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_extra_retry_statuses() -> Vec<u16> {
    vec![429]
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE_ROWS
}

#[derive(Debug)]
pub enum ConfigError {
    Read { path: PathBuf, source: std::io::Error },
    Parse(String),
    Missing(&'static str),
    Invalid { field: &'static str, reason: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read {}: {}", path.display(), source)
            }
            ConfigError::Parse(e) => write!(f, "failed to parse config: {}", e),
            ConfigError::Missing(field) => write!(f, "missing required setting '{}'", field),
            ConfigError::Invalid { field, reason } => write!(f, "invalid '{}': {}", field, reason),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl std::fmt::Debug for SinkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkConfig")
            .field("api_token", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("api_batching", &self.api_batching)
            .field("user_agent", &self.user_agent)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_attempts", &self.max_attempts)
            .field("extra_retry_statuses", &self.extra_retry_statuses)
            .field("batch_size_rows", &self.batch_size_rows)
            .field("allow_redirects", &self.allow_redirects)
            .field("debug_requests", &self.debug_requests)
            .finish()
    }
}

impl SinkConfig {
    /// Minimal config with defaults for everything optional.
    pub fn new(api_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            api_url: api_url.into(),
            api_batching: true,
            user_agent: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            extra_retry_statuses: default_extra_retry_statuses(),
            batch_size_rows: DEFAULT_BATCH_SIZE_ROWS,
            allow_redirects: false,
            debug_requests: false,
        }
    }

    /// Load from a JSON file, or TOML when the extension is `.toml`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let is_toml = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);
        let config: SinkConfig = if is_toml {
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?
        } else {
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?
        };
        config.validated()
    }

    /// Load from `TARGET_MATTERBEAM_HTTP_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup; `lookup` receives full names
    /// such as `TARGET_MATTERBEAM_HTTP_API_TOKEN`.
    pub fn from_lookup(mut lookup: impl FnMut(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        let api_token = var("API_TOKEN").ok_or(ConfigError::Missing("api_token"))?;
        let api_url = var("API_URL").ok_or(ConfigError::Missing("api_url"))?;
        let mut config = SinkConfig::new(api_url, api_token);

        if let Some(v) = var("API_BATCHING") {
            config.api_batching = parse_bool("api_batching", &v)?;
        }
        if let Some(v) = var("USER_AGENT") {
            config.user_agent = Some(v);
        }
        if let Some(v) = var("REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = parse_num("request_timeout_secs", &v)?;
        }
        if let Some(v) = var("MAX_ATTEMPTS") {
            config.max_attempts = parse_num("max_attempts", &v)?;
        }
        if let Some(v) = var("EXTRA_RETRY_STATUSES") {
            config.extra_retry_statuses = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| parse_num("extra_retry_statuses", s))
                .collect::<Result<_, _>>()?;
        }
        if let Some(v) = var("BATCH_SIZE_ROWS") {
            config.batch_size_rows = parse_num("batch_size_rows", &v)?;
        }
        if let Some(v) = var("ALLOW_REDIRECTS") {
            config.allow_redirects = parse_bool("allow_redirects", &v)?;
        }
        if let Some(v) = var("DEBUG_REQUESTS") {
            config.debug_requests = parse_bool("debug_requests", &v)?;
        }
        config.validated()
    }

    /// Check required values and normalize the base URL.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        if self.api_token.trim().is_empty() {
            return Err(ConfigError::Missing("api_token"));
        }
        let url = reqwest::Url::parse(&self.api_url).map_err(|e| ConfigError::Invalid {
            field: "api_url",
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                field: "api_url",
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        if self.batch_size_rows == 0 {
            return Err(ConfigError::Invalid {
                field: "batch_size_rows",
                reason: "must be at least 1".to_string(),
            });
        }
        self.api_url = self.api_url.trim_end_matches('/').to_string();
        Ok(self)
    }

    pub fn user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_bool(field: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid {
            field,
            reason: format!("expected a boolean, got '{}'", other),
        }),
    }
}

fn parse_num<T: std::str::FromStr>(field: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        field,
        reason: e.to_string(),
    })
}
