use thiserror::Error;
use url::Url;

/// Environment variable consulted for the provisioning API base URL.
pub const BASE_URL_ENV: &str = "PROVISIONER_API_URL";
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid base URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Unsupported URL scheme '{0}', expected http or https")]
    UnsupportedScheme(String),
}

/// Settings fixed at process start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelConfig {
    base_url: String,
}

impl PanelConfig {
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        let trimmed = base_url.trim().trim_end_matches('/');
        let parsed = Url::parse(trimmed).map_err(|source| ConfigError::InvalidUrl {
            url: base_url.to_string(),
            source,
        })?;

        match parsed.scheme() {
            "http" | "https" => Ok(Self {
                base_url: trimmed.to_string(),
            }),
            other => Err(ConfigError::UnsupportedScheme(other.to_string())),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}
