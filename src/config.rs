use std::path::PathBuf;

use crate::error::{Result, ToolError};
use crate::pipeline::{DEFAULT_MAX_PAGES, Pagination};

pub const DEFAULT_GOOGLE_BASE_URL: &str = "https://maps.googleapis.com/maps/api";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_SBA_BASE_URL: &str = "https://data.sba.gov/api/sba";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
pub const DEFAULT_OUTPUT_DIR: &str = "output";

/// Credentials and endpoints for every upstream tool.
///
/// Credentials stay optional here; each client checks for the key it needs
/// when it is constructed.
#[derive(Debug, Clone)]
pub struct Config {
    pub google_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub sba_api_key: Option<String>,
    pub openai_model: String,
    pub google_base_url: String,
    pub openai_base_url: String,
    pub sba_base_url: String,
    pub output_dir: PathBuf,
    pub pagination: Pagination,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            google_api_key: None,
            openai_api_key: None,
            sba_api_key: None,
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            google_base_url: DEFAULT_GOOGLE_BASE_URL.to_string(),
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            sba_base_url: DEFAULT_SBA_BASE_URL.to_string(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            pagination: Pagination::default(),
        }
    }
}

impl Config {
    /// Loads `.env` when present, then reads the process environment.
    pub fn from_env() -> Result<Self> {
        if dotenvy::dotenv().is_err() {
            tracing::debug!("no .env file loaded; using process environment only");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let max_pages = match value("VALLEY_MAX_PAGES") {
            Some(raw) => raw.trim().parse::<usize>().ok().filter(|pages| *pages > 0).ok_or_else(
                || ToolError::InvalidArgument(format!("VALLEY_MAX_PAGES must be a positive integer, got '{raw}'")),
            )?,
            None => DEFAULT_MAX_PAGES,
        };

        Ok(Self {
            google_api_key: value("GOOGLE_API_KEY"),
            openai_api_key: value("OPENAI_API_KEY"),
            sba_api_key: value("SBA_API_KEY"),
            openai_model: value("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            google_base_url: value("GOOGLE_PLACES_BASE_URL")
                .map(|url| validate_url("GOOGLE_PLACES_BASE_URL", url))
                .transpose()?
                .unwrap_or(defaults.google_base_url),
            openai_base_url: value("OPENAI_BASE_URL")
                .map(|url| validate_url("OPENAI_BASE_URL", url))
                .transpose()?
                .unwrap_or(defaults.openai_base_url),
            sba_base_url: value("SBA_BASE_URL")
                .map(|url| validate_url("SBA_BASE_URL", url))
                .transpose()?
                .unwrap_or(defaults.sba_base_url),
            output_dir: value("VALLEY_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            pagination: Pagination::with_max_pages(max_pages),
        })
    }
}

/// Returns the credential or a `ConfigurationMissing` error naming it.
pub(crate) fn require_key(
    key: Option<&str>,
    variable: &'static str,
    hint: &'static str,
) -> Result<String> {
    key.map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .ok_or(ToolError::ConfigurationMissing { variable, hint })
}

fn validate_url(variable: &str, url: String) -> Result<String> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ToolError::InvalidArgument(format!(
            "{variable} must start with http:// or https://"
        )));
    }
    Ok(url.trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_environment_is_empty() {
        let config = Config::from_lookup(lookup(&[])).expect("config builds");

        assert_eq!(config.google_api_key, None);
        assert_eq!(config.openai_model, DEFAULT_OPENAI_MODEL);
        assert_eq!(config.output_dir, PathBuf::from(DEFAULT_OUTPUT_DIR));
        assert_eq!(config.pagination.max_pages(), DEFAULT_MAX_PAGES);
    }

    #[test]
    fn blank_credentials_are_treated_as_absent() {
        let config = Config::from_lookup(lookup(&[("GOOGLE_API_KEY", "  "), ("OPENAI_API_KEY", "sk-test")]))
            .expect("config builds");

        assert_eq!(config.google_api_key, None);
        assert_eq!(config.openai_api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn overrides_are_read_and_urls_normalized() {
        let config = Config::from_lookup(lookup(&[
            ("GOOGLE_PLACES_BASE_URL", "http://127.0.0.1:9000/"),
            ("VALLEY_MAX_PAGES", "3"),
            ("VALLEY_OUTPUT_DIR", "/tmp/valley"),
        ]))
        .expect("config builds");

        assert_eq!(config.google_base_url, "http://127.0.0.1:9000");
        assert_eq!(config.pagination.max_pages(), 3);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/valley"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            Config::from_lookup(lookup(&[("VALLEY_MAX_PAGES", "zero")])),
            Err(ToolError::InvalidArgument(_))
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("SBA_BASE_URL", "ftp://example.com")])),
            Err(ToolError::InvalidArgument(_))
        ));
    }

    #[test]
    fn require_key_reports_the_missing_variable() {
        let error = require_key(None, "GOOGLE_API_KEY", "set it in .env").expect_err("missing");
        assert!(error.to_string().contains("GOOGLE_API_KEY"));
        assert_eq!(require_key(Some(" k "), "X", "").expect("present"), "k");
    }
}
