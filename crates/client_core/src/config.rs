use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use url::Url;

pub const DEFAULT_CONFIG_FILE: &str = "backupctl.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Delay before the store re-reads the listing after a create.
    pub refresh_delay_ms: u64,
    pub request_timeout_ms: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".into(),
            api_key: None,
            refresh_delay_ms: 2000,
            request_timeout_ms: None,
        }
    }
}

impl ClientConfig {
    pub fn refresh_delay(&self) -> Duration {
        Duration::from_millis(self.refresh_delay_ms)
    }

    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.base_url)
            .with_context(|| format!("invalid base_url '{}'", self.base_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("base_url must start with http:// or https://");
        }
        Ok(())
    }
}

/// Defaults, then the toml file (if present), then environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<ClientConfig> {
    let mut config = ClientConfig::default();

    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    match fs::read_to_string(&path) {
        Ok(raw) => apply_file(&mut config, &raw)
            .with_context(|| format!("failed to parse config file '{}'", path.display()))?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read config file '{}'", path.display()))
        }
    }

    apply_env(&mut config, |key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

fn apply_file(config: &mut ClientConfig, raw: &str) -> Result<()> {
    let file_cfg = toml::from_str::<HashMap<String, toml::Value>>(raw)?;

    if let Some(v) = file_cfg.get("base_url").and_then(toml::Value::as_str) {
        config.base_url = v.to_string();
    }
    if let Some(v) = file_cfg.get("api_key").and_then(toml::Value::as_str) {
        config.api_key = Some(v.to_string());
    }
    if let Some(v) = file_cfg.get("refresh_delay_ms") {
        config.refresh_delay_ms = non_negative(v, "refresh_delay_ms")?;
    }
    if let Some(v) = file_cfg.get("request_timeout_ms") {
        config.request_timeout_ms = Some(non_negative(v, "request_timeout_ms")?);
    }
    Ok(())
}

fn non_negative(value: &toml::Value, key: &str) -> Result<u64> {
    value
        .as_integer()
        .and_then(|v| u64::try_from(v).ok())
        .with_context(|| format!("{key} must be a non-negative integer"))
}

fn apply_env(config: &mut ClientConfig, var: impl Fn(&str) -> Option<String>) -> Result<()> {
    if let Some(v) = var("BACKUP_API_URL") {
        config.base_url = v;
    }
    if let Some(v) = var("APP__BASE_URL") {
        config.base_url = v;
    }

    if let Some(v) = var("BACKUP_API_KEY") {
        config.api_key = Some(v);
    }
    if let Some(v) = var("APP__API_KEY") {
        config.api_key = Some(v);
    }
    if config.api_key.as_deref().is_some_and(str::is_empty) {
        config.api_key = None;
    }

    if let Some(v) = var("APP__REFRESH_DELAY_MS") {
        config.refresh_delay_ms = v
            .parse()
            .with_context(|| format!("APP__REFRESH_DELAY_MS is not a number: {v}"))?;
    }
    if let Some(v) = var("APP__REQUEST_TIMEOUT_MS") {
        config.request_timeout_ms = Some(
            v.parse()
                .with_context(|| format!("APP__REQUEST_TIMEOUT_MS is not a number: {v}"))?,
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn file_values_override_defaults() {
        let mut config = ClientConfig::default();
        apply_file(
            &mut config,
            "base_url = \"https://backups.internal\"\napi_key = \"secret\"\nrefresh_delay_ms = 500\n",
        )
        .expect("apply file");

        assert_eq!(config.base_url, "https://backups.internal");
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.refresh_delay(), Duration::from_millis(500));
        assert_eq!(config.request_timeout_ms, None);
    }

    #[test]
    fn negative_delay_in_file_is_rejected() {
        let mut config = ClientConfig::default();
        assert!(apply_file(&mut config, "refresh_delay_ms = -1\n").is_err());
    }

    #[test]
    fn app_prefixed_env_wins_over_plain_env() {
        let mut config = ClientConfig::default();
        apply_env(
            &mut config,
            env_of(&[
                ("BACKUP_API_URL", "http://plain:8000"),
                ("APP__BASE_URL", "http://prefixed:8000"),
                ("BACKUP_API_KEY", "k1"),
                ("APP__REQUEST_TIMEOUT_MS", "1500"),
            ]),
        )
        .expect("apply env");

        assert_eq!(config.base_url, "http://prefixed:8000");
        assert_eq!(config.api_key.as_deref(), Some("k1"));
        assert_eq!(config.request_timeout_ms, Some(1500));
    }

    #[test]
    fn empty_api_key_means_no_header() {
        let mut config = ClientConfig::default();
        apply_env(&mut config, env_of(&[("BACKUP_API_KEY", "")])).expect("apply env");
        assert_eq!(config.api_key, None);
    }

    #[test]
    fn unparsable_env_delay_is_an_error() {
        let mut config = ClientConfig::default();
        assert!(apply_env(&mut config, env_of(&[("APP__REFRESH_DELAY_MS", "soon")])).is_err());
    }

    #[test]
    fn validate_rejects_non_http_urls() {
        let config = ClientConfig {
            base_url: "ftp://backups".into(),
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(ClientConfig::default().validate().is_ok());
    }
}
