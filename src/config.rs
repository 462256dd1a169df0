use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::forecast::DEFAULT_WINDOW;

pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_url: Option<String>,
    pub model_dir: PathBuf,
    pub forecast_window: usize,
    pub log_filter: String,
    pub predict_lookback_days: i64,
    pub forecast_lookback_days: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            model_dir: PathBuf::from("./models"),
            forecast_window: DEFAULT_WINDOW,
            log_filter: "info".to_string(),
            predict_lookback_days: 30,
            forecast_lookback_days: 60,
        }
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::load_default()?,
        };
        if let Ok(url) = std::env::var(DATABASE_URL_ENV) {
            config.database_url = Some(url);
        }
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn load_default() -> anyhow::Result<Self> {
        if let Some(home) = dirs::home_dir() {
            let path = home.join(".workwell").join("config.toml");
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }
        Ok(Config::default())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.forecast_window == 0 {
            bail!("forecast_window must be greater than 0");
        }
        if self.predict_lookback_days < 1 || self.forecast_lookback_days < 1 {
            bail!("lookback windows must be at least one day");
        }
        Ok(())
    }

    pub fn database_url(&self) -> anyhow::Result<&str> {
        self.database_url.as_deref().with_context(|| {
            format!("{DATABASE_URL_ENV} must be set or database_url configured")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.forecast_window, 14);
        assert_eq!(config.model_dir, PathBuf::from("./models"));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "forecast_window = 7\nlog_filter = \"debug\"").unwrap();
        let config = Config::load_from_file(file.path()).unwrap();
        assert_eq!(config.forecast_window, 7);
        assert_eq!(config.log_filter, "debug");
        assert_eq!(config.predict_lookback_days, 30);
    }

    #[test]
    fn zero_window_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "forecast_window = 0").unwrap();
        assert!(Config::load_from_file(file.path()).is_err());
    }

    #[test]
    fn missing_database_url_is_an_error() {
        let config = Config::default();
        assert!(config.database_url().is_err());
        let configured = Config {
            database_url: Some("postgres://localhost/workwell".to_string()),
            ..Config::default()
        };
        assert_eq!(
            configured.database_url().unwrap(),
            "postgres://localhost/workwell"
        );
    }
}
