//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/vstudio/config.toml)
//! 3. Environment variables (VSTUDIO_* prefix)
//!
//! Environment variables take precedence over config file values.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable prefix
const ENV_PREFIX: &str = "VSTUDIO";

/// Which document store backs the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// SQLite database under `data_dir`
    #[default]
    Sqlite,
    /// Process-local store, discarded on exit
    Memory,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Sqlite => f.write_str("sqlite"),
            Backend::Memory => f.write_str("memory"),
        }
    }
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Backend::Sqlite),
            "memory" => Ok(Backend::Memory),
            other => bail!("Unknown backend '{}'. Use 'sqlite' or 'memory'.", other),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for data storage (SQLite database)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Document store backend
    #[serde(default)]
    pub backend: Backend,

    /// Database name; the SQLite file is `<data_dir>/<database>.db`
    #[serde(default = "default_database")]
    pub database: String,

    /// Log level for the vstudio crates (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enforce key-field uniqueness with store indexes at startup
    #[serde(default = "default_unique_indexes")]
    pub unique_indexes: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            backend: Backend::default(),
            database: default_database(),
            log_level: default_log_level(),
            unique_indexes: default_unique_indexes(),
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (VSTUDIO_DATA_DIR, VSTUDIO_BACKEND, ...)
    /// 2. Config file (~/.config/vstudio/config.toml or VSTUDIO_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration, preferring an explicit path given on the command line
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides()?;
        if config.backend == Backend::Sqlite {
            config.ensure_data_dir()?;
        }
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        // VSTUDIO_DATA_DIR
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        // VSTUDIO_BACKEND
        if let Ok(val) = std::env::var(format!("{}_BACKEND", ENV_PREFIX)) {
            self.backend = val.parse().context("Invalid VSTUDIO_BACKEND")?;
        }

        // VSTUDIO_DATABASE
        if let Ok(val) = std::env::var(format!("{}_DATABASE", ENV_PREFIX)) {
            if !val.is_empty() {
                self.database = val;
            }
        }

        // VSTUDIO_LOG_LEVEL
        if let Ok(val) = std::env::var(format!("{}_LOG_LEVEL", ENV_PREFIX)) {
            if !val.is_empty() {
                self.log_level = val;
            }
        }

        // VSTUDIO_UNIQUE_INDEXES
        if let Ok(val) = std::env::var(format!("{}_UNIQUE_INDEXES", ENV_PREFIX)) {
            self.unique_indexes = val.eq_ignore_ascii_case("true") || val == "1";
        }

        Ok(())
    }

    /// Update one setting by name, as given on the command line
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "data_dir" => self.data_dir = PathBuf::from(value),
            "backend" => self.backend = value.parse()?,
            "database" => {
                if value.is_empty() {
                    bail!("database must not be empty");
                }
                self.database = value.to_string();
            }
            "log_level" => self.log_level = value.to_string(),
            "unique_indexes" => {
                self.unique_indexes = value
                    .parse()
                    .context("Invalid value for unique_indexes. Use 'true' or 'false'.")?;
            }
            _ => bail!(
                "Unknown configuration key: '{}'\n\
                 Valid keys: data_dir, backend, database, log_level, unique_indexes",
                key
            ),
        }
        Ok(())
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to the default file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with VSTUDIO_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vstudio")
            .join("config.toml")
    }

    /// Get the path to the SQLite database
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.db", self.database))
    }
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vstudio")
}

fn default_database() -> String {
    "vstudio".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_unique_indexes() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;
    use tempfile::TempDir;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "VSTUDIO_DATA_DIR",
        "VSTUDIO_BACKEND",
        "VSTUDIO_DATABASE",
        "VSTUDIO_LOG_LEVEL",
        "VSTUDIO_UNIQUE_INDEXES",
        "VSTUDIO_CONFIG",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.backend, Backend::Sqlite);
        assert_eq!(config.database, "vstudio");
        assert_eq!(config.log_level, "info");
        assert!(config.unique_indexes);
        assert!(config.data_dir.ends_with("vstudio"));
    }

    #[test]
    fn test_database_path() {
        let config = Config {
            data_dir: PathBuf::from("/data"),
            database: "studio".to_string(),
            ..Config::default()
        };
        assert_eq!(config.database_path(), PathBuf::from("/data/studio.db"));
    }

    #[test]
    fn test_env_override_data_dir() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("VSTUDIO_DATA_DIR", "/tmp/vstudio-test");
        config.apply_env_overrides().unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/vstudio-test"));
    }

    #[test]
    fn test_env_override_backend() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("VSTUDIO_BACKEND", "MEMORY");
        config.apply_env_overrides().unwrap();
        assert_eq!(config.backend, Backend::Memory);

        env::set_var("VSTUDIO_BACKEND", "mongo");
        assert!(config.apply_env_overrides().is_err());
    }

    #[test]
    fn test_env_override_unique_indexes() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("VSTUDIO_UNIQUE_INDEXES", "false");
        config.apply_env_overrides().unwrap();
        assert!(!config.unique_indexes);

        env::set_var("VSTUDIO_UNIQUE_INDEXES", "1");
        config.apply_env_overrides().unwrap();
        assert!(config.unique_indexes);
    }

    #[test]
    fn test_env_override_database_and_log_level() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("VSTUDIO_DATABASE", "scratch");
        env::set_var("VSTUDIO_LOG_LEVEL", "debug");
        config.apply_env_overrides().unwrap();
        assert_eq!(config.database, "scratch");
        assert_eq!(config.log_level, "debug");

        // Empty strings keep the current value
        env::set_var("VSTUDIO_DATABASE", "");
        config.apply_env_overrides().unwrap();
        assert_eq!(config.database, "scratch");
    }

    #[test]
    fn test_serialization() {
        let _guard = EnvGuard::new(ENV_VARS);

        let config = Config {
            data_dir: PathBuf::from("/data/vstudio"),
            backend: Backend::Memory,
            database: "studio".to_string(),
            log_level: "warn".to_string(),
            unique_indexes: false,
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("backend = \"memory\""));
        assert!(toml_str.contains("unique_indexes = false"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.data_dir, config.data_dir);
        assert_eq!(parsed.backend, config.backend);
        assert_eq!(parsed.database, config.database);
        assert!(!parsed.unique_indexes);
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            data_dir = "/custom/data"
            backend = "memory"
            log_level = "debug"
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(config.backend, Backend::Memory);
        assert_eq!(config.log_level, "debug");
        // Unset fields fall back to defaults
        assert_eq!(config.database, "vstudio");
        assert!(config.unique_indexes);
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp = TempDir::new().unwrap();
        env::set_var("VSTUDIO_DATA_DIR", temp.path().join("data"));

        let path = PathBuf::from("/nonexistent/config.toml");
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.backend, Backend::Sqlite);
        assert!(temp.path().join("data").exists());
    }

    #[test]
    fn test_save_and_reload() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");

        let mut config = Config::load_from_str("backend = \"memory\"").unwrap();
        config.set("database", "studio").unwrap();
        config.set("unique_indexes", "false").unwrap();
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_with_cli_override(Some(&path)).unwrap();
        assert_eq!(loaded.backend, Backend::Memory);
        assert_eq!(loaded.database, "studio");
        assert!(!loaded.unique_indexes);
    }

    #[test]
    fn test_set_rejects_bad_input() {
        let mut config = Config::default();
        assert!(config.set("colour", "blue").is_err());
        assert!(config.set("backend", "mongo").is_err());
        assert!(config.set("unique_indexes", "maybe").is_err());
        assert!(config.set("database", "").is_err());
    }
}
