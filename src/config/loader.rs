//! Configuration Loader
//!
//! Environment-aware loading on top of the `config` crate. Sources, later
//! ones winning:
//!
//! 1. `<dir>/registration.toml`
//! 2. `<dir>/registration.<environment>.toml`
//! 3. `REGISTRATION__*` environment variables (`__` separates nesting levels,
//!    e.g. `REGISTRATION__BACKOFF__MAX_DELIVERIES=3`)
//!
//! Both files are optional.

use super::error::ConfigResult;
use super::RegistrationConfig;
use config::{Config, Environment, File, FileFormat};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

const CONFIG_FILE_STEM: &str = "registration";
const ENV_PREFIX: &str = "REGISTRATION";
const ENV_SEPARATOR: &str = "__";

pub struct ConfigManager {
    config: RegistrationConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_sources(config_dir, environment, None)
    }

    /// Load with an explicit set of `REGISTRATION__*` variables instead of the
    /// process environment. Useful for testing without touching global state.
    pub fn load_from_sources(
        config_dir: Option<PathBuf>,
        environment: &str,
        env_overrides: Option<HashMap<String, String>>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let env_source = Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
            .source(env_overrides);

        let config: RegistrationConfig = Config::builder()
            .add_source(Self::file_source(&Self::base_file(&config_directory)))
            .add_source(Self::file_source(&Self::environment_file(
                &config_directory,
                environment,
            )))
            .add_source(env_source)
            .build()?
            .try_deserialize()?;

        config.validate()?;

        debug!(config = ?config, "Configuration loaded successfully");
        info!(
            environment = environment,
            attempt_limit = config.registration_attempt_limit,
            wait_for_payment = config.wait_for_payment_to_register,
            workers = config.worker.concurrency,
            "Registration configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    fn file_source(path: &Path) -> File<config::FileSourceFile, FileFormat> {
        File::from(path.to_path_buf())
            .format(FileFormat::Toml)
            .required(false)
    }

    fn base_file(config_directory: &Path) -> PathBuf {
        config_directory.join(format!("{CONFIG_FILE_STEM}.toml"))
    }

    fn environment_file(config_directory: &Path, environment: &str) -> PathBuf {
        config_directory.join(format!("{CONFIG_FILE_STEM}.{environment}.toml"))
    }

    pub(crate) fn detect_environment() -> String {
        env::var("REGISTRATION_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn default_config_directory() -> PathBuf {
        env::var("REGISTRATION_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }
}

static GLOBAL_CONFIG: OnceLock<Arc<ConfigManager>> = OnceLock::new();

impl ConfigManager {
    /// Get or initialize the global configuration instance
    pub fn global() -> Arc<ConfigManager> {
        GLOBAL_CONFIG
            .get_or_init(|| {
                ConfigManager::load().unwrap_or_else(|e| {
                    warn!("Configuration loading failed, using defaults: {e}");
                    Arc::new(ConfigManager::fallback())
                })
            })
            .clone()
    }

    /// Initialize the global instance from a specific directory. The first
    /// initialization wins.
    pub fn initialize_global(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let config_manager = ConfigManager::load_from_directory(config_dir)?;
        Ok(GLOBAL_CONFIG.get_or_init(|| config_manager).clone())
    }

    fn fallback() -> ConfigManager {
        ConfigManager {
            config: RegistrationConfig::default(),
            environment: Self::detect_environment(),
            config_directory: Self::default_config_directory(),
        }
    }
}

impl std::fmt::Debug for ConfigManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigManager")
            .field("environment", &self.environment)
            .field("config_directory", &self.config_directory)
            .finish()
    }
}
