use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::path::PathBuf;
use std::time::Duration;

/// Default generation script, resolved against the working directory.
pub const DEFAULT_SCRIPT_PATH: &str = "coloring_script.sh";
pub const DEFAULT_CREDENTIAL_VAR: &str = "OPENAI_API_KEY";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct ColoringConfig {
    pub common: core_config::Config,
    pub invoker: InvokerConfig,
    /// Port of the health/metrics listener.
    pub ops_port: u16,
}

/// How the generation script is located and run.
#[derive(Debug, Clone, Deserialize)]
pub struct InvokerConfig {
    #[serde(default = "default_script_path")]
    pub script_path: PathBuf,
    #[serde(default = "default_shell")]
    pub shell: String,
    /// Environment variable that must hold the generation API key.
    #[serde(default = "default_credential_var")]
    pub credential_var: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct ServiceSettings {
    #[serde(default)]
    invoker: InvokerConfig,
    #[serde(default = "default_ops_port")]
    ops_port: u16,
}

fn default_script_path() -> PathBuf {
    PathBuf::from(DEFAULT_SCRIPT_PATH)
}

fn default_shell() -> String {
    "bash".to_string()
}

fn default_credential_var() -> String {
    DEFAULT_CREDENTIAL_VAR.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_ops_port() -> u16 {
    9090
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            script_path: default_script_path(),
            shell: default_shell(),
            credential_var: default_credential_var(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl InvokerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Script path with a leading `~/` expanded against `$HOME`.
    pub fn resolved_script_path(&self) -> PathBuf {
        expand_home(&self.script_path)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.timeout_secs == 0 {
            return Err(config_error("invoker.timeout_secs must be greater than zero"));
        }
        if self.shell.trim().is_empty() {
            return Err(config_error("invoker.shell must not be empty"));
        }
        if self.credential_var.trim().is_empty() {
            return Err(config_error("invoker.credential_var must not be empty"));
        }
        Ok(())
    }
}

impl Default for ColoringConfig {
    fn default() -> Self {
        Self {
            common: core_config::Config::default(),
            invoker: InvokerConfig::default(),
            ops_port: default_ops_port(),
        }
    }
}

impl ColoringConfig {
    pub fn load() -> Result<Self, AppError> {
        // Common settings (port, log level, OTLP) come from the shared loader.
        let common = core_config::Config::load()?;
        let settings: ServiceSettings = core_config::Config::load_as()?;

        let config = ColoringConfig {
            common,
            invoker: settings.invoker,
            ops_port: settings.ops_port,
        };
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        self.invoker.validate()?;

        if self.ops_port == self.common.port && self.ops_port != 0 {
            return Err(config_error(format!(
                "ops_port ({}) must differ from port",
                self.ops_port
            )));
        }

        Ok(())
    }
}

fn config_error(message: impl Into<String>) -> AppError {
    AppError::ConfigError(anyhow::anyhow!(message.into()))
}

fn expand_home(path: &std::path::Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}
