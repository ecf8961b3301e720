use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub(crate) const CONFIG_FILE: &str = "codeloop.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub run: RunConfig,
}

/// Generative model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Environment variable holding the provider API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model identifiers in priority order (fastest first, legacy last)
    #[serde(default = "default_models")]
    pub models: Vec<String>,

    /// Pause between fallback attempts, in milliseconds
    #[serde(default = "default_retry_pause_ms")]
    pub retry_pause_ms: u64,

    /// Per-request timeout, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Base URL of the `generateContent` endpoint
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            models: default_models(),
            retry_pause_ms: default_retry_pause_ms(),
            request_timeout_secs: default_request_timeout(),
            api_base: default_api_base(),
        }
    }
}

impl ModelConfig {
    /// Reads the API key from the configured environment variable.
    pub fn api_key(&self) -> Result<String> {
        resolve_api_key(
            &self.api_key_env,
            std::env::var(&self.api_key_env).ok().as_deref(),
        )
    }

    pub fn retry_pause(&self) -> Duration {
        Duration::from_millis(self.retry_pause_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Validates an API key value taken from `var_name`.
/// Split out so tests don't have to touch the process environment.
fn resolve_api_key(var_name: &str, value: Option<&str>) -> Result<String> {
    match value.map(str::trim) {
        Some(key) if !key.is_empty() => Ok(key.to_string()),
        _ => anyhow::bail!(
            "Model API key not set.\n\
             \n\
             Export it before running codeloop:\n\
             export {var_name}=<your key>\n\
             \n\
             Or point [model].api_key_env in {CONFIG_FILE} at another variable."
        ),
    }
}

/// Execution sandbox configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Docker image providing the interpreter
    #[serde(default = "default_image")]
    pub image: String,

    /// Memory ceiling (e.g., "512m", "1g")
    #[serde(default = "default_memory")]
    pub memory: String,

    /// Working directory inside the container
    #[serde(default = "default_working_dir")]
    pub working_dir: String,

    /// File name the candidate program is written to
    #[serde(default = "default_script_name")]
    pub script_name: String,

    /// Interpreter command used to run the script
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Wall-clock limit for one execution, in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: default_image(),
            memory: default_memory(),
            working_dir: default_working_dir(),
            script_name: default_script_name(),
            interpreter: default_interpreter(),
            timeout_secs: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Generate/verify attempts before giving up (at most 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

// Default value functions
fn default_api_key_env() -> String {
    "GOOGLE_API_KEY".to_string()
}

fn default_models() -> Vec<String> {
    vec![
        "gemini-2.5-flash".to_string(),
        "gemini-pro-latest".to_string(),
        "gemini-2.0-flash-lite".to_string(),
        "gemma-3-1b-it".to_string(),
    ]
}

fn default_retry_pause_ms() -> u64 {
    1000
}

fn default_request_timeout() -> u64 {
    120
}

fn default_api_base() -> String {
    "https://generativelanguage.googleapis.com/v1beta/models".to_string()
}

fn default_image() -> String {
    "python:3.9-slim".to_string()
}

fn default_memory() -> String {
    "512m".to_string()
}

fn default_working_dir() -> String {
    "/app".to_string()
}

fn default_script_name() -> String {
    "script.py".to_string()
}

fn default_interpreter() -> String {
    "python".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

impl Config {
    /// Load configuration from file, using defaults if not found
    pub fn load(project_dir: &Path) -> Result<Self> {
        let config_path = project_dir.join(CONFIG_FILE);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        Ok(config)
    }
}

/// Parse memory limit string (e.g., "1g", "512m") to bytes
///
/// The result is always positive; Docker reads 0 as "no limit".
pub(crate) fn parse_memory_limit(limit: &str) -> Result<i64> {
    let limit = limit.trim().to_lowercase();

    let (num, multiplier) = if let Some(num) = limit.strip_suffix('g') {
        (num, 1024 * 1024 * 1024)
    } else if let Some(num) = limit.strip_suffix('m') {
        (num, 1024 * 1024)
    } else if let Some(num) = limit.strip_suffix('k') {
        (num, 1024)
    } else {
        (limit.as_str(), 1)
    };

    let value: i64 = num.parse().context("Invalid memory limit")?;
    if value <= 0 {
        anyhow::bail!("Memory limit must be positive, got '{limit}'");
    }

    value
        .checked_mul(multiplier)
        .with_context(|| format!("Memory limit too large: '{limit}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.run.max_attempts, 3);
        assert_eq!(config.sandbox.image, "python:3.9-slim");
        assert_eq!(config.sandbox.memory, "512m");
        assert_eq!(config.sandbox.working_dir, "/app");
        assert_eq!(config.model.api_key_env, "GOOGLE_API_KEY");
    }

    #[test]
    fn test_default_models_one_identifier_per_entry() {
        let models = default_models();
        assert_eq!(models.len(), 4);
        assert_eq!(models[0], "gemini-2.5-flash");
        assert!(models.iter().all(|m| !m.contains(' ') && !m.is_empty()));
        assert!(models.contains(&"gemini-2.0-flash-lite".to_string()));
        assert!(models.contains(&"gemma-3-1b-it".to_string()));
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[model]
models = ["gemini-2.5-flash", "gemma-3-1b-it"]
retry_pause_ms = 0

[sandbox]
image = "python:3.12-slim"
memory = "1g"
timeout_secs = 5

[run]
max_attempts = 2
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.model.models.len(), 2);
        assert_eq!(config.model.retry_pause(), Duration::ZERO);
        assert_eq!(config.sandbox.image, "python:3.12-slim");
        assert_eq!(config.sandbox.timeout_secs, 5);
        // Unset fields keep their defaults
        assert_eq!(config.sandbox.working_dir, "/app");
        assert_eq!(config.run.max_attempts, 2);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.run.max_attempts, 3);
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "[run\nmax_attempts = ").unwrap();
        let err = Config::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_resolve_api_key() {
        assert_eq!(
            resolve_api_key("GOOGLE_API_KEY", Some(" abc ")).unwrap(),
            "abc"
        );
        let err = resolve_api_key("GOOGLE_API_KEY", None).unwrap_err();
        assert!(err.to_string().contains("GOOGLE_API_KEY"));
        assert!(resolve_api_key("GOOGLE_API_KEY", Some("  ")).is_err());
    }

    #[test]
    fn test_parse_memory_limit() {
        assert_eq!(parse_memory_limit("512m").unwrap(), 512 * 1024 * 1024);
        assert_eq!(parse_memory_limit("1G").unwrap(), 1024 * 1024 * 1024);
        assert_eq!(parse_memory_limit("64k").unwrap(), 64 * 1024);
        assert_eq!(parse_memory_limit("1048576").unwrap(), 1_048_576);
        assert!(parse_memory_limit("lots").is_err());
    }

    #[test]
    fn test_parse_memory_limit_rejects_unbounded_values() {
        let err = parse_memory_limit("0").unwrap_err();
        assert!(err.to_string().contains("must be positive"));
        assert!(parse_memory_limit("0g").is_err());
        assert!(parse_memory_limit("-5m").is_err());

        let err = parse_memory_limit("99999999999g").unwrap_err();
        assert!(err.to_string().contains("too large"));
        assert!(parse_memory_limit("9223372036854775807k").is_err());
    }
}
