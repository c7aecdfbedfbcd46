//! Application configuration for askpage.
//!
//! User config lives at `~/.askpage/askpage.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AskPageError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "askpage.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".askpage";

// ---------------------------------------------------------------------------
// Config structs (matching askpage.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Which URLs may be fetched.
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Subprocess and direct fetch settings.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Content normalization settings.
    #[serde(default)]
    pub content: ContentConfig,

    /// Completion provider settings.
    #[serde(default)]
    pub llm: LlmConfig,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Show internal error messages to HTTP callers (development only).
    #[serde(default)]
    pub expose_internal_errors: bool,

    /// Allowed CORS origins. Empty means any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            expose_internal_errors: false,
            cors_origins: Vec::new(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    3001
}

/// `[policy]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Domain suffixes permitted as fetch targets.
    #[serde(default = "default_allowed_domains")]
    pub allowed_domains: Vec<String>,

    /// Extra suffixes appended to `allowed_domains`.
    #[serde(default)]
    pub extra_domains: Vec<String>,

    /// Path substrings that are never fetched (matched case-insensitively).
    #[serde(default = "default_blocked_paths")]
    pub blocked_paths: Vec<String>,

    /// Permit loopback/private hosts (integration tests against mock servers).
    #[serde(default)]
    pub allow_private_hosts: bool,

    /// Maximum accepted URL length in characters.
    #[serde(default = "default_max_url_length")]
    pub max_url_length: usize,

    /// Maximum accepted question length in characters.
    #[serde(default = "default_max_question_length")]
    pub max_question_length: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            allowed_domains: default_allowed_domains(),
            extra_domains: Vec::new(),
            blocked_paths: default_blocked_paths(),
            allow_private_hosts: false,
            max_url_length: default_max_url_length(),
            max_question_length: default_max_question_length(),
        }
    }
}

impl PolicyConfig {
    /// The effective allow-list: configured domains followed by the extras.
    pub fn domains(&self) -> Vec<String> {
        self.allowed_domains
            .iter()
            .chain(self.extra_domains.iter())
            .map(|d| d.trim().to_lowercase())
            .filter(|d| !d.is_empty())
            .collect()
    }
}

fn default_allowed_domains() -> Vec<String> {
    [
        "wikipedia.org",
        "github.com",
        "stackoverflow.com",
        "medium.com",
        "news.ycombinator.com",
        "example.com",
        "arxiv.org",
        "reddit.com",
        "hackernews.com",
        "techcrunch.com",
        "bbc.com",
        "cnn.com",
        "reuters.com",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_blocked_paths() -> Vec<String> {
    ["/admin", "/api", "/config", "/private"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_max_url_length() -> usize {
    2000
}
fn default_max_question_length() -> usize {
    1000
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Executable that speaks line-delimited JSON-RPC on stdio.
    #[serde(default = "default_protocol_command")]
    pub protocol_command: String,

    /// Arguments passed to `protocol_command`.
    #[serde(default = "default_protocol_args")]
    pub protocol_args: Vec<String>,

    /// Try the subprocess before the direct fetch.
    #[serde(default = "default_true")]
    pub protocol_enabled: bool,

    /// Bound on the whole subprocess session.
    #[serde(default = "default_fetch_timeout_ms")]
    pub protocol_timeout_ms: u64,

    /// Bound on the direct HTTP GET.
    #[serde(default = "default_fetch_timeout_ms")]
    pub direct_timeout_ms: u64,

    /// Wait after closing stdin before the subprocess is killed.
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,

    /// `max_length` argument passed to the fetch tool.
    #[serde(default = "default_max_length_hint")]
    pub max_length_hint: usize,

    /// Retrieved text shorter than this fails the request.
    #[serde(default = "default_min_content_length")]
    pub min_content_length: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            protocol_command: default_protocol_command(),
            protocol_args: default_protocol_args(),
            protocol_enabled: true,
            protocol_timeout_ms: default_fetch_timeout_ms(),
            direct_timeout_ms: default_fetch_timeout_ms(),
            kill_grace_ms: default_kill_grace_ms(),
            max_length_hint: default_max_length_hint(),
            min_content_length: default_min_content_length(),
        }
    }
}

impl FetchConfig {
    pub fn protocol_timeout(&self) -> Duration {
        Duration::from_millis(self.protocol_timeout_ms)
    }

    pub fn direct_timeout(&self) -> Duration {
        Duration::from_millis(self.direct_timeout_ms)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }
}

fn default_protocol_command() -> String {
    "uvx".into()
}
fn default_protocol_args() -> Vec<String> {
    vec!["mcp-server-fetch".into()]
}
fn default_true() -> bool {
    true
}
fn default_fetch_timeout_ms() -> u64 {
    15_000
}
fn default_kill_grace_ms() -> u64 {
    100
}
fn default_max_length_hint() -> usize {
    2000
}
fn default_min_content_length() -> usize {
    50
}

/// `[content]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    /// Processed content is truncated to this many characters.
    #[serde(default = "default_max_length")]
    pub max_length: usize,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            max_length: default_max_length(),
        }
    }
}

fn default_max_length() -> usize {
    4000
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Name of the env var holding the OpenAI key (never store the key itself).
    #[serde(default = "default_openai_key_env")]
    pub openai_api_key_env: String,

    #[serde(default = "default_openai_model")]
    pub openai_model: String,

    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,

    /// Name of the env var holding the Anthropic key.
    #[serde(default = "default_anthropic_key_env")]
    pub anthropic_api_key_env: String,

    #[serde(default = "default_anthropic_model")]
    pub anthropic_model: String,

    #[serde(default = "default_anthropic_base_url")]
    pub anthropic_base_url: String,

    /// Bound on each completion call.
    #[serde(default = "default_llm_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            openai_api_key_env: default_openai_key_env(),
            openai_model: default_openai_model(),
            openai_base_url: default_openai_base_url(),
            anthropic_api_key_env: default_anthropic_key_env(),
            anthropic_model: default_anthropic_model(),
            anthropic_base_url: default_anthropic_base_url(),
            timeout_ms: default_llm_timeout_ms(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// The OpenAI key, if its env var is set and non-empty.
    pub fn openai_api_key(&self) -> Option<String> {
        read_key(&self.openai_api_key_env)
    }

    /// The Anthropic key, if its env var is set and non-empty.
    pub fn anthropic_api_key(&self) -> Option<String> {
        read_key(&self.anthropic_api_key_env)
    }
}

fn read_key(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Some(val),
        _ => None,
    }
}

fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_openai_model() -> String {
    "gpt-3.5-turbo".into()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_anthropic_key_env() -> String {
    "ANTHROPIC_API_KEY".into()
}
fn default_anthropic_model() -> String {
    "claude-3-sonnet-20240229".into()
}
fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com/v1".into()
}
fn default_llm_timeout_ms() -> u64 {
    25_000
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_temperature() -> f32 {
    0.7
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.askpage/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| AskPageError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.askpage/askpage.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| AskPageError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        AskPageError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| AskPageError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| AskPageError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| AskPageError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject settings that would make every request fail.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.policy.domains().is_empty() {
        return Err(AskPageError::config("policy.allowed_domains must not be empty"));
    }
    if config.content.max_length == 0 {
        return Err(AskPageError::config("content.max_length must be greater than 0"));
    }
    if config.fetch.protocol_enabled && config.fetch.protocol_command.trim().is_empty() {
        return Err(AskPageError::config(
            "fetch.protocol_command is empty; set it or disable fetch.protocol_enabled",
        ));
    }
    Ok(())
}
