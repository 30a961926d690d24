//! Configuration management
//!
//! This module handles loading, validation, and management of the Lexis
//! configuration. Configuration is stored in TOML format at
//! ~/.lexis/config.toml and created with defaults on first run.
//!
//! # Configuration Sections
//!
//! - **core**: Data directory, export directory, log level
//! - **llm**: Completion provider selection and endpoints
//! - **memory**: Conversational memory database and context size
//! - **templates**: Clause library directory and search depth
//! - **pipeline**: Optional research lookups and negotiation routing
//!
//! # Path Expansion
//!
//! `~` is expanded to the user's home directory and the data, export and
//! clause directories are created if they do not exist.
//!
//! # Examples
//!
//! ```no_run
//! use lexis_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Checkpoints: {:?}", config.checkpoint_dir());
//! println!("Default provider: {}", config.llm.default_provider);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use sdk::types::TaskCategory;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    pub core: CoreConfig,

    /// LLM provider configuration
    #[serde(default)]
    pub llm: LLMConfig,

    /// Conversational memory configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Clause library configuration
    #[serde(default)]
    pub templates: TemplatesConfig,

    /// Stage pipeline configuration
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Data directory for checkpoints and the memory database (supports ~)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Directory receiving calendar, text and signature exports (supports ~)
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Active provider (ollama, openai)
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Ollama provider settings
    #[serde(default)]
    pub ollama: OllamaConfig,

    /// OpenAI provider settings
    #[serde(default)]
    pub openai: OpenAIConfig,
}

/// Ollama provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Base URL for Ollama API
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

/// OpenAI provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIConfig {
    /// Base URL for OpenAI-compatible API
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_openai_model")]
    pub model: String,
    // Note: API key read from OPENAI_API_KEY, never stored in config
}

/// Conversational memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Prior turns retrieved as context for conversational replies
    #[serde(default = "default_context_turns")]
    pub context_turns: usize,

    /// SQLite file name, relative to `core.data_dir`
    #[serde(default = "default_db_file")]
    pub db_file: String,
}

/// Clause library configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplatesConfig {
    /// Directory of `*.txt` clause files (supports ~)
    #[serde(default = "default_clause_dir")]
    pub clause_dir: PathBuf,

    /// Number of clauses retrieved per search
    #[serde(default = "default_search_k")]
    pub search_k: usize,
}

/// Stage pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PipelineConfig {
    /// Run the optional structure and market-terms lookups during research
    #[serde(default)]
    pub research_lookups: bool,

    /// Categories that also run Negotiation after Drafting
    #[serde(default)]
    pub negotiation_categories: Vec<TaskCategory>,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.lexis")
}

fn default_export_dir() -> PathBuf {
    PathBuf::from("~/.lexis/exports")
}

fn default_clause_dir() -> PathBuf {
    PathBuf::from("~/.lexis/clauses")
}

fn default_provider() -> String {
    "ollama".to_string()
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_context_turns() -> usize {
    5
}

fn default_db_file() -> String {
    "memory.db".to_string()
}

fn default_search_k() -> usize {
    3
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            model: default_ollama_model(),
        }
    }
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            model: default_openai_model(),
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            ollama: OllamaConfig::default(),
            openai: OpenAIConfig::default(),
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            context_turns: default_context_turns(),
            db_file: default_db_file(),
        }
    }
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            clause_dir: default_clause_dir(),
            search_k: default_search_k(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.lexis/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails (invalid level, provider or negotiation category)
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Build a validated configuration whose directories all live under `root`.
    ///
    /// Used by `--data-dir` style overrides and by tests that need an isolated
    /// tree.
    pub fn rooted_at(root: &Path) -> Result<Self, EngineError> {
        let mut config = Self::default_config();
        config.core.data_dir = root.to_path_buf();
        config.core.export_dir = root.join("exports");
        config.templates.clause_dir = root.join("clauses");
        config.validate_and_process()?;
        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let mut config = Self::default_config();

        // Serialize before expansion so the file keeps the portable ~ paths
        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        config.validate_and_process()?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Created default configuration at {:?}", path);

        Ok(config)
    }

    /// Get the default configuration file path (~/.lexis/config.toml)
    fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".lexis").join("config.toml"))
    }

    /// Create a default configuration
    fn default_config() -> Self {
        Self {
            core: CoreConfig {
                data_dir: default_data_dir(),
                export_dir: default_export_dir(),
                log_level: default_log_level(),
            },
            llm: LLMConfig::default(),
            memory: MemoryConfig::default(),
            templates: TemplatesConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }

    /// Directory holding one checkpoint file per session
    pub fn checkpoint_dir(&self) -> PathBuf {
        self.core.data_dir.join("checkpoints")
    }

    /// Path of the conversational memory database
    pub fn memory_db_path(&self) -> PathBuf {
        self.core.data_dir.join(&self.memory.db_file)
    }

    /// Validate and process configuration
    ///
    /// This method:
    /// - Validates log level and provider names
    /// - Rejects negotiation routing for categories without a draft stage
    /// - Expands ~ in paths
    /// - Creates the data, export and clause directories
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        let valid_providers = ["ollama", "openai"];
        if !valid_providers.contains(&self.llm.default_provider.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid default provider '{}'. Must be one of: {}",
                self.llm.default_provider,
                valid_providers.join(", ")
            )));
        }

        for category in &self.pipeline.negotiation_categories {
            if matches!(category, TaskCategory::Admin | TaskCategory::Chat) {
                return Err(EngineError::Config(format!(
                    "pipeline.negotiation_categories cannot contain '{}': it has no draft to negotiate",
                    category
                )));
            }
        }

        if self.templates.search_k == 0 {
            return Err(EngineError::Config(
                "templates.search_k must be at least 1".to_string(),
            ));
        }

        if self.memory.db_file.trim().is_empty() {
            return Err(EngineError::Config(
                "memory.db_file must not be empty".to_string(),
            ));
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;
        self.core.export_dir = expand_path(&self.core.export_dir)?;
        self.templates.clause_dir = expand_path(&self.templates.clause_dir)?;

        for dir in [
            &self.core.data_dir,
            &self.core.export_dir,
            &self.templates.clause_dir,
        ] {
            ensure_dir(dir)?;
        }

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

/// Create a directory if missing and reject paths that exist as files
fn ensure_dir(path: &Path) -> Result<(), EngineError> {
    if path.exists() {
        if !path.is_dir() {
            return Err(EngineError::Config(format!(
                "Path is not a directory: {:?}",
                path
            )));
        }
        return Ok(());
    }

    fs::create_dir_all(path)
        .map_err(|e| EngineError::Config(format!("Failed to create directory {:?}: {}", path, e)))
}
