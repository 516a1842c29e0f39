//! Bootstrap configuration loading and path resolution
//!
//! Configuration file priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable `IMTAG_CONFIG`
//! 3. `<config_dir>/imtag/config.toml`
//! 4. Built-in defaults (fallback)
//!
//! A missing configuration file is not an error: a warning is logged and the
//! built-in defaults are used. A file that exists but cannot be parsed is.

use crate::db::is_valid_identifier;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "IMTAG_CONFIG";
/// Environment variable overriding the storage root folder
pub const ROOT_FOLDER_ENV_VAR: &str = "IMTAG_ROOT_FOLDER";
/// Environment variable overriding the database file
pub const DATABASE_ENV_VAR: &str = "IMTAG_DATABASE";

const DATABASE_FILE_NAME: &str = "imtag.db";

/// Bootstrap configuration loaded from TOML
///
/// Every section is optional; absent values fall back to built-in defaults.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TomlConfig {
    /// Root folder that relative file identifiers resolve against
    pub root_folder: Option<PathBuf>,

    /// SQLite database file
    pub database_path: Option<PathBuf>,

    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub tagger: TaggerConfig,
    pub register: RegisterConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log file path (logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Storage implementation selection
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageConfig {
    /// Local filesystem rooted at the resolved root folder
    #[default]
    Local,
}

/// Database implementation selection
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DatabaseConfig {
    Sqlite {
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig::Sqlite {
            max_connections: default_max_connections(),
        }
    }
}

/// Tagger implementation selection
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaggerConfig {
    /// External inference program fed the image on stdin, answering JSON on stdout
    Command {
        #[serde(default = "default_tagger_program")]
        program: String,
        #[serde(default)]
        args: Vec<String>,
        /// Minimum score for a tag to be kept
        #[serde(default)]
        threshold: f32,
        /// Table holding this model's tags
        #[serde(default = "default_tag_table")]
        tag_table: String,
    },
}

impl Default for TaggerConfig {
    fn default() -> Self {
        TaggerConfig::Command {
            program: default_tagger_program(),
            args: Vec::new(),
            threshold: 0.0,
            tag_table: default_tag_table(),
        }
    }
}

impl TaggerConfig {
    /// Name of the table the configured model writes its tags to
    pub fn tag_table(&self) -> &str {
        match self {
            TaggerConfig::Command { tag_table, .. } => tag_table,
        }
    }
}

/// Registration run parameters
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RegisterConfig {
    /// Maximum concurrent extraction/tagging tasks
    pub n_workers: usize,
    /// Descend into sub-directories when listing input files
    pub recursive: bool,
    /// Draw a progress bar for parallel stages
    pub show_progress: bool,
    /// Maximum hashes per existence lookup query
    pub lookup_chunk_size: usize,
}

impl Default for RegisterConfig {
    fn default() -> Self {
        Self {
            n_workers: 8,
            recursive: false,
            show_progress: true,
            lookup_chunk_size: 500,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_connections() -> u32 {
    4
}

fn default_tagger_program() -> String {
    "camie-tagger".to_string()
}

fn default_tag_table() -> String {
    "tags_camie_v2".to_string()
}

impl TomlConfig {
    /// Parse configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would only fail later, deep inside a run
    pub fn validate(&self) -> Result<()> {
        if self.register.n_workers == 0 {
            return Err(Error::Config("register.n_workers must be at least 1".to_string()));
        }
        if self.register.lookup_chunk_size == 0 {
            return Err(Error::Config(
                "register.lookup_chunk_size must be at least 1".to_string(),
            ));
        }

        let DatabaseConfig::Sqlite { max_connections } = &self.database;
        if *max_connections == 0 {
            return Err(Error::Config(
                "database.max_connections must be at least 1".to_string(),
            ));
        }

        let TaggerConfig::Command {
            program,
            threshold,
            tag_table,
            ..
        } = &self.tagger;
        if program.trim().is_empty() {
            return Err(Error::Config("tagger.program must not be empty".to_string()));
        }
        if !threshold.is_finite() {
            return Err(Error::Config(format!(
                "tagger.threshold must be finite, got {}",
                threshold
            )));
        }
        if !is_valid_identifier(tag_table) || tag_table == "images" {
            return Err(Error::Config(format!(
                "tagger.tag_table is not a usable table name: {:?}",
                tag_table
            )));
        }

        Ok(())
    }

    /// Storage root folder: `IMTAG_ROOT_FOLDER` → TOML → OS default
    pub fn resolve_root_folder(&self) -> PathBuf {
        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV_VAR) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.root_folder {
            return path.clone();
        }

        get_default_data_folder()
    }

    /// Database file: `IMTAG_DATABASE` → TOML → `<data folder>/imtag.db`
    pub fn resolve_database_path(&self) -> PathBuf {
        if let Ok(path) = std::env::var(DATABASE_ENV_VAR) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.database_path {
            return path.clone();
        }

        get_default_data_folder().join(DATABASE_FILE_NAME)
    }
}

/// Locate the configuration file without reading it
///
/// Returns `None` when neither the CLI nor the environment names a file and
/// no file exists at the default location.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Default location
    dirs::config_dir()
        .map(|d| d.join("imtag").join("config.toml"))
        .filter(|p| p.exists())
}

/// Load configuration following the priority order above
///
/// Missing files degrade to defaults with a warning.
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    let Some(path) = resolve_config_path(cli_arg) else {
        info!("No configuration file found, using built-in defaults");
        return Ok(TomlConfig::default());
    };

    if !path.exists() {
        warn!(
            path = %path.display(),
            "Configuration file not found, using built-in defaults"
        );
        return Ok(TomlConfig::default());
    }

    let config = TomlConfig::from_file(&path)?;
    info!(path = %path.display(), "Configuration loaded");
    Ok(config)
}

/// OS-dependent default data folder
fn get_default_data_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("imtag"))
        .unwrap_or_else(|| PathBuf::from("./imtag_data"))
}
