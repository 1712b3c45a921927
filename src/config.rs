use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::database::DB_FILENAME;
use crate::tree::TreeSettings;

pub static CONFIG: OnceCell<Config> = OnceCell::new();

const ENV_PREFIX: &str = "FILETREE_";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub filetree: String,
}

impl LoggingConfig {
    const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
    const FILETREE_LEVEL: &str = "info";

    fn default() -> Self {
        LoggingConfig {
            filetree: Self::FILETREE_LEVEL.to_string(),
        }
    }

    fn ensure_valid(&mut self) {
        let str_original = self.filetree.clone();
        self.filetree = self.filetree.trim().to_ascii_lowercase();
        if !Self::LOG_LEVELS.contains(&self.filetree.as_str()) {
            eprintln!(
                "Config error: filetree log level of '{}' is invalid - using default of '{}'",
                str_original,
                Self::FILETREE_LEVEL
            );
            self.filetree = Self::FILETREE_LEVEL.to_owned();
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Database file. Defaults to `filetree.db` in the data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TreeConfig {
    pub history_retention: usize,
    pub max_tree_depth: usize,
    pub name_max_chars: usize,
    pub desc_max_chars: usize,
}

impl TreeConfig {
    fn default() -> Self {
        let settings = TreeSettings::default();
        TreeConfig {
            history_retention: settings.history_retention,
            max_tree_depth: settings.max_tree_depth,
            name_max_chars: settings.name_max_chars,
            desc_max_chars: settings.desc_max_chars,
        }
    }

    fn ensure_valid(&mut self) {
        let defaults = Self::default();
        ensure_positive("tree.history_retention", &mut self.history_retention, defaults.history_retention);
        ensure_positive("tree.max_tree_depth", &mut self.max_tree_depth, defaults.max_tree_depth);
        ensure_positive("tree.name_max_chars", &mut self.name_max_chars, defaults.name_max_chars);
        ensure_positive("tree.desc_max_chars", &mut self.desc_max_chars, defaults.desc_max_chars);
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct JobsConfig {
    pub workers: usize,
}

impl JobsConfig {
    const WORKERS: usize = 4;
    const MAX_WORKERS: usize = 64;

    fn default() -> Self {
        JobsConfig {
            workers: Self::WORKERS,
        }
    }

    fn ensure_valid(&mut self) {
        if self.workers == 0 || self.workers > Self::MAX_WORKERS {
            eprintln!(
                "Config error: jobs.workers of {} is invalid (1-{}) - using default of {}",
                self.workers,
                Self::MAX_WORKERS,
                Self::WORKERS
            );
            self.workers = Self::WORKERS;
        }
    }
}

fn ensure_positive(key: &str, value: &mut usize, default: usize) {
    if *value == 0 {
        eprintln!(
            "Config error: {} must be at least 1 - using default of {}",
            key, default
        );
        *value = default;
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub logging: LoggingConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub tree: TreeConfig,
    pub jobs: JobsConfig,
}

impl Config {
    fn default() -> Self {
        Config {
            logging: LoggingConfig::default(),
            database: DatabaseConfig::default(),
            tree: TreeConfig::default(),
            jobs: JobsConfig::default(),
        }
    }

    /// Loads the configuration from `config.toml` in the app's data directory,
    /// writing the defaults there first if the file does not exist.
    pub fn load_config(project_dirs: &ProjectDirs) -> Self {
        let config_path = project_dirs.data_local_dir().join("config.toml");

        if !config_path.exists() {
            Self::write_default(&config_path);
        }

        Self::load_from(&config_path)
    }

    /// Defaults, overlaid with the TOML file (if present), overlaid with
    /// `FILETREE_`-prefixed environment variables (`__` separates sections).
    pub fn load_from(config_path: &Path) -> Self {
        let default_config = Self::default();

        let figment = Figment::from(Serialized::defaults(default_config.clone()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let mut config = figment.extract().unwrap_or_else(|err| {
            eprintln!(
                "Could not load config file {}: {}. Using default configuration.",
                config_path.display(),
                err
            );
            default_config
        });

        config.ensure_valid();

        config
    }

    /// Load once and keep for the life of the process.
    pub fn init(project_dirs: &ProjectDirs) -> &'static Config {
        CONFIG.get_or_init(|| Self::load_config(project_dirs))
    }

    pub fn tree_settings(&self) -> TreeSettings {
        TreeSettings {
            history_retention: self.tree.history_retention,
            max_tree_depth: self.tree.max_tree_depth,
            name_max_chars: self.tree.name_max_chars,
            desc_max_chars: self.tree.desc_max_chars,
            job_workers: self.jobs.workers,
        }
    }

    /// Configured database file, or `filetree.db` inside `data_dir`.
    pub fn db_path(&self, data_dir: &Path) -> PathBuf {
        match &self.database.path {
            Some(path) if !path.trim().is_empty() => PathBuf::from(path.trim()),
            _ => data_dir.join(DB_FILENAME),
        }
    }

    fn write_default(config_path: &Path) {
        if let Some(parent) = config_path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                eprintln!(
                    "Failed to create configuration directory {}: {}",
                    parent.display(),
                    e
                );
            }
        }
        match toml::to_string_pretty(&Self::default()) {
            Ok(toml_string) => {
                if let Err(e) = fs::write(config_path, toml_string) {
                    eprintln!(
                        "Failed to write default config to {}: {}",
                        config_path.display(),
                        e
                    );
                }
            }
            Err(e) => eprintln!("Failed to serialize default config: {}", e),
        }
    }

    fn ensure_valid(&mut self) {
        self.logging.ensure_valid();
        self.tree.ensure_valid();
        self.jobs.ensure_valid();
    }
}
