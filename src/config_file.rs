use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const PROJECT_CONFIG_NAME: &str = ".cabloadrc";

/// Settings read from a cabload INI file. Unset keys stay `None` so that files can be
/// layered on top of each other.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ConfigFile {
    pub batch_size: Option<usize>,
    pub duplicates_path: Option<String>,
    pub database: Option<String>,
    pub table: Option<String>,
    pub create_table: Option<bool>,
    pub stats: Option<bool>,
    pub stats_format: Option<String>,
}

impl ConfigFile {
    /// Find project-level .cabloadrc by walking up directory tree
    pub fn find_project_config() -> Option<PathBuf> {
        let mut current = env::current_dir().ok()?;
        loop {
            let config_path = current.join(PROJECT_CONFIG_NAME);
            if config_path.exists() {
                return Some(config_path);
            }
            if !current.pop() {
                break;
            }
        }
        None
    }

    /// Get list of user config file locations in order of preference
    pub fn get_user_config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if cfg!(windows) {
            if let Ok(appdata) = env::var("APPDATA") {
                paths.push(PathBuf::from(appdata).join("cabload").join("config.ini"));
            }
            if let Ok(userprofile) = env::var("USERPROFILE") {
                paths.push(PathBuf::from(userprofile).join(PROJECT_CONFIG_NAME));
            }
        } else {
            // $XDG_CONFIG_HOME/cabload/config.ini, then ~/.cabloadrc
            let xdg_config = env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    env::var("HOME")
                        .map(|h| PathBuf::from(h).join(".config"))
                        .unwrap_or_else(|_| PathBuf::from(".config"))
                });

            paths.push(xdg_config.join("cabload").join("config.ini"));

            if let Ok(home) = env::var("HOME") {
                paths.push(PathBuf::from(home).join(PROJECT_CONFIG_NAME));
            }
        }

        paths
    }

    /// Load configuration with proper precedence: project > user > defaults
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        // First existing user config only
        if let Some(path) = Self::get_user_config_paths()
            .into_iter()
            .find(|p| p.exists())
        {
            config = config.merge(Self::load_from_path(&path)?);
        }

        if let Some(project_path) = Self::find_project_config() {
            config = config.merge(Self::load_from_path(&project_path)?);
        }

        Ok(config)
    }

    /// Load configuration with optional custom config file path. A custom path
    /// replaces file discovery entirely.
    pub fn load_with_custom_path(custom_path: Option<&Path>) -> Result<Self> {
        match custom_path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse_ini_content(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    fn parse_ini_content(content: &str) -> Result<Self> {
        let mut config = Self::default();
        let mut current_section = String::new();

        for (index, line) in content.lines().enumerate() {
            let line_number = index + 1;
            let line = line.trim();

            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                current_section = line[1..line.len() - 1].trim().to_lowercase();
                continue;
            }

            let Some(eq_pos) = line.find('=') else {
                continue;
            };
            let key = line[..eq_pos].trim();
            let value = line[eq_pos + 1..].trim();

            match (current_section.as_str(), key) {
                ("input", "batch_size") => {
                    config.batch_size = Some(parse_value(key, value, line_number)?);
                }
                ("duplicates", "path") => config.duplicates_path = Some(value.to_string()),
                ("destination", "database") => config.database = Some(value.to_string()),
                ("destination", "table") => config.table = Some(value.to_string()),
                ("destination", "create_table") => {
                    config.create_table = Some(parse_bool(key, value, line_number)?);
                }
                ("output", "stats") => config.stats = Some(parse_bool(key, value, line_number)?),
                ("output", "stats_format") => config.stats_format = Some(value.to_string()),
                _ => {
                    log::debug!(
                        "Ignoring unknown config key '{}' in section [{}]",
                        key,
                        current_section
                    );
                }
            }
        }

        Ok(config)
    }

    /// Merge two configuration objects, with `overlay` taking precedence
    pub fn merge(self, overlay: Self) -> Self {
        Self {
            batch_size: overlay.batch_size.or(self.batch_size),
            duplicates_path: overlay.duplicates_path.or(self.duplicates_path),
            database: overlay.database.or(self.database),
            table: overlay.table.or(self.table),
            create_table: overlay.create_table.or(self.create_table),
            stats: overlay.stats.or(self.stats),
            stats_format: overlay.stats_format.or(self.stats_format),
        }
    }

    /// Show configuration search locations with precedence details
    pub fn show_config(custom_path: Option<&Path>, ignore_config: bool) {
        println!(
            "Configuration precedence: CLI > --config > project {} > user config > defaults\n",
            PROJECT_CONFIG_NAME
        );

        if ignore_config {
            println!("Configuration files ignored (--ignore-config).");
            return;
        }

        if let Some(path) = custom_path {
            let status = if path.exists() { "(found)" } else { "(not found)" };
            println!("Custom configuration: {} {}", path.display(), status);
            return;
        }

        println!("Configuration search locations (in precedence order):");
        match Self::find_project_config() {
            Some(project_path) => println!("  1. Project: {} (found)", project_path.display()),
            None => println!(
                "  1. Project: {} (searched up directory tree, not found)",
                PROJECT_CONFIG_NAME
            ),
        }

        for (i, path) in Self::get_user_config_paths().iter().enumerate() {
            let status = if path.exists() { "(found)" } else { "(not found)" };
            println!("  {}. User: {} {}", i + 2, path.display(), status);
        }
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str, line_number: usize) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("line {}: invalid value '{}' for {}", line_number, value, key))
}

fn parse_bool(key: &str, value: &str, line_number: usize) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(anyhow!(
            "line {}: invalid boolean '{}' for {}",
            line_number,
            value,
            key
        )),
    }
}
