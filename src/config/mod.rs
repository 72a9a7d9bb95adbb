use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::template::Template;

const SETTINGS_FILE: &str = "settings.json";
const APP_DIR: &str = "receiptify";

/// Application settings persisted as JSON
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Base URL of the print server
    #[serde(default)]
    pub print_server_url: String,

    /// Directory holding user plugins
    #[serde(default, rename = "plugins")]
    pub plugin_path: Option<PathBuf>,

    /// Saved receipt templates
    #[serde(default)]
    pub library: Vec<Template>,
}

impl Settings {
    /// Load settings from the default location, creating the file on first run
    pub fn load_default() -> Result<Self> {
        let path = Self::default_settings_path()?;
        Self::ensure_exists(&path)?;
        Self::load_from_file(&path)
    }

    /// Load settings from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents =
            fs::read_to_string(path.as_ref()).context("Failed to read settings file")?;

        let settings: Settings =
            serde_json::from_str(&contents).context("Failed to parse settings file")?;

        Ok(settings)
    }

    /// Save settings to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents =
            serde_json::to_string_pretty(self).context("Failed to serialize settings")?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).context("Failed to create settings directory")?;
        }

        fs::write(path.as_ref(), contents).context("Failed to write settings file")?;

        Ok(())
    }

    /// Write a fresh settings file next to a `plugins/` directory if none exists
    pub fn ensure_exists<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if path.exists() {
            return Ok(());
        }

        let plugin_dir = path
            .parent()
            .map(|dir| dir.join("plugins"))
            .unwrap_or_else(|| PathBuf::from("plugins"));

        let settings = Settings {
            plugin_path: Some(plugin_dir),
            ..Settings::default()
        };
        settings.save_to_file(path)
    }

    /// `./settings.json` if present, otherwise the platform config directory
    pub fn default_settings_path() -> Result<PathBuf> {
        let local = std::env::current_dir()
            .context("Failed to get working directory")?
            .join(SETTINGS_FILE);
        if local.exists() {
            return Ok(local);
        }

        let config = dirs::config_dir().context("Failed to get config directory")?;
        Ok(config.join(APP_DIR).join(SETTINGS_FILE))
    }

    /// Configured plugin directory; an empty path counts as none
    #[must_use]
    pub fn plugin_dir(&self) -> Option<&Path> {
        self.plugin_path
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
    }

    /// Store a template, replacing one with the same name
    pub fn add_template(&mut self, template: Template) {
        match self.library.iter_mut().find(|t| t.name == template.name) {
            Some(existing) => *existing = template,
            None => self.library.push(template),
        }
    }

    /// Remove a template by name, returning it if it existed
    pub fn remove_template(&mut self, name: &str) -> Option<Template> {
        let index = self.library.iter().position(|t| t.name == name)?;
        Some(self.library.remove(index))
    }

    #[must_use]
    pub fn template(&self, name: &str) -> Option<&Template> {
        self.library.iter().find(|t| t.name == name)
    }
}
