use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{MacroError, Result};

use super::host::ScriptHost;
use super::manifest::{Manifest, ManifestRegistry};
use super::source::{self, PluginOrigin, PluginSource, ENTRY_SCRIPT, MANIFEST_FILE};

/// Owns the script host and the manifests of every loaded plugin.
pub struct PluginManager {
    host: ScriptHost,
    manifests: ManifestRegistry,
    plugin_dir: Option<PathBuf>,
}

/// A plugin that loaded successfully
#[derive(Debug, Clone)]
pub struct LoadedPlugin {
    pub id: String,
    pub name: String,
    pub version: String,
    pub origin: PluginOrigin,
}

/// A plugin that was skipped
#[derive(Debug)]
pub struct PluginFailure {
    pub id: String,
    pub origin: PluginOrigin,
    pub error: MacroError,
}

/// Outcome of a load pass.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: Vec<LoadedPlugin>,
    pub failures: Vec<PluginFailure>,
}

impl LoadReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl PluginManager {
    /// Create a manager with a running host and no plugins loaded
    ///
    /// # Errors
    /// Returns an error if the script host cannot be started.
    pub fn new() -> Result<Self> {
        Ok(Self {
            host: ScriptHost::new()?,
            manifests: ManifestRegistry::new(),
            plugin_dir: None,
        })
    }

    /// Start a host and load the bundled plugins plus those in `plugin_dir`.
    ///
    /// # Errors
    /// Returns an error if the host cannot start or the plugin directory
    /// exists but cannot be listed. Individual bad plugins are reported in
    /// the [`LoadReport`] instead.
    pub fn load(plugin_dir: Option<&Path>) -> Result<(Self, LoadReport)> {
        let mut manager = Self::new()?;
        manager.plugin_dir = plugin_dir.map(Path::to_path_buf);
        let report = manager.load_all()?;
        Ok((manager, report))
    }

    /// Throw away the host and every manifest, then load everything again
    /// from `plugin_dir`.
    ///
    /// # Errors
    /// Same as [`PluginManager::load`].
    pub fn reload(&mut self, plugin_dir: Option<&Path>) -> Result<LoadReport> {
        self.host.shutdown();
        self.manifests.clear();
        self.plugin_dir = plugin_dir.map(Path::to_path_buf);

        self.host = ScriptHost::new()?;
        self.load_all()
    }

    fn load_all(&mut self) -> Result<LoadReport> {
        let mut report = LoadReport::default();

        for plugin in source::discover(self.plugin_dir.as_deref())? {
            match self.load_plugin(Arc::clone(&plugin)) {
                Ok(manifest) => {
                    info!(
                        plugin = %manifest.name,
                        version = %manifest.version,
                        origin = %plugin.origin(),
                        functions = manifest.functions.len(),
                        "Loaded plugin"
                    );
                    report.loaded.push(LoadedPlugin {
                        id: plugin.id().to_string(),
                        name: manifest.name,
                        version: manifest.version,
                        origin: plugin.origin(),
                    });
                }
                Err(error) => {
                    warn!(
                        plugin = plugin.id(),
                        origin = %plugin.origin(),
                        error = %error,
                        "Failed to load plugin, skipping"
                    );
                    report.failures.push(PluginFailure {
                        id: plugin.id().to_string(),
                        origin: plugin.origin(),
                        error,
                    });
                }
            }
        }

        Ok(report)
    }

    /// Load one plugin into the host and register its manifest.
    ///
    /// The manifest is only registered once the entry script has run, so a
    /// broken plugin leaves no trace in the registry.
    ///
    /// # Errors
    /// - [`MacroError::Load`] if `manifest.json` or `main.lua` is missing,
    ///   unreadable, or the script fails
    /// - [`MacroError::Parse`] if the manifest is malformed
    pub fn load_plugin(&mut self, plugin: Arc<dyn PluginSource>) -> Result<Manifest> {
        let id = plugin.id().to_string();

        let manifest = plugin
            .read(MANIFEST_FILE)
            .map_err(|e| MacroError::load(&id, e))?
            .ok_or_else(|| MacroError::load(&id, format!("missing {MANIFEST_FILE}")))?;
        let manifest = Manifest::from_slice(manifest.as_bytes())?;
        manifest.validate()?;

        let code = plugin
            .read(ENTRY_SCRIPT)
            .map_err(|e| MacroError::load(&id, e))?
            .ok_or_else(|| MacroError::load(&id, format!("missing {ENTRY_SCRIPT}")))?;

        self.host.register_module_resolver(&id, plugin)?;
        self.host.load_plugin_source(&id, &code)?;

        if !self.host.has_table(&manifest.name) {
            warn!(
                plugin = %manifest.name,
                "Entry script did not define a global table named after the plugin"
            );
        }

        if let Some(previous) = self.manifests.register(manifest.clone()) {
            warn!(
                plugin = %manifest.name,
                previous_version = %previous.version,
                version = %manifest.version,
                "Plugin name already registered, replacing"
            );
        }

        Ok(manifest)
    }

    #[must_use]
    pub fn host(&self) -> &ScriptHost {
        &self.host
    }

    #[must_use]
    pub fn manifests(&self) -> &ManifestRegistry {
        &self.manifests
    }

    /// Get list of loaded plugin names
    #[must_use]
    pub fn list_plugins(&self) -> Vec<&str> {
        self.manifests
            .sorted()
            .into_iter()
            .map(|m| m.name.as_str())
            .collect()
    }

    /// Check if plugin is loaded
    #[must_use]
    pub fn is_loaded(&self, name: &str) -> bool {
        self.manifests.lookup(name).is_ok()
    }

    /// Stop the script host. Expansion fails afterwards until [`reload`](Self::reload).
    pub fn shutdown(&mut self) {
        self.host.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::source::{BundledPlugin, BUNDLED_PLUGINS};

    #[test]
    fn test_plugin_manager_creation() {
        let manager = PluginManager::new().unwrap();
        assert_eq!(manager.list_plugins().len(), 0);
    }

    #[test]
    fn test_bundled_plugins_load() {
        let (manager, report) = PluginManager::load(None).unwrap();
        assert!(report.is_clean(), "{:?}", report.failures);
        assert_eq!(report.loaded.len(), BUNDLED_PLUGINS.len());
        assert_eq!(manager.list_plugins(), vec!["clock", "text"]);
        assert!(manager.host().has_table("text"));
    }

    #[test]
    fn test_missing_entry_script() {
        static NO_MAIN: BundledPlugin = BundledPlugin {
            id: "nomain",
            files: &[(
                MANIFEST_FILE,
                r#"{ "name": "nomain", "version": "1.0.0", "functions": [] }"#,
            )],
        };

        let mut manager = PluginManager::new().unwrap();
        let err = manager.load_plugin(Arc::new(NO_MAIN)).unwrap_err();
        assert!(err.to_string().contains("missing main.lua"));
        assert!(!manager.is_loaded("nomain"));
    }

    #[test]
    fn test_broken_script_not_registered() {
        static BROKEN: BundledPlugin = BundledPlugin {
            id: "broken",
            files: &[
                (
                    MANIFEST_FILE,
                    r#"{ "name": "broken", "version": "1.0.0", "functions": [] }"#,
                ),
                (ENTRY_SCRIPT, "broken = {"),
            ],
        };

        let mut manager = PluginManager::new().unwrap();
        let result = manager.load_plugin(Arc::new(BROKEN));
        assert!(matches!(result, Err(MacroError::Load { .. })));
        assert!(!manager.is_loaded("broken"));
    }

    #[test]
    fn test_shutdown_then_reload() {
        let (mut manager, _) = PluginManager::load(None).unwrap();
        manager.shutdown();
        assert!(!manager.host().is_running());

        let report = manager.reload(None).unwrap();
        assert!(report.is_clean());
        assert!(manager.host().is_running());
        assert!(manager.is_loaded("clock"));
    }
}
