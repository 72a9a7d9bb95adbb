//! Where plugin files come from
//!
//! Plugins are either bundled into the binary or live in a directory on disk.
//! Both expose the same read-by-relative-path interface so the loader and the
//! module resolver never care which one they are talking to.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{MacroError, Result};

/// File name of a plugin's manifest document
pub const MANIFEST_FILE: &str = "manifest.json";

/// File name of a plugin's entry script
pub const ENTRY_SCRIPT: &str = "main.lua";

/// Where a plugin was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginOrigin {
    /// Packaged with the application, read-only
    Bundled,
    /// Found in the user's plugin directory
    External,
}

impl std::fmt::Display for PluginOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bundled => f.write_str("bundled"),
            Self::External => f.write_str("external"),
        }
    }
}

/// Read access to one plugin's files.
pub trait PluginSource {
    /// Directory name of the plugin
    fn id(&self) -> &str;

    fn origin(&self) -> PluginOrigin;

    /// Read a file relative to the plugin root.
    ///
    /// Returns `Ok(None)` when the file does not exist.
    fn read(&self, relative: &str) -> io::Result<Option<String>>;
}

/// A plugin compiled into the binary.
#[derive(Debug, Clone, Copy)]
pub struct BundledPlugin {
    pub id: &'static str,
    pub files: &'static [(&'static str, &'static str)],
}

impl PluginSource for BundledPlugin {
    fn id(&self) -> &str {
        self.id
    }

    fn origin(&self) -> PluginOrigin {
        PluginOrigin::Bundled
    }

    fn read(&self, relative: &str) -> io::Result<Option<String>> {
        Ok(self
            .files
            .iter()
            .find(|(name, _)| *name == relative)
            .map(|(_, contents)| (*contents).to_string()))
    }
}

/// A plugin directory on disk.
#[derive(Debug, Clone)]
pub struct DirPlugin {
    id: String,
    root: PathBuf,
}

impl DirPlugin {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let id = root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.display().to_string());
        Self { id, root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl PluginSource for DirPlugin {
    fn id(&self) -> &str {
        &self.id
    }

    fn origin(&self) -> PluginOrigin {
        PluginOrigin::External
    }

    fn read(&self, relative: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.root.join(relative)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Plugins shipped with the application.
pub static BUNDLED_PLUGINS: &[BundledPlugin] = &[
    BundledPlugin {
        id: "clock",
        files: &[
            (MANIFEST_FILE, include_str!("../../plugins/clock/manifest.json")),
            (ENTRY_SCRIPT, include_str!("../../plugins/clock/main.lua")),
            ("util.lua", include_str!("../../plugins/clock/util.lua")),
        ],
    },
    BundledPlugin {
        id: "text",
        files: &[
            (MANIFEST_FILE, include_str!("../../plugins/text/manifest.json")),
            (ENTRY_SCRIPT, include_str!("../../plugins/text/main.lua")),
            ("util.lua", include_str!("../../plugins/text/util.lua")),
        ],
    },
];

/// Collect every plugin to load: bundled ones first, then the subdirectories
/// of `plugin_dir` in name order.
///
/// A missing directory means no external plugins.
///
/// # Errors
/// Returns [`MacroError::Load`] if the plugin directory exists but cannot be read.
pub fn discover(plugin_dir: Option<&Path>) -> Result<Vec<Arc<dyn PluginSource>>> {
    let mut sources: Vec<Arc<dyn PluginSource>> = BUNDLED_PLUGINS
        .iter()
        .map(|plugin| Arc::new(*plugin) as Arc<dyn PluginSource>)
        .collect();

    let Some(dir) = plugin_dir else {
        debug!("No plugin directory configured");
        return Ok(sources);
    };

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!(dir = %dir.display(), "Plugin directory does not exist, skipping");
            return Ok(sources);
        }
        Err(e) => return Err(MacroError::load(dir.display().to_string(), e)),
    };

    let mut dirs = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| MacroError::load(dir.display().to_string(), e))?
            .path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();

    sources.extend(
        dirs.into_iter()
            .map(|path| Arc::new(DirPlugin::new(path)) as Arc<dyn PluginSource>),
    );

    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_bundled_plugins_are_complete() {
        for plugin in BUNDLED_PLUGINS {
            assert!(plugin.read(MANIFEST_FILE).unwrap().is_some(), "{}", plugin.id);
            assert!(plugin.read(ENTRY_SCRIPT).unwrap().is_some(), "{}", plugin.id);
            assert!(plugin.read("missing.lua").unwrap().is_none());
        }
    }

    #[test]
    fn test_discover_without_directory() {
        let sources = discover(None).unwrap();
        assert_eq!(sources.len(), BUNDLED_PLUGINS.len());
        assert!(sources.iter().all(|s| s.origin() == PluginOrigin::Bundled));
    }

    #[test]
    fn test_discover_missing_directory() {
        let dir = tempdir().unwrap();
        let sources = discover(Some(&dir.path().join("nope"))).unwrap();
        assert_eq!(sources.len(), BUNDLED_PLUGINS.len());
    }

    #[test]
    fn test_discover_orders_external_after_bundled() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("zeta")).unwrap();
        fs::create_dir(dir.path().join("alpha")).unwrap();
        fs::write(dir.path().join("stray.txt"), "not a plugin").unwrap();

        let sources = discover(Some(dir.path())).unwrap();
        let ids: Vec<&str> = sources.iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec!["clock", "text", "alpha", "zeta"]);
        assert_eq!(sources[2].origin(), PluginOrigin::External);
    }

    #[test]
    fn test_dir_plugin_read() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("main.lua"), "x = 1").unwrap();

        let plugin = DirPlugin::new(dir.path());
        assert_eq!(plugin.read("main.lua").unwrap().as_deref(), Some("x = 1"));
        assert!(plugin.read("manifest.json").unwrap().is_none());
    }
}
