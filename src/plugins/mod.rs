// Lua plugin system:
// - manifests declare typed function signatures
// - one sandboxed interpreter hosts every plugin
// - bundled plugins load first, then the user's plugin directory
pub mod host;
pub mod loader;
pub mod manifest;
pub mod source;

pub use host::ScriptHost;
pub use loader::{LoadReport, LoadedPlugin, PluginFailure, PluginManager};
pub use manifest::{FunctionSignature, Manifest, ManifestRegistry, TypeTag};
pub use source::{BundledPlugin, DirPlugin, PluginOrigin, PluginSource};
