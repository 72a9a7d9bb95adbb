//! Plugin manifests and the registry that indexes them
//!
//! A manifest declares which functions a plugin exposes to templates and the
//! positional types of their arguments and results.
//!
//! ```json
//! {
//!   "name": "greeter",
//!   "version": "1.0.0",
//!   "functions": [
//!     { "name": "greet", "params": ["string"], "returns": ["string"] }
//!   ]
//! }
//! ```

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{MacroError, Result};

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Declared type of a parameter or return value.
///
/// Unknown tags are kept so a manifest still loads; they are rejected when a
/// call actually needs them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TypeTag {
    String,
    Number,
    Boolean,
    Other(String),
}

impl From<String> for TypeTag {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "string" => Self::String,
            "number" => Self::Number,
            "boolean" => Self::Boolean,
            _ => Self::Other(tag),
        }
    }
}

impl From<TypeTag> for String {
    fn from(tag: TypeTag) -> Self {
        tag.to_string()
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => f.write_str("string"),
            Self::Number => f.write_str("number"),
            Self::Boolean => f.write_str("boolean"),
            Self::Other(tag) => f.write_str(tag),
        }
    }
}

/// Signature of one callable plugin function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSignature {
    pub name: String,
    #[serde(default)]
    pub params: Vec<TypeTag>,
    #[serde(default)]
    pub returns: Vec<TypeTag>,
}

impl fmt::Display for FunctionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |tags: &[TypeTag]| {
            tags.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        write!(
            f,
            "{}({}) -> ({})",
            self.name,
            join(&self.params),
            join(&self.returns)
        )
    }
}

/// Parsed `manifest.json` of a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub functions: Vec<FunctionSignature>,
}

impl Manifest {
    /// Deserialize a manifest document.
    ///
    /// # Errors
    /// Returns [`MacroError::Parse`] if the JSON is malformed or does not
    /// match the manifest schema.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| MacroError::Parse(e.to_string()))
    }

    /// Check that the plugin and its functions are addressable from a token.
    ///
    /// The plugin name doubles as a Lua global, and both names are parsed out
    /// of `{{plugin.function(...)}}`, so they must be plain identifiers.
    ///
    /// # Errors
    /// Returns [`MacroError::Parse`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        if !IDENTIFIER.is_match(&self.name) {
            return Err(MacroError::Parse(format!(
                "invalid plugin name '{}': must be a Lua identifier",
                self.name
            )));
        }

        if self.version.trim().is_empty() {
            return Err(MacroError::Parse(format!(
                "plugin '{}' has an empty version string",
                self.name
            )));
        }

        for function in &self.functions {
            if !IDENTIFIER.is_match(&function.name) {
                return Err(MacroError::Parse(format!(
                    "invalid function name '{}' in plugin '{}'",
                    function.name, self.name
                )));
            }
        }

        Ok(())
    }

    /// Find a declared function by name. The first match wins.
    ///
    /// # Errors
    /// Returns [`MacroError::NotFound`] if the manifest does not declare it.
    pub fn function(&self, name: &str) -> Result<&FunctionSignature> {
        self.functions
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| {
                MacroError::NotFound(format!("function {} in {} manifest", name, self.name))
            })
    }
}

/// Manifests of every loaded plugin, keyed by plugin name.
#[derive(Debug, Default)]
pub struct ManifestRegistry {
    manifests: HashMap<String, Manifest>,
}

impl ManifestRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a manifest, replacing any previous one with the same name.
    ///
    /// Returns the replaced manifest, if there was one.
    pub fn register(&mut self, manifest: Manifest) -> Option<Manifest> {
        self.manifests.insert(manifest.name.clone(), manifest)
    }

    /// Look up a plugin's manifest.
    ///
    /// # Errors
    /// Returns [`MacroError::NotFound`] for unknown plugins.
    pub fn lookup(&self, plugin: &str) -> Result<&Manifest> {
        self.manifests
            .get(plugin)
            .ok_or_else(|| MacroError::NotFound(format!("plugin {plugin}")))
    }

    /// Drop every manifest
    pub fn clear(&mut self) {
        self.manifests.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.manifests.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }

    /// Manifests sorted by plugin name
    #[must_use]
    pub fn sorted(&self) -> Vec<&Manifest> {
        let mut manifests: Vec<&Manifest> = self.manifests.values().collect();
        manifests.sort_by(|a, b| a.name.cmp(&b.name));
        manifests
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GREETER: &str = r#"{
        "name": "greeter",
        "version": "1.0.0",
        "functions": [
            { "name": "greet", "params": ["string"], "returns": ["string"] },
            { "name": "shout", "params": ["string", "number"], "returns": ["string", "boolean"] }
        ]
    }"#;

    #[test]
    fn test_manifest_parsing() {
        let manifest = Manifest::from_slice(GREETER.as_bytes()).unwrap();
        assert_eq!(manifest.name, "greeter");
        assert_eq!(manifest.version, "1.0.0");
        assert_eq!(manifest.functions.len(), 2);
        assert_eq!(manifest.functions[1].params, vec![TypeTag::String, TypeTag::Number]);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_malformed_manifest() {
        let result = Manifest::from_slice(br#"{ "name": "broken", "functions": 3 }"#);
        assert!(matches!(result, Err(MacroError::Parse(_))));
    }

    #[test]
    fn test_unknown_type_tag_is_kept() {
        let manifest = Manifest::from_slice(
            br#"{ "name": "t", "version": "1", "functions": [{ "name": "f", "params": ["table"] }] }"#,
        )
        .unwrap();
        let function = manifest.function("f").unwrap();
        assert_eq!(function.params, vec![TypeTag::Other("table".to_string())]);
        assert!(function.returns.is_empty());
    }

    #[test]
    fn test_invalid_names_rejected() {
        let mut manifest = Manifest::from_slice(GREETER.as_bytes()).unwrap();
        manifest.name = "my.plugin".to_string();
        assert!(manifest.validate().is_err());

        let mut manifest = Manifest::from_slice(GREETER.as_bytes()).unwrap();
        manifest.functions[0].name = "greet(".to_string();
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_function_lookup() {
        let manifest = Manifest::from_slice(GREETER.as_bytes()).unwrap();
        assert_eq!(manifest.function("shout").unwrap().returns.len(), 2);

        let err = manifest.function("whisper").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_registry_last_registration_wins() {
        let mut registry = ManifestRegistry::new();
        let first = Manifest::from_slice(GREETER.as_bytes()).unwrap();
        let mut second = first.clone();
        second.version = "2.0.0".to_string();

        assert!(registry.register(first).is_none());
        let replaced = registry.register(second).unwrap();
        assert_eq!(replaced.version, "1.0.0");
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("greeter").unwrap().version, "2.0.0");
    }

    #[test]
    fn test_registry_lookup_missing() {
        let registry = ManifestRegistry::new();
        let err = registry.lookup("ghost").unwrap_err();
        assert_eq!(err.to_string(), "plugin ghost not found");
    }

    #[test]
    fn test_signature_display() {
        let manifest = Manifest::from_slice(GREETER.as_bytes()).unwrap();
        assert_eq!(
            manifest.functions[1].to_string(),
            "shout(string, number) -> (string, boolean)"
        );
    }
}
