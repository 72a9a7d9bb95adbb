use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::MacroError;
use crate::plugins::PluginManager;

/// Kind of a receipt component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentType {
    Text,
    Divider,
    Qr,
    Macro,
    Header,
}

/// One block of a receipt layout, as sent to the print server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    #[serde(rename = "type")]
    pub kind: ComponentType,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub bold: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub italic: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub underline: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub font_size: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub line_width: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub align: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub fit: bool,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub scale: i32,
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn is_zero(value: &i32) -> bool {
    *value == 0
}

impl Component {
    /// Whether this component's content goes through macro expansion
    #[must_use]
    pub fn is_expandable(&self) -> bool {
        matches!(self.kind, ComponentType::Text | ComponentType::Qr)
    }
}

/// A named receipt layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    #[serde(default)]
    pub layout: Vec<Component>,
}

impl Template {
    /// Load a template document
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path.as_ref()).context("Failed to read template file")?;
        let template = serde_json::from_str(&json).context("Failed to parse template file")?;
        Ok(template)
    }

    /// Save a template document
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize template")?;
        fs::write(path.as_ref(), json).context("Failed to write template file")?;
        Ok(())
    }

    /// Copy of this template with every text and QR component expanded.
    ///
    /// # Errors
    /// The first component that fails to expand aborts the whole template.
    pub fn expand(&self, plugins: &PluginManager) -> std::result::Result<Self, MacroError> {
        let layout = self
            .layout
            .iter()
            .map(|component| -> std::result::Result<Component, MacroError> {
                let mut component = component.clone();
                if component.is_expandable() {
                    component.content = plugins.expand_text(&component.content)?;
                }
                Ok(component)
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            name: self.name.clone(),
            layout,
        })
    }
}
