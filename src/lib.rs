//! Receiptify - receipt templates with Lua macro plugins
//!
//! Receipt templates can embed `{{plugin.function(args)}}` tokens. Each token
//! is checked against the plugin's manifest, run inside a sandboxed Lua
//! interpreter, and replaced by its result before printing.
//!
//! # Modules
//!
//! - [`plugins`]: manifests, plugin discovery and the Lua script host
//! - [`expand`]: token parsing, argument coercion and text expansion
//! - [`template`]: receipt template documents
//! - [`config`]: settings persistence
//! - [`error`]: the macro engine's error type

pub mod config;
pub mod error;
pub mod expand;
pub mod plugins;
pub mod template;

pub use error::{MacroError, Result};
pub use plugins::PluginManager;
