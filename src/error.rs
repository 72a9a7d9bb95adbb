//! Error types for the macro engine
//!
//! Every failure that can happen between reading a plugin from disk and
//! substituting a token's result back into text is one of these variants.

use thiserror::Error;

/// Errors raised while loading plugins or expanding macro tokens.
#[derive(Error, Debug)]
pub enum MacroError {
    /// Malformed or invalid manifest document
    #[error("failed to parse manifest: {0}")]
    Parse(String),

    /// Missing or unreadable plugin files, or an entry script that failed to run
    #[error("failed to load plugin {plugin}: {reason}")]
    Load { plugin: String, reason: String },

    /// Malformed `{{plugin.function(args)}}` token
    #[error("malformed macro call: {0}")]
    Format(String),

    /// Argument arity or type mismatch against the manifest signature
    #[error("{0}")]
    Type(String),

    /// Unknown plugin or function
    #[error("{0} not found")]
    NotFound(String),

    /// Runtime failure inside a plugin function, trapped by the protected call
    #[error("error calling Lua function {call}: {reason}")]
    Invocation { call: String, reason: String },

    /// The script host was never started or has been shut down
    #[error("script host is not running")]
    HostClosed,
}

impl MacroError {
    pub(crate) fn load(plugin: impl Into<String>, reason: impl ToString) -> Self {
        Self::Load {
            plugin: plugin.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result alias used across the macro engine.
pub type Result<T> = std::result::Result<T, MacroError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = MacroError::NotFound("plugin ghost".to_string());
        assert_eq!(err.to_string(), "plugin ghost not found");
    }

    #[test]
    fn test_load_display() {
        let err = MacroError::load("weather", "missing main.lua");
        assert_eq!(
            err.to_string(),
            "failed to load plugin weather: missing main.lua"
        );
    }

    #[test]
    fn test_invocation_display() {
        let err = MacroError::Invocation {
            call: "math.div".to_string(),
            reason: "division by zero".to_string(),
        };
        assert!(err.to_string().contains("math.div"));
        assert!(err.to_string().contains("division by zero"));
    }
}
