//! Macro expansion
//!
//! Turns text such as `Total due {{text.upper("today")}}` into literal text by
//! running every `{{plugin.function(args)}}` word through its plugin.

pub mod coerce;
pub mod token;

pub use coerce::{coerce_args, decode_returns, ReturnValue, TypedValue};
pub use token::{is_call_token, parse_call, split_args, CallToken};

use tracing::debug;

use crate::error::Result;
use crate::plugins::PluginManager;

/// Run one call token and return each decoded result separately.
fn call_token(plugins: &PluginManager, token: &str) -> Result<Vec<String>> {
    let call = parse_call(token)?;

    let manifest = plugins.manifests().lookup(&call.plugin)?;
    let signature = manifest.function(&call.function)?;

    let raw_args = if call.raw_args.trim().is_empty() {
        Vec::new()
    } else {
        split_args(&call.raw_args)
    };
    let args = coerce_args(&raw_args, &signature.params)?;

    let values = plugins.host().invoke(
        &call.plugin,
        &call.function,
        &args,
        signature.returns.len(),
    )?;

    debug!(token, results = values.len(), "Expanded macro call");
    Ok(decode_returns(&values, &signature.returns))
}

/// Expand a single `{{plugin.function(args)}}` token.
///
/// Multiple results are joined with a single space.
///
/// # Errors
/// Any parse, lookup, coercion or invocation failure; nothing is substituted.
pub fn expand_token(plugins: &PluginManager, token: &str) -> Result<String> {
    Ok(call_token(plugins, token)?.join(" "))
}

/// Expand every call token in `content`.
///
/// The content is split on plain spaces; words that are call tokens are
/// replaced by their results, everything else passes through untouched.
///
/// # Errors
/// The first failing token aborts the whole expansion.
pub fn expand_text(plugins: &PluginManager, content: &str) -> Result<String> {
    let mut output = Vec::new();

    for word in content.split(' ') {
        if is_call_token(word) {
            output.extend(call_token(plugins, word)?);
        } else {
            output.push(word.to_string());
        }
    }

    Ok(output.join(" "))
}

impl PluginManager {
    /// Expand every call token in `content`. See [`expand_text`].
    ///
    /// # Errors
    /// The first failing token aborts the whole expansion.
    pub fn expand_text(&self, content: &str) -> Result<String> {
        expand_text(self, content)
    }
}
