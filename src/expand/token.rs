//! Recognizing and taking apart `{{plugin.function(args)}}` tokens

use crate::error::{MacroError, Result};

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// A parsed macro call. Lives only for the duration of one expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallToken {
    pub plugin: String,
    pub function: String,
    /// Everything between the parentheses, unsplit
    pub raw_args: String,
}

/// Whether a whole word is a macro call.
#[must_use]
pub fn is_call_token(word: &str) -> bool {
    word.starts_with(OPEN) && word.ends_with(CLOSE)
}

/// Split a token into plugin name, function name and argument text.
///
/// # Errors
/// Returns [`MacroError::Format`] if the token is not delimited by `{{`/`}}`,
/// has no plugin name before the first `.`, or lacks a `(...)` argument list
/// closing at the end of the call.
pub fn parse_call(token: &str) -> Result<CallToken> {
    let call = token
        .strip_prefix(OPEN)
        .and_then(|t| t.strip_suffix(CLOSE))
        .ok_or_else(|| MacroError::Format(format!("{token} is not a {{{{...}}}} call")))?;

    let dot = match call.find('.') {
        Some(index) if index >= 1 => index,
        _ => {
            return Err(MacroError::Format(
                "call must be pluginName.functionName".to_string(),
            ))
        }
    };
    let plugin = &call[..dot];
    let function_call = &call[dot + 1..];

    let paren = match function_call.find('(') {
        Some(index) if function_call.ends_with(')') => index,
        _ => {
            return Err(MacroError::Format(
                "function call is missing parentheses".to_string(),
            ))
        }
    };

    let function = &function_call[..paren];
    if function.is_empty() {
        return Err(MacroError::Format("function name is empty".to_string()));
    }

    Ok(CallToken {
        plugin: plugin.to_string(),
        function: function.to_string(),
        raw_args: function_call[paren + 1..function_call.len() - 1].to_string(),
    })
}

/// Split an argument list on top-level commas.
///
/// Commas inside double quotes do not separate, and `\` takes away the
/// special meaning of the character after it. Escapes are left in place;
/// every element is trimmed. The result is never empty.
#[must_use]
pub fn split_args(args: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in args.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(args[start..i].trim().to_string());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(args[start..].trim().to_string());

    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_is_call_token() {
        assert!(is_call_token("{{a.b()}}"));
        assert!(!is_call_token("plain"));
        assert!(!is_call_token("{{a.b()"));
        assert!(!is_call_token("x{{a.b()}}"));
    }

    #[test]
    fn test_parse_call() {
        let call = parse_call("{{math.add(1,2)}}").unwrap();
        assert_eq!(
            call,
            CallToken {
                plugin: "math".to_string(),
                function: "add".to_string(),
                raw_args: "1,2".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_call_splits_on_first_dot() {
        let call = parse_call("{{math.round(1.5)}}").unwrap();
        assert_eq!(call.plugin, "math");
        assert_eq!(call.function, "round");
        assert_eq!(call.raw_args, "1.5");
    }

    #[test]
    fn test_parse_call_without_args() {
        let call = parse_call("{{clock.today()}}").unwrap();
        assert_eq!(call.function, "today");
        assert_eq!(call.raw_args, "");
    }

    #[test]
    fn test_parse_call_errors() {
        for token in [
            "{{.add(1)}}",
            "{{mathadd(1)}}",
            "{{math.add}}",
            "{{math.add(1}}",
            "{{math.add)1(}}",
            "{{math.(1)}}",
            "math.add(1)",
        ] {
            assert!(
                matches!(parse_call(token), Err(MacroError::Format(_))),
                "{token} should not parse"
            );
        }
    }

    #[test]
    fn test_split_args_respects_quotes() {
        assert_eq!(
            split_args(r#""a,b", 3, true"#),
            vec![r#""a,b""#, "3", "true"]
        );
    }

    #[test]
    fn test_split_args_empty() {
        assert_eq!(split_args(""), vec![""]);
    }

    #[test]
    fn test_split_args_escapes() {
        assert_eq!(
            split_args(r#""say \"hi, there\"", 2"#),
            vec![r#""say \"hi, there\"""#, "2"]
        );
        assert_eq!(split_args(r"a\,b, c"), vec![r"a\,b", "c"]);
    }

    proptest! {
        #[test]
        fn split_args_never_empty(s in ".*") {
            prop_assert!(!split_args(&s).is_empty());
        }

        #[test]
        fn split_args_plain_commas(parts in prop::collection::vec("[a-z0-9 ]{0,8}", 1..6)) {
            let split = split_args(&parts.join(","));
            prop_assert_eq!(split.len(), parts.len());
            for (got, want) in split.iter().zip(&parts) {
                prop_assert_eq!(got.as_str(), want.trim());
            }
        }
    }
}
