//! Environment variable interpolation for config files.
//!
//! Supports:
//! - `$VAR` or `${VAR}` - substitute with env var value, error if missing
//! - `${VAR:-default}` - use default if VAR is unset OR empty
//! - `${VAR-default}` - use default only if VAR is unset (empty is OK)
//! - `$$` - escape sequence for literal `$`

use regex::{Captures, Regex};
use std::env;
use std::sync::LazyLock;

use crate::error::ConfigError;

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \$\$                           # escaped dollar
        |
        \$\{
            (?P<braced>[A-Za-z_][A-Za-z0-9_]*)
            (?:(?P<op>:?-)(?P<default>[^}]*))?
        \}
        |
        \$(?P<bare>[A-Za-z_][A-Za-z0-9_]*)
        ",
    )
    .expect("interpolation pattern is valid")
});

fn substitute(caps: &Captures, errors: &mut Vec<String>) -> String {
    let whole = &caps[0];
    if whole == "$$" {
        return "$".to_string();
    }

    let name = caps
        .name("braced")
        .or_else(|| caps.name("bare"))
        .map(|m| m.as_str())
        .unwrap_or_default();
    let op = caps.name("op").map(|m| m.as_str());
    let default = caps.name("default").map(|m| m.as_str());

    match env::var(name) {
        Ok(value) if value.contains('\n') || value.contains('\r') => {
            errors.push(format!(
                "environment variable '{name}' contains newlines, which is not allowed"
            ));
            whole.to_string()
        }
        Ok(value) if value.is_empty() && op == Some(":-") => {
            default.unwrap_or_default().to_string()
        }
        Ok(value) => value,
        Err(_) => match default {
            Some(default) => default.to_string(),
            None => {
                errors.push(format!("environment variable '{name}' is not set"));
                whole.to_string()
            }
        },
    }
}

/// Interpolate environment variables in `input`.
///
/// Every missing variable is reported at once in a single error.
pub fn interpolate(input: &str) -> Result<String, ConfigError> {
    let mut errors = Vec::new();
    let text = ENV_VAR_PATTERN
        .replace_all(input, |caps: &Captures| substitute(caps, &mut errors))
        .into_owned();

    if errors.is_empty() {
        Ok(text)
    } else {
        Err(ConfigError::EnvInterpolation {
            message: errors.join("\n"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_env<R>(vars: &[(&str, Option<&str>)], f: impl FnOnce() -> R) -> R {
        let originals: Vec<_> = vars.iter().map(|(k, _)| (*k, env::var(k).ok())).collect();
        // SAFETY: every test uses variable names unique to itself
        for (key, value) in vars {
            match value {
                Some(v) => unsafe { env::set_var(key, v) },
                None => unsafe { env::remove_var(key) },
            }
        }
        let result = f();
        for (key, original) in originals {
            match original {
                Some(v) => unsafe { env::set_var(key, v) },
                None => unsafe { env::remove_var(key) },
            }
        }
        result
    }

    #[test]
    fn test_bare_and_braced() {
        with_env(&[("TOTE_VARS_BUCKET", Some("ingestion-zone"))], || {
            assert_eq!(
                interpolate("a: s3://$TOTE_VARS_BUCKET\nb: ${TOTE_VARS_BUCKET}/raw").unwrap(),
                "a: s3://ingestion-zone\nb: ingestion-zone/raw"
            );
        });
    }

    #[test]
    fn test_missing_variables_are_all_reported() {
        with_env(
            &[("TOTE_VARS_MISSING_A", None), ("TOTE_VARS_MISSING_B", None)],
            || {
                let err = interpolate("$TOTE_VARS_MISSING_A ${TOTE_VARS_MISSING_B}").unwrap_err();
                let message = err.to_string();
                assert!(message.contains("TOTE_VARS_MISSING_A"));
                assert!(message.contains("TOTE_VARS_MISSING_B"));
            },
        );
    }

    #[test]
    fn test_defaults() {
        with_env(
            &[("TOTE_VARS_UNSET", None), ("TOTE_VARS_EMPTY", Some(""))],
            || {
                assert_eq!(interpolate("${TOTE_VARS_UNSET:-local}").unwrap(), "local");
                assert_eq!(interpolate("${TOTE_VARS_EMPTY:-local}").unwrap(), "local");
                assert_eq!(interpolate("${TOTE_VARS_EMPTY-local}").unwrap(), "");
            },
        );
    }

    #[test]
    fn test_newline_injection_rejected() {
        with_env(&[("TOTE_VARS_NEWLINE", Some("a\nb: c"))], || {
            assert!(interpolate("${TOTE_VARS_NEWLINE}").is_err());
        });
    }

    #[test]
    fn test_escape_sequence() {
        assert_eq!(interpolate("price: $$100").unwrap(), "price: $100");
    }
}
