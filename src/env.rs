//! Environment variable substitution for configuration files
//!
//! Configuration text may reference environment variables as `${VAR_NAME}`,
//! which keeps secrets such as default identity paths or mount passwords out
//! of the YAML on disk. Substitution happens on the raw text before parsing.

use std::env;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::config::ConfigError;

static ENV_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("env reference pattern is valid")
});

/// Replace every `${VAR}` in `input` with the value of `VAR`.
///
/// All unset variables are collected and reported in a single error, in the
/// order they first appear.
pub fn substitute_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut missing: Vec<String> = Vec::new();

    let output = ENV_REFERENCE.replace_all(input, |caps: &Captures<'_>| {
        let name = &caps[1];
        match env::var(name) {
            Ok(value) => value,
            Err(_) => {
                if !missing.iter().any(|m| m == name) {
                    missing.push(name.to_string());
                }
                caps[0].to_string()
            }
        }
    });

    if !missing.is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "Missing environment variables: {}",
            missing.join(", ")
        )));
    }

    Ok(output.into_owned())
}
