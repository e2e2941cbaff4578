// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Access to configuration values.
//!
//! All configuration is read through the [`Environment`] trait so that the engine can be embedded
//! (values supplied by the host through a [`MapEnvironment`]) or run as a process (values read from
//! the process environment through [`SystemEnvironment`]).

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

pub trait Environment: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn enabled(&self, key: &str, default_value: bool) -> Result<bool, EnvError> {
        match self.get(key) {
            Some(value) => match value.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" | "enabled" | "enable" => Ok(true),
                "false" | "0" | "no" | "off" | "disabled" | "disable" => Ok(false),
                _ => Err(EnvError::InvalidBoolean {
                    key: key.to_string(),
                    value,
                }),
            },
            None => Ok(default_value),
        }
    }

    fn get_or_else(&self, key: &str, default_value: &str) -> String {
        self.get(key).unwrap_or_else(|| default_value.to_string())
    }

    /// Parse the value of `key` (after trimming) into `T`. Returns `Ok(None)` if the key is not set
    /// or is set to an empty string.
    fn get_parsed<T>(&self, key: &str) -> Result<Option<T>, EnvError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
        Self: Sized,
    {
        parse_value(self.get(key), key)
    }
}

/// Same as [`Environment::get_parsed`], usable with `&dyn Environment`.
pub fn get_parsed<T>(env: &dyn Environment, key: &str) -> Result<Option<T>, EnvError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    parse_value(env.get(key), key)
}

fn parse_value<T>(value: Option<String>, key: &str) -> Result<Option<T>, EnvError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(value) if !value.trim().is_empty() => {
            value
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|e| EnvError::InvalidValue {
                    key: key.to_string(),
                    value: value.clone(),
                    message: e.to_string(),
                })
        }
        _ => Ok(None),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    #[error(
        "Invalid value for {key}: {value}. Expected true, 1, yes, on, enabled, enable OR false, 0, no, off, disabled, disable"
    )]
    InvalidBoolean { key: String, value: String },

    #[error("Invalid value for {key}: {value} ({message})")]
    InvalidValue {
        key: String,
        value: String,
        message: String,
    },

    #[error("Invalid env value {env_value} for {env_key}: {message}")]
    InvalidEnum {
        env_key: &'static str,
        env_value: String,
        message: String,
    },
}

pub struct SystemEnvironment;

impl Environment for SystemEnvironment {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// An environment backed by an in-memory map, optionally falling back to another environment for
/// keys it does not have.
#[derive(Clone, Default)]
pub struct MapEnvironment {
    values: HashMap<String, String>,
    fallback: Option<Arc<dyn Environment>>,
}

impl Environment for MapEnvironment {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .cloned()
            .or_else(|| self.fallback.as_ref().and_then(|fb| fb.get(key)))
    }
}

impl<const N: usize> From<[(&str, &str); N]> for MapEnvironment {
    fn from(values: [(&str, &str); N]) -> Self {
        Self {
            values: values
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            fallback: None,
        }
    }
}

impl MapEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fallback(fallback: Arc<dyn Environment>) -> Self {
        Self {
            values: HashMap::new(),
            fallback: Some(fallback),
        }
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_typed_values() {
        let env = MapEnvironment::from([("SIZE", " 42 "), ("EMPTY", ""), ("BAD", "forty")]);

        assert_eq!(env.get_parsed::<usize>("SIZE").unwrap(), Some(42));
        assert_eq!(env.get_parsed::<usize>("EMPTY").unwrap(), None);
        assert_eq!(env.get_parsed::<usize>("MISSING").unwrap(), None);
        assert!(matches!(
            env.get_parsed::<usize>("BAD"),
            Err(EnvError::InvalidValue { .. })
        ));
    }

    #[test]
    fn falls_back_for_missing_keys() {
        let base: Arc<dyn Environment> =
            Arc::new(MapEnvironment::from([("A", "base"), ("B", "b")]));
        let mut env = MapEnvironment::with_fallback(base);
        env.set("A", "override");

        assert_eq!(env.get("A").as_deref(), Some("override"));
        assert_eq!(env.get("B").as_deref(), Some("b"));
        assert!(env.enabled("C", true).unwrap());
    }
}
