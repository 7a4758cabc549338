// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! A flat key/value configuration store.
//!
//! Keys are dotted paths such as `RenderManager.Deferred.ShowLightVolumes`.
//! Values are kept as strings and parsed on lookup, so the same store can be
//! filled programmatically or from a RON map.

use ahash::AHashMap;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// An error raised while loading configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The document is not valid RON.
    Parse(String),
    /// A value is neither a boolean, a number nor a string.
    UnsupportedValue {
        /// The offending key.
        key: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Parse(msg) => write!(f, "Failed to parse configuration: {msg}"),
            ConfigError::UnsupportedValue { key } => {
                write!(f, "Unsupported value type for configuration key '{key}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Flat configuration store with typed, defaulted getters.
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    values: AHashMap<String, String>,
}

impl ConfigStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a store from a RON map of keys to scalars.
    ///
    /// ```
    /// use lumen_core::config::ConfigStore;
    ///
    /// let store = ConfigStore::from_ron_str(r#"{ "A.Enable": false, "A.Count": 3 }"#).unwrap();
    /// assert!(!store.get_bool("A.Enable", true));
    /// assert_eq!(store.get_int("A.Count", 0), 3);
    /// ```
    pub fn from_ron_str(source: &str) -> Result<Self, ConfigError> {
        let map: BTreeMap<String, ron::Value> =
            ron::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let mut store = Self::new();
        for (key, value) in map {
            let text = match value {
                ron::Value::String(s) => s,
                ron::Value::Bool(_) | ron::Value::Number(_) | ron::Value::Char(_) => {
                    ron::to_string(&value).map_err(|e| ConfigError::Parse(e.to_string()))?
                }
                _ => return Err(ConfigError::UnsupportedValue { key }),
            };
            store.set(key, text);
        }
        Ok(store)
    }

    /// Sets a value, replacing any previous one.
    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) {
        self.values.insert(key.into(), value.to_string());
    }

    /// Returns `true` when `key` has a value.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// The raw string stored under `key`.
    pub fn raw(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// A boolean value. Accepts `true/false`, `yes/no`, `on/off` and `1/0`.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        let Some(raw) = self.raw(key) else {
            return default;
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => true,
            "false" | "no" | "off" | "0" => false,
            _ => {
                log::warn!("Config: '{key}' is not a boolean ('{raw}'), using {default}");
                default
            }
        }
    }

    /// An integer value.
    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        self.parse(key, default)
    }

    /// A float value.
    pub fn get_float(&self, key: &str, default: f32) -> f32 {
        self.parse(key, default)
    }

    /// A string value.
    pub fn get_str(&self, key: &str, default: &str) -> String {
        self.raw(key).unwrap_or(default).to_string()
    }

    fn parse<T: FromStr + fmt::Display + Copy>(&self, key: &str, default: T) -> T {
        match self.raw(key) {
            None => default,
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                log::warn!("Config: '{key}' has unparsable value '{raw}', using {default}");
                default
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_and_unparsable_values_use_defaults() {
        let mut store = ConfigStore::new();
        store.set("a.int", "twelve");
        store.set("a.bool", "maybe");
        assert_eq!(store.get_int("a.int", 7), 7);
        assert_eq!(store.get_int("a.missing", 3), 3);
        assert!(store.get_bool("a.bool", true));
        assert_eq!(store.get_str("a.missing", "x"), "x");
    }

    #[test]
    fn ron_maps_load_scalars() {
        let store = ConfigStore::from_ron_str(
            r#"{
                "RenderManager.Deferred.ForwardPriorities": "alpha, portal",
                "RenderManager.Deferred.ShowLightVolumes": true,
                "RenderManager.Deferred.GlobalIllum.SSDO.SampleRadius": 2.5,
            }"#,
        )
        .expect("valid document");
        assert_eq!(
            store.get_str("RenderManager.Deferred.ForwardPriorities", ""),
            "alpha, portal"
        );
        assert!(store.get_bool("RenderManager.Deferred.ShowLightVolumes", false));
        assert!(
            (store.get_float("RenderManager.Deferred.GlobalIllum.SSDO.SampleRadius", 0.0) - 2.5)
                .abs()
                < 1e-6
        );
    }

    #[test]
    fn nested_values_are_rejected() {
        let err = ConfigStore::from_ron_str(r#"{ "a": [1, 2] }"#).unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnsupportedValue {
                key: "a".to_string()
            }
        );
        assert!(matches!(
            ConfigStore::from_ron_str("{ oops"),
            Err(ConfigError::Parse(_))
        ));
    }
}
