//! # Runtime Configuration Module
//!
//! Environment variable-based configuration for dispatch behaviour.
//!
//! ## Environment Variables
//!
//! ### `TYPED_DISPATCH_SCHEMA_CACHE`
//!
//! `off`, `false` or `0` disables the process-wide compiled-schema cache; any
//! other value (or none) leaves it on.
//!
//! ### `TYPED_DISPATCH_RAW_TEXT_LIMIT`
//!
//! Maximum number of body bytes copied into a body-decode failure as raw text.
//! Accepts decimal (`4096`) or hexadecimal (`0x1000`). Default: `4096`.
//!
//! ### `TYPED_DISPATCH_HTTP_TIMEOUT_MS`
//!
//! Timeout in milliseconds applied by the default transport to requests that do
//! not set their own. Unset means no timeout.
//!
//! ## Usage
//!
//! ```rust
//! use typed_dispatch::runtime_config::DispatchConfig;
//!
//! let config = DispatchConfig::from_env();
//! println!("Schema cache enabled: {}", config.schema_cache);
//! ```

use std::env;
use std::time::Duration;

/// Default cap on captured raw body text.
pub const DEFAULT_RAW_TEXT_LIMIT: usize = 0x1000;

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Whether compiled JSON Schema validators are cached (default: on)
    pub schema_cache: bool,
    /// Bytes of raw body text kept on decode failures (default: 4 KB)
    pub raw_text_limit: usize,
    /// Default transport timeout (default: none)
    pub http_timeout: Option<Duration>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            schema_cache: true,
            raw_text_limit: DEFAULT_RAW_TEXT_LIMIT,
            http_timeout: None,
        }
    }
}

impl DispatchConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let schema_cache = match lookup("TYPED_DISPATCH_SCHEMA_CACHE") {
            Some(val) => !matches!(val.trim().to_lowercase().as_str(), "off" | "false" | "0"),
            None => defaults.schema_cache,
        };

        let raw_text_limit = lookup("TYPED_DISPATCH_RAW_TEXT_LIMIT")
            .and_then(|val| parse_size(&val))
            .unwrap_or(defaults.raw_text_limit);

        let http_timeout = lookup("TYPED_DISPATCH_HTTP_TIMEOUT_MS")
            .and_then(|val| val.trim().parse::<u64>().ok())
            .map(Duration::from_millis);

        DispatchConfig {
            schema_cache,
            raw_text_limit,
            http_timeout,
        }
    }
}

fn parse_size(val: &str) -> Option<usize> {
    let val = val.trim();
    if let Some(hex) = val.strip_prefix("0x") {
        usize::from_str_radix(hex, 16).ok()
    } else {
        val.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = DispatchConfig::from_lookup(lookup(&[]));
        assert_eq!(config, DispatchConfig::default());
        assert!(config.schema_cache);
        assert_eq!(config.raw_text_limit, 4096);
        assert_eq!(config.http_timeout, None);
    }

    #[test]
    fn test_schema_cache_off() {
        for val in ["off", "OFF", "false", "0"] {
            let config =
                DispatchConfig::from_lookup(lookup(&[("TYPED_DISPATCH_SCHEMA_CACHE", val)]));
            assert!(!config.schema_cache, "{val} should disable the cache");
        }
        let config = DispatchConfig::from_lookup(lookup(&[("TYPED_DISPATCH_SCHEMA_CACHE", "on")]));
        assert!(config.schema_cache);
    }

    #[test]
    fn test_raw_text_limit_hex_and_decimal() {
        let hex = DispatchConfig::from_lookup(lookup(&[("TYPED_DISPATCH_RAW_TEXT_LIMIT", "0x20")]));
        assert_eq!(hex.raw_text_limit, 32);
        let dec = DispatchConfig::from_lookup(lookup(&[("TYPED_DISPATCH_RAW_TEXT_LIMIT", "100")]));
        assert_eq!(dec.raw_text_limit, 100);
        let bad = DispatchConfig::from_lookup(lookup(&[("TYPED_DISPATCH_RAW_TEXT_LIMIT", "lots")]));
        assert_eq!(bad.raw_text_limit, DEFAULT_RAW_TEXT_LIMIT);
    }

    #[test]
    fn test_http_timeout() {
        let config =
            DispatchConfig::from_lookup(lookup(&[("TYPED_DISPATCH_HTTP_TIMEOUT_MS", "1500")]));
        assert_eq!(config.http_timeout, Some(Duration::from_millis(1500)));
    }
}
