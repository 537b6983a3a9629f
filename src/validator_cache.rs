//! # Schema Validator Cache Module
//!
//! This module provides thread-safe caching of compiled JSON Schema validators so
//! that dispatching many responses against the same schema compiles it once.
//!
//! ## Overview
//!
//! Compiling a JSON Schema is far more expensive than evaluating it. A dispatcher
//! may validate every response of an endpoint against the same schema, so the
//! compiled validator is stored here and shared through `Arc`.
//!
//! ## Cache Key Structure
//!
//! Entries are keyed by [`SchemaKey`], the SHA-256 digest of the schema's JSON
//! text. Two schema values with the same content share one compiled validator,
//! even when they were built independently.
//!
//! ## Thread Safety
//!
//! The cache uses `Arc<RwLock<HashMap>>`:
//! - Multiple readers can look up validators simultaneously
//! - Writers take the lock only to insert a freshly compiled validator
//! - A double-check under the write lock keeps the first compiled entry
//!
//! ## Eviction
//!
//! Entries are never evicted. Memory grows with the number of distinct schemas,
//! which is bounded when schemas are declared alongside handlers. Call
//! [`ValidatorCache::clear`] if schemas are generated at runtime.
//!
//! ## Configuration
//!
//! The process-wide cache returned by [`global`] can be disabled with
//! `TYPED_DISPATCH_SCHEMA_CACHE=off`; validators are then compiled per call.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use jsonschema::Validator;
use once_cell::sync::Lazy;
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::runtime_config::DispatchConfig;

static GLOBAL: Lazy<ValidatorCache> =
    Lazy::new(|| ValidatorCache::new(DispatchConfig::from_env().schema_cache));

/// Process-wide validator cache shared by default [`JsonSchemaValidator`](crate::validator::JsonSchemaValidator)s.
pub fn global() -> &'static ValidatorCache {
    &GLOBAL
}

/// Content-derived identity of a schema.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchemaKey([u8; 32]);

impl SchemaKey {
    /// Compute the key of `schema` from its JSON text.
    #[must_use]
    pub fn of(schema: &Value) -> Self {
        let digest = Sha256::digest(schema.to_string().as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        SchemaKey(key)
    }
}

impl fmt::Display for SchemaKey {
    /// First 8 bytes in hex, enough to tell schemas apart in logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..8] {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for SchemaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SchemaKey({self})")
    }
}

/// A schema that could not be compiled.
#[derive(Debug, Clone, Error)]
#[error("invalid JSON Schema: {message}")]
pub struct CompileError {
    pub message: String,
}

/// Thread-safe cache for compiled JSON Schema validators.
///
/// # Example
///
/// ```rust
/// use typed_dispatch::validator_cache::ValidatorCache;
/// use serde_json::json;
///
/// let cache = ValidatorCache::new(true);
/// let schema = json!({"type": "object", "properties": {"name": {"type": "string"}}});
///
/// let validator = cache.get_or_compile(&schema).unwrap();
/// assert!(validator.is_valid(&json!({"name": "Ann"})));
/// ```
#[derive(Clone)]
pub struct ValidatorCache {
    cache: Arc<RwLock<HashMap<SchemaKey, Arc<Validator>>>>,
    enabled: bool,
}

impl fmt::Debug for ValidatorCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorCache")
            .field("enabled", &self.enabled)
            .field("size", &self.size())
            .finish()
    }
}

impl ValidatorCache {
    /// Create a new validator cache
    ///
    /// # Arguments
    ///
    /// * `enabled` - Whether compiled validators are kept (from [`DispatchConfig`])
    pub fn new(enabled: bool) -> Self {
        info!(enabled = enabled, "Initializing JSON Schema validator cache");
        Self {
            cache: Arc::new(RwLock::new(HashMap::new())),
            enabled,
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Get a cached validator or compile and cache a new one
    ///
    /// # Performance
    ///
    /// - Cache hit: read lock + HashMap lookup
    /// - Cache miss: compilation + write lock for the insert
    pub fn get_or_compile(&self, schema: &Value) -> Result<Arc<Validator>, CompileError> {
        if !self.enabled {
            return compile(schema).map(Arc::new);
        }

        let key = SchemaKey::of(schema);

        // Fast path: read lock only
        {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(validator) = cache.get(&key) {
                debug!(schema_key = %key, "Schema validator cache hit");
                return Ok(Arc::clone(validator));
            }
        }

        let validator = match compile(schema) {
            Ok(compiled) => Arc::new(compiled),
            Err(e) => {
                error!(schema_key = %key, error = %e, "Failed to compile JSON Schema");
                return Err(e);
            }
        };

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        // Another task may have compiled the same schema while we were compiling
        if let Some(existing) = cache.get(&key) {
            debug!(schema_key = %key, "Schema validator compiled by another task");
            return Ok(Arc::clone(existing));
        }
        cache.insert(key, Arc::clone(&validator));
        info!(
            schema_key = %key,
            cache_size = cache.len(),
            "Schema validator compiled and cached"
        );
        Ok(validator)
    }

    /// Number of cached validators.
    #[must_use]
    pub fn size(&self) -> usize {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Drop every cached validator.
    pub fn clear(&self) {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        let dropped = cache.len();
        cache.clear();
        info!(dropped = dropped, "Schema validator cache cleared");
    }

    /// Compile and cache `schemas` up front.
    ///
    /// Invalid schemas are logged and skipped. Returns the number of schemas that
    /// compiled successfully; zero when the cache is disabled.
    pub fn precompile<'a>(&self, schemas: impl IntoIterator<Item = &'a Value>) -> usize {
        if !self.enabled {
            info!("Schema cache disabled, skipping precompilation");
            return 0;
        }

        let compiled_count = schemas
            .into_iter()
            .filter(|schema| self.get_or_compile(schema).is_ok())
            .count();

        info!(
            compiled_count = compiled_count,
            cache_size = self.size(),
            "Precompiled response schemas"
        );
        compiled_count
    }
}

fn compile(schema: &Value) -> Result<Validator, CompileError> {
    jsonschema::validator_for(schema).map_err(|e| CompileError {
        message: e.to_string(),
    })
}
