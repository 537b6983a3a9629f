//! Handler registry: the per-status table a dispatcher routes responses through.
//!
//! Each status code maps to one [`HandlerEntry`] (handler, optional schema,
//! extractor). Registering a code twice replaces the earlier entry: the last
//! registration wins. At most one [`Fallback`] covers the statuses without an
//! entry.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::extract::Extract;
use crate::transport::HttpResponse;
use crate::validator::Validate;

/// Why a type-erased handler did not produce an output.
#[derive(Debug)]
pub(crate) enum InvokeError {
    /// The body could not be decoded into the handler's payload type.
    Decode(serde_json::Error),
    /// The handler itself returned an error.
    Failed(anyhow::Error),
}

/// Handler with its payload type erased behind JSON decoding.
pub(crate) type ErasedHandler<O> = Arc<dyn Fn(&Value) -> Result<O, InvokeError> + Send + Sync>;

/// Error-producing fallback.
pub type ErrorFallback = Arc<dyn Fn(&HttpResponse) -> anyhow::Error + Send + Sync>;

/// Value-producing fallback.
pub type ValueFallback<O> = Arc<dyn Fn() -> O + Send + Sync>;

pub(crate) fn erase<P, O, F>(handler: F) -> ErasedHandler<O>
where
    P: DeserializeOwned + 'static,
    O: 'static,
    F: Fn(P) -> anyhow::Result<O> + Send + Sync + 'static,
{
    Arc::new(move |value: &Value| {
        let payload = P::deserialize(value).map_err(InvokeError::Decode)?;
        handler(payload).map_err(InvokeError::Failed)
    })
}

/// Optional settings for one registration.
pub struct Registration<V: Validate> {
    pub(crate) schema: Option<V::Schema>,
    pub(crate) extract: Extract,
}

impl<V: Validate> Registration<V> {
    /// No schema, content-type sniffing extraction.
    pub fn new() -> Self {
        Self {
            schema: None,
            extract: Extract::Auto,
        }
    }

    #[must_use]
    pub fn schema(mut self, schema: V::Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    #[must_use]
    pub fn extractor(mut self, extract: Extract) -> Self {
        self.extract = extract;
        self
    }
}

impl<V: Validate> Default for Registration<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handler, schema and extractor registered for one status code.
pub struct HandlerEntry<O, V: Validate> {
    pub(crate) handler: ErasedHandler<O>,
    pub(crate) schema: Option<V::Schema>,
    pub(crate) extract: Extract,
}

impl<O, V: Validate> HandlerEntry<O, V> {
    pub(crate) fn new(handler: ErasedHandler<O>, registration: Registration<V>) -> Self {
        Self {
            handler,
            schema: registration.schema,
            extract: registration.extract,
        }
    }

    #[must_use]
    pub fn has_schema(&self) -> bool {
        self.schema.is_some()
    }

    #[must_use]
    pub fn extract(&self) -> &Extract {
        &self.extract
    }
}

impl<O, V: Validate> Clone for HandlerEntry<O, V> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            schema: self.schema.clone(),
            extract: self.extract.clone(),
        }
    }
}

/// Catch-all used when no entry matches the response status.
pub enum Fallback<O> {
    None,
    /// Turn the response into a terminal error.
    AsError(ErrorFallback),
    /// Produce a successful output without looking at the response.
    AsValue(ValueFallback<O>),
}

impl<O> Fallback<O> {
    #[must_use]
    pub fn is_set(&self) -> bool {
        !matches!(self, Fallback::None)
    }
}

impl<O> Clone for Fallback<O> {
    fn clone(&self) -> Self {
        match self {
            Fallback::None => Fallback::None,
            Fallback::AsError(f) => Fallback::AsError(Arc::clone(f)),
            Fallback::AsValue(f) => Fallback::AsValue(Arc::clone(f)),
        }
    }
}

impl<O> fmt::Debug for Fallback<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fallback::None => f.write_str("None"),
            Fallback::AsError(_) => f.write_str("AsError(..)"),
            Fallback::AsValue(_) => f.write_str("AsValue(..)"),
        }
    }
}

/// Status-code table plus fallback slot and declared status set.
pub struct HandlerRegistry<O, V: Validate> {
    entries: HashMap<u16, HandlerEntry<O, V>>,
    fallback: Fallback<O>,
    declared: BTreeSet<u16>,
}

impl<O, V: Validate> HandlerRegistry<O, V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            fallback: Fallback::None,
            declared: BTreeSet::new(),
        }
    }

    /// Insert an entry, returning the one it replaced.
    pub fn insert(&mut self, status: u16, entry: HandlerEntry<O, V>) -> Option<HandlerEntry<O, V>> {
        self.entries.insert(status, entry)
    }

    #[must_use]
    pub fn get(&self, status: u16) -> Option<&HandlerEntry<O, V>> {
        self.entries.get(&status)
    }

    /// Replace the fallback, returning the previous one.
    pub fn set_fallback(&mut self, fallback: Fallback<O>) -> Fallback<O> {
        std::mem::replace(&mut self.fallback, fallback)
    }

    #[must_use]
    pub fn fallback(&self) -> &Fallback<O> {
        &self.fallback
    }

    /// Record status codes the endpoint is declared to answer with.
    pub fn declare(&mut self, statuses: impl IntoIterator<Item = u16>) {
        self.declared.extend(statuses);
    }

    /// Registered status codes, ascending.
    #[must_use]
    pub fn statuses(&self) -> Vec<u16> {
        let mut statuses: Vec<u16> = self.entries.keys().copied().collect();
        statuses.sort_unstable();
        statuses
    }

    /// Declared status codes that have no entry, ascending.
    ///
    /// Empty once a fallback is set, since the fallback covers them.
    #[must_use]
    pub fn unhandled(&self) -> Vec<u16> {
        if self.fallback.is_set() {
            return Vec::new();
        }
        self.declared
            .iter()
            .copied()
            .filter(|status| !self.entries.contains_key(status))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy the registry, composing every handler and the value fallback with `f`.
    ///
    /// The error fallback is carried over unchanged.
    pub fn map<O2>(&self, f: Arc<dyn Fn(O) -> O2 + Send + Sync>) -> HandlerRegistry<O2, V>
    where
        O: 'static,
        O2: 'static,
    {
        let entries = self
            .entries
            .iter()
            .map(|(status, entry)| {
                let inner = Arc::clone(&entry.handler);
                let f = Arc::clone(&f);
                let handler: ErasedHandler<O2> =
                    Arc::new(move |value: &Value| inner(value).map(|output| f(output)));
                let mapped = HandlerEntry {
                    handler,
                    schema: entry.schema.clone(),
                    extract: entry.extract.clone(),
                };
                (*status, mapped)
            })
            .collect();

        let fallback = match &self.fallback {
            Fallback::None => Fallback::None,
            Fallback::AsError(on_error) => Fallback::AsError(Arc::clone(on_error)),
            Fallback::AsValue(on_value) => {
                let inner = Arc::clone(on_value);
                Fallback::AsValue(Arc::new(move || f(inner())))
            }
        };

        HandlerRegistry {
            entries,
            fallback,
            declared: self.declared.clone(),
        }
    }
}

impl<O, V: Validate> Default for HandlerRegistry<O, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O, V: Validate> Clone for HandlerRegistry<O, V> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            fallback: self.fallback.clone(),
            declared: self.declared.clone(),
        }
    }
}

impl<O, V: Validate> fmt::Debug for HandlerRegistry<O, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("statuses", &self.statuses())
            .field("fallback", &self.fallback)
            .field("declared", &self.declared)
            .finish()
    }
}
