//! Dispatcher core: builder, pipeline and execution modes.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info_span, warn, Instrument};

use crate::error::{DispatchError, HandlerId, Result};
use crate::ids::DispatchId;
use crate::registry::{erase, Fallback, HandlerEntry, HandlerRegistry, InvokeError, Registration};
use crate::runtime_config::DispatchConfig;
use crate::transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};
use crate::validator::{Diagnostic, Issue, JsonSchemaValidator, Validate};

static DEFAULT_TRANSPORT: Lazy<Arc<dyn Transport>> = Lazy::new(|| {
    let config = DispatchConfig::from_env();
    Arc::new(ReqwestTransport::default().with_default_timeout(config.http_timeout))
});

/// Successful result of [`Dispatcher::run`]: the handler output and, when the
/// body failed its schema, the validation diagnostic.
pub type RunOutput<O> = (O, Option<Diagnostic>);

/// Routes the response of one request to the handler registered for its status.
///
/// A dispatcher owns an immutable request descriptor, an optional transport
/// (the shared `reqwest` transport is used when none is injected), a
/// validation capability `V` and the handler registry. Builder methods consume
/// and return the dispatcher; [`map`](Dispatcher::map) produces a new one.
pub struct Dispatcher<O, V: Validate = JsonSchemaValidator> {
    request: Arc<HttpRequest>,
    transport: Option<Arc<dyn Transport>>,
    validator: Arc<V>,
    registry: HandlerRegistry<O, V>,
    config: DispatchConfig,
}

impl<O: 'static> Dispatcher<O, JsonSchemaValidator> {
    /// Dispatcher validating with JSON Schema through the process-wide cache.
    pub fn new(request: HttpRequest) -> Self {
        Self::with_validator(request, JsonSchemaValidator::default())
    }
}

impl<O: 'static, V: Validate> Dispatcher<O, V> {
    /// Dispatcher using an explicit validation capability.
    pub fn with_validator(request: HttpRequest, validator: V) -> Self {
        Self {
            request: Arc::new(request),
            transport: None,
            validator: Arc::new(validator),
            registry: HandlerRegistry::new(),
            config: DispatchConfig::from_env(),
        }
    }

    /// Inject the transport used by [`run`](Dispatcher::run).
    #[must_use]
    pub fn with_transport<T: Transport + 'static>(self, transport: T) -> Self {
        self.with_shared_transport(Arc::new(transport))
    }

    #[must_use]
    pub fn with_shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Register `handler` for `status` with no schema and content-type sniffing.
    #[must_use]
    pub fn register<P, F>(self, status: u16, handler: F) -> Self
    where
        P: DeserializeOwned + 'static,
        F: Fn(P) -> anyhow::Result<O> + Send + Sync + 'static,
    {
        self.register_with(status, Registration::new(), handler)
    }

    /// Register `handler` for `status`, validating the body against `schema` first.
    #[must_use]
    pub fn register_validated<P, F>(self, status: u16, schema: V::Schema, handler: F) -> Self
    where
        P: DeserializeOwned + 'static,
        F: Fn(P) -> anyhow::Result<O> + Send + Sync + 'static,
    {
        self.register_with(status, Registration::new().schema(schema), handler)
    }

    /// Register `handler` for `status` with explicit schema and extractor settings.
    ///
    /// Registering a status twice replaces the earlier handler.
    #[must_use]
    pub fn register_with<P, F>(mut self, status: u16, registration: Registration<V>, handler: F) -> Self
    where
        P: DeserializeOwned + 'static,
        F: Fn(P) -> anyhow::Result<O> + Send + Sync + 'static,
    {
        let entry = HandlerEntry::new(erase(handler), registration);
        if self.registry.insert(status, entry).is_some() {
            warn!(status = status, "Replacing handler registered earlier for this status");
        }
        self
    }

    /// Fail with the error built by `on_error` when no handler matches.
    ///
    /// Replaces any fallback set before, value fallbacks included.
    #[must_use]
    pub fn on_unmatched_as_error<F>(mut self, on_error: F) -> Self
    where
        F: Fn(&HttpResponse) -> anyhow::Error + Send + Sync + 'static,
    {
        self.replace_fallback(Fallback::AsError(Arc::new(on_error)));
        self
    }

    /// Succeed with the value built by `on_value` when no handler matches.
    ///
    /// Replaces an earlier value fallback. An error fallback takes precedence
    /// and is kept, in which case `on_value` is discarded.
    #[must_use]
    pub fn on_unmatched_as_value<F>(mut self, on_value: F) -> Self
    where
        F: Fn() -> O + Send + Sync + 'static,
    {
        if matches!(self.registry.fallback(), Fallback::AsError(_)) {
            debug!("Error fallback already set, ignoring value fallback");
            return self;
        }
        self.replace_fallback(Fallback::AsValue(Arc::new(on_value)));
        self
    }

    fn replace_fallback(&mut self, fallback: Fallback<O>) {
        let previous = self.registry.set_fallback(fallback);
        if previous.is_set() {
            debug!(previous = ?previous, "Replacing unmatched-status fallback");
        }
    }

    /// Declare the statuses this endpoint can answer with.
    ///
    /// Only used for bookkeeping: see [`unhandled_statuses`](Dispatcher::unhandled_statuses).
    #[must_use]
    pub fn expect_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.registry.declare(statuses);
        self
    }

    /// Declared statuses left without a handler (empty once a fallback is set).
    #[must_use]
    pub fn unhandled_statuses(&self) -> Vec<u16> {
        self.registry.unhandled()
    }

    /// Whether every declared status is covered by a handler or a fallback.
    #[must_use]
    pub fn is_exhaustive(&self) -> bool {
        self.registry.unhandled().is_empty()
    }

    #[must_use]
    pub fn handles(&self, status: u16) -> bool {
        self.registry.get(status).is_some()
    }

    #[must_use]
    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    #[must_use]
    pub fn registry(&self) -> &HandlerRegistry<O, V> {
        &self.registry
    }

    /// Derive a dispatcher whose output is `f` applied to this one's output.
    ///
    /// Handlers and the value fallback are composed with `f`; the error
    /// fallback is kept as is. Request, transport and validator are shared and
    /// `self` stays usable.
    #[must_use]
    pub fn map<O2, F>(&self, f: F) -> Dispatcher<O2, V>
    where
        O2: 'static,
        F: Fn(O) -> O2 + Send + Sync + 'static,
    {
        Dispatcher {
            request: Arc::clone(&self.request),
            transport: self.transport.clone(),
            validator: Arc::clone(&self.validator),
            registry: self.registry.map(Arc::new(f)),
            config: self.config,
        }
    }

    /// Send the request and dispatch the response.
    ///
    /// Resolves to the handler output plus a diagnostic when the body failed
    /// its schema (the handler still ran on the raw body). Every other failure
    /// is returned as an error. The request is sent exactly once.
    pub async fn run(&self) -> Result<RunOutput<O>> {
        let dispatch_id = DispatchId::new();
        let span = info_span!(
            "dispatch",
            dispatch_id = %dispatch_id,
            method = %self.request.method,
            url = %self.request.url,
        );
        self.execute().instrument(span).await
    }

    /// Like [`run`](Dispatcher::run), but a validation diagnostic is a failure.
    ///
    /// Handler, extractor and validator panics are caught, so this never
    /// unwinds into the caller.
    pub async fn safe_run(&self) -> Result<O> {
        match self.run().await {
            Ok((output, None)) => Ok(output),
            Ok((_, Some(diagnostic))) => {
                debug!(issues = diagnostic.issues.len(), "Validation diagnostic turned into failure");
                Err(DispatchError::Validation(diagnostic))
            }
            Err(e) => Err(e),
        }
    }

    async fn execute(&self) -> Result<RunOutput<O>> {
        let transport: &dyn Transport = match &self.transport {
            Some(transport) => transport.as_ref(),
            None => DEFAULT_TRANSPORT.as_ref(),
        };

        let response = match transport.send(&self.request).await {
            Ok(response) => response,
            Err(source) => {
                warn!(error = %source, "Transport failed");
                return Err(DispatchError::Network {
                    request: Box::new(self.request.as_ref().clone()),
                    source,
                });
            }
        };

        let status = response.status;
        let Some(entry) = self.registry.get(status) else {
            return self.dispatch_unmatched(&response);
        };
        debug!(status = status, extract = ?entry.extract(), "Dispatching to status handler");

        let extracted = catch_unwind(AssertUnwindSafe(|| entry.extract().extract(&response)))
            .unwrap_or_else(|panic| {
                Err(anyhow::anyhow!("extractor panicked: {}", panic_message(&*panic)))
            });
        let body = match extracted {
            Ok(body) => body,
            Err(source) => return Err(self.decode_failure(&response, source)),
        };

        let Some(schema) = &entry.schema else {
            return self.invoke(status, entry, &response, body, None);
        };
        match catch_unwind(AssertUnwindSafe(|| self.validator.validate(schema, &body))) {
            Ok(Ok(validated)) => self.invoke(status, entry, &response, validated, None),
            Ok(Err(diagnostic)) => {
                warn!(
                    status = status,
                    issues = diagnostic.issues.len(),
                    "Response body failed validation, invoking handler on raw body"
                );
                self.invoke(status, entry, &response, body, Some(diagnostic))
            }
            Err(panic) => {
                // No verdict on the body, so the handler does not run
                let message = format!("validator panicked: {}", panic_message(&*panic));
                warn!(status = status, error = %message, "Validator panicked");
                Err(DispatchError::Validation(Diagnostic::new(
                    body,
                    vec![Issue::at("validator", message)],
                )))
            }
        }
    }

    fn invoke(
        &self,
        status: u16,
        entry: &HandlerEntry<O, V>,
        response: &HttpResponse,
        input: Value,
        diagnostic: Option<Diagnostic>,
    ) -> Result<RunOutput<O>> {
        let handler = HandlerId::Status(status);
        match catch_unwind(AssertUnwindSafe(|| (entry.handler)(&input))) {
            Ok(Ok(output)) => Ok((output, diagnostic)),
            Ok(Err(InvokeError::Decode(e))) => match diagnostic {
                // The handler cannot take the raw body, so the diagnostic is all we have
                Some(diagnostic) => Err(DispatchError::Validation(diagnostic)),
                None => Err(self.decode_failure(response, e.into())),
            },
            Ok(Err(InvokeError::Failed(source))) => {
                warn!(handler = %handler, error = %source, "Handler returned an error");
                Err(DispatchError::HandlerExecution {
                    input,
                    handler,
                    source,
                })
            }
            Err(panic) => {
                let source = anyhow::anyhow!("handler panicked: {}", panic_message(&*panic));
                warn!(handler = %handler, error = %source, "Handler panicked");
                Err(DispatchError::HandlerExecution {
                    input,
                    handler,
                    source,
                })
            }
        }
    }

    fn dispatch_unmatched(&self, response: &HttpResponse) -> Result<RunOutput<O>> {
        let status = response.status;
        match self.registry.fallback() {
            Fallback::AsError(on_error) => {
                let source = catch_unwind(AssertUnwindSafe(|| on_error(response))).unwrap_or_else(
                    |panic| anyhow::anyhow!("error fallback panicked: {}", panic_message(&*panic)),
                );
                debug!(status = status, error = %source, "Unmatched status handled by error fallback");
                Err(DispatchError::Unmatched { status, source })
            }
            Fallback::AsValue(on_value) => match catch_unwind(AssertUnwindSafe(|| on_value())) {
                Ok(output) => {
                    debug!(status = status, "Unmatched status handled by value fallback");
                    Ok((output, None))
                }
                Err(panic) => Err(DispatchError::HandlerExecution {
                    input: Value::Null,
                    handler: HandlerId::Fallback,
                    source: anyhow::anyhow!("value fallback panicked: {}", panic_message(&*panic)),
                }),
            },
            Fallback::None => {
                warn!(status = status, "No handler or fallback for response status");
                Err(DispatchError::UnhandledStatus { status })
            }
        }
    }

    fn decode_failure(&self, response: &HttpResponse, source: anyhow::Error) -> DispatchError {
        warn!(status = response.status, error = %source, "Failed to decode response body");
        DispatchError::BodyDecode {
            raw_text: raw_text(response, self.config.raw_text_limit),
            response: Box::new(response.clone()),
            source,
        }
    }
}

impl<O, V: Validate> Clone for Dispatcher<O, V> {
    fn clone(&self) -> Self {
        Self {
            request: Arc::clone(&self.request),
            transport: self.transport.clone(),
            validator: Arc::clone(&self.validator),
            registry: self.registry.clone(),
            config: self.config,
        }
    }
}

impl<O, V: Validate> fmt::Debug for Dispatcher<O, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("request", &self.request)
            .field("custom_transport", &self.transport.is_some())
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}

/// Best-effort UTF-8 text of the first `limit` body bytes.
///
/// A multi-byte character cut by the limit is dropped; bodies that are not
/// UTF-8 at all yield `None`.
fn raw_text(response: &HttpResponse, limit: usize) -> Option<String> {
    if limit == 0 {
        return None;
    }
    let slice = &response.body[..response.body.len().min(limit)];
    match std::str::from_utf8(slice) {
        Ok(text) => Some(text.to_owned()),
        Err(e) if e.error_len().is_none() => std::str::from_utf8(&slice[..e.valid_up_to()])
            .ok()
            .map(str::to_owned),
        Err(_) => None,
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
