//! # typed-dispatch
//!
//! **typed-dispatch** routes an HTTP response to the handler declared for its
//! status code and returns one typed result.
//!
//! ## Overview
//!
//! Calling an HTTP endpoint usually means handling several outcomes: a 200
//! with one body shape, a 404 with another, a 422 with validation errors, and
//! "anything else". A [`Dispatcher`] captures that contract as a table from
//! status code to handler, each with an optional schema and a body extractor,
//! plus an optional catch-all fallback.
//!
//! ## Architecture
//!
//! - **[`transport`]** - Request/response descriptors and the pluggable transport
//! - **[`extract`]** - Turning a response body into a JSON value
//! - **[`validator`]** - Validation capability and the JSON Schema adapter
//! - **[`validator_cache`]** - Compiled-schema cache shared across dispatches
//! - **[`registry`]** - Per-status handler entries and the fallback slot
//! - **[`dispatcher`]** - The pipeline: send, match, extract, validate, handle
//! - **[`error`]** - Failure kinds returned by a dispatch
//! - **[`runtime_config`]** / **[`logging`]** - Environment configuration and tracing setup
//!
//! ## Execution Modes
//!
//! [`Dispatcher::run`] resolves to `(output, Option<Diagnostic>)`: a body that
//! fails its schema is still handed to its handler, and the diagnostic is
//! returned next to the output. [`Dispatcher::safe_run`] resolves to a plain
//! `Result` and treats such a diagnostic as a failure.
//!
//! ## Example
//!
//! ```rust,no_run
//! use serde::Deserialize;
//! use serde_json::json;
//! use typed_dispatch::{Dispatcher, HttpRequest};
//!
//! #[derive(Deserialize)]
//! struct Person {
//!     name: String,
//! }
//!
//! # async fn example() -> Result<(), typed_dispatch::DispatchError> {
//! let schema = json!({
//!     "type": "object",
//!     "properties": {"name": {"type": "string"}, "age": {"type": "number"}},
//!     "required": ["name", "age"]
//! });
//!
//! let greeting = Dispatcher::new(HttpRequest::get("https://api.example.com/people/1"))
//!     .register_validated(200, schema, |p: Person| Ok(format!("Hello, {}", p.name)))
//!     .on_unmatched_as_value(|| "Hello, stranger".to_string())
//!     .safe_run()
//!     .await?;
//! println!("{greeting}");
//! # Ok(())
//! # }
//! ```

pub mod dispatcher;
pub mod error;
pub mod extract;
pub mod ids;
pub mod logging;
pub mod registry;
pub mod runtime_config;
pub mod transport;
pub mod validator;
pub mod validator_cache;

pub use dispatcher::{Dispatcher, RunOutput};
pub use error::{DispatchError, ErrorKind, HandlerId};
pub use extract::Extract;
pub use registry::Registration;
pub use transport::{transport_fn, HttpRequest, HttpResponse, Transport};
pub use validator::{Diagnostic, FnValidator, Issue, JsonSchemaValidator, Validate};
