//! # Dispatcher Module
//!
//! The dispatcher turns one HTTP exchange into one typed result. It sends the
//! request it was built with, looks the response status up in its handler
//! registry, extracts and optionally validates the body, and hands it to the
//! handler registered for that status.
//!
//! ## Handler Registration
//!
//! ```rust,ignore
//! use serde::Deserialize;
//! use typed_dispatch::{Dispatcher, HttpRequest};
//!
//! #[derive(Deserialize)]
//! struct Person { name: String }
//!
//! let dispatcher = Dispatcher::new(HttpRequest::get("https://api.example.com/people/1"))
//!     .register_validated(200, person_schema, |p: Person| Ok(format!("Hello, {}", p.name)))
//!     .register(404, |_: serde_json::Value| Ok("nobody".to_string()))
//!     .on_unmatched_as_error(|resp| anyhow::anyhow!("unexpected status {}", resp.status));
//!
//! let (greeting, diagnostic) = dispatcher.run().await?;
//! ```
//!
//! ## Request Flow
//!
//! 1. The transport sends the request (exactly once, no retries)
//! 2. The response status selects a handler entry, or the fallback
//! 3. The entry's extractor reads the body (JSON or text by default)
//! 4. If the entry has a schema, the validator checks the body
//! 5. The body is decoded into the handler's payload type and the handler runs
//!
//! ## Error Handling
//!
//! - Transport failures become network failures carrying the request
//! - Extraction failures become body-decode failures carrying the response
//!   and, best effort, its raw text
//! - A body that fails validation does not stop the handler: [`Dispatcher::run`]
//!   returns the handler output together with the diagnostic, while
//!   [`Dispatcher::safe_run`] reports it as a validation failure
//! - Handler errors and panics become handler-execution failures
//! - Statuses without handler or fallback become unhandled-status failures
//!
//! ## Fallbacks
//!
//! A dispatcher holds at most one fallback. When both kinds are registered the
//! error fallback takes precedence whatever the order of the calls:
//! `on_unmatched_as_error` replaces any fallback, while `on_unmatched_as_value`
//! replaces only an earlier value fallback.
//!
//! ## Panics
//!
//! Handler, fallback, extractor and validator panics are caught. An extractor
//! panic is reported as a body-decode failure and a validator panic as a
//! validation failure whose single issue sits at `validator`.

mod core;

pub use core::{Dispatcher, RunOutput};
