//! # Transport Module
//!
//! The transport is the only part of a dispatch that talks to the network. The
//! dispatcher hands it one [`HttpRequest`] and expects one fully buffered
//! [`HttpResponse`] back; everything after that is local work.
//!
//! ## Pluggable Backends
//!
//! Any type implementing [`Transport`] can be injected into a dispatcher. Two
//! implementations ship with the crate:
//!
//! - [`ReqwestTransport`] - the default, backed by a shared `reqwest::Client`
//! - [`FnTransport`] - wraps an async closure, convenient for tests and adapters
//!
//! ```rust,ignore
//! use typed_dispatch::transport::{transport_fn, HttpResponse};
//!
//! let transport = transport_fn(|_req| async move {
//!     Ok(HttpResponse::json(200, &serde_json::json!({"name": "Ann"}))?)
//! });
//! ```
//!
//! ## Failure Model
//!
//! A transport reports failures (connection refused, DNS, timeouts) as an
//! `anyhow::Error`. The dispatcher wraps it in a network failure together with
//! the request that was being sent. Retries, redirects and cancellation are the
//! transport's business; the dispatcher never re-sends a request.

mod core;
mod http_client;

pub use core::{transport_fn, BoxFuture, FnTransport, HttpRequest, HttpResponse, Transport};
pub use http_client::ReqwestTransport;
