use std::time::Duration;

use tracing::debug;

use super::core::{BoxFuture, HttpRequest, HttpResponse, Transport};

/// Default [`Transport`] backed by `reqwest`.
///
/// Performs exactly one request per call and buffers the whole body. The
/// timeout of the request descriptor wins over the transport-wide default.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: ::reqwest::Client,
    default_timeout: Option<Duration>,
}

impl ReqwestTransport {
    pub fn new(client: ::reqwest::Client) -> Self {
        Self {
            client,
            default_timeout: None,
        }
    }

    /// Timeout applied to requests that carry none of their own.
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }
}

impl Transport for ReqwestTransport {
    fn send<'a>(
        &'a self,
        request: &'a HttpRequest,
    ) -> BoxFuture<'a, anyhow::Result<HttpResponse>> {
        Box::pin(async move {
            let mut builder = self
                .client
                .request(request.method.clone(), &request.url)
                .headers(request.headers.clone());
            if let Some(body) = &request.body {
                builder = builder.body(body.clone());
            }
            if let Some(timeout) = request.timeout.or(self.default_timeout) {
                builder = builder.timeout(timeout);
            }

            let response = builder.send().await?;
            let status = response.status().as_u16();
            let headers = response.headers().clone();
            let body = response.bytes().await?;
            debug!(
                method = %request.method,
                url = %request.url,
                status = status,
                body_len = body.len(),
                "Transport received response"
            );
            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        })
    }
}
