#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

//! End-to-end dispatch tests driven through in-memory transports.
//!
//! Each test builds a dispatcher, injects a transport that returns a canned
//! response (or fails), runs it and checks the outcome.

mod common;

use common::fixtures::{greet, person_schema, Person};
use common::transports::{failing, fixed, sent};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use typed_dispatch::extract::Extract;
use typed_dispatch::registry::Registration;
use typed_dispatch::runtime_config::DispatchConfig;
use typed_dispatch::validator::{schema_fn, Diagnostic, FnValidator, Issue};
use typed_dispatch::{DispatchError, Dispatcher, ErrorKind, HandlerId, HttpRequest, HttpResponse};

fn request() -> HttpRequest {
    HttpRequest::get("http://api.test/people/1")
}

fn greeter() -> Dispatcher<String> {
    Dispatcher::<String>::new(request()).register_validated(200, person_schema(), greet)
}

#[tokio::test]
async fn test_valid_body_runs_handler_without_diagnostic() {
    let (transport, count) = fixed(HttpResponse::json(200, &json!({"name": "Ann", "age": 30})).unwrap());
    let dispatcher = greeter().with_transport(transport);

    let (greeting, diagnostic) = dispatcher.run().await.unwrap();
    assert_eq!(greeting, "Hello, Ann");
    assert!(diagnostic.is_none());
    assert_eq!(sent(&count), 1, "request must be sent exactly once");
}

#[tokio::test]
async fn test_invalid_body_still_runs_handler_and_reports_diagnostic() {
    let body = json!({"name": "Ann", "age": "x"});
    let (transport, _) = fixed(HttpResponse::json(200, &body).unwrap());
    let dispatcher = greeter().with_transport(transport);

    let (greeting, diagnostic) = dispatcher.run().await.unwrap();
    assert_eq!(greeting, "Hello, Ann");
    let diagnostic = diagnostic.expect("invalid age should produce a diagnostic");
    assert_eq!(diagnostic.received, body);
    assert!(!diagnostic.issues.is_empty());
    assert_eq!(diagnostic.schema, Some(person_schema()));
}

#[tokio::test]
async fn test_safe_run_turns_diagnostic_into_validation_failure() {
    let (transport, count) = fixed(HttpResponse::json(200, &json!({"name": "Ann", "age": "x"})).unwrap());
    let dispatcher = greeter().with_transport(transport);

    let err = dispatcher.safe_run().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.diagnostic().is_some());
    assert_eq!(sent(&count), 1);
}

#[tokio::test]
async fn test_invalid_body_the_handler_cannot_take_is_a_validation_failure() {
    // name is required by Person, so decoding the raw body fails too
    let (transport, _) = fixed(HttpResponse::json(200, &json!({"age": 30})).unwrap());
    let dispatcher = greeter().with_transport(transport);

    match dispatcher.run().await {
        Err(DispatchError::Validation(diagnostic)) => {
            assert_eq!(diagnostic.received, json!({"age": 30}));
        }
        other => panic!("expected validation failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unregistered_status_without_fallback_is_unhandled() {
    let (transport, _) = fixed(HttpResponse::json(404, &json!({"error": "missing"})).unwrap());
    let dispatcher = greeter().with_transport(transport);

    let err = dispatcher.run().await.unwrap_err();
    assert!(matches!(err, DispatchError::UnhandledStatus { status: 404 }));
    assert_eq!(err.status(), Some(404));
}

#[tokio::test]
async fn test_transport_failure_is_network_error_in_both_modes() {
    let dispatcher = greeter().with_transport(failing("connection refused"));

    for result in [
        dispatcher.run().await.map(|(out, _)| out),
        dispatcher.safe_run().await,
    ] {
        match result {
            Err(DispatchError::Network { request, source }) => {
                assert_eq!(request.url, "http://api.test/people/1");
                assert!(source.to_string().contains("connection refused"));
            }
            other => panic!("expected network failure, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_handler_error_is_handler_execution_with_input() {
    let body = json!({"name": "Ann", "age": 30});
    let (transport, _) = fixed(HttpResponse::json(200, &body).unwrap());
    let dispatcher = Dispatcher::<String>::new(request())
        .register(200, |_: Value| -> anyhow::Result<String> {
            Err(anyhow::anyhow!("handler refused"))
        })
        .with_transport(transport);

    match dispatcher.run().await {
        Err(DispatchError::HandlerExecution {
            input,
            handler,
            source,
        }) => {
            assert_eq!(input, body);
            assert_eq!(handler, HandlerId::Status(200));
            assert_eq!(source.to_string(), "handler refused");
        }
        other => panic!("expected handler failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_handler_panic_is_caught() {
    let (transport, _) = fixed(HttpResponse::json(200, &json!({"name": "Ann", "age": 30})).unwrap());
    let dispatcher = Dispatcher::<String>::new(request())
        .register(200, |_: Person| -> anyhow::Result<String> { panic!("boom") })
        .with_transport(transport);

    let err = dispatcher.safe_run().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::HandlerExecution);
    assert!(err.to_string().contains("boom"));
}

#[derive(Debug, Error)]
#[error("upstream answered {0}")]
struct UpstreamError(u16);

#[tokio::test]
async fn test_error_fallback_produces_unmatched_failure() {
    let (transport, _) = fixed(HttpResponse::text(503, "maintenance"));
    let dispatcher = greeter()
        .on_unmatched_as_error(|resp| UpstreamError(resp.status).into())
        .with_transport(transport);

    match dispatcher.run().await {
        Err(DispatchError::Unmatched { status, source }) => {
            assert_eq!(status, 503);
            let upstream = source.downcast_ref::<UpstreamError>().unwrap();
            assert_eq!(upstream.0, 503);
        }
        other => panic!("expected unmatched failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_value_fallback_produces_success() {
    let (transport, _) = fixed(HttpResponse::text(418, "teapot"));
    let dispatcher = greeter()
        .on_unmatched_as_value(|| "Hello, stranger".to_string())
        .with_transport(transport);

    let (greeting, diagnostic) = dispatcher.run().await.unwrap();
    assert_eq!(greeting, "Hello, stranger");
    assert!(diagnostic.is_none());
}

#[tokio::test]
async fn test_error_fallback_takes_precedence() {
    let (transport, _) = fixed(HttpResponse::new(500));
    let value_then_error = greeter()
        .on_unmatched_as_value(|| "fallback".to_string())
        .on_unmatched_as_error(|_| anyhow::anyhow!("server error"))
        .with_transport(transport);
    let err = value_then_error.run().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unmatched);

    let (transport, _) = fixed(HttpResponse::new(500));
    let error_then_value = greeter()
        .on_unmatched_as_error(|_| anyhow::anyhow!("server error"))
        .on_unmatched_as_value(|| "fallback".to_string())
        .with_transport(transport);
    let err = error_then_value.safe_run().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unmatched);
    assert!(err.to_string().contains("server error"));
}

#[tokio::test]
async fn test_later_value_fallback_replaces_earlier_one() {
    let (transport, _) = fixed(HttpResponse::new(500));
    let dispatcher = greeter()
        .on_unmatched_as_value(|| "first".to_string())
        .on_unmatched_as_value(|| "second".to_string())
        .with_transport(transport);
    assert_eq!(dispatcher.safe_run().await.unwrap(), "second");
}

#[tokio::test]
async fn test_extractor_panic_is_body_decode() {
    let (transport, _) = fixed(HttpResponse::text(200, "Ann"));
    let dispatcher = Dispatcher::<String>::new(request())
        .register_with(
            200,
            Registration::new().extractor(Extract::custom(|_| panic!("extractor boom"))),
            greet,
        )
        .with_transport(transport);

    for result in [
        dispatcher.run().await.map(|(out, _)| out),
        dispatcher.safe_run().await,
    ] {
        match result {
            Err(DispatchError::BodyDecode {
                raw_text, source, ..
            }) => {
                assert_eq!(raw_text.as_deref(), Some("Ann"));
                assert!(source.to_string().contains("extractor boom"));
            }
            other => panic!("expected body decode failure, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_validator_panic_is_validation_failure() {
    let exploding = schema_fn(|_: &Value| panic!("validator boom"));
    let body = json!(8);
    let (transport, _) = fixed(HttpResponse::json(200, &body).unwrap());
    let dispatcher = Dispatcher::<i64, FnValidator>::with_validator(request(), FnValidator)
        .register_validated(200, exploding, |n: i64| Ok(n))
        .with_transport(transport);

    let err = dispatcher.safe_run().await.unwrap_err();
    let diagnostic = err.diagnostic().expect("validator panic should yield a diagnostic");
    assert_eq!(diagnostic.received, body);
    assert_eq!(diagnostic.issues[0].path.as_deref(), Some("validator"));
    assert!(diagnostic.issues[0].message.contains("validator boom"));

    // run reports it as a failure too: there is no verdict to pair with an output
    assert_eq!(dispatcher.run().await.unwrap_err().kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_registered_status_takes_precedence_over_fallback() {
    let (transport, _) = fixed(HttpResponse::json(200, &json!({"name": "Bo", "age": 5})).unwrap());
    let dispatcher = greeter()
        .on_unmatched_as_value(|| "fallback".to_string())
        .with_transport(transport);
    assert_eq!(dispatcher.safe_run().await.unwrap(), "Hello, Bo");
}

#[tokio::test]
async fn test_malformed_json_is_body_decode_with_raw_text() {
    let response = HttpResponse::new(200)
        .header("content-type", "application/json")
        .with_body("{not json");
    let (transport, _) = fixed(response);
    let dispatcher = greeter().with_transport(transport);

    match dispatcher.run().await {
        Err(DispatchError::BodyDecode {
            response, raw_text, ..
        }) => {
            assert_eq!(response.status, 200);
            assert_eq!(raw_text.as_deref(), Some("{not json"));
        }
        other => panic!("expected body decode failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_raw_text_respects_configured_limit() {
    let response = HttpResponse::new(200)
        .header("content-type", "application/json")
        .with_body("{not json at all");
    let (transport, _) = fixed(response);
    let config = DispatchConfig {
        raw_text_limit: 4,
        ..DispatchConfig::default()
    };
    let dispatcher = greeter().with_config(config).with_transport(transport);

    match dispatcher.run().await {
        Err(DispatchError::BodyDecode { raw_text, .. }) => {
            assert_eq!(raw_text.as_deref(), Some("{not"));
        }
        other => panic!("expected body decode failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unvalidated_payload_mismatch_is_body_decode() {
    let (transport, _) = fixed(HttpResponse::json(200, &json!([1, 2, 3])).unwrap());
    let dispatcher = Dispatcher::<String>::new(request())
        .register(200, greet)
        .with_transport(transport);

    let err = dispatcher.run().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BodyDecode);
    assert_eq!(err.status(), Some(200));
}

#[tokio::test]
async fn test_text_bodies_are_extracted_as_strings() {
    let (transport, _) = fixed(HttpResponse::text(404, "no such person"));
    let dispatcher = greeter()
        .register(404, |text: String| Ok(format!("missing: {text}")))
        .with_transport(transport);

    assert_eq!(dispatcher.safe_run().await.unwrap(), "missing: no such person");
}

#[tokio::test]
async fn test_explicit_extractors() {
    // JSON body served without a content type
    let (transport, _) = fixed(HttpResponse::new(200).with_body(r#"{"name":"Cy","age":1}"#));
    let dispatcher = Dispatcher::<String>::new(request())
        .register_with(200, Registration::new().extractor(Extract::Json), greet)
        .with_transport(transport);
    assert_eq!(dispatcher.safe_run().await.unwrap(), "Hello, Cy");

    let (transport, _) = fixed(HttpResponse::new(200).with_body("Dee"));
    let dispatcher = Dispatcher::<String>::new(request())
        .register_with(
            200,
            Registration::new().extractor(Extract::custom(|resp| {
                Ok(json!({"name": resp.text_lossy(), "age": 0}))
            })),
            greet,
        )
        .with_transport(transport);
    assert_eq!(dispatcher.safe_run().await.unwrap(), "Hello, Dee");
}

#[tokio::test]
async fn test_duplicate_registration_last_wins() {
    let (transport, _) = fixed(HttpResponse::json(200, &json!({"name": "Ann", "age": 30})).unwrap());
    let dispatcher = greeter()
        .register(200, |p: Person| Ok(format!("Bye, {}", p.name)))
        .with_transport(transport);

    assert_eq!(dispatcher.safe_run().await.unwrap(), "Bye, Ann");
}

#[tokio::test]
async fn test_custom_validation_capability() {
    let even = schema_fn(|value: &Value| match value.as_i64() {
        Some(n) if n % 2 == 0 => Ok(json!(n / 2)),
        _ => Err(Diagnostic::new(value.clone(), vec![Issue::new("expected an even number")])),
    });

    let (transport, _) = fixed(HttpResponse::json(200, &json!(8)).unwrap());
    let dispatcher = Dispatcher::<i64, FnValidator>::with_validator(request(), FnValidator)
        .register_validated(200, Arc::clone(&even), |n: i64| Ok(n))
        .with_transport(transport);
    // Handler receives the value returned by the validator
    assert_eq!(dispatcher.run().await.unwrap(), (4, None));

    let (transport, _) = fixed(HttpResponse::json(200, &json!(7)).unwrap());
    let dispatcher = Dispatcher::<i64, FnValidator>::with_validator(request(), FnValidator)
        .register_validated(200, even, |n: i64| Ok(n))
        .with_transport(transport);
    let (n, diagnostic) = dispatcher.run().await.unwrap();
    assert_eq!(n, 7);
    assert_eq!(diagnostic.unwrap().issues[0].message, "expected an even number");
}

#[tokio::test]
async fn test_dispatcher_can_run_repeatedly() {
    let (transport, count) = fixed(HttpResponse::json(200, &json!({"name": "Ann", "age": 30})).unwrap());
    let dispatcher = greeter().with_transport(transport);

    for _ in 0..3 {
        assert_eq!(dispatcher.safe_run().await.unwrap(), "Hello, Ann");
    }
    assert_eq!(sent(&count), 3);
}
