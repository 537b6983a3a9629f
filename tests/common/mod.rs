#![allow(dead_code)]

pub mod transports {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use typed_dispatch::transport::{transport_fn, HttpRequest, HttpResponse, Transport};

    /// Transport that answers every request with a clone of `response`.
    ///
    /// The returned counter tracks how many requests were sent.
    pub fn fixed(response: HttpResponse) -> (impl Transport, Arc<AtomicUsize>) {
        let sent = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&sent);
        let transport = transport_fn(move |_req: HttpRequest| {
            counter.fetch_add(1, Ordering::SeqCst);
            let response = response.clone();
            async move { Ok::<_, anyhow::Error>(response) }
        });
        (transport, sent)
    }

    /// Transport whose every send fails with `message`.
    pub fn failing(message: &'static str) -> impl Transport {
        transport_fn(move |_req: HttpRequest| async move {
            Err::<HttpResponse, _>(anyhow::anyhow!(message))
        })
    }

    pub fn sent(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

pub mod fixtures {
    use serde::Deserialize;
    use serde_json::{json, Value};

    #[derive(Debug, Deserialize)]
    pub struct Person {
        pub name: String,
        #[serde(default)]
        pub age: Option<Value>,
    }

    pub fn person_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "age": {"type": "number"}
            },
            "required": ["name", "age"]
        })
    }

    pub fn greet(p: Person) -> anyhow::Result<String> {
        Ok(format!("Hello, {}", p.name))
    }
}
