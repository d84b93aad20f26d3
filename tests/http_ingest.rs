use mockito::{Matcher, Server};
use serde_json::json;
use signalfx_azure_function::{
    BoxError, Builder, Context, Datapoint, Error, HttpIngest, Ingest, IngestSession, Invocation,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn function_env() -> HashMap<String, String> {
    [
        ("WEBSITE_SITE_NAME", "FunctionWebSiteName"),
        ("Location", "West Europe"),
        ("WEBSITE_RESOURCE_GROUP", "TheResourceGroup"),
        ("WEBSITE_OWNER_NAME", "subscription-id+anotherstring"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn metric(name: &str) -> Matcher {
    Matcher::Regex(format!(r#""metric":"{}""#, regex_escape(name)))
}

fn regex_escape(name: &str) -> String {
    name.replace('.', r"\.")
}

#[test]
fn session_posts_json_batches() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/v2/datapoint")
        .match_header("x-sf-token", "SFXTOKEN")
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(json!({
            "counter": [{
                "metric": "azure.function.invocations",
                "value": 1,
                "dimensions": {"azure_function_name": "TestFunction"}
            }]
        })))
        .with_status(200)
        .expect(1)
        .create();

    let mut session = HttpIngest
        .open(&server.url(), "SFXTOKEN", Duration::from_secs(1))
        .unwrap();
    session
        .send(
            &[Datapoint::new("azure.function.invocations", 1).with_dimension("azure_function_name", "TestFunction")],
            &[],
        )
        .unwrap();

    session.stop().unwrap();
    // A second stop must not deliver anything again
    session.stop().unwrap();

    mock.assert();
}

#[test]
fn rejected_batches_fail_the_stop() {
    let mut server = Server::new();
    let mock = server.mock("POST", "/v2/datapoint").with_status(401).expect(1).create();

    let mut session = HttpIngest
        .open(&server.url(), "BADTOKEN", Duration::from_secs(1))
        .unwrap();
    session.send(&[], &[Datapoint::new("azure.function.duration", 3.5)]).unwrap();

    let err = session.stop().unwrap_err();
    assert!(matches!(err, Error::Rejected(status) if status == http::StatusCode::UNAUTHORIZED));
    mock.assert();
}

#[test]
fn instrumented_handler_over_http() {
    let mut server = Server::new();
    let invocations = server
        .mock("POST", "/v2/datapoint")
        .match_header("x-sf-token", "SFXTOKEN")
        .match_body(metric("azure.function.invocations"))
        .with_status(200)
        .expect(1)
        .create();
    let duration = server
        .mock("POST", "/v2/datapoint")
        .match_body(Matcher::AllOf(vec![
            metric("azure.function.duration"),
            Matcher::Regex(r#""azure_region":"westeurope""#.into()),
            Matcher::Regex(r#""subscription_id":"subscription-id""#.into()),
        ]))
        .with_status(200)
        .expect(1)
        .create();
    let errors = server
        .mock("POST", "/v2/datapoint")
        .match_body(metric("azure.function.errors"))
        .with_status(200)
        .expect(0)
        .create();

    let instrumentation = Builder::new()
        .access_token("SFXTOKEN")
        .ingest_endpoint(server.url())
        .environment(function_env())
        .init()
        .unwrap();

    let response = instrumentation
        .call(
            |invocation: Invocation<&str>| Ok::<_, BoxError>(format!("processed {}", invocation.payload)),
            Invocation::new("blabla", Context::new("TestFunction")),
        )
        .unwrap();

    assert_eq!(response, "processed blabla");
    invocations.assert();
    duration.assert();
    errors.assert();
}

#[test]
fn failed_handler_over_http() {
    let mut server = Server::new();
    server
        .mock("POST", "/v2/datapoint")
        .match_body(metric("azure.function.invocations"))
        .with_status(200)
        .expect(1)
        .create();
    let outcome = server
        .mock("POST", "/v2/datapoint")
        .match_body(Matcher::AllOf(vec![metric("azure.function.errors"), metric("azure.function.duration")]))
        .with_status(200)
        .expect(1)
        .create();

    let instrumentation = Builder::new()
        .access_token("SFXTOKEN")
        .ingest_endpoint(server.url())
        .environment(function_env())
        .init()
        .unwrap();

    let err = instrumentation
        .call(
            |_: Invocation<()>| Err::<(), BoxError>("upstream timed out".into()),
            Invocation::new((), Context::new("TestFunction")),
        )
        .unwrap_err();

    assert_eq!(err.to_string(), "upstream timed out");
    outcome.assert();
}

#[test]
fn ingest_outage_keeps_handler_result() {
    let mut server = Server::new();
    let rejected = server
        .mock("POST", "/v2/datapoint")
        .with_status(503)
        .expect(2)
        .create();

    let instrumentation = Builder::new()
        .access_token("SFXTOKEN")
        .ingest_endpoint(server.url())
        .environment(function_env())
        .init()
        .unwrap();
    let orders = AtomicUsize::new(0);

    let response = instrumentation
        .call(
            |_: Invocation<()>| {
                orders.fetch_add(1, Ordering::Relaxed);
                Ok::<_, BoxError>("order placed")
            },
            Invocation::new((), Context::new("TestFunction")),
        )
        .unwrap();

    assert_eq!(response, "order placed");
    assert_eq!(orders.load(Ordering::Relaxed), 1);
    rejected.assert();
}
