mod common;

use std::{net::TcpListener, sync::Arc};

use common::{ml_classifier, test_taxonomy, PipelineBuilder, StubBehaviour, StubFetcher, StubModel};
use sector::{domain::content::FetchStrategy, services::Pipeline, startup::run};
use serde_json::{json, Value};

fn spawn_app(pipeline: Pipeline) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let server = run(listener, Arc::new(pipeline)).expect("Failed to bind address");
    tokio::spawn(server);
    format!("http://127.0.0.1:{}", port)
}

fn keyword_only() -> Pipeline {
    PipelineBuilder::new(Arc::new(Arc::new(test_taxonomy()))).build()
}

#[tokio::test]
async fn health_returns_200() {
    let address = spawn_app(keyword_only());

    let response = reqwest::get(format!("{}/health", address)).await.unwrap();

    assert!(response.status().is_success());
}

#[tokio::test]
async fn classify_returns_result() {
    let address = spawn_app(keyword_only());

    let response = reqwest::Client::new()
        .post(format!("{}/classify", address))
        .json(&json!({
            "name": "Luigi's",
            "description": "Pizza and pasta kitchen with catering for parties."
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["industry"], "Restaurants");
    assert_eq!(body["used_ml"], false);
    assert!(body["confidence"].as_f64().unwrap() <= 1.0);
    assert!(body["codes"]
        .as_array()
        .unwrap()
        .iter()
        .any(|code| code["code"] == "5812"));
    assert_eq!(body["stages"].as_array().unwrap().last().unwrap(), "Done");
}

#[tokio::test]
async fn classify_rejects_invalid_input() {
    let address = spawn_app(keyword_only());
    let client = reqwest::Client::new();

    for body in [
        json!({ "name": "  " }),
        json!({ "name": "Luigi's", "website_url": "ftp://luigis.example" }),
    ] {
        let response = client
            .post(format!("{}/classify", address))
            .json(&body)
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 400, "body: {}", body);
        let error: Value = response.json().await.unwrap();
        assert_eq!(error["retryable"], false);
    }
}

#[tokio::test]
async fn ml_circuit_not_found_without_ml() {
    let address = spawn_app(keyword_only());

    let response = reqwest::get(format!("{}/health/ml-circuit", address))
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn ml_circuit_reports_breaker_state() {
    let model = Arc::new(StubModel::answering("Restaurants", 0.8));
    let pipeline = PipelineBuilder::new(Arc::new(Arc::new(test_taxonomy())))
        .ml(ml_classifier(model, 3))
        .build();
    let address = spawn_app(pipeline);

    let response = reqwest::get(format!("{}/health/ml-circuit", address))
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    let snapshot: Value = response.json().await.unwrap();
    assert_eq!(snapshot["state"], "Closed");
    assert_eq!(snapshot["consecutive_failures"], 0);
}

#[tokio::test]
async fn overload_returns_503_with_retry_after() {
    let stuck = Arc::new(StubFetcher::new(
        FetchStrategy::PrimaryHttp,
        StubBehaviour::Pending,
    ));
    let pipeline = PipelineBuilder::new(Arc::new(Arc::new(test_taxonomy())))
        .fetcher(stuck.clone())
        .admission(1, 0)
        .build();
    let address = spawn_app(pipeline);
    let client = reqwest::Client::new();

    let busy = client
        .post(format!("{}/classify", address))
        .json(&json!({ "name": "Luigi's", "website_url": "https://stuck.example" }))
        .send();
    let first = tokio::spawn(busy);
    stuck.started.notified().await;

    let response = client
        .post(format!("{}/classify", address))
        .json(&json!({ "name": "Tony's" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 503);
    assert_eq!(
        response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok()),
        Some("1")
    );
    let error: Value = response.json().await.unwrap();
    assert_eq!(error["retryable"], true);
    first.abort();
}
