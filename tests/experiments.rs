//! Experiment evaluation tests using a wiremock mock server.

use laikatest::{
    Client, Config, Error, EvaluateExperimentRequest, KeyValue, VariableMap,
};
use serde_json::json;
use wiremock::matchers::{any, body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Helper to create a client pointing at the mock server.
fn client_for_server(server: &MockServer) -> Client {
    Client::new(Config {
        api_key: Some("lk_test_key".into()),
        base_url: Some(server.uri()),
        ..Default::default()
    })
    .expect("client creation should succeed")
}

fn evaluation_body(content: &str, kind: &str) -> serde_json::Value {
    json!({
        "success": true,
        "data": {
            "experimentId": "exp-123",
            "bucketId": "bucket-456",
            "prompt": {
                "content": content,
                "type": kind,
                "promptVersionId": "pv-789",
                "promptId": "prompt-abc"
            }
        }
    })
}

#[tokio::test]
async fn evaluate_merges_context_and_compiles_content() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v3/experiments/evaluate"))
        .and(header("Authorization", "Bearer lk_test_key"))
        .and(body_json(json!({
            "experimentTitle": "onboarding",
            "context": { "userId": "u-1", "sessionId": "s-1", "plan": "pro" }
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(evaluation_body("[{\"content\":\"Hey {{name}}\"}]", "text")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for_server(&server);
    let payload = client
        .experiments()
        .evaluate(EvaluateExperimentRequest {
            experiment_title: "onboarding".into(),
            user_id: "u-1".into(),
            session_id: "s-1".into(),
            additional_context: vec![KeyValue::new("plan", "pro")],
            variables: VariableMap::from_iter([("name", "Ada")]),
        })
        .await
        .expect("request should succeed");

    assert_eq!(payload.content, json!("Hey Ada"));
    assert_eq!(payload.kind, "text");
    assert_eq!(payload.experiment_id, "exp-123");
    assert_eq!(payload.bucket_id, "bucket-456");
    assert_eq!(payload.prompt_version_id, "pv-789");
    assert_eq!(payload.prompt_id, "prompt-abc");
}

#[tokio::test]
async fn evaluate_skips_empty_identifiers_and_lets_pairs_override() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v3/experiments/evaluate"))
        .and(body_json(json!({
            "experimentTitle": "onboarding",
            "context": { "sessionId": "s-1", "plan": "free" }
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(evaluation_body("[{\"content\":\"Hi\"}]", "text")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for_server(&server);
    client
        .experiments()
        .evaluate(EvaluateExperimentRequest {
            experiment_title: "onboarding".into(),
            user_id: String::new(),
            session_id: "s-1".into(),
            additional_context: vec![
                KeyValue::new("plan", "pro"),
                KeyValue::new("", "dropped"),
                KeyValue::new("plan", "free"),
            ],
            ..Default::default()
        })
        .await
        .expect("request should succeed");
}

#[tokio::test]
async fn evaluate_passes_non_text_variants_through() {
    let server = MockServer::start().await;

    let chat = json!([{ "role": "system", "content": "v2 variant" }]);
    Mock::given(method("POST"))
        .and(path("/api/v3/experiments/evaluate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(evaluation_body(
            &serde_json::to_string(&chat).unwrap(),
            "chat",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for_server(&server);
    let payload = client
        .experiments()
        .evaluate(EvaluateExperimentRequest {
            experiment_title: "onboarding".into(),
            user_id: "u-1".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(payload.content, chat);
    assert_eq!(payload.kind, "chat");
}

#[tokio::test]
async fn evaluate_keeps_base_url_subpath() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sub/api/v3/experiments/evaluate"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(evaluation_body("[{\"content\":\"Hi\"}]", "text")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::new(Config {
        api_key: Some("lk_test_key".into()),
        base_url: Some(format!("{}/sub", server.uri())),
        ..Default::default()
    })
    .unwrap();
    client
        .experiments()
        .evaluate(EvaluateExperimentRequest {
            experiment_title: "onboarding".into(),
            user_id: "u-1".into(),
            ..Default::default()
        })
        .await
        .expect("request should succeed");
}

#[tokio::test]
async fn evaluate_surfaces_failure_envelope() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v3/experiments/evaluate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "error": "experiment is not running"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for_server(&server);
    let err = client
        .experiments()
        .evaluate(EvaluateExperimentRequest {
            experiment_title: "onboarding".into(),
            user_id: "u-1".into(),
            ..Default::default()
        })
        .await
        .unwrap_err();

    match err {
        Error::Api(api) => assert_eq!(api.message, "experiment is not running"),
        other => panic!("expected api error, got {other:?}"),
    }
}

#[tokio::test]
async fn evaluate_treats_missing_payload_as_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v3/experiments/evaluate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for_server(&server);
    let err = client
        .experiments()
        .evaluate(EvaluateExperimentRequest {
            experiment_title: "onboarding".into(),
            user_id: "u-1".into(),
            ..Default::default()
        })
        .await
        .unwrap_err();

    match err {
        Error::Api(api) => assert_eq!(api.message, "API error"),
        other => panic!("expected api error, got {other:?}"),
    }
}

#[tokio::test]
async fn evaluate_rejects_empty_title_without_calling_out() {
    let server = MockServer::start().await;

    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for_server(&server);
    let err = client
        .experiments()
        .evaluate(EvaluateExperimentRequest::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Validation(_)));
}
