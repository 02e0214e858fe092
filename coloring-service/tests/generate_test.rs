mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use common::{
    body_json, get, invoker_config, send, TestScript, ABSENT_CREDENTIAL, PRESENT_CREDENTIAL,
};
use serde_json::json;
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[tokio::test]
async fn no_query_string_is_rejected() {
    let script = TestScript::new("exit 0");
    let response = get(&script.invoker_config(), "/").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(
        body_json(response).await,
        json!({
            "status": "error",
            "message": "Missing 'idea' parameter. Usage: ?idea=dinosaur",
            "code": 400
        })
    );
}

#[tokio::test]
async fn empty_idea_is_rejected_without_running_script() {
    // Would fail the request with 200/return_code 9 if it ever ran.
    let script = TestScript::new("exit 9");

    for uri in ["/?idea=", "/?idea", "/?other=value", "/anything?idea="] {
        let response = get(&script.invoker_config(), uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "uri: {}", uri);

        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["code"], 400);
    }
}

#[tokio::test]
async fn successful_generation_matches_documented_body() {
    let script = TestScript::new("exit 0");
    let response = get(&script.invoker_config(), "/?idea=dinosaur").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(
        body_json(response).await,
        json!({
            "status": "success",
            "idea": "dinosaur",
            "message": "Coloring page for 'dinosaur' has been generated and sent to printer!",
            "error": "",
            "return_code": 0
        })
    );
}

#[tokio::test]
async fn idea_is_echoed_after_url_decoding() {
    let script = TestScript::new("exit 0");
    let response = get(
        &script.invoker_config(),
        "/?idea=princess%20castle%20%26%20%22dragons%22",
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["idea"], "princess castle & \"dragons\"");
    assert_eq!(
        body["message"],
        "Coloring page for 'princess castle & \"dragons\"' has been generated and sent to printer!"
    );
}

#[tokio::test]
async fn path_is_ignored() {
    let script = TestScript::new("exit 0");

    for uri in ["/print?idea=cat", "/a/b/c?idea=cat", "/index.html?idea=cat"] {
        let response = get(&script.invoker_config(), uri).await;
        assert_eq!(response.status(), StatusCode::OK, "uri: {}", uri);

        let body = body_json(response).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["idea"], "cat");
    }
}

#[tokio::test]
async fn first_idea_value_is_used() {
    let script = TestScript::new("exit 0");
    let response = get(&script.invoker_config(), "/?idea=cat&idea=dog").await;

    assert_eq!(body_json(response).await["idea"], "cat");
}

#[tokio::test]
async fn script_failure_is_reported_inside_a_200() {
    let script = TestScript::new("echo 'printer offline' >&2\nexit 4");
    let response = get(&script.invoker_config(), "/?idea=fire%20truck").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({
            "status": "success",
            "idea": "fire truck",
            "message": "Script executed but returned error code 4",
            "error": "printer offline",
            "return_code": 4
        })
    );
}

#[tokio::test]
async fn missing_credential_is_reported() {
    let script = TestScript::new("exit 0");
    let config = invoker_config(script.path.clone(), ABSENT_CREDENTIAL, 30);
    let response = get(&config, "/?idea=robot").await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["return_code"], 1);
    assert_eq!(body["message"], "");
    assert!(body["error"].as_str().unwrap().contains(ABSENT_CREDENTIAL));
}

#[tokio::test]
async fn missing_script_is_reported() {
    let config = invoker_config(
        PathBuf::from("/definitely/not/here/coloring_script.sh"),
        PRESENT_CREDENTIAL,
        30,
    );
    let response = get(&config, "/?idea=robot").await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["return_code"], 1);
    assert_eq!(
        body["error"],
        "Coloring script not found at /definitely/not/here/coloring_script.sh. Please update the script_path in the server."
    );
}

#[tokio::test]
async fn credential_is_checked_before_script_path() {
    let config = invoker_config(
        PathBuf::from("/definitely/not/here/coloring_script.sh"),
        ABSENT_CREDENTIAL,
        30,
    );
    let body = body_json(get(&config, "/?idea=robot").await).await;

    assert_eq!(
        body["error"],
        format!("{} environment variable is not set", ABSENT_CREDENTIAL)
    );
}

#[tokio::test]
async fn slow_script_still_gets_a_response() {
    let script = TestScript::new("sleep 30");
    let config = invoker_config(script.path.clone(), PRESENT_CREDENTIAL, 1);

    let start = Instant::now();
    let response = get(&config, "/?idea=snail").await;

    assert!(start.elapsed() < Duration::from_secs(10));
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["return_code"], 1);
    assert_eq!(body["message"], "");
    assert_eq!(body["error"], "Script execution timed out (1 seconds)");
}

#[tokio::test]
async fn other_methods_are_not_allowed() {
    let script = TestScript::new("exit 0");

    for method in [Method::POST, Method::PUT, Method::DELETE] {
        let response = send(
            &script.invoker_config(),
            Request::builder()
                .method(method.clone())
                .uri("/?idea=dinosaur")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(response.headers()[header::ALLOW], "GET");
        assert_eq!(
            body_json(response).await,
            json!({
                "status": "error",
                "message": format!("Method {} not allowed. Usage: GET ?idea=dinosaur", method),
                "code": 405
            })
        );
    }
}

#[tokio::test]
async fn head_request_does_not_run_script() {
    let script = TestScript::new(r#"touch "$(dirname "$0")/ran""#);
    let marker = script.dir.path().join("ran");

    for uri in ["/?idea=dinosaur", "/print?idea=dinosaur"] {
        let response = send(
            &script.invoker_config(),
            Request::builder()
                .method(Method::HEAD)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "uri: {}", uri);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    assert!(!marker.exists(), "script ran for a HEAD request");

    // The same script does run for GET, so the marker check above is meaningful.
    let response = get(&script.invoker_config(), "/?idea=dinosaur").await;
    assert_eq!(body_json(response).await["return_code"], 0);
    assert!(marker.exists());
}

#[tokio::test]
async fn response_carries_request_id() {
    let script = TestScript::new("exit 0");
    let response = send(
        &script.invoker_config(),
        Request::builder()
            .uri("/?idea=cat")
            .header("x-request-id", "req-42")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.headers()["x-request-id"], "req-42");
}

#[tokio::test]
async fn concurrent_requests_are_isolated() {
    let script = TestScript::new(r#"sleep 0.2; [ "$1" = "odd" ] && exit 5; exit 0"#);
    let config = script.invoker_config();

    let (even, odd) = tokio::join!(
        get(&config, "/?idea=even"),
        get(&config, "/?idea=odd"),
    );

    let even = body_json(even).await;
    let odd = body_json(odd).await;
    assert_eq!(even["idea"], "even");
    assert_eq!(even["return_code"], 0);
    assert_eq!(odd["idea"], "odd");
    assert_eq!(odd["return_code"], 5);
}
