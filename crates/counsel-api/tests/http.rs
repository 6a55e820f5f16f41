use axum_test::TestServer;
use counsel_api::routes::build_router;
use counsel_api::state::AppState;
use counsel_core::{Orchestrator, ServiceContext};
use serde_json::{Value, json};

const LEASE: &str = "Clause 1. The tenant pays rent of 900 euros on the first day of every month. \
Clause 2. Late payment incurs a five percent penalty on the outstanding amount. \
Clause 3. The deposit equals three months of rent and is returned within sixty days.";

fn server_with(state: AppState) -> TestServer {
    TestServer::new(build_router(state)).unwrap()
}

fn offline_server() -> TestServer {
    server_with(AppState::new(Orchestrator::new(ServiceContext::offline()), 2))
}

async fn create_request(server: &TestServer, text: &str) -> String {
    let response = server
        .post("/requests")
        .json(&json!({
            "prompt": "Is this lease lawful?",
            "text": text,
            "document_uri": "uploads/lease.txt"
        }))
        .await;
    assert_eq!(response.status_code(), 201);
    let body: Value = response.json();
    body["request_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_reports_retrieval_mode_and_capacity() {
    let server = offline_server();

    let response = server.get("/health").await;

    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["retrieval_mode"], "memory");
    assert_eq!(body["capacity"]["max_turns"], 2);
}

#[tokio::test]
async fn conversation_round_trip() {
    let server = offline_server();
    let request_id = create_request(&server, LEASE).await;

    let pending: Value = server.get(&format!("/requests/{request_id}")).await.json();
    assert_eq!(pending["status"], "pending");

    let first = server
        .post(&format!("/requests/{request_id}/turns"))
        .json(&json!({ "query": "Is the deposit lawful?" }))
        .await;
    assert_eq!(first.status_code(), 200);
    let first: Value = first.json();
    assert_eq!(first["kind"]["type"], "first_analysis");
    assert!(first["answer"].as_str().unwrap().contains("Executive Summary"));
    assert!(first.get("trace_path").is_none());

    let follow_up: Value = server
        .post(&format!("/requests/{request_id}/turns"))
        .json(&json!({ "query": "What is the late payment penalty?" }))
        .await
        .json();
    assert_eq!(follow_up["kind"]["type"], "follow_up");
    assert_eq!(follow_up["kind"]["first_follow_up"], true);
    assert_eq!(follow_up["trace"][0]["stage"], "retrieval");

    let stored: Value = server.get(&format!("/requests/{request_id}")).await.json();
    assert_eq!(stored["status"], "complete");
    assert_eq!(stored["chat_history"].as_array().unwrap().len(), 2);
    assert_eq!(stored["chat_history"][0]["role"], "user");
}

#[tokio::test]
async fn unknown_request_is_not_found() {
    let server = offline_server();

    let response = server.get("/requests/missing").await;
    assert_eq!(response.status_code(), 404);
    let body: Value = response.json();
    assert!(
        body["error"]
            .as_str()
            .unwrap()
            .starts_with("Error: Could not find the specified document")
    );

    let turn = server
        .post("/requests/missing/turns")
        .json(&json!({ "query": "Hello?" }))
        .await;
    assert_eq!(turn.status_code(), 404);
}

#[tokio::test]
async fn document_without_chunks_fails_the_first_turn() {
    let server = offline_server();
    let request_id = create_request(&server, "Too short.").await;

    let response = server
        .post(&format!("/requests/{request_id}/turns"))
        .json(&json!({ "query": "Summarise" }))
        .await;

    assert_eq!(response.status_code(), 422);
    let body: Value = response.json();
    assert_eq!(body["error"], "Could not find text chunks.");

    let stored: Value = server.get(&format!("/requests/{request_id}")).await.json();
    assert_eq!(stored["status"], "failed");
    assert_eq!(stored["error_message"], "Could not find text chunks.");
}

#[tokio::test]
async fn blank_prompt_is_rejected() {
    let server = offline_server();

    let response = server
        .post("/requests")
        .json(&json!({ "prompt": "  ", "text": LEASE }))
        .await;

    assert_eq!(response.status_code(), 422);
}

#[tokio::test]
async fn turn_traces_are_persisted_when_configured() {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::new(Orchestrator::new(ServiceContext::offline()), 1)
        .with_trace_dir(dir.path());
    let server = server_with(state);
    let request_id = create_request(&server, LEASE).await;

    let body: Value = server
        .post(&format!("/requests/{request_id}/turns"))
        .json(&json!({ "query": "Summarise" }))
        .await
        .json();

    let path = body["trace_path"].as_str().unwrap();
    assert!(std::path::Path::new(path).starts_with(dir.path()));
    let written: Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(written["request_id"], request_id.as_str());
    assert_eq!(written["events"].as_array().unwrap().len(), 5);
}
