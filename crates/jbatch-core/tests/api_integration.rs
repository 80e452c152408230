//! Integration test: curl transport against a local scripted HTTP server.
//!
//! Drives the executor, batcher and processor end to end, including a
//! processor restart against an on-disk checkpoint store.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::api_server::{ApiServer, Reply};
use jbatch_core::batcher::RequestBatcher;
use jbatch_core::cache::TtlCache;
use jbatch_core::checkpoint::CheckpointStore;
use jbatch_core::control::AbortToken;
use jbatch_core::executor::Executor;
use jbatch_core::ops;
use jbatch_core::processor::{BatchProcessor, ProcessOptions};
use jbatch_core::request::{RequestDescriptor, RequestOutcome};
use jbatch_core::retry::{ErrorKind, RetryPolicy};
use jbatch_core::transport::{Credentials, CurlTransport};
use tempfile::tempdir;

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay_ms: 5,
        max_delay_ms: 20,
        ..RetryPolicy::default()
    }
}

fn executor(server: &ApiServer) -> Executor {
    let transport = CurlTransport::new(Some(Credentials {
        email: "bot@example.com".to_string(),
        api_token: "secret".to_string(),
    }))
    .with_connect_timeout(Duration::from_secs(2));
    Executor::new(Arc::new(transport), &server.base_url, fast_policy())
        .unwrap()
        .with_timeout(Duration::from_secs(5))
}

#[tokio::test]
async fn executor_retries_over_real_http() {
    let server = ApiServer::start();
    server.script(
        "/rest/api/3/issue/TEST-1",
        vec![
            Reply::json(503, ""),
            Reply::json(200, r#"{"key":"TEST-1","fields":{"summary":"Test Issue"}}"#),
        ],
    );
    let exec = executor(&server);

    let outcome = exec
        .execute(&ops::get_issue("TEST-1", &["summary".to_string()]))
        .await
        .unwrap();
    match outcome {
        RequestOutcome::Success {
            status,
            body,
            attempts,
            ..
        } => {
            assert_eq!(status, 200);
            assert_eq!(attempts, 2);
            assert_eq!(body["fields"]["summary"], "Test Issue");
        }
        other => panic!("expected success, got {:?}", other),
    }

    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].target, "/rest/api/3/issue/TEST-1?fields=summary");
    // base64("bot@example.com:secret")
    assert_eq!(
        requests[0].authorization.as_deref(),
        Some("Basic Ym90QGV4YW1wbGUuY29tOnNlY3JldA==")
    );
}

#[tokio::test]
async fn bodies_keep_the_request_method() {
    let server = ApiServer::start();
    let exec = executor(&server);

    let search = RequestDescriptor::get("/rest/api/3/search/jql").json(serde_json::json!({"jql": "project = TEST"}));
    assert!(exec.execute(&search).await.unwrap().is_success());
    let remove = RequestDescriptor::delete("/rest/api/3/issue/TEST-1/watchers")
        .json(serde_json::json!({"accountId": "abc"}));
    assert!(exec.execute(&remove).await.unwrap().is_success());

    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].body, r#"{"jql":"project = TEST"}"#);
    assert_eq!(requests[1].method, "DELETE");
    assert_eq!(requests[1].body, r#"{"accountId":"abc"}"#);
}

#[tokio::test]
async fn error_bodies_become_failure_messages() {
    let server = ApiServer::start();
    server.script(
        "/rest/api/3/issue/TEST-2/transitions",
        vec![Reply::json(
            400,
            r#"{"errorMessages":[],"errors":{"resolution":"Resolution is required."}}"#,
        )],
    );
    server.script(
        "/rest/api/3/issue/TEST-3",
        vec![Reply::json(429, r#"{"message":"Rate limit exceeded"}"#).header("Retry-After", "0")],
    );
    let exec = executor(&server);

    let transition = exec
        .execute(&ops::transition_issue("TEST-2", "31", None))
        .await
        .unwrap();
    assert_eq!(
        transition,
        RequestOutcome::Failure {
            kind: ErrorKind::Validation,
            message: "resolution: Resolution is required.".to_string(),
            status: Some(400),
            attempts: 1,
        }
    );
    let sent: serde_json::Value = serde_json::from_str(&server.requests()[0].body).unwrap();
    assert_eq!(sent["transition"]["id"], "31");

    let limited = exec.execute(&ops::get_issue("TEST-3", &[])).await.unwrap();
    assert_eq!(limited.attempts(), 3);
    assert!(matches!(limited.kind(), Some(ErrorKind::RateLimited { .. })));
    assert_eq!(server.hits("/rest/api/3/issue/TEST-3"), 3);
}

#[tokio::test]
async fn batch_isolates_failures() {
    let server = ApiServer::start();
    server.script("/rest/api/3/issue/TEST-2", vec![Reply::json(404, "")]);
    let batcher = RequestBatcher::new(Arc::new(executor(&server)));
    let keys: Vec<String> = (1..=4).map(|i| format!("TEST-{}", i)).collect();

    let result = batcher
        .fetch_issues(&keys, &[], 2, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(result.len(), 4);
    assert_eq!(result.succeeded(), 3);
    assert_eq!(result.get("TEST-2").unwrap().kind(), Some(ErrorKind::NotFound));
}

#[tokio::test]
async fn processor_resumes_after_restart() {
    let server = ApiServer::start();
    let state = tempdir().unwrap();
    let db_path = state.path().join("cache.db");
    let items: Vec<String> = (1..=6).map(|i| format!("TEST-{}", i)).collect();
    let to_request = |key: &String| ops::transition_issue(key, "31", None);
    let opts = ProcessOptions {
        concurrency_limit: 2,
        chunk_size: 2,
        ..ProcessOptions::default()
    };

    {
        let cache = TtlCache::open_at(&db_path).await.unwrap();
        let processor = BatchProcessor::new(
            RequestBatcher::new(Arc::new(executor(&server))),
            CheckpointStore::new(cache),
        );
        let abort = AbortToken::new();
        let trigger = abort.clone();
        let summary = processor
            .process(
                "move-to-done",
                items.clone(),
                |key: &String| {
                    if key == "TEST-5" {
                        trigger.abort();
                    }
                    to_request(key)
                },
                &ProcessOptions {
                    abort: Some(abort),
                    ..opts.clone()
                },
            )
            .await
            .unwrap();
        assert_eq!(summary.succeeded, 4);
        assert_eq!(summary.skipped, 2);
    }
    assert_eq!(server.requests().len(), 4);

    let cache = TtlCache::open_at(&db_path).await.unwrap();
    let processor = BatchProcessor::new(
        RequestBatcher::new(Arc::new(executor(&server))),
        CheckpointStore::new(cache),
    );
    let summary = processor
        .process("move-to-done", items.clone(), to_request, &opts)
        .await
        .unwrap();
    assert!(summary.completed);
    assert_eq!(summary.succeeded, 6);
    assert_eq!(server.requests().len(), 6);
    assert_eq!(server.hits("/rest/api/3/issue/TEST-5/transitions"), 1);

    let checkpoint = processor.store().load("move-to-done").await.unwrap().unwrap();
    assert_eq!(checkpoint.cursor, 6);
    assert!(checkpoint.finished);
}
