//! HTTP surface tests: request validation, user scoping, cancellation.

mod common;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::harness;
use docpress::api::{AppState, router};
use docpress::server_config::ServerConfig;
use tower::ServiceExt;

fn app() -> (axum::Router, common::TestHarness) {
    let h = harness();
    let state = AppState {
        store: Arc::clone(&h.store),
        registry: Arc::clone(&h.registry),
        defaults: Arc::new(ServerConfig::default()),
    };
    (router(state), h)
}

fn post_job(body: &str, user: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/jobs")
        .header("content-type", "application/json");
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    builder.body(Body::from(body.to_string())).expect("request should build")
}

#[tokio::test]
async fn test_missing_user_header_rejected() {
    let (app, _h) = app();
    let response = app
        .oneshot(post_job(r#"{"url": "https://example.com/"}"#, None))
        .await
        .expect("request should run");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_invalid_seed_rejected() {
    let (app, _h) = app();
    let response = app
        .oneshot(post_job(r#"{"url": "not a url"}"#, Some("u1")))
        .await
        .expect("request should run");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_option_key_rejected() {
    let (app, _h) = app();
    let body = r#"{"url": "https://example.com/", "options": {"max_pagez": 3}}"#;
    let response = app
        .oneshot(post_job(body, Some("u1")))
        .await
        .expect("request should run");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_out_of_range_option_rejected() {
    let (app, _h) = app();
    let body = r#"{"url": "https://example.com/", "options": {"max_concurrent_requests": 50}}"#;
    let response = app
        .oneshot(post_job(body, Some("u1")))
        .await
        .expect("request should run");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_job_is_404() {
    let (app, _h) = app();
    let request = Request::builder()
        .method("GET")
        .uri("/jobs/does-not-exist")
        .header("x-user-id", "u1")
        .body(Body::empty())
        .expect("request should build");
    let response = app.oneshot(request).await.expect("request should run");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_foreign_user_cannot_see_job() {
    let (app, h) = app();

    // Create a job as u1 directly through the store.
    let key = docpress::JobKey::new("u1", "job-1");
    h.store
        .create_job(docpress::JobRecord::new(
            &key,
            "https://example.com/".to_string(),
            docpress::CrawlOptions::default(),
        ))
        .await
        .expect("create should succeed");

    let request = Request::builder()
        .method("GET")
        .uri("/jobs/job-1")
        .header("x-user-id", "u2")
        .body(Body::empty())
        .expect("request should build");
    let response = app.oneshot(request).await.expect("request should run");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_download_before_completion_conflicts() {
    let (app, h) = app();
    let key = docpress::JobKey::new("u1", "job-1");
    h.store
        .create_job(docpress::JobRecord::new(
            &key,
            "https://example.com/".to_string(),
            docpress::CrawlOptions::default(),
        ))
        .await
        .expect("create should succeed");

    let request = Request::builder()
        .method("GET")
        .uri("/jobs/job-1/download")
        .header("x-user-id", "u1")
        .body(Body::empty())
        .expect("request should build");
    let response = app.oneshot(request).await.expect("request should run");
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_cancel_is_idempotent() {
    let mut server = mockito::Server::new_async().await;
    let _slow = server
        .mock("GET", "/page")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_chunked_body(|writer| {
            std::thread::sleep(Duration::from_secs(2));
            writer.write_all(b"<h1>late</h1>")
        })
        .create_async()
        .await;

    let (app, h) = app();
    let cfg = docpress::build_job_config(
        &format!("{}/page", server.url()),
        docpress::CrawlOptions::default(),
        Duration::from_secs(60),
    )
    .expect("config should validate");
    let key = docpress::JobKey::new("u1", "job-1");
    h.store
        .create_job(docpress::JobRecord::new(
            &key,
            cfg.seed.to_string(),
            cfg.options.clone(),
        ))
        .await
        .expect("create should succeed");
    h.registry.launch(key.clone(), cfg);

    for _ in 0..2 {
        let request = Request::builder()
            .method("DELETE")
            .uri("/jobs/job-1")
            .header("x-user-id", "u1")
            .body(Body::empty())
            .expect("request should build");
        let response = app
            .clone()
            .oneshot(request)
            .await
            .expect("request should run");
        assert_eq!(response.status(), StatusCode::OK);
    }

    // The runner observes the cancel and lands in the cancelled state.
    let wait_limit = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let record = h
            .store
            .get_job(&key)
            .await
            .expect("get should succeed")
            .expect("job should exist");
        if record.status.is_terminal() {
            assert_eq!(record.status, docpress::JobStatus::Cancelled);
            break;
        }
        assert!(tokio::time::Instant::now() < wait_limit, "cancel should finalize");
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

#[tokio::test]
async fn test_stream_of_unknown_job_is_404() {
    let (app, _h) = app();
    let request = Request::builder()
        .method("GET")
        .uri("/jobs/nope/stream")
        .header("x-user-id", "u1")
        .body(Body::empty())
        .expect("request should build");
    let response = app.oneshot(request).await.expect("request should run");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
