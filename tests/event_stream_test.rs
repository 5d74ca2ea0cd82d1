//! Event-log invariants and stream resume behavior across a real crawl.

mod common;

use std::time::Duration;

use common::{events, fast_options, harness, run_job};
use docpress::events::{follow_events, is_terminal_event_type};
use docpress::store::JobStatus;
use futures::StreamExt;

fn html_page(title: &str, extra: &str) -> String {
    format!("<html><body><h1>{title}</h1><p>some page prose</p>{extra}</body></html>")
}

#[tokio::test]
async fn test_event_ids_monotone_and_gap_free_across_a_crawl() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();
    let _a = server
        .mock("GET", "/a")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(html_page(
            "A",
            &format!(r#"<a href="{base}/b">b</a> <a href="{base}/c">c</a>"#),
        ))
        .create_async()
        .await;
    for path in ["/b", "/c"] {
        let _m = server
            .mock("GET", path)
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body(html_page(path.trim_start_matches('/'), ""))
            .create_async()
            .await;
    }

    let h = harness();
    let (key, record) = run_job(
        &h,
        &format!("{base}/a"),
        {
            let mut options = fast_options();
            options.max_depth = 1;
            options
        },
        Duration::from_secs(60),
    )
    .await;
    assert_eq!(record.status, JobStatus::Completed);

    let log = events(&h, &key).await;
    assert!(!log.is_empty());
    for (i, event) in log.iter().enumerate() {
        assert_eq!(event.event_id, i as u64 + 1, "ids must be gap-free from 1");
        assert_eq!(event.job_id, key.job_id);
        assert_eq!(event.user_id, key.user_id);
    }

    // Exactly one terminal event, and it is the last entry.
    let terminals: Vec<_> = log
        .iter()
        .filter(|e| is_terminal_event_type(&e.event_type))
        .collect();
    assert_eq!(terminals.len(), 1);
    assert_eq!(
        terminals[0].event_id,
        log.last().expect("log is non-empty").event_id
    );
}

#[tokio::test]
async fn test_resume_after_terminal_replays_exact_suffix() {
    let mut server = mockito::Server::new_async().await;
    let _a = server
        .mock("GET", "/a")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(html_page("A", ""))
        .create_async()
        .await;

    let h = harness();
    let (key, _record) = run_job(
        &h,
        &format!("{}/a", server.url()),
        fast_options(),
        Duration::from_secs(60),
    )
    .await;

    let log = events(&h, &key).await;
    assert!(log.len() >= 3, "expected a few events, got {}", log.len());
    let resume_from = log[1].event_id;

    // Reconnect with last_event_id = second event: expect ids 3..=n once
    // each, in order, then stream end at the terminal event.
    let live = h.registry.get(&key).map(|handle| handle.bus.subscribe());
    let stream = follow_events(h.store.clone(), key.clone(), live, resume_from);
    let replayed: Vec<u64> = stream.map(|r| r.event_id).collect().await;

    let expected: Vec<u64> = (resume_from + 1..=log.len() as u64).collect();
    assert_eq!(replayed, expected);
}

#[tokio::test]
async fn test_live_subscriber_sees_crawl_events_in_order() {
    let mut server = mockito::Server::new_async().await;
    let _a = server
        .mock("GET", "/a")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(html_page("A", ""))
        .create_async()
        .await;

    let h = harness();
    let cfg = docpress::build_job_config(
        &format!("{}/a", server.url()),
        fast_options(),
        Duration::from_secs(60),
    )
    .expect("config should validate");
    let key = docpress::JobKey::new("test-user", "live-job");
    h.store
        .create_job(docpress::JobRecord::new(
            &key,
            cfg.seed.to_string(),
            cfg.options.clone(),
        ))
        .await
        .expect("create should succeed");

    // Attach before launch so the whole sequence arrives live.
    let handle = h.registry.launch(key.clone(), cfg);
    let stream = follow_events(h.store.clone(), key.clone(), Some(handle.bus.subscribe()), 0);

    let collected: Vec<_> = tokio::time::timeout(Duration::from_secs(30), stream.collect::<Vec<_>>())
        .await
        .expect("stream should terminate");

    let ids: Vec<u64> = collected.iter().map(|e| e.event_id).collect();
    let expected: Vec<u64> = (1..=collected.len() as u64).collect();
    assert_eq!(ids, expected);

    let types: Vec<&str> = collected.iter().map(|e| e.event_type.as_str()).collect();
    assert!(types.contains(&"url_started"));
    assert!(types.contains(&"url_crawled"));
    assert_eq!(types.last(), Some(&"job_completed"));
}
