// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::helpers::{LoopbackResolver, TestRun};
use recrawlrs::domain::models::fetch_result::{FetchMode, FetchOutcome};
use recrawlrs::domain::models::recrawl_config::RecrawlConfig;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

const LARGE_BODY: usize = 2 * 1024 * 1024;

async fn large_body_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(LARGE_BODY)))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    server
}

async fn run_mode(mode: FetchMode) -> (TestRun, String, u64) {
    let server = large_body_server().await;
    let run = TestRun::new();
    let url = format!("{}/big", server.uri());
    let seed_id = run.write_seeds("seeds.txt", &[url.clone()]);

    let report = run
        .use_case(run.config(mode), Arc::new(LoopbackResolver::default()))
        .execute(&seed_id, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.stats.fetched, 1);
    (run, url, report.stats.bytes_read)
}

#[tokio::test]
async fn status_only_reads_no_body_bytes() {
    let (run, url, bytes) = run_mode(FetchMode::StatusOnly).await;
    assert_eq!(bytes, 0);

    let store = run.open_store().await;
    let row = store.find(&url).await.unwrap().unwrap();
    assert_eq!(row.outcome, FetchOutcome::Fetched);
    assert_eq!(row.status_code, Some(200));
    assert_eq!(row.bytes_read, 0);
    assert_eq!(row.mode, FetchMode::StatusOnly);
}

#[tokio::test]
async fn head_only_reads_no_body_bytes() {
    let (_run, _url, bytes) = run_mode(FetchMode::HeadOnly).await;
    assert_eq!(bytes, 0);
}

#[tokio::test]
async fn full_mode_body_is_capped() {
    let (run, url, bytes) = run_mode(FetchMode::Full).await;
    let cap = RecrawlConfig::default().max_body_bytes as u64;
    assert!(bytes > 0);
    assert!(bytes <= cap);

    let store = run.open_store().await;
    let row = store.find(&url).await.unwrap().unwrap();
    assert_eq!(row.bytes_read, bytes);
    assert_eq!(row.content_length, Some(LARGE_BODY as u64));
}
