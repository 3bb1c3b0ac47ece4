// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::helpers::{start_server, LoopbackResolver, TestRun};
use recrawlrs::domain::models::domain_health::DeadReason;
use recrawlrs::domain::models::fetch_result::{FetchMode, FetchOutcome};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn urls_on_dead_domain_are_skipped_without_requests() {
    let run = TestRun::new();
    let port = start_server().await;
    let mut lines: Vec<String> = (0..100)
        .map(|i| format!("https://gone.invalid/item/{}", i))
        .collect();
    lines.push(format!("http://live.example:{}/", port));
    let seed_id = run.write_seeds("seeds.txt", &lines);

    let report = run
        .use_case(run.config(FetchMode::Full), Arc::new(LoopbackResolver::default()))
        .execute(&seed_id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.stats.skipped_dead_domain, 100);
    assert_eq!(report.stats.attempted, 1);
    assert_eq!(report.stats.fetched, 1);

    let store = run.open_store().await;
    assert_eq!(
        store
            .count_by_outcome(FetchOutcome::SkippedDeadDomain)
            .await
            .unwrap(),
        100
    );

    let failed = store.failed_domains().await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].domain, "gone.invalid");
    assert_eq!(failed[0].reason, DeadReason::DnsNxdomain);
    assert_eq!(failed[0].url_count, 100);
}

#[tokio::test]
async fn refused_domain_is_short_circuited() {
    let run = TestRun::new();
    let closed = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let lines: Vec<String> = (0..50)
        .map(|i| format!("http://down.example:{}/{}", closed, i))
        .collect();
    let seed_id = run.write_seeds("seeds.txt", &lines);

    let report = run
        .use_case(run.config(FetchMode::Full), Arc::new(LoopbackResolver::default()))
        .execute(&seed_id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.stats.domains_killed, 1);
    assert_eq!(report.stats.errored + report.stats.skipped_dead_domain, 50);
    assert!(report.stats.skipped_dead_domain > 0);
    assert!(report.stats.attempted < 50);
    assert_eq!(report.stats.connect_errors, report.stats.errored);

    let store = run.open_store().await;
    assert_eq!(store.count_results().await.unwrap(), 50);
    let failed = store.failed_domains().await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].reason, DeadReason::HttpRefused);
    assert_eq!(failed[0].stage, "http_worker");
}
