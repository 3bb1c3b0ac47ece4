// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::helpers::{start_server, LoopbackResolver, TestRun};
use recrawlrs::domain::models::fetch_result::{FetchMode, FetchOutcome};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// 一个存活域名两个URL、一个不存在的域名一个URL
#[tokio::test]
async fn live_and_dead_domains_produce_one_row_per_url() {
    let run = TestRun::new();
    let port = start_server().await;
    let seed_id = run.write_seeds(
        "seeds.txt",
        &[
            format!("http://live.example:{}/a\tlive.example", port),
            format!("http://live.example:{}/b\tlive.example", port),
            "https://dead.invalid/c\tdead.invalid".to_string(),
        ],
    );

    let report = run
        .use_case(run.config(FetchMode::Full), Arc::new(LoopbackResolver::default()))
        .execute(&seed_id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.seeds.total_urls, 3);
    assert_eq!(report.seeds.unique_domains, 2);
    assert!(report.error.is_none());
    assert_eq!(report.stats.fetched, 2);
    assert_eq!(report.stats.status_2xx, 2);
    assert_eq!(report.stats.skipped_dead_domain, 1);

    let store = run.open_store().await;
    assert_eq!(store.count_results().await.unwrap(), 3);

    let a = store
        .find(&format!("http://live.example:{}/a", port))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(a.outcome, FetchOutcome::Fetched);
    assert_eq!(a.status_code, Some(200));
    assert_eq!(a.bytes_read, 4);

    let c = store.find("https://dead.invalid/c").await.unwrap().unwrap();
    assert_eq!(c.outcome, FetchOutcome::SkippedDeadDomain);
    assert_eq!(c.status_code, None);

    let started = store.get_meta("started_at").await.unwrap().unwrap_or_default();
    let finished = store.get_meta("finished_at").await.unwrap().unwrap_or_default();
    assert!(!started.is_empty());
    assert!(!finished.is_empty());
    assert_eq!(
        store.get_meta("fetch_mode").await.unwrap().as_deref(),
        Some("full")
    );
    assert_eq!(store.get_meta("workers").await.unwrap().as_deref(), Some("8"));
}

/// 4xx/5xx 是数据而不是错误
#[tokio::test]
async fn http_error_statuses_are_recorded_as_fetched() {
    let run = TestRun::new();
    let port = start_server().await;
    let url = format!("http://live.example:{}/missing", port);
    let seed_id = run.write_seeds("seeds.txt", &[url.clone()]);

    let report = run
        .use_case(run.config(FetchMode::Full), Arc::new(LoopbackResolver::default()))
        .execute(&seed_id, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.stats.fetched, 1);
    assert_eq!(report.stats.status_4xx, 1);
    assert_eq!(report.stats.errored, 0);

    let store = run.open_store().await;
    let row = store.find(&url).await.unwrap().unwrap();
    assert_eq!(row.outcome, FetchOutcome::Fetched);
    assert_eq!(row.status_code, Some(404));
}
