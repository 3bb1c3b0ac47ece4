// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::helpers::{start_server, LoopbackResolver, TestRun};
use recrawlrs::domain::models::fetch_result::FetchMode;
use recrawlrs::domain::models::recrawl_config::RecrawlConfig;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn ten_urls(port: u16) -> Vec<String> {
    (0..10)
        .map(|i| format!("http://live.example:{}/page/{}", port, i))
        .collect()
}

#[tokio::test]
async fn second_resumed_run_fetches_nothing() {
    let run = TestRun::new();
    let port = start_server().await;
    let seed_id = run.write_seeds("seeds.txt", &ten_urls(port));
    let config = RecrawlConfig {
        resume: true,
        ..run.config(FetchMode::StatusOnly)
    };
    let resolver = Arc::new(LoopbackResolver::default());

    let first = run
        .use_case(config.clone(), resolver.clone())
        .execute(&seed_id, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(first.stats.fetched, 10);
    assert_eq!(first.stats.skipped_resumed, 0);

    let second = run
        .use_case(config, resolver)
        .execute(&seed_id, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(second.stats.fetched, 0);
    assert_eq!(second.stats.attempted, 0);
    assert_eq!(second.stats.skipped_resumed, 10);

    let store = run.open_store().await;
    assert_eq!(store.count_results().await.unwrap(), 10);
}

#[tokio::test]
async fn resumed_run_only_fetches_new_urls() {
    let run = TestRun::new();
    let port = start_server().await;
    let urls = ten_urls(port);
    let config = RecrawlConfig {
        resume: true,
        ..run.config(FetchMode::HeadOnly)
    };
    let resolver = Arc::new(LoopbackResolver::default());

    let first_seeds = run.write_seeds("first.txt", &urls[..6]);
    run.use_case(config.clone(), resolver.clone())
        .execute(&first_seeds, &CancellationToken::new())
        .await
        .unwrap();

    let all_seeds = run.write_seeds("all.txt", &urls);
    let second = run
        .use_case(config, resolver)
        .execute(&all_seeds, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(second.stats.skipped_resumed, 6);
    assert_eq!(second.stats.fetched, 4);

    let store = run.open_store().await;
    assert_eq!(store.count_results().await.unwrap(), 10);
}

#[tokio::test]
async fn without_resume_urls_are_refetched_and_overwritten() {
    let run = TestRun::new();
    let port = start_server().await;
    let seed_id = run.write_seeds("seeds.txt", &ten_urls(port)[..3]);
    let resolver = Arc::new(LoopbackResolver::default());

    for _ in 0..2 {
        let report = run
            .use_case(run.config(FetchMode::StatusOnly), resolver.clone())
            .execute(&seed_id, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.stats.fetched, 3);
    }

    let store = run.open_store().await;
    assert_eq!(store.count_results().await.unwrap(), 3);
}
