// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

#[cfg(test)]
mod tests {
    use crate::domain::models::domain_health::{DeadReason, FailedDomain};
    use crate::domain::models::fetch_result::{ErrorClass, FetchMode, FetchOutcome, FetchResult};
    use crate::domain::models::recrawl_config::RecrawlConfig;
    use crate::domain::models::seed::Seed;
    use crate::domain::repositories::result_store::ResultStore;
    use crate::engines::recrawl_engine::RecrawlEngine;
    use crate::infrastructure::observability::stats::{CrawlStats, Phase, Progress};
    use crate::utils::errors::RepositoryError;
    use async_trait::async_trait;
    use axum::{response::Redirect, routing::get, Router};
    use parking_lot::Mutex;
    use std::collections::{HashMap, HashSet};
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_util::sync::CancellationToken;

    const LARGE_BODY: usize = 1024 * 1024;

    /// 内存结果存储
    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<Vec<FetchResult>>,
        flushes: Mutex<usize>,
    }

    impl MemoryStore {
        fn rows(&self) -> Vec<FetchResult> {
            self.rows.lock().clone()
        }

        fn count(&self, outcome: FetchOutcome) -> usize {
            self.rows.lock().iter().filter(|r| r.outcome == outcome).count()
        }
    }

    #[async_trait]
    impl ResultStore for MemoryStore {
        async fn insert(&self, results: Vec<FetchResult>) -> Result<(), RepositoryError> {
            self.rows.lock().extend(results);
            Ok(())
        }

        async fn flush(&self) -> Result<(), RepositoryError> {
            *self.flushes.lock() += 1;
            Ok(())
        }

        async fn set_meta(&self, _key: &str, _value: &str) -> Result<(), RepositoryError> {
            Ok(())
        }

        async fn load_completed_urls(&self) -> Result<HashSet<String>, RepositoryError> {
            Ok(self.rows.lock().iter().map(|r| r.url.clone()).collect())
        }

        async fn record_failed_domains(
            &self,
            _failures: Vec<FailedDomain>,
        ) -> Result<(), RepositoryError> {
            Ok(())
        }

        async fn close(&self) -> Result<(), RepositoryError> {
            Ok(())
        }
    }

    async fn start_test_server() -> u16 {
        let app = Router::new()
            .route("/ok", get(|| async { "hello" }))
            .route("/large", get(|| async { "x".repeat(LARGE_BODY) }))
            .route("/redirect", get(|| async { Redirect::temporary("/ok") }))
            .fallback(|| async { "page" });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        port
    }

    /// 绑定后立即释放的端口，连接会被拒绝
    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    fn loopback() -> HashMap<String, Vec<IpAddr>> {
        let mut map = HashMap::new();
        for domain in ["live.example", "down.example", "slow.example"] {
            map.insert(
                domain.to_string(),
                vec![IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))],
            );
        }
        map
    }

    fn config(mode: FetchMode) -> RecrawlConfig {
        RecrawlConfig {
            workers: 4,
            fetch_mode: mode,
            http_timeout: Duration::from_secs(2),
            ..Default::default()
        }
    }

    fn seeds(domain: &str, port: u16, paths: &[&str]) -> Vec<Seed> {
        paths
            .iter()
            .map(|p| Seed::new(format!("http://{}:{}{}", domain, port, p), domain))
            .collect()
    }

    fn engine(config: RecrawlConfig, store: Arc<MemoryStore>) -> RecrawlEngine {
        RecrawlEngine::new(config, store, Arc::new(CrawlStats::new()))
            .unwrap()
            .with_address_cache(loopback())
    }

    #[tokio::test]
    async fn test_full_mode_fetches_and_caps_body() {
        let port = start_test_server().await;
        let store = Arc::new(MemoryStore::default());
        let engine = engine(config(FetchMode::Full), store.clone());
        let seeds = seeds("live.example", port, &["/ok", "/large", "/a", "/b"]);

        engine
            .run(&seeds, &HashSet::new(), &HashMap::new(), &CancellationToken::new())
            .await
            .unwrap();

        let rows = store.rows();
        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|r| r.outcome == FetchOutcome::Fetched));
        assert!(rows.iter().all(|r| r.status_code == Some(200)));

        let large = rows.iter().find(|r| r.url.ends_with("/large")).unwrap();
        assert_eq!(large.bytes_read, 512 * 1024);
        assert_eq!(large.content_length, Some(LARGE_BODY as u64));

        let ok = rows.iter().find(|r| r.url.ends_with("/ok")).unwrap();
        assert_eq!(ok.bytes_read, 5);

        let snapshot = engine.stats().snapshot();
        assert_eq!(snapshot.fetched, 4);
        assert_eq!(snapshot.status_2xx, 4);
        assert_eq!(*store.flushes.lock(), 1);
    }

    #[tokio::test]
    async fn test_status_only_reads_no_body() {
        let port = start_test_server().await;
        let store = Arc::new(MemoryStore::default());
        let engine = engine(config(FetchMode::StatusOnly), store.clone());

        engine
            .run(
                &seeds("live.example", port, &["/large", "/large?again"]),
                &HashSet::new(),
                &HashMap::new(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let rows = store.rows();
        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert_eq!(row.status_code, Some(200));
            assert_eq!(row.bytes_read, 0);
            assert_eq!(row.mode, FetchMode::StatusOnly);
        }
        assert_eq!(engine.stats().snapshot().bytes_read, 0);
    }

    #[tokio::test]
    async fn test_head_only_records_headers() {
        let port = start_test_server().await;
        let store = Arc::new(MemoryStore::default());
        let engine = engine(config(FetchMode::HeadOnly), store.clone());

        engine
            .run(
                &seeds("live.example", port, &["/ok"]),
                &HashSet::new(),
                &HashMap::new(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let row = &store.rows()[0];
        assert_eq!(row.status_code, Some(200));
        assert_eq!(row.bytes_read, 0);
        assert_eq!(row.mode, FetchMode::HeadOnly);
    }

    #[tokio::test]
    async fn test_redirect_target_is_recorded() {
        let port = start_test_server().await;
        let store = Arc::new(MemoryStore::default());
        let engine = engine(config(FetchMode::Full), store.clone());

        engine
            .run(
                &seeds("live.example", port, &["/redirect"]),
                &HashSet::new(),
                &HashMap::new(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let row = &store.rows()[0];
        assert_eq!(row.status_code, Some(200));
        assert_eq!(
            row.redirect_url.as_deref(),
            Some(format!("http://live.example:{}/ok", port).as_str())
        );
    }

    #[tokio::test]
    async fn test_dead_domain_is_skipped_without_requests() {
        let store = Arc::new(MemoryStore::default());
        let engine = engine(config(FetchMode::Full), store.clone());
        let paths: Vec<String> = (0..100).map(|i| format!("/p{}", i)).collect();
        let path_refs: Vec<&str> = paths.iter().map(|p| p.as_str()).collect();
        let seeds = seeds("dead.invalid", 80, &path_refs);

        let mut dead = HashMap::new();
        dead.insert("dead.invalid".to_string(), DeadReason::DnsNxdomain);

        engine
            .run(&seeds, &HashSet::new(), &dead, &CancellationToken::new())
            .await
            .unwrap();

        let snapshot = engine.stats().snapshot();
        assert_eq!(snapshot.attempted, 0);
        assert_eq!(snapshot.fetched, 0);
        assert_eq!(snapshot.skipped_dead_domain, 100);
        assert_eq!(store.count(FetchOutcome::SkippedDeadDomain), 100);
        assert!(engine.http_dead_domains().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_connect_failures_short_circuit_domain() {
        let port = closed_port().await;
        let store = Arc::new(MemoryStore::default());
        let config = RecrawlConfig {
            workers: 1,
            max_conns_per_domain: 1,
            domain_fail_threshold: 2,
            ..config(FetchMode::Full)
        };
        let engine = engine(config, store.clone());
        let paths: Vec<String> = (0..10).map(|i| format!("/p{}", i)).collect();
        let path_refs: Vec<&str> = paths.iter().map(|p| p.as_str()).collect();

        engine
            .run(
                &seeds("down.example", port, &path_refs),
                &HashSet::new(),
                &HashMap::new(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let snapshot = engine.stats().snapshot();
        assert_eq!(snapshot.attempted, 2);
        assert_eq!(snapshot.errored, 2);
        assert_eq!(snapshot.connect_errors, 2);
        assert_eq!(snapshot.skipped_dead_domain, 8);
        assert_eq!(snapshot.domains_killed, 1);

        let errored: Vec<FetchResult> = store
            .rows()
            .into_iter()
            .filter(|r| r.outcome == FetchOutcome::Errored)
            .collect();
        assert!(errored
            .iter()
            .all(|r| r.error_class == Some(ErrorClass::Connect)));

        let dead = engine.http_dead_domains();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].domain, "down.example");
        assert_eq!(dead[0].reason, DeadReason::HttpRefused);
        assert_eq!(dead[0].skipped_urls, 8);
    }

    #[tokio::test]
    async fn test_two_pass_probe_skips_unreachable_domains() {
        let live_port = start_test_server().await;
        let dead_port = closed_port().await;
        let store = Arc::new(MemoryStore::default());
        let config = RecrawlConfig {
            two_pass: true,
            ..config(FetchMode::Full)
        };
        let engine = engine(config, store.clone());

        let mut all = seeds("live.example", live_port, &["/ok", "/a"]);
        all.extend(seeds("down.example", dead_port, &["/x", "/y", "/z"]));

        engine
            .run(&all, &HashSet::new(), &HashMap::new(), &CancellationToken::new())
            .await
            .unwrap();

        let snapshot = engine.stats().snapshot();
        assert_eq!(snapshot.probes_sent, 2);
        assert_eq!(snapshot.probes_failed, 1);
        assert_eq!(snapshot.fetched, 2);
        assert_eq!(snapshot.skipped_dead_domain, 3);

        let skipped: Vec<FetchResult> = store
            .rows()
            .into_iter()
            .filter(|r| r.outcome == FetchOutcome::SkippedDeadDomain)
            .collect();
        assert!(skipped
            .iter()
            .all(|r| r.error.as_deref() == Some("probe_unreachable")));
        assert_eq!(engine.http_dead_domains()[0].reason, DeadReason::ProbeUnreachable);
    }

    #[tokio::test]
    async fn test_two_pass_reports_probe_progress() {
        let live_port = start_test_server().await;
        let dead_port = closed_port().await;
        let store = Arc::new(MemoryStore::default());
        let config = RecrawlConfig {
            two_pass: true,
            ..config(FetchMode::StatusOnly)
        };
        let reports: Arc<Mutex<Vec<Progress>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = reports.clone();
        let engine = engine(config, store.clone()).with_progress(
            Arc::new(move |p: Progress| sink.lock().push(p)),
            Duration::from_millis(10),
        );

        let mut all = seeds("live.example", live_port, &["/ok"]);
        all.extend(seeds("down.example", dead_port, &["/x"]));
        engine
            .run(&all, &HashSet::new(), &HashMap::new(), &CancellationToken::new())
            .await
            .unwrap();

        let reports = reports.lock();
        let probe = reports
            .iter()
            .filter(|p| p.phase == Phase::Probe)
            .last()
            .copied()
            .unwrap();
        assert_eq!((probe.done, probe.total), (2, 2));
        assert_eq!((probe.live, probe.dead), (1, 1));

        let fetch = reports
            .iter()
            .filter(|p| p.phase == Phase::Fetch)
            .last()
            .copied()
            .unwrap();
        assert_eq!(fetch.done, 2);
    }

    #[tokio::test]
    async fn test_two_pass_fetches_reachable_domain_while_slow_domain_is_checked() {
        let events: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        let fast_log = events.clone();
        let slow_log = events.clone();
        let app = Router::new()
            .route(
                "/fast",
                get(move || {
                    let log = fast_log.clone();
                    async move {
                        log.lock().push("fast");
                        "fast"
                    }
                }),
            )
            .route(
                "/slow",
                get(move || {
                    let log = slow_log.clone();
                    async move {
                        tokio::time::sleep(Duration::from_millis(800)).await;
                        log.lock().push("slow");
                        "slow"
                    }
                }),
            );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let store = Arc::new(MemoryStore::default());
        let config = RecrawlConfig {
            two_pass: true,
            ..config(FetchMode::StatusOnly)
        };
        let engine = engine(config, store.clone());
        let mut all = seeds("live.example", port, &["/fast?1", "/fast?2", "/fast?3"]);
        all.extend(seeds("slow.example", port, &["/slow"]));

        engine
            .run(&all, &HashSet::new(), &HashMap::new(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(engine.stats().snapshot().fetched, 4);
        let events = events.lock();
        assert_eq!(events.len(), 6);
        // 快域名的三次抓取不等待慢域名的检查结束
        assert!(events[..4].iter().all(|e| *e == "fast"), "{:?}", events);
    }

    #[tokio::test]
    async fn test_many_workers_fetch_each_url_once() {
        let port = start_test_server().await;
        let store = Arc::new(MemoryStore::default());
        let config = RecrawlConfig {
            workers: 64,
            ..config(FetchMode::StatusOnly)
        };
        let engine = engine(config, store.clone());
        let paths: Vec<String> = (0..300).map(|i| format!("/page/{}", i)).collect();
        let path_refs: Vec<&str> = paths.iter().map(String::as_str).collect();

        engine
            .run(
                &seeds("live.example", port, &path_refs),
                &HashSet::new(),
                &HashMap::new(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let snapshot = engine.stats().snapshot();
        assert_eq!(snapshot.attempted, 300);
        assert_eq!(snapshot.fetched, 300);
        let urls: HashSet<String> = store.rows().into_iter().map(|r| r.url).collect();
        assert_eq!(urls.len(), 300);
        assert_eq!(store.count(FetchOutcome::Fetched), 300);
    }

    #[tokio::test]
    async fn test_resumed_urls_are_not_fetched() {
        let port = start_test_server().await;
        let store = Arc::new(MemoryStore::default());
        let engine = engine(config(FetchMode::StatusOnly), store.clone());
        let seeds = seeds("live.example", port, &["/1", "/2", "/3", "/4"]);
        let skip: HashSet<String> = seeds[..3].iter().map(|s| s.url.clone()).collect();

        engine
            .run(&seeds, &skip, &HashMap::new(), &CancellationToken::new())
            .await
            .unwrap();

        let snapshot = engine.stats().snapshot();
        assert_eq!(snapshot.skipped_resumed, 3);
        assert_eq!(snapshot.fetched, 1);
        assert_eq!(store.rows().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_run_fetches_nothing_and_flushes() {
        let port = start_test_server().await;
        let store = Arc::new(MemoryStore::default());
        let engine = engine(config(FetchMode::Full), store.clone());
        let token = CancellationToken::new();
        token.cancel();

        engine
            .run(
                &seeds("live.example", port, &["/ok", "/a"]),
                &HashSet::new(),
                &HashMap::new(),
                &token,
            )
            .await
            .unwrap();

        assert_eq!(engine.stats().snapshot().attempted, 0);
        assert_eq!(*store.flushes.lock(), 1);
    }
}
