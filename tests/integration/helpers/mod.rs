// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use axum::{routing::get, Router};
use recrawlrs::application::use_cases::recrawl_use_case::RecrawlUseCase;
use recrawlrs::dns::resolver::{DomainResolver, LookupError};
use recrawlrs::domain::models::fetch_result::FetchMode;
use recrawlrs::domain::models::recrawl_config::RecrawlConfig;
use recrawlrs::infrastructure::repositories::file_seed_source::FileSeedSource;
use recrawlrs::infrastructure::storage::sharded_result_store::ShardedResultStore;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

pub const RESULT_SHARDS: usize = 4;

/// `*.example` 和IP字面量解析到本机，其余域名不存在
#[derive(Default)]
pub struct LoopbackResolver {
    calls: AtomicUsize,
}

impl LoopbackResolver {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DomainResolver for LoopbackResolver {
    async fn lookup(&self, domain: &str) -> Result<Vec<IpAddr>, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(ip) = domain.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }
        if domain.ends_with(".example") {
            Ok(vec![IpAddr::V4(Ipv4Addr::LOCALHOST)])
        } else {
            Err(LookupError::NotFound)
        }
    }

    fn name(&self) -> &'static str {
        "loopback"
    }
}

/// 启动本地HTTP服务，任意路径都返回 "page"
pub async fn start_server() -> u16 {
    let app = Router::new()
        .route("/missing", get(|| async { (axum::http::StatusCode::NOT_FOUND, "gone") }))
        .fallback(|| async { "page" });
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    port
}

/// 一次测试运行的工作目录
pub struct TestRun {
    pub dir: TempDir,
}

impl TestRun {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn result_dir(&self) -> PathBuf {
        self.dir.path().join("results")
    }

    pub fn cache_path(&self) -> PathBuf {
        self.dir.path().join("dns_cache.db")
    }

    /// 写入种子文件，返回种子标识
    pub fn write_seeds(&self, name: &str, lines: &[String]) -> String {
        let mut content = String::from("# generated seeds\n");
        for line in lines {
            content.push_str(line);
            content.push('\n');
        }
        std::fs::write(self.dir.path().join(name), content).unwrap();
        name.to_string()
    }

    pub fn config(&self, mode: FetchMode) -> RecrawlConfig {
        RecrawlConfig {
            workers: 8,
            dns_workers: 4,
            http_timeout: Duration::from_secs(2),
            dns_timeout: Duration::from_millis(500),
            fetch_mode: mode,
            batch_size: 16,
            result_shards: RESULT_SHARDS,
            result_dir: self.result_dir(),
            dns_cache_path: self.cache_path(),
            ..Default::default()
        }
    }

    pub fn use_case(
        &self,
        config: RecrawlConfig,
        resolver: Arc<LoopbackResolver>,
    ) -> RecrawlUseCase {
        RecrawlUseCase::new(
            config,
            Arc::new(FileSeedSource::new(self.dir.path())),
            resolver,
        )
    }

    pub async fn open_store(&self) -> ShardedResultStore {
        ShardedResultStore::open(&self.result_dir(), RESULT_SHARDS, 16)
            .await
            .unwrap()
    }
}
