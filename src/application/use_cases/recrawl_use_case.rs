// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use chrono::Utc;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::dns::pipeline::{unique_domains, DnsBatchSummary, DnsPipeline};
use crate::dns::resolver::DomainResolver;
use crate::domain::models::domain_health::{DeadReason, DomainHealthEntry, FailedDomain};
use crate::domain::models::recrawl_config::RecrawlConfig;
use crate::domain::models::seed::{Seed, SeedStats};
use crate::domain::repositories::result_store::ResultStore;
use crate::domain::repositories::seed_source::SeedSource;
use crate::engines::domain_guard::HttpDeadDomain;
use crate::engines::recrawl_engine::RecrawlEngine;
use crate::infrastructure::cache::domain_health_cache::DomainHealthCache;
use crate::infrastructure::observability::stats::{CrawlStats, ProgressCallback, StatsSnapshot};
use crate::infrastructure::storage::sharded_result_store::ShardedResultStore;
use crate::utils::errors::RecrawlError;

/// 一次重爬运行的报告
#[derive(Debug, Clone, Serialize)]
pub struct RecrawlReport {
    pub seeds: SeedStats,
    /// 未开启DNS预解析时为 `None`
    pub dns: Option<DnsBatchSummary>,
    pub stats: StatsSnapshot,
    /// 合并回域名健康缓存的HTTP层死亡域名数
    pub merged_dead_domains: usize,
    /// 非致命的运行错误，此时结果集仍然是完整落盘的部分结果
    pub error: Option<String>,
    pub cancelled: bool,
}

/// DNS阶段的产物，注入抓取引擎
#[derive(Default)]
struct DnsOutcome {
    summary: Option<DnsBatchSummary>,
    dead: HashMap<String, DeadReason>,
    addresses: HashMap<String, Vec<IpAddr>>,
}

/// 重爬用例
///
/// 依次完成：加载种子 → 打开结果存储 → 读取续传集合 → DNS预解析 → 抓取 →
/// 落盘并写入元数据 → 将抓取阶段发现的死亡域名合并回域名健康缓存
pub struct RecrawlUseCase {
    config: RecrawlConfig,
    seed_source: Arc<dyn SeedSource>,
    resolver: Arc<dyn DomainResolver>,
    progress: Option<(ProgressCallback, Duration)>,
}

impl RecrawlUseCase {
    pub fn new(
        config: RecrawlConfig,
        seed_source: Arc<dyn SeedSource>,
        resolver: Arc<dyn DomainResolver>,
    ) -> Self {
        Self {
            config: config.normalized(),
            seed_source,
            resolver,
            progress: None,
        }
    }

    /// 设置DNS阶段和抓取阶段共用的进度回调
    pub fn with_progress(mut self, callback: ProgressCallback, interval: Duration) -> Self {
        self.progress = Some((callback, interval));
        self
    }

    pub fn config(&self) -> &RecrawlConfig {
        &self.config
    }

    /// 执行一次重爬
    ///
    /// # 参数
    ///
    /// * `seed_id` - 交给种子来源的种子集合标识
    /// * `token` - 取消信号，取消后仍会落盘并写入 `finished_at`
    ///
    /// # 返回值
    ///
    /// * `Ok(RecrawlReport)` - 运行结束，可能带有非致命错误
    /// * `Err(RecrawlError)` - 种子无法加载或结果存储无法打开
    #[instrument(skip(self, token), fields(source = self.seed_source.name()))]
    pub async fn execute(
        &self,
        seed_id: &str,
        token: &CancellationToken,
    ) -> Result<RecrawlReport, RecrawlError> {
        let config = &self.config;

        let seed_stats = self
            .seed_source
            .load_stats(seed_id)
            .await
            .map_err(|e| RecrawlError::SeedLoad(format!("{:#}", e)))?;
        let seeds = self
            .seed_source
            .load_seeds(seed_id)
            .await
            .map_err(|e| RecrawlError::SeedLoad(format!("{:#}", e)))?;
        info!(
            "Recrawl of {} URLs across {} domains",
            seed_stats.total_urls, seed_stats.unique_domains
        );

        let store = Arc::new(
            ShardedResultStore::open(&config.result_dir, config.result_shards, config.batch_size)
                .await
                .map_err(RecrawlError::ResultStore)?,
        );
        let mut error = None;
        if let Err(e) = self.write_start_meta(store.as_ref(), seed_id).await {
            error!("Failed to write run metadata: {}", e);
            error = Some(e.to_string());
        }

        let skip = if config.resume {
            let completed = store.load_completed_urls().await?;
            info!("Resume enabled: {} URLs already completed", completed.len());
            completed
        } else {
            HashSet::new()
        };

        let cache = Arc::new(DomainHealthCache::new(config.live_downgrade_failures));
        if let Err(e) = cache.load(&config.dns_cache_path).await {
            warn!(
                "Failed to load domain cache {}: {}",
                config.dns_cache_path.display(),
                e
            );
        }

        let dns = if config.dns_prefetch {
            self.prefetch(&seeds, &cache, token).await
        } else {
            if config.two_pass {
                info!("DNS prefetch disabled, domains are probed during fetch");
            }
            DnsOutcome::default()
        };

        if !dns.dead.is_empty() {
            let failures = dns_failures(&seeds, &dns.dead);
            if let Err(e) = store.record_failed_domains(failures).await {
                error!("Failed to record DNS-dead domains: {}", e);
                error.get_or_insert(e.to_string());
            }
        }

        let stats = Arc::new(CrawlStats::new());
        let mut engine = RecrawlEngine::new(config.clone(), store.clone(), stats.clone())?
            .with_address_cache(dns.addresses);
        if let Some((callback, interval)) = &self.progress {
            engine = engine.with_progress(callback.clone(), *interval);
        }

        if let Err(e) = engine.run(&seeds, &skip, &dns.dead, token).await {
            let e = RecrawlError::from(e);
            error!("Recrawl finished with error: {}", e);
            error.get_or_insert(e.to_string());
        }

        let http_dead = engine.http_dead_domains();
        if let Err(e) = self.finish_store(store.as_ref(), &http_dead).await {
            error!("Failed to finalize result store: {}", e);
            error.get_or_insert(e.to_string());
        }

        let merged_dead_domains = cache.merge(http_dead.iter().map(|dead| {
            DomainHealthEntry::dead(dead.domain.clone(), dead.reason, dead.failure_count)
        }));
        match cache.save(&config.dns_cache_path).await {
            Ok(written) => info!(
                "Domain cache saved: {} entries written, {} HTTP-dead domains merged",
                written, merged_dead_domains
            ),
            Err(e) => warn!(
                "Failed to save domain cache {}: {}",
                config.dns_cache_path.display(),
                e
            ),
        }

        Ok(RecrawlReport {
            seeds: seed_stats,
            dns: dns.summary,
            stats: stats.snapshot(),
            merged_dead_domains,
            error,
            cancelled: token.is_cancelled(),
        })
    }

    async fn write_start_meta(
        &self,
        store: &dyn ResultStore,
        seed_id: &str,
    ) -> Result<(), RecrawlError> {
        let config = &self.config;
        let entries = [
            (
                "seed_source",
                format!("{}:{}", self.seed_source.name(), seed_id),
            ),
            ("started_at", Utc::now().to_rfc3339()),
            ("workers", config.workers.to_string()),
            ("dns_workers", config.dns_workers.to_string()),
            ("fetch_mode", config.fetch_mode.as_str().to_string()),
            ("transport_shards", config.transport_shards.to_string()),
            ("resume", config.resume.to_string()),
            ("two_pass", config.two_pass.to_string()),
        ];
        for (key, value) in entries {
            store.set_meta(key, &value).await?;
        }
        Ok(())
    }

    /// 解析全部域名，返回死亡集合和可直接拨号的地址
    async fn prefetch(
        &self,
        seeds: &[Seed],
        cache: &Arc<DomainHealthCache>,
        token: &CancellationToken,
    ) -> DnsOutcome {
        let domains = unique_domains(seeds);
        let mut pipeline = DnsPipeline::new(
            self.resolver.clone(),
            cache.clone(),
            self.config.dns_workers,
            self.config.dns_timeout,
        )
        .with_retry_timeouts(self.config.dns_retry_timeouts);
        if let Some((callback, interval)) = &self.progress {
            pipeline = pipeline.with_progress(callback.clone(), *interval);
        }

        let summary = pipeline.resolve_batch(&domains, token).await;

        let mut dead = HashMap::new();
        for domain in &domains {
            if let Some(reason) = cache.get(domain).and_then(|entry| entry.skip_reason()) {
                dead.insert(domain.clone(), reason);
            }
        }
        let addresses = cache.address_map(domains.iter());

        DnsOutcome {
            summary: Some(summary),
            dead,
            addresses,
        }
    }

    async fn finish_store(
        &self,
        store: &ShardedResultStore,
        http_dead: &[HttpDeadDomain],
    ) -> Result<(), RecrawlError> {
        let mut first_error = None;
        if !http_dead.is_empty() {
            let failures = http_dead
                .iter()
                .map(|dead| FailedDomain {
                    domain: dead.domain.clone(),
                    reason: dead.reason,
                    url_count: dead.skipped_urls,
                    stage: if dead.reason == DeadReason::ProbeUnreachable {
                        "probe".to_string()
                    } else {
                        "http_worker".to_string()
                    },
                })
                .collect();
            if let Err(e) = store.record_failed_domains(failures).await {
                first_error = Some(e);
            }
        }
        if let Err(e) = store
            .set_meta("finished_at", &Utc::now().to_rfc3339())
            .await
        {
            first_error.get_or_insert(e);
        }
        // 元数据写入失败也要关闭存储，保证缓冲的结果落盘
        let closed = store.close().await;
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(closed?),
        }
    }
}

/// DNS阶段判定不可达的域名及其受影响的URL数
fn dns_failures(seeds: &[Seed], dead: &HashMap<String, DeadReason>) -> Vec<FailedDomain> {
    let mut counts: HashMap<&str, u64> = HashMap::new();
    for seed in seeds {
        if dead.contains_key(&seed.domain) {
            *counts.entry(seed.domain.as_str()).or_default() += 1;
        }
    }

    let mut failures: Vec<FailedDomain> = dead
        .iter()
        .map(|(domain, reason)| FailedDomain {
            domain: domain.clone(),
            reason: *reason,
            url_count: counts.get(domain.as_str()).copied().unwrap_or(0),
            stage: "dns_batch".to_string(),
        })
        .collect();
    failures.sort_by(|a, b| a.domain.cmp(&b.domain));
    failures
}

#[cfg(test)]
#[path = "recrawl_use_case_test.rs"]
mod tests;
