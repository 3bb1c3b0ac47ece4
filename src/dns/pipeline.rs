// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::counter;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::dns::resolver::{DomainResolver, LookupError};
use crate::domain::models::domain_health::{
    Classification, DeadReason, DomainHealthEntry,
};
use crate::domain::models::seed::Seed;
use crate::infrastructure::cache::domain_health_cache::DomainHealthCache;
use crate::infrastructure::observability::stats::{
    spawn_progress_reporter, Phase, ProgressCallback, ProgressCounts,
};

/// 一次批量解析的汇总
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DnsBatchSummary {
    pub live: u64,
    pub dead: u64,
    pub timeout: u64,
    /// 直接命中缓存的域名数
    pub cached: u64,
    /// 本次实际发起解析的域名数
    pub resolved: u64,
    #[serde(skip)]
    pub elapsed: Duration,
}

#[derive(Default)]
struct BatchCounters {
    done: AtomicU64,
    live: AtomicU64,
    dead: AtomicU64,
    timeout: AtomicU64,
}

impl BatchCounters {
    fn count(&self, classification: Classification) {
        let counter = match classification {
            Classification::Live => &self.live,
            Classification::Dead => &self.dead,
            Classification::Timeout => &self.timeout,
            Classification::Unknown => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.done.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self, total: u64) -> ProgressCounts {
        ProgressCounts {
            done: self.done.load(Ordering::Relaxed),
            total,
            live: self.live.load(Ordering::Relaxed),
            dead: self.dead.load(Ordering::Relaxed),
            timeout: self.timeout.load(Ordering::Relaxed),
        }
    }
}

/// 按出现顺序去重，得到需要解析的域名列表
pub fn unique_domains(seeds: &[Seed]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(seeds.len() / 4 + 1);
    seeds
        .iter()
        .filter(|s| seen.insert(s.domain.as_str()))
        .map(|s| s.domain.clone())
        .collect()
}

/// DNS批量预解析流水线
///
/// 独立于抓取worker的有界解析池：每个域名只解析一次，结论写入域名健康缓存，
/// 已缓存的域名直接跳过
pub struct DnsPipeline {
    resolver: Arc<dyn DomainResolver>,
    cache: Arc<DomainHealthCache>,
    workers: usize,
    timeout: Duration,
    retry_timeouts: bool,
    progress: Option<ProgressCallback>,
    progress_interval: Duration,
}

impl DnsPipeline {
    /// 创建解析流水线
    ///
    /// # 参数
    ///
    /// * `resolver` - 解析后端
    /// * `cache` - 域名健康缓存，解析结论会写入其中
    /// * `workers` - 并发解析数
    /// * `timeout` - 单次解析超时
    pub fn new(
        resolver: Arc<dyn DomainResolver>,
        cache: Arc<DomainHealthCache>,
        workers: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            resolver,
            cache,
            workers: workers.max(1),
            timeout,
            retry_timeouts: false,
            progress: None,
            progress_interval: Duration::from_millis(500),
        }
    }

    /// 缓存中的超时域名是否重新解析
    pub fn with_retry_timeouts(mut self, retry: bool) -> Self {
        self.retry_timeouts = retry;
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback, interval: Duration) -> Self {
        self.progress = Some(callback);
        self.progress_interval = interval;
        self
    }

    fn needs_lookup(&self, domain: &str) -> bool {
        match self.cache.classify(domain) {
            Classification::Unknown => true,
            Classification::Timeout => self.retry_timeouts,
            Classification::Live | Classification::Dead => false,
        }
    }

    /// 批量解析域名
    ///
    /// 取消后停止派发新的解析，已在进行中的解析由各自的超时约束
    ///
    /// # 参数
    ///
    /// * `domains` - 待解析域名，可以包含重复
    /// * `token` - 取消信号
    ///
    /// # 返回值
    ///
    /// 返回本批次的 live/dead/timeout 计数（包含命中缓存的域名）
    #[instrument(skip_all, fields(domains = domains.len(), workers = self.workers))]
    pub async fn resolve_batch(
        &self,
        domains: &[String],
        token: &CancellationToken,
    ) -> DnsBatchSummary {
        let started = Instant::now();
        let mut seen = HashSet::with_capacity(domains.len());
        let unique: Vec<&String> = domains.iter().filter(|d| seen.insert(*d)).collect();
        let total = unique.len() as u64;

        let counters = Arc::new(BatchCounters::default());
        let mut pending = Vec::new();
        let mut cached = 0u64;
        for domain in unique {
            if self.needs_lookup(domain) {
                pending.push(domain.clone());
            } else {
                counters.count(self.cache.classify(domain));
                cached += 1;
            }
        }

        info!(
            "DNS batch: {} unique domains, {} cached, {} to resolve",
            total,
            cached,
            pending.len()
        );

        let reporter_token = token.child_token();
        let reporter = self.progress.clone().map(|callback| {
            let counters = counters.clone();
            spawn_progress_reporter(
                Phase::Dns,
                self.progress_interval,
                reporter_token.clone(),
                move || counters.snapshot(total),
                callback,
            )
        });

        let resolved = pending.len() as u64;
        if !pending.is_empty() {
            let pending = Arc::new(pending);
            let cursor = Arc::new(AtomicUsize::new(0));
            let mut tasks = JoinSet::new();

            for _ in 0..self.workers.min(pending.len()) {
                let pending = pending.clone();
                let cursor = cursor.clone();
                let counters = counters.clone();
                let resolver = self.resolver.clone();
                let cache = self.cache.clone();
                let token = token.clone();
                let timeout = self.timeout;

                tasks.spawn(async move {
                    loop {
                        if token.is_cancelled() {
                            break;
                        }
                        let index = cursor.fetch_add(1, Ordering::Relaxed);
                        let Some(domain) = pending.get(index) else {
                            break;
                        };
                        let entry = resolve_one(resolver.as_ref(), domain, timeout).await;
                        counters.count(entry.status.into());
                        cache.insert(entry);
                    }
                });
            }

            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    warn!("DNS worker terminated abnormally: {}", e);
                }
            }
        }

        reporter_token.cancel();
        if let Some(handle) = reporter {
            let _ = handle.await;
        }

        let counts = counters.snapshot(total);
        let summary = DnsBatchSummary {
            live: counts.live,
            dead: counts.dead,
            timeout: counts.timeout,
            cached,
            resolved,
            elapsed: started.elapsed(),
        };

        info!(
            "DNS batch finished in {:?}: live={}, dead={}, timeout={}{}",
            summary.elapsed,
            summary.live,
            summary.dead,
            summary.timeout,
            if token.is_cancelled() { " (cancelled)" } else { "" }
        );
        summary
    }
}

/// 解析单个域名并分类
async fn resolve_one(
    resolver: &dyn DomainResolver,
    domain: &str,
    timeout: Duration,
) -> DomainHealthEntry {
    let outcome = match tokio::time::timeout(timeout, resolver.lookup(domain)).await {
        Ok(result) => result,
        Err(_) => Err(LookupError::Timeout),
    };

    let entry = match outcome {
        Ok(addrs) if !addrs.is_empty() => DomainHealthEntry::live(domain, addrs),
        Ok(_) | Err(LookupError::NotFound) => {
            DomainHealthEntry::dead(domain, DeadReason::DnsNxdomain, 0)
        }
        Err(LookupError::Timeout) => DomainHealthEntry::timeout(domain),
        Err(LookupError::Failed(message)) => {
            debug!("DNS lookup for {} failed: {}", domain, message);
            DomainHealthEntry::dead(domain, DeadReason::DnsError, 0)
        }
    };

    counter!("recrawl_dns_lookups_total", "status" => entry.status.as_str()).increment(1);
    entry
}

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod tests;
