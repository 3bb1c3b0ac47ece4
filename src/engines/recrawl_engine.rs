// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use rand::seq::SliceRandom;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::models::domain_health::DeadReason;
use crate::domain::models::fetch_result::FetchResult;
use crate::domain::models::recrawl_config::RecrawlConfig;
use crate::domain::models::seed::Seed;
use crate::domain::repositories::result_store::ResultStore;
use crate::engines::domain_guard::{DomainGuard, HttpDeadDomain};
use crate::engines::fetch_mode::{probe, strategy_for};
use crate::engines::traits::{EngineError, FetchStrategy};
use crate::engines::transport::{AddressCache, TransportPool};
use crate::infrastructure::observability::stats::{
    spawn_progress_reporter, CrawlStats, Phase, ProgressCallback, ProgressCounts,
};

/// 预先判定死亡的域名一次写入的跳过记录数
const SKIP_BATCH: usize = 1000;

/// 所有任务共享的引擎状态
struct EngineShared {
    config: Arc<RecrawlConfig>,
    store: Arc<dyn ResultStore>,
    stats: Arc<CrawlStats>,
    guard: Arc<DomainGuard>,
    transports: TransportPool,
    strategy: Arc<dyn FetchStrategy>,
}

impl EngineShared {
    async fn write_skips(&self, results: Vec<FetchResult>) -> Result<(), EngineError> {
        if results.is_empty() {
            return Ok(());
        }
        for result in &results {
            self.stats.record_result(result);
        }
        self.store.insert(results).await?;
        Ok(())
    }

    async fn skip(&self, seed: &Seed, reason: DeadReason) -> Result<(), EngineError> {
        self.guard.note_skip(&seed.domain);
        let result = FetchResult::skipped(seed, reason, self.strategy.mode());
        self.stats.record_result(&result);
        self.store.insert_one(result).await?;
        Ok(())
    }

    /// 处理单个种子：死亡检查 → 域名并发限制 → 抓取 → 更新域名状态 → 写入
    async fn process(&self, seed: Seed, token: &CancellationToken) -> Result<(), EngineError> {
        if let Some(reason) = self.guard.dead_reason(&seed.domain) {
            return self.skip(&seed, reason).await;
        }

        let semaphore = self.guard.semaphore(&seed.domain);
        let permit = tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(()),
            permit = semaphore.acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return Ok(()),
            },
        };

        // 等待许可期间域名可能已被判死
        if let Some(reason) = self.guard.dead_reason(&seed.domain) {
            drop(permit);
            return self.skip(&seed, reason).await;
        }

        self.stats.record_attempt();
        let client = self.transports.client_for(&seed.domain);
        let result = self.strategy.fetch(client, &seed).await;
        drop(permit);

        if result.status_code.is_some() {
            self.guard.record_response(&seed.domain);
        } else if let Some(class) = result.error_class {
            if let Some(reason) = self.guard.record_failure(&seed.domain, class) {
                self.stats.record_domain_killed(reason);
                info!("Domain {} marked dead during fetch ({})", seed.domain, reason);
            }
        }

        self.stats.record_result(&result);
        self.store.insert_one(result).await?;
        Ok(())
    }
}

/// 重爬抓取引擎
///
/// 有界worker池从有界队列中消费种子。队列由单独的投喂任务按域名轮转填充，
/// 结果存储写入变慢时会沿队列反压到投喂端
pub struct RecrawlEngine {
    shared: Arc<EngineShared>,
    addresses: AddressCache,
    progress: Option<(ProgressCallback, Duration)>,
}

impl RecrawlEngine {
    /// 创建抓取引擎
    ///
    /// # 参数
    ///
    /// * `config` - 运行配置，零值会被替换为默认值
    /// * `store` - 结果存储
    /// * `stats` - 统计计数
    ///
    /// # 返回值
    ///
    /// * `Ok(RecrawlEngine)` - 引擎实例
    /// * `Err(EngineError)` - HTTP客户端构建失败
    pub fn new(
        config: RecrawlConfig,
        store: Arc<dyn ResultStore>,
        stats: Arc<CrawlStats>,
    ) -> Result<Self, EngineError> {
        let config = Arc::new(config.normalized());
        let addresses: AddressCache = Arc::new(DashMap::new());
        let transports = TransportPool::new(&config, addresses.clone())?;
        let strategy = strategy_for(config.fetch_mode, config.max_body_bytes);
        let guard = Arc::new(DomainGuard::new(
            config.domain_fail_threshold,
            config.max_conns_per_domain,
        ));

        info!(
            "Recrawl engine ready: mode={}, workers={}, transport shards={}",
            strategy.name(),
            config.workers,
            transports.shard_count()
        );

        Ok(Self {
            shared: Arc::new(EngineShared {
                config,
                store,
                stats,
                guard,
                transports,
                strategy,
            }),
            addresses,
            progress: None,
        })
    }

    /// 注入预解析地址，命中的域名抓取时不再做DNS查询
    pub fn with_address_cache(self, addresses: HashMap<String, Vec<IpAddr>>) -> Self {
        for (domain, addrs) in addresses {
            if !addrs.is_empty() {
                self.addresses.insert(domain, addrs);
            }
        }
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback, interval: Duration) -> Self {
        self.progress = Some((callback, interval));
        self
    }

    pub fn stats(&self) -> Arc<CrawlStats> {
        self.shared.stats.clone()
    }

    /// 本次运行中在HTTP层判定死亡的域名（含两阶段探测）
    pub fn http_dead_domains(&self) -> Vec<HttpDeadDomain> {
        self.shared.guard.http_dead_domains()
    }

    /// 执行抓取
    ///
    /// 取消后停止派发新URL，进行中的请求由各自的超时约束；返回前总会落盘已缓冲的结果
    ///
    /// # 参数
    ///
    /// * `seeds` - 种子列表
    /// * `skip` - 已完成的URL集合（断点续传）
    /// * `dead` - 预先判定死亡的域名
    /// * `token` - 取消信号
    ///
    /// # 返回值
    ///
    /// * `Ok(())` - 运行结束（包括被取消）
    /// * `Err(EngineError)` - 结果写入失败等引擎级错误
    #[instrument(skip_all, fields(seeds = seeds.len(), mode = self.shared.config.fetch_mode.as_str()))]
    pub async fn run(
        &self,
        seeds: &[Seed],
        skip: &HashSet<String>,
        dead: &HashMap<String, DeadReason>,
        token: &CancellationToken,
    ) -> Result<(), EngineError> {
        let shared = self.shared.clone();
        shared.guard.preload(dead);
        shared.stats.set_total(seeds.len() as u64);

        let mut by_domain: HashMap<String, Vec<Seed>> = HashMap::new();
        let mut resumed = 0u64;
        for seed in seeds {
            if skip.contains(&seed.url) {
                resumed += 1;
                continue;
            }
            by_domain
                .entry(seed.domain.clone())
                .or_default()
                .push(seed.clone());
        }
        shared.stats.record_resumed(resumed);

        let pending = seeds.len() - resumed as usize;
        info!(
            "Fetching {} URLs across {} domains ({} resumed)",
            pending,
            by_domain.len(),
            resumed
        );
        if pending == 0 {
            return Ok(());
        }

        let mut domains: Vec<String> = by_domain.keys().cloned().collect();
        domains.shuffle(&mut rand::rng());

        let run_token = token.child_token();
        let reporter = self.progress.clone().map(|(callback, interval)| {
            let stats = shared.stats.clone();
            spawn_progress_reporter(
                Phase::Fetch,
                interval,
                run_token.child_token(),
                move || stats.progress_counts(),
                callback,
            )
        });

        let capacity = (shared.config.workers * 4).min(pending).max(1);
        let (tx, rx) = flume::bounded::<Seed>(capacity);

        let mut tasks: JoinSet<Result<(), EngineError>> = JoinSet::new();
        {
            let shared = shared.clone();
            let token = run_token.clone();
            let progress = self.progress.clone();
            tasks.spawn(async move { feed(shared, domains, by_domain, tx, progress, token).await });
        }

        let workers = shared.config.workers.min(pending).max(1);
        for _ in 0..workers {
            let shared = shared.clone();
            let rx = rx.clone();
            let token = run_token.clone();
            tasks.spawn(async move { worker_loop(shared, rx, token).await });
        }
        drop(rx);
        debug!("Spawned {} fetch workers", workers);

        let mut first_error: Option<EngineError> = None;
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined
                .unwrap_or_else(|e| Err(EngineError::Other(format!("fetch task failed: {}", e))));
            if let Err(e) = outcome {
                error!("Fetch pipeline error: {}", e);
                run_token.cancel();
                first_error.get_or_insert(e);
            }
        }

        run_token.cancel();
        if let Some(handle) = reporter {
            let _ = handle.await;
        }

        if let Err(e) = shared.store.flush().await {
            error!("Failed to flush results: {}", e);
            first_error.get_or_insert(EngineError::ResultStore(e));
        }

        let snapshot = shared.stats.snapshot();
        info!(
            "Fetch finished: fetched={}, errored={}, skipped_dead={}, resumed={}, domains_killed={}{}",
            snapshot.fetched,
            snapshot.errored,
            snapshot.skipped_dead_domain,
            snapshot.skipped_resumed,
            snapshot.domains_killed,
            if token.is_cancelled() { " (cancelled)" } else { "" }
        );

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

async fn worker_loop(
    shared: Arc<EngineShared>,
    rx: flume::Receiver<Seed>,
    token: CancellationToken,
) -> Result<(), EngineError> {
    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            seed = rx.recv_async() => seed.ok(),
        };
        let Some(seed) = next else {
            return Ok(());
        };
        shared.process(seed, &token).await?;
    }
}

/// 投喂任务：写入死亡域名的跳过记录，再按域名轮转把URL送入队列
///
/// 两阶段模式下域名探测与派发并行，探测通过的域名立即加入轮转
async fn feed(
    shared: Arc<EngineShared>,
    domains: Vec<String>,
    mut by_domain: HashMap<String, Vec<Seed>>,
    tx: flume::Sender<Seed>,
    progress: Option<(ProgressCallback, Duration)>,
    token: CancellationToken,
) -> Result<(), EngineError> {
    let mode = shared.strategy.mode();
    let mut live = Vec::with_capacity(domains.len());
    let mut skipped = Vec::new();

    for domain in domains {
        let Some(seeds) = by_domain.remove(&domain) else {
            continue;
        };
        let Some(reason) = shared.guard.dead_reason(&domain) else {
            live.push((domain, seeds));
            continue;
        };
        skipped.extend(seeds.iter().map(|s| FetchResult::skipped(s, reason, mode)));
        if skipped.len() >= SKIP_BATCH {
            shared.write_skips(std::mem::take(&mut skipped)).await?;
        }
    }
    shared.write_skips(skipped).await?;

    if !shared.config.two_pass || token.is_cancelled() {
        let queues = live.into_iter().map(|(_, seeds)| seeds.into_iter()).collect();
        dispatch(tx, queues, None, &token).await;
        return Ok(());
    }

    let (live_tx, live_rx) = mpsc::unbounded_channel();
    tokio::try_join!(
        probe_domains(&shared, live, live_tx, progress, &token),
        async {
            dispatch(tx, Vec::new(), Some(live_rx), &token).await;
            Ok::<(), EngineError>(())
        },
    )?;
    Ok(())
}

/// 按域名轮转派发URL，每轮从每个域名各取一个，避免大域名在其并发限制后面排队
///
/// `arrivals` 不为空时持续接收新加入的域名，直到发送端关闭且所有队列耗尽
async fn dispatch(
    tx: flume::Sender<Seed>,
    mut queues: Vec<std::vec::IntoIter<Seed>>,
    mut arrivals: Option<mpsc::UnboundedReceiver<Vec<Seed>>>,
    token: &CancellationToken,
) {
    loop {
        let mut closed = false;
        if let Some(rx) = arrivals.as_mut() {
            loop {
                match rx.try_recv() {
                    Ok(seeds) => queues.push(seeds.into_iter()),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        closed = true;
                        break;
                    }
                }
            }
        }
        if closed {
            arrivals = None;
        }

        if queues.is_empty() {
            let Some(rx) = arrivals.as_mut() else {
                return;
            };
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                next = rx.recv() => match next {
                    Some(seeds) => queues.push(seeds.into_iter()),
                    None => return,
                },
            }
            continue;
        }

        let mut next_round = Vec::with_capacity(queues.len());
        for mut queue in queues {
            let Some(seed) = queue.next() else {
                continue;
            };
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                sent = tx.send_async(seed) => {
                    if sent.is_err() {
                        return;
                    }
                }
            }
            next_round.push(queue);
        }
        queues = next_round;
    }
}

/// 两阶段模式：每个域名先发一次探测，可达域名的URL交给派发任务，不可达的整体跳过
async fn probe_domains(
    shared: &Arc<EngineShared>,
    targets: Vec<(String, Vec<Seed>)>,
    live_tx: mpsc::UnboundedSender<Vec<Seed>>,
    progress: Option<(ProgressCallback, Duration)>,
    token: &CancellationToken,
) -> Result<(), EngineError> {
    let timeout = shared.config.probe_timeout();
    info!("Probing {} domains ahead of their URLs", targets.len());

    let total = targets.len() as u64;
    let probed = Arc::new(AtomicU64::new(0));
    let unreachable = Arc::new(AtomicU64::new(0));
    let reporter_token = token.child_token();
    let reporter = progress.map(|(callback, interval)| {
        let probed = probed.clone();
        let unreachable = unreachable.clone();
        spawn_progress_reporter(
            Phase::Probe,
            interval,
            reporter_token.clone(),
            move || {
                let done = probed.load(Ordering::Relaxed);
                let dead = unreachable.load(Ordering::Relaxed);
                ProgressCounts {
                    done,
                    total,
                    live: done.saturating_sub(dead),
                    dead,
                    timeout: 0,
                }
            },
            callback,
        )
    });

    let mut outcomes = pin!(stream::iter(targets)
        .map(|(domain, seeds)| {
            let shared = shared.clone();
            let token = token.clone();
            let probed = probed.clone();
            let unreachable = unreachable.clone();
            async move {
                if token.is_cancelled() {
                    return None;
                }
                let url = seeds.first()?.url.clone();
                let client = shared.transports.client_for(&domain);
                let reachable = probe(client, &url, timeout).await.is_reachable();
                shared.stats.record_probe(reachable);
                if !reachable {
                    unreachable.fetch_add(1, Ordering::Relaxed);
                }
                probed.fetch_add(1, Ordering::Relaxed);
                Some((domain, seeds, reachable))
            }
        })
        .buffer_unordered(shared.config.workers.max(1)));

    let mode = shared.strategy.mode();
    let mut alive = 0usize;
    let mut skipped_urls = 0usize;
    let written = async {
        let mut skipped = Vec::new();
        while let Some(outcome) = outcomes.next().await {
            let Some((domain, seeds, reachable)) = outcome else {
                continue;
            };
            if reachable {
                alive += 1;
                // 派发任务已退出时直接丢弃
                let _ = live_tx.send(seeds);
                continue;
            }

            if shared
                .guard
                .mark_dead(&domain, DeadReason::ProbeUnreachable, 1)
            {
                shared.stats.record_domain_killed(DeadReason::ProbeUnreachable);
            }
            for seed in &seeds {
                shared.guard.note_skip(&domain);
                skipped.push(FetchResult::skipped(seed, DeadReason::ProbeUnreachable, mode));
            }
            if skipped.len() >= SKIP_BATCH {
                skipped_urls += skipped.len();
                shared.write_skips(std::mem::take(&mut skipped)).await?;
            }
        }
        skipped_urls += skipped.len();
        shared.write_skips(skipped).await
    }
    .await;
    drop(live_tx);

    reporter_token.cancel();
    if let Some(handle) = reporter {
        let _ = handle.await;
    }

    if skipped_urls > 0 {
        warn!(
            "Probe marked {} URLs unreachable, {} domains alive",
            skipped_urls, alive
        );
    }
    written
}

#[cfg(test)]
#[path = "recrawl_engine_test.rs"]
mod tests;
