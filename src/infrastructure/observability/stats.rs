// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::counter;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::domain::models::domain_health::DeadReason;
use crate::domain::models::fetch_result::{ErrorClass, FetchOutcome, FetchResult};

/// 进度所属阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Dns,
    Probe,
    Fetch,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Dns => "dns",
            Phase::Probe => "probe",
            Phase::Fetch => "fetch",
        };
        f.write_str(name)
    }
}

/// 传递给展示层的进度数据
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Progress {
    pub phase: Phase,
    pub done: u64,
    pub total: u64,
    pub live: u64,
    pub dead: u64,
    pub timeout: u64,
    /// 最近一个采样周期内的每秒完成数
    pub speed: f64,
    pub elapsed: Duration,
}

/// 进度回调，由调用方提供，引擎不依赖任何展示技术
pub type ProgressCallback = Arc<dyn Fn(Progress) + Send + Sync>;

/// 一次采样得到的原始计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressCounts {
    pub done: u64,
    pub total: u64,
    pub live: u64,
    pub dead: u64,
    pub timeout: u64,
}

/// 滚动吞吐量计算
pub struct ThroughputMeter {
    started: Instant,
    last: Mutex<(Instant, u64)>,
}

impl ThroughputMeter {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            started: now,
            last: Mutex::new((now, 0)),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// 根据当前完成数生成进度，速度取自上一次采样以来的增量
    pub fn progress(&self, phase: Phase, counts: ProgressCounts) -> Progress {
        let now = Instant::now();
        let speed = {
            let mut last = self.last.lock();
            let dt = now.duration_since(last.0).as_secs_f64();
            let delta = counts.done.saturating_sub(last.1);
            let speed = if dt > 0.0 {
                delta as f64 / dt
            } else {
                0.0
            };
            *last = (now, counts.done);
            speed
        };

        Progress {
            phase,
            done: counts.done,
            total: counts.total,
            live: counts.live,
            dead: counts.dead,
            timeout: counts.timeout,
            speed,
            elapsed: now.duration_since(self.started),
        }
    }
}

impl Default for ThroughputMeter {
    fn default() -> Self {
        Self::new()
    }
}

/// 周期性地采样计数并调用进度回调，取消后再发送一次最终进度
pub fn spawn_progress_reporter<F>(
    phase: Phase,
    interval: Duration,
    token: CancellationToken,
    sample: F,
    callback: ProgressCallback,
) -> JoinHandle<()>
where
    F: Fn() -> ProgressCounts + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let meter = ThroughputMeter::new();
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => callback(meter.progress(phase, sample())),
            }
        }
        callback(meter.progress(phase, sample()));
    })
}

/// 抓取阶段统计
///
/// 全部为原子计数，抓取worker只做无阻塞的自增；引擎的任何决策都不依赖这些数值
#[derive(Default)]
pub struct CrawlStats {
    total: AtomicU64,
    attempted: AtomicU64,
    fetched: AtomicU64,
    status_classes: [AtomicU64; 6],
    errored: AtomicU64,
    error_classes: [AtomicU64; 6],
    skipped_dead: AtomicU64,
    skipped_resumed: AtomicU64,
    bytes_read: AtomicU64,
    domains_killed: AtomicU64,
    probes_sent: AtomicU64,
    probes_failed: AtomicU64,
}

fn error_slot(class: ErrorClass) -> usize {
    match class {
        ErrorClass::Timeout => 0,
        ErrorClass::Connect => 1,
        ErrorClass::Dns => 2,
        ErrorClass::Redirect => 3,
        ErrorClass::Body => 4,
        ErrorClass::Request => 5,
    }
}

impl CrawlStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
    }

    /// 即将发起一次网络请求
    pub fn record_attempt(&self) {
        self.attempted.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录一个已写入存储的结果
    pub fn record_result(&self, result: &FetchResult) {
        match result.outcome {
            FetchOutcome::Fetched => {
                self.fetched.fetch_add(1, Ordering::Relaxed);
                self.bytes_read
                    .fetch_add(result.bytes_read, Ordering::Relaxed);
                let class = result.status_class().unwrap_or(0).min(5) as usize;
                self.status_classes[class].fetch_add(1, Ordering::Relaxed);
                counter!("recrawl_fetch_total", "class" => format!("{}xx", class)).increment(1);
            }
            FetchOutcome::Errored => {
                self.errored.fetch_add(1, Ordering::Relaxed);
                let class = result.error_class.unwrap_or(ErrorClass::Request);
                self.error_classes[error_slot(class)].fetch_add(1, Ordering::Release);
                counter!("recrawl_fetch_total", "class" => class.as_str()).increment(1);
            }
            FetchOutcome::SkippedDeadDomain => {
                self.skipped_dead.fetch_add(1, Ordering::Relaxed);
                counter!("recrawl_skipped_total", "reason" => "dead_domain").increment(1);
            }
        }
    }

    /// 因断点续传跳过的URL，不产生存储记录
    pub fn record_resumed(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.skipped_resumed.fetch_add(count, Ordering::Relaxed);
        counter!("recrawl_skipped_total", "reason" => "resumed").increment(count);
    }

    pub fn record_domain_killed(&self, reason: DeadReason) {
        self.domains_killed.fetch_add(1, Ordering::Relaxed);
        counter!("recrawl_domains_killed_total", "reason" => reason.as_str()).increment(1);
    }

    pub fn record_probe(&self, reachable: bool) {
        self.probes_sent.fetch_add(1, Ordering::Relaxed);
        if !reachable {
            self.probes_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn fetched(&self) -> u64 {
        self.fetched.load(Ordering::Relaxed)
    }

    pub fn skipped_resumed(&self) -> u64 {
        self.skipped_resumed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        // 写入顺序是先总数后分类，读取时反过来，保证分类计数不超过总数
        let error_classes: [u64; 6] =
            std::array::from_fn(|i| self.error_classes[i].load(Ordering::Acquire));
        let status_classes: [u64; 6] = std::array::from_fn(|i| load(&self.status_classes[i]));
        StatsSnapshot {
            total: load(&self.total),
            attempted: load(&self.attempted),
            fetched: load(&self.fetched),
            status_2xx: status_classes[2],
            status_3xx: status_classes[3],
            status_4xx: status_classes[4],
            status_5xx: status_classes[5],
            status_other: status_classes[0] + status_classes[1],
            errored: load(&self.errored),
            timeout_errors: error_classes[0],
            connect_errors: error_classes[1],
            dns_errors: error_classes[2],
            redirect_errors: error_classes[3],
            body_errors: error_classes[4],
            request_errors: error_classes[5],
            skipped_dead_domain: load(&self.skipped_dead),
            skipped_resumed: load(&self.skipped_resumed),
            bytes_read: load(&self.bytes_read),
            domains_killed: load(&self.domains_killed),
            probes_sent: load(&self.probes_sent),
            probes_failed: load(&self.probes_failed),
        }
    }

    /// 抓取阶段的进度计数
    pub fn progress_counts(&self) -> ProgressCounts {
        self.snapshot().progress_counts()
    }
}

/// 统计快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub total: u64,
    pub attempted: u64,
    pub fetched: u64,
    pub status_2xx: u64,
    pub status_3xx: u64,
    pub status_4xx: u64,
    pub status_5xx: u64,
    pub status_other: u64,
    pub errored: u64,
    pub timeout_errors: u64,
    pub connect_errors: u64,
    pub dns_errors: u64,
    pub redirect_errors: u64,
    pub body_errors: u64,
    pub request_errors: u64,
    pub skipped_dead_domain: u64,
    pub skipped_resumed: u64,
    pub bytes_read: u64,
    pub domains_killed: u64,
    pub probes_sent: u64,
    pub probes_failed: u64,
}

impl StatsSnapshot {
    /// 已到达终态的URL数量
    pub fn done(&self) -> u64 {
        self.fetched + self.errored + self.skipped_dead_domain + self.skipped_resumed
    }

    pub fn progress_counts(&self) -> ProgressCounts {
        ProgressCounts {
            done: self.done(),
            total: self.total,
            live: self.fetched,
            dead: self.skipped_dead_domain + self.errored.saturating_sub(self.timeout_errors),
            timeout: self.timeout_errors,
        }
    }
}
