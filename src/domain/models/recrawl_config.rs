// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::path::PathBuf;
use std::time::Duration;

use crate::domain::models::fetch_result::FetchMode;

/// 重爬运行配置
///
/// 由调用方构造一次，之后只读。引擎组件只从中派生自己的计数器，不会回写
#[derive(Debug, Clone)]
pub struct RecrawlConfig {
    /// HTTP抓取并发数
    pub workers: usize,
    /// DNS解析并发数（与抓取并发数相互独立）
    pub dns_workers: usize,
    /// 单次DNS查询超时
    pub dns_timeout: Duration,
    /// 单个HTTP请求超时
    pub http_timeout: Duration,
    pub fetch_mode: FetchMode,
    /// 每个结果分片累计多少条记录后落盘
    pub batch_size: usize,
    pub resume: bool,
    pub dns_prefetch: bool,
    /// HTTP连接池分片数
    pub transport_shards: usize,
    pub two_pass: bool,
    pub user_agent: String,
    /// 结果存储分片数
    pub result_shards: usize,
    /// 域名连续失败多少次后跳过其剩余URL
    pub domain_fail_threshold: u32,
    /// 单个域名的最大并发连接数
    pub max_conns_per_domain: usize,
    /// Full模式下读取响应体的上限
    pub max_body_bytes: usize,
    /// 缓存中的Live域名需要多少次HTTP失败才降级为Dead
    pub live_downgrade_failures: u32,
    /// 是否在下次运行时重新解析超时的域名
    pub dns_retry_timeouts: bool,
    /// 结果存储目录
    pub result_dir: PathBuf,
    /// 域名健康缓存文件
    pub dns_cache_path: PathBuf,
}

impl Default for RecrawlConfig {
    fn default() -> Self {
        Self {
            workers: 2000,
            dns_workers: 2000,
            dns_timeout: Duration::from_secs(2),
            http_timeout: Duration::from_secs(3),
            fetch_mode: FetchMode::Full,
            batch_size: 5000,
            resume: false,
            dns_prefetch: true,
            transport_shards: 1,
            two_pass: false,
            user_agent: "recrawlrs/1.0".to_string(),
            result_shards: 8,
            domain_fail_threshold: 2,
            max_conns_per_domain: 8,
            max_body_bytes: 512 * 1024,
            live_downgrade_failures: 3,
            dns_retry_timeouts: false,
            result_dir: PathBuf::from("./recrawl"),
            dns_cache_path: PathBuf::from("./recrawl/dns_cache.db"),
        }
    }
}

impl RecrawlConfig {
    /// 将零值替换为默认值
    pub fn normalized(mut self) -> Self {
        let defaults = RecrawlConfig::default();
        if self.workers == 0 {
            self.workers = defaults.workers;
        }
        if self.dns_workers == 0 {
            self.dns_workers = defaults.dns_workers;
        }
        if self.dns_timeout.is_zero() {
            self.dns_timeout = defaults.dns_timeout;
        }
        if self.http_timeout.is_zero() {
            self.http_timeout = defaults.http_timeout;
        }
        if self.batch_size == 0 {
            self.batch_size = defaults.batch_size;
        }
        if self.transport_shards == 0 {
            self.transport_shards = defaults.transport_shards;
        }
        if self.result_shards == 0 {
            self.result_shards = defaults.result_shards;
        }
        if self.domain_fail_threshold == 0 {
            self.domain_fail_threshold = defaults.domain_fail_threshold;
        }
        if self.max_conns_per_domain == 0 {
            self.max_conns_per_domain = defaults.max_conns_per_domain;
        }
        if self.max_body_bytes == 0 {
            self.max_body_bytes = defaults.max_body_bytes;
        }
        if self.live_downgrade_failures == 0 {
            self.live_downgrade_failures = defaults.live_downgrade_failures;
        }
        if self.user_agent.trim().is_empty() {
            self.user_agent = defaults.user_agent;
        }
        self
    }

    /// 两阶段模式下探测请求的超时
    pub fn probe_timeout(&self) -> Duration {
        self.http_timeout.min(Duration::from_secs(3))
    }
}
