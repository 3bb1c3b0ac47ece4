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

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::dns::resolver::ResolverBackend;
use crate::domain::models::fetch_result::FetchMode;
use crate::domain::models::recrawl_config::RecrawlConfig;

/// 配置错误
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("配置加载失败: {0}")]
    Load(#[from] ConfigError),

    #[error("无效配置 {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// 应用程序配置设置
///
/// 包含抓取、DNS、存储、种子来源和指标导出等所有配置项
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// 抓取配置
    pub recrawl: RecrawlSettings,
    /// DNS配置
    pub dns: DnsSettings,
    /// 结果存储配置
    pub storage: StorageSettings,
    /// 种子来源配置
    pub seeds: SeedSettings,
    /// 指标导出配置
    pub metrics: MetricsSettings,
}

/// 抓取配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct RecrawlSettings {
    /// HTTP抓取并发数
    pub workers: usize,
    /// 单个HTTP请求超时（毫秒）
    pub http_timeout_ms: u64,
    /// 抓取模式 (full, head-only, status-only)
    pub fetch_mode: String,
    /// 每个结果分片的批量写入大小
    pub batch_size: usize,
    pub resume: bool,
    pub two_pass: bool,
    /// HTTP连接池分片数
    pub transport_shards: usize,
    pub user_agent: String,
    /// 域名连续失败多少次后跳过
    pub domain_fail_threshold: u32,
    pub max_conns_per_domain: usize,
    /// Full模式响应体上限（字节）
    pub max_body_bytes: usize,
    /// 缓存中Live域名降级为Dead所需的HTTP失败次数
    pub live_downgrade_failures: u32,
}

/// DNS配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct DnsSettings {
    /// 是否在抓取前批量预解析
    pub prefetch: bool,
    /// 解析后端 (hickory, system)
    pub backend: String,
    /// 解析并发数
    pub workers: usize,
    /// 单次解析超时（毫秒）
    pub timeout_ms: u64,
    /// 是否重新解析上次超时的域名
    pub retry_timeouts: bool,
    /// 域名健康缓存文件路径
    pub cache_path: String,
}

/// 存储配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// 结果存储目录
    pub result_dir: String,
    /// 结果分片数
    pub result_shards: usize,
}

/// 种子来源配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct SeedSettings {
    /// 种子文件所在目录
    pub base_dir: String,
    /// 默认种子文件
    pub path: Option<String>,
}

/// 指标导出配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsSettings {
    pub enabled: bool,
    /// Prometheus导出监听地址
    pub listen: String,
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 依次读取默认值、`config/default`、`config/{APP_ENVIRONMENT}` 和
    /// `RECRAWLRS__` 前缀的环境变量
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(SettingsError)` - 配置加载失败
    pub fn new() -> Result<Self, SettingsError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        let builder = Self::with_defaults(Config::builder())?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("RECRAWLRS").separator("__"));

        Ok(builder.build()?.try_deserialize()?)
    }

    /// 只使用内置默认值
    pub fn defaults() -> Result<Self, SettingsError> {
        Ok(Self::with_defaults(Config::builder())?
            .build()?
            .try_deserialize()?)
    }

    fn with_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        let defaults = RecrawlConfig::default();
        builder
            // Recrawl settings
            .set_default("recrawl.workers", defaults.workers as u64)?
            .set_default(
                "recrawl.http_timeout_ms",
                defaults.http_timeout.as_millis() as u64,
            )?
            .set_default("recrawl.fetch_mode", defaults.fetch_mode.as_str())?
            .set_default("recrawl.batch_size", defaults.batch_size as u64)?
            .set_default("recrawl.resume", defaults.resume)?
            .set_default("recrawl.two_pass", defaults.two_pass)?
            .set_default("recrawl.transport_shards", defaults.transport_shards as u64)?
            .set_default("recrawl.user_agent", defaults.user_agent.clone())?
            .set_default(
                "recrawl.domain_fail_threshold",
                defaults.domain_fail_threshold as u64,
            )?
            .set_default(
                "recrawl.max_conns_per_domain",
                defaults.max_conns_per_domain as u64,
            )?
            .set_default("recrawl.max_body_bytes", defaults.max_body_bytes as u64)?
            .set_default(
                "recrawl.live_downgrade_failures",
                defaults.live_downgrade_failures as u64,
            )?
            // DNS settings
            .set_default("dns.prefetch", defaults.dns_prefetch)?
            .set_default("dns.backend", ResolverBackend::default().to_string())?
            .set_default("dns.workers", defaults.dns_workers as u64)?
            .set_default("dns.timeout_ms", defaults.dns_timeout.as_millis() as u64)?
            .set_default("dns.retry_timeouts", defaults.dns_retry_timeouts)?
            .set_default(
                "dns.cache_path",
                defaults.dns_cache_path.to_string_lossy().to_string(),
            )?
            // Storage settings
            .set_default(
                "storage.result_dir",
                defaults.result_dir.to_string_lossy().to_string(),
            )?
            .set_default("storage.result_shards", defaults.result_shards as u64)?
            // Seed settings
            .set_default("seeds.base_dir", ".")?
            // Metrics settings
            .set_default("metrics.enabled", false)?
            .set_default("metrics.listen", "127.0.0.1:9464")
    }

    /// 解析后端
    pub fn resolver_backend(&self) -> Result<ResolverBackend, SettingsError> {
        self.dns
            .backend
            .parse::<ResolverBackend>()
            .map_err(|message| SettingsError::Invalid {
                key: "dns.backend",
                message,
            })
    }

    /// 转换为一次运行的不可变配置
    pub fn recrawl_config(&self) -> Result<RecrawlConfig, SettingsError> {
        let fetch_mode = self
            .recrawl
            .fetch_mode
            .parse::<FetchMode>()
            .map_err(|message| SettingsError::Invalid {
                key: "recrawl.fetch_mode",
                message,
            })?;

        let config = RecrawlConfig {
            workers: self.recrawl.workers,
            dns_workers: self.dns.workers,
            dns_timeout: Duration::from_millis(self.dns.timeout_ms),
            http_timeout: Duration::from_millis(self.recrawl.http_timeout_ms),
            fetch_mode,
            batch_size: self.recrawl.batch_size,
            resume: self.recrawl.resume,
            dns_prefetch: self.dns.prefetch,
            transport_shards: self.recrawl.transport_shards,
            two_pass: self.recrawl.two_pass,
            user_agent: self.recrawl.user_agent.clone(),
            result_shards: self.storage.result_shards,
            domain_fail_threshold: self.recrawl.domain_fail_threshold,
            max_conns_per_domain: self.recrawl.max_conns_per_domain,
            max_body_bytes: self.recrawl.max_body_bytes,
            live_downgrade_failures: self.recrawl.live_downgrade_failures,
            dns_retry_timeouts: self.dns.retry_timeouts,
            result_dir: PathBuf::from(&self.storage.result_dir),
            dns_cache_path: PathBuf::from(&self.dns.cache_path),
        };
        Ok(config.normalized())
    }
}

#[cfg(test)]
#[path = "settings_test.rs"]
mod tests;
