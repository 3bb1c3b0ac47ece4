// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use hickory_resolver::config::ResolverOpts;
use hickory_resolver::TokioResolver;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::lookup_host;

use crate::utils::url_utils::truncate_message;

const MAX_ERROR_LEN: usize = 200;

/// 域名解析错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// 域名不存在或没有任何地址记录
    #[error("no such host")]
    NotFound,

    /// 解析超时
    #[error("lookup timed out")]
    Timeout,

    /// 其他解析失败
    #[error("lookup failed: {0}")]
    Failed(String),
}

/// 域名解析后端
#[async_trait]
pub trait DomainResolver: Send + Sync {
    /// 解析域名的全部地址
    ///
    /// 返回空列表与 `NotFound` 同义
    async fn lookup(&self, domain: &str) -> Result<Vec<IpAddr>, LookupError>;

    /// 后端名称
    fn name(&self) -> &'static str;
}

/// 可选的解析后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolverBackend {
    #[default]
    Hickory,
    System,
}

impl fmt::Display for ResolverBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolverBackend::Hickory => f.write_str("hickory"),
            ResolverBackend::System => f.write_str("system"),
        }
    }
}

impl FromStr for ResolverBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hickory" => Ok(ResolverBackend::Hickory),
            "system" => Ok(ResolverBackend::System),
            other => Err(format!("unknown resolver backend: {}", other)),
        }
    }
}

/// 根据配置创建解析后端
pub fn build_resolver(
    backend: ResolverBackend,
    timeout: Duration,
) -> Result<Arc<dyn DomainResolver>, LookupError> {
    match backend {
        ResolverBackend::Hickory => Ok(Arc::new(HickoryDomainResolver::new(timeout)?)),
        ResolverBackend::System => Ok(Arc::new(SystemDomainResolver)),
    }
}

/// 基于hickory的异步解析器
///
/// 读取系统的上游配置，但只尝试一次且不追加搜索域，失败要快
pub struct HickoryDomainResolver {
    resolver: TokioResolver,
}

impl HickoryDomainResolver {
    pub fn new(timeout: Duration) -> Result<Self, LookupError> {
        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;
        opts.attempts = 1;
        opts.ndots = 0;

        let resolver = TokioResolver::builder_tokio()
            .map_err(|e| LookupError::Failed(format!("failed to create resolver: {}", e)))?
            .with_options(opts)
            .build();

        Ok(Self { resolver })
    }
}

#[async_trait]
impl DomainResolver for HickoryDomainResolver {
    async fn lookup(&self, domain: &str) -> Result<Vec<IpAddr>, LookupError> {
        // 末尾加点表示完全限定名，避免追加搜索域
        let fqdn = format!("{}.", domain.trim_end_matches('.'));
        match self.resolver.lookup_ip(fqdn.as_str()).await {
            Ok(lookup) => {
                let addrs: Vec<IpAddr> = lookup.iter().collect();
                if addrs.is_empty() {
                    Err(LookupError::NotFound)
                } else {
                    Ok(addrs)
                }
            }
            Err(e) if e.is_nx_domain() || e.is_no_records_found() => Err(LookupError::NotFound),
            Err(e) => {
                let message = e.to_string();
                if message.contains("timed out") || message.contains("timeout") {
                    Err(LookupError::Timeout)
                } else {
                    Err(LookupError::Failed(truncate_message(&message, MAX_ERROR_LEN)))
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "hickory"
    }
}

/// 使用操作系统解析器（getaddrinfo）的后端
pub struct SystemDomainResolver;

#[async_trait]
impl DomainResolver for SystemDomainResolver {
    async fn lookup(&self, domain: &str) -> Result<Vec<IpAddr>, LookupError> {
        match lookup_host((domain, 0)).await {
            Ok(addrs) => {
                let mut ips: Vec<IpAddr> = Vec::new();
                for addr in addrs {
                    if !ips.contains(&addr.ip()) {
                        ips.push(addr.ip());
                    }
                }
                if ips.is_empty() {
                    Err(LookupError::NotFound)
                } else {
                    Ok(ips)
                }
            }
            Err(e) => {
                let message = e.to_string();
                if is_not_found_message(&message) {
                    Err(LookupError::NotFound)
                } else if e.kind() == std::io::ErrorKind::TimedOut {
                    Err(LookupError::Timeout)
                } else {
                    Err(LookupError::Failed(truncate_message(&message, MAX_ERROR_LEN)))
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "system"
    }
}

fn is_not_found_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("name or service not known")
        || lower.contains("nodename nor servname")
        || lower.contains("no address associated")
        || lower.contains("no such host")
}
