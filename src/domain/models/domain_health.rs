// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// 域名健康状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainStatus {
    /// 解析到至少一个地址
    Live,
    /// 确定性的解析失败，或HTTP层判定不可达
    Dead,
    /// 解析超时，可能只是暂时的网络状况
    Timeout,
}

impl DomainStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DomainStatus::Live => "live",
            DomainStatus::Dead => "dead",
            DomainStatus::Timeout => "timeout",
        }
    }
}

impl fmt::Display for DomainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DomainStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "live" => Ok(DomainStatus::Live),
            "dead" => Ok(DomainStatus::Dead),
            "timeout" => Ok(DomainStatus::Timeout),
            other => Err(format!("unknown domain status: {}", other)),
        }
    }
}

/// 缓存查询结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Live,
    Dead,
    Timeout,
    Unknown,
}

impl From<DomainStatus> for Classification {
    fn from(status: DomainStatus) -> Self {
        match status {
            DomainStatus::Live => Classification::Live,
            DomainStatus::Dead => Classification::Dead,
            DomainStatus::Timeout => Classification::Timeout,
        }
    }
}

/// 域名被判定为死亡的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadReason {
    /// DNS返回不存在
    DnsNxdomain,
    /// DNS解析出现其他确定性错误
    DnsError,
    /// DNS解析超时
    DnsTimeout,
    /// HTTP连接被拒绝或重置
    HttpRefused,
    /// HTTP请求时域名解析失败
    HttpDnsError,
    /// 连续失败次数超过阈值
    HttpFailures,
    /// 两阶段模式下探测失败
    ProbeUnreachable,
}

impl DeadReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeadReason::DnsNxdomain => "dns_nxdomain",
            DeadReason::DnsError => "dns_error",
            DeadReason::DnsTimeout => "dns_timeout",
            DeadReason::HttpRefused => "http_refused",
            DeadReason::HttpDnsError => "http_dns_error",
            DeadReason::HttpFailures => "http_failures",
            DeadReason::ProbeUnreachable => "probe_unreachable",
        }
    }

    /// 原因是否来自DNS层（DNS结论可以直接降级Live域名）
    pub fn is_dns(&self) -> bool {
        matches!(
            self,
            DeadReason::DnsNxdomain
                | DeadReason::DnsError
                | DeadReason::DnsTimeout
                | DeadReason::HttpDnsError
        )
    }
}

impl fmt::Display for DeadReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeadReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dns_nxdomain" => Ok(DeadReason::DnsNxdomain),
            "dns_error" => Ok(DeadReason::DnsError),
            "dns_timeout" => Ok(DeadReason::DnsTimeout),
            "http_refused" => Ok(DeadReason::HttpRefused),
            "http_dns_error" => Ok(DeadReason::HttpDnsError),
            "http_failures" => Ok(DeadReason::HttpFailures),
            "probe_unreachable" => Ok(DeadReason::ProbeUnreachable),
            other => Err(format!("unknown dead reason: {}", other)),
        }
    }
}

/// 域名健康条目
///
/// 以域名为键跨运行持久化，由DNS阶段写入，并在运行结束时合并HTTP层发现的死亡域名
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainHealthEntry {
    pub domain: String,
    pub addresses: Vec<IpAddr>,
    pub status: DomainStatus,
    /// 死亡或超时的原因，Live条目为 `None`
    pub reason: Option<DeadReason>,
    /// 支撑Dead结论的HTTP层失败次数，DNS结论为0
    pub failure_count: u32,
    pub resolved_at: DateTime<Utc>,
}

impl DomainHealthEntry {
    pub fn live(domain: impl Into<String>, addresses: Vec<IpAddr>) -> Self {
        Self {
            domain: domain.into(),
            addresses,
            status: DomainStatus::Live,
            reason: None,
            failure_count: 0,
            resolved_at: Utc::now(),
        }
    }

    pub fn dead(domain: impl Into<String>, reason: DeadReason, failure_count: u32) -> Self {
        Self {
            domain: domain.into(),
            addresses: Vec::new(),
            status: DomainStatus::Dead,
            reason: Some(reason),
            failure_count,
            resolved_at: Utc::now(),
        }
    }

    pub fn timeout(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            addresses: Vec::new(),
            status: DomainStatus::Timeout,
            reason: Some(DeadReason::DnsTimeout),
            failure_count: 0,
            resolved_at: Utc::now(),
        }
    }

    /// 该条目在本次运行中应被视为不可达时返回对应原因
    pub fn skip_reason(&self) -> Option<DeadReason> {
        match self.status {
            DomainStatus::Live => None,
            DomainStatus::Dead => Some(self.reason.unwrap_or(DeadReason::DnsNxdomain)),
            DomainStatus::Timeout => Some(DeadReason::DnsTimeout),
        }
    }
}

/// 失败域名记录，用于审计一次运行中放弃了哪些域名
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedDomain {
    pub domain: String,
    pub reason: DeadReason,
    /// 受影响的URL数量
    pub url_count: u64,
    /// 判定发生的阶段，如 `dns_batch`、`probe`、`http_worker`
    pub stage: String,
}
