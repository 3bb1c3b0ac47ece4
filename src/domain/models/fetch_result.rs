// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::models::domain_health::DeadReason;
use crate::domain::models::seed::Seed;

/// 抓取模式，每次运行选择一次
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchMode {
    /// GET并读取响应体（有大小上限）
    #[default]
    Full,
    /// 只发送HEAD请求
    HeadOnly,
    /// GET但在拿到状态行和响应头后立即丢弃响应体
    StatusOnly,
}

impl FetchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchMode::Full => "full",
            FetchMode::HeadOnly => "head-only",
            FetchMode::StatusOnly => "status-only",
        }
    }
}

impl fmt::Display for FetchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FetchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "full" => Ok(FetchMode::Full),
            "head-only" | "head" => Ok(FetchMode::HeadOnly),
            "status-only" | "status" => Ok(FetchMode::StatusOnly),
            other => Err(format!("unknown fetch mode: {}", other)),
        }
    }
}

/// 单个URL失败的错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// 请求超时
    Timeout,
    /// 连接被拒绝、重置或不可路由
    Connect,
    /// 请求阶段的域名解析失败
    Dns,
    /// 重定向次数过多或重定向无效
    Redirect,
    /// 读取响应体失败
    Body,
    /// 其他传输层错误
    Request,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Timeout => "timeout",
            ErrorClass::Connect => "connect",
            ErrorClass::Dns => "dns",
            ErrorClass::Redirect => "redirect",
            ErrorClass::Body => "body",
            ErrorClass::Request => "request",
        }
    }

    /// 是否计入域名连续失败次数
    pub fn counts_against_domain(&self) -> bool {
        matches!(self, ErrorClass::Timeout | ErrorClass::Connect | ErrorClass::Dns)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "timeout" => Ok(ErrorClass::Timeout),
            "connect" => Ok(ErrorClass::Connect),
            "dns" => Ok(ErrorClass::Dns),
            "redirect" => Ok(ErrorClass::Redirect),
            "body" => Ok(ErrorClass::Body),
            "request" => Ok(ErrorClass::Request),
            other => Err(format!("unknown error class: {}", other)),
        }
    }
}

/// 持久化的抓取结局
///
/// 因断点续传而跳过的URL不会产生新的记录，只计入统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchOutcome {
    /// 收到HTTP响应（2xx-5xx都算数据）
    Fetched,
    /// 请求失败
    Errored,
    /// 域名已被判定死亡，没有发起任何网络请求
    SkippedDeadDomain,
}

impl FetchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchOutcome::Fetched => "fetched",
            FetchOutcome::Errored => "errored",
            FetchOutcome::SkippedDeadDomain => "skipped_dead_domain",
        }
    }
}

impl FromStr for FetchOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fetched" => Ok(FetchOutcome::Fetched),
            "errored" => Ok(FetchOutcome::Errored),
            "skipped_dead_domain" => Ok(FetchOutcome::SkippedDeadDomain),
            other => Err(format!("unknown fetch outcome: {}", other)),
        }
    }
}

/// 抓取结果
///
/// 每次运行每个URL一条，按URL覆盖写入，不保留历史
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResult {
    pub url: String,
    pub domain: String,
    pub outcome: FetchOutcome,
    /// HTTP状态码，未收到响应时为 `None`
    pub status_code: Option<u16>,
    pub error_class: Option<ErrorClass>,
    /// 截断后的错误信息，跳过时记录死亡原因
    pub error: Option<String>,
    /// 实际读取的响应体字节数
    pub bytes_read: u64,
    /// 响应头声明的长度
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    /// 跟随重定向后的最终URL（与原URL不同时）
    pub redirect_url: Option<String>,
    pub latency_ms: u64,
    pub fetched_at: DateTime<Utc>,
    pub mode: FetchMode,
}

impl FetchResult {
    /// 创建一个因域名死亡而跳过的结果
    pub fn skipped(seed: &Seed, reason: DeadReason, mode: FetchMode) -> Self {
        Self {
            url: seed.url.clone(),
            domain: seed.domain.clone(),
            outcome: FetchOutcome::SkippedDeadDomain,
            status_code: None,
            error_class: None,
            error: Some(reason.as_str().to_string()),
            bytes_read: 0,
            content_length: None,
            content_type: None,
            redirect_url: None,
            latency_ms: 0,
            fetched_at: Utc::now(),
            mode,
        }
    }

    /// 创建一个请求失败的结果
    pub fn errored(
        seed: &Seed,
        class: ErrorClass,
        message: String,
        latency_ms: u64,
        mode: FetchMode,
    ) -> Self {
        Self {
            url: seed.url.clone(),
            domain: seed.domain.clone(),
            outcome: FetchOutcome::Errored,
            status_code: None,
            error_class: Some(class),
            error: Some(message),
            bytes_read: 0,
            content_length: None,
            content_type: None,
            redirect_url: None,
            latency_ms,
            fetched_at: Utc::now(),
            mode,
        }
    }

    /// 状态码类别（2、3、4、5），没有状态码时返回 `None`
    pub fn status_class(&self) -> Option<u16> {
        self.status_code.map(|code| code / 100)
    }
}
