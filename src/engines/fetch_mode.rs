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

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::Response;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::domain::models::fetch_result::{ErrorClass, FetchMode, FetchOutcome, FetchResult};
use crate::domain::models::seed::Seed;
use crate::engines::traits::{classify_error, error_message, FetchStrategy};

const ACCEPT: &str = "text/html,application/xhtml+xml,*/*;q=0.8";

/// 根据抓取模式选择策略
///
/// # 参数
///
/// * `mode` - 抓取模式
/// * `max_body_bytes` - Full模式下读取响应体的上限
pub fn strategy_for(mode: FetchMode, max_body_bytes: usize) -> Arc<dyn FetchStrategy> {
    match mode {
        FetchMode::Full => Arc::new(FullFetch { max_body_bytes }),
        FetchMode::HeadOnly => Arc::new(HeadOnlyFetch),
        FetchMode::StatusOnly => Arc::new(StatusOnlyFetch),
    }
}

/// 从响应头中提取的元数据
struct ResponseMeta {
    status: u16,
    content_type: Option<String>,
    content_length: Option<u64>,
    redirect_url: Option<String>,
}

impl ResponseMeta {
    fn from_response(seed: &Seed, response: &Response) -> Self {
        let headers = response.headers();
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string())
            .filter(|v| !v.trim().is_empty());
        let content_length = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let final_url = response.url().as_str();
        let redirect_url = if final_url != seed.url {
            Some(final_url.to_string())
        } else {
            None
        };

        Self {
            status: response.status().as_u16(),
            content_type,
            content_length,
            redirect_url,
        }
    }

    fn into_result(self, seed: &Seed, bytes_read: u64, started: Instant, mode: FetchMode) -> FetchResult {
        FetchResult {
            url: seed.url.clone(),
            domain: seed.domain.clone(),
            outcome: FetchOutcome::Fetched,
            status_code: Some(self.status),
            error_class: None,
            error: None,
            bytes_read,
            content_length: self.content_length,
            content_type: self.content_type,
            redirect_url: self.redirect_url,
            latency_ms: elapsed_ms(started),
            fetched_at: Utc::now(),
            mode,
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u64::MAX as u128) as u64
}

fn request_failed(seed: &Seed, err: &reqwest::Error, started: Instant, mode: FetchMode) -> FetchResult {
    FetchResult::errored(
        seed,
        classify_error(err),
        error_message(err),
        elapsed_ms(started),
        mode,
    )
}

/// 完整抓取：GET并读取响应体直到上限
pub struct FullFetch {
    pub max_body_bytes: usize,
}

#[async_trait]
impl FetchStrategy for FullFetch {
    async fn fetch(&self, client: &reqwest::Client, seed: &Seed) -> FetchResult {
        let started = Instant::now();
        let mut response = match client
            .get(&seed.url)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return request_failed(seed, &e, started, FetchMode::Full),
        };

        let meta = ResponseMeta::from_response(seed, &response);
        let limit = self.max_body_bytes as u64;
        let mut bytes_read = 0u64;
        let mut body_error = None;

        while bytes_read < limit {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    bytes_read += (chunk.len() as u64).min(limit - bytes_read);
                }
                Ok(None) => break,
                Err(e) => {
                    body_error = Some(e);
                    break;
                }
            }
        }
        drop(response);

        let mut result = meta.into_result(seed, bytes_read, started, FetchMode::Full);
        if let Some(e) = body_error {
            result.outcome = FetchOutcome::Errored;
            result.error_class = Some(match classify_error(&e) {
                ErrorClass::Timeout => ErrorClass::Timeout,
                _ => ErrorClass::Body,
            });
            result.error = Some(error_message(&e));
        }
        result
    }

    fn mode(&self) -> FetchMode {
        FetchMode::Full
    }
}

/// 只发HEAD请求，不读取响应体
pub struct HeadOnlyFetch;

#[async_trait]
impl FetchStrategy for HeadOnlyFetch {
    async fn fetch(&self, client: &reqwest::Client, seed: &Seed) -> FetchResult {
        let started = Instant::now();
        match client.head(&seed.url).send().await {
            Ok(response) => ResponseMeta::from_response(seed, &response).into_result(
                seed,
                0,
                started,
                FetchMode::HeadOnly,
            ),
            Err(e) => request_failed(seed, &e, started, FetchMode::HeadOnly),
        }
    }

    fn mode(&self) -> FetchMode {
        FetchMode::HeadOnly
    }
}

/// GET后拿到状态行和响应头就立即丢弃响应体
pub struct StatusOnlyFetch;

#[async_trait]
impl FetchStrategy for StatusOnlyFetch {
    async fn fetch(&self, client: &reqwest::Client, seed: &Seed) -> FetchResult {
        let started = Instant::now();
        match client
            .get(&seed.url)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .send()
            .await
        {
            Ok(response) => {
                let meta = ResponseMeta::from_response(seed, &response);
                // 丢弃响应会关闭连接，不会把响应体读完
                drop(response);
                meta.into_result(seed, 0, started, FetchMode::StatusOnly)
            }
            Err(e) => request_failed(seed, &e, started, FetchMode::StatusOnly),
        }
    }

    fn mode(&self) -> FetchMode {
        FetchMode::StatusOnly
    }
}

/// 探测结论
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// 收到任意HTTP响应
    Reachable,
    /// 超时，保守地视为可达
    Slow,
    /// 连接失败或域名解析失败
    Unreachable(ErrorClass),
}

impl ProbeOutcome {
    pub fn is_reachable(&self) -> bool {
        !matches!(self, ProbeOutcome::Unreachable(_))
    }
}

/// 用HEAD请求探测域名是否提供HTTP服务
pub async fn probe(client: &reqwest::Client, url: &str, timeout: Duration) -> ProbeOutcome {
    match client.head(url).timeout(timeout).send().await {
        Ok(_) => ProbeOutcome::Reachable,
        Err(e) => match classify_error(&e) {
            ErrorClass::Timeout => ProbeOutcome::Slow,
            class => ProbeOutcome::Unreachable(class),
        },
    }
}

#[cfg(test)]
#[path = "fetch_mode_test.rs"]
mod tests;
