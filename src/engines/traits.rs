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
use std::error::Error as StdError;
use thiserror::Error;

use crate::domain::models::fetch_result::{ErrorClass, FetchMode, FetchResult};
use crate::domain::models::seed::Seed;
use crate::utils::errors::RepositoryError;
use crate::utils::url_utils::truncate_message;

/// 错误信息最大长度
pub const MAX_ERROR_LEN: usize = 200;

/// 引擎错误类型
///
/// 只表示引擎自身无法继续运行的情况，单个URL的失败以 `FetchResult` 记录
#[derive(Error, Debug)]
pub enum EngineError {
    /// HTTP客户端构建失败
    #[error("Client build failed: {0}")]
    ClientBuild(#[from] reqwest::Error),
    /// 结果写入失败
    #[error("Result store failed: {0}")]
    ResultStore(#[from] RepositoryError),
    /// 配置无效
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    /// 其他错误
    #[error("Other error: {0}")]
    Other(String),
}

/// 抓取策略特质
///
/// 抓取模式在一次运行中固定不变，引擎构造时选定一个策略实例
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    /// 抓取一个种子URL
    ///
    /// 永远返回一条结果，请求失败也以 `Errored` 结局记录
    async fn fetch(&self, client: &reqwest::Client, seed: &Seed) -> FetchResult;

    /// 策略对应的抓取模式
    fn mode(&self) -> FetchMode;

    /// 策略名称
    fn name(&self) -> &'static str {
        self.mode().as_str()
    }
}

/// 把reqwest错误归类为持久化的错误类别
pub fn classify_error(err: &reqwest::Error) -> ErrorClass {
    if err.is_timeout() {
        return ErrorClass::Timeout;
    }
    if err.is_redirect() {
        return ErrorClass::Redirect;
    }
    if err.is_body() || err.is_decode() {
        return ErrorClass::Body;
    }

    let chain = error_chain(err).to_ascii_lowercase();
    if chain.contains("dns error")
        || chain.contains("failed to lookup address")
        || chain.contains("no such host")
    {
        return ErrorClass::Dns;
    }
    if chain.contains("timed out") {
        return ErrorClass::Timeout;
    }
    if err.is_connect()
        || chain.contains("connection refused")
        || chain.contains("connection reset")
        || chain.contains("unreachable")
    {
        return ErrorClass::Connect;
    }
    ErrorClass::Request
}

/// 拼接完整错误链，底层原因往往才包含有用的信息
pub fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

/// 截断后的错误信息
pub fn error_message(err: &reqwest::Error) -> String {
    truncate_message(&error_chain(err), MAX_ERROR_LEN)
}
