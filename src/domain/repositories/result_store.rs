// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::collections::HashSet;

use crate::domain::models::domain_health::FailedDomain;
use crate::domain::models::fetch_result::FetchResult;
use crate::utils::errors::RepositoryError;

/// 抓取结果存储特质
///
/// 写入是缓冲的，只有 `flush`/`close` 或缓冲达到批量大小时才落盘
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// 缓冲写入一批结果
    async fn insert(&self, results: Vec<FetchResult>) -> Result<(), RepositoryError>;

    /// 将所有缓冲中的结果落盘
    async fn flush(&self) -> Result<(), RepositoryError>;

    /// 写入（覆盖）一条运行元数据
    async fn set_meta(&self, key: &str, value: &str) -> Result<(), RepositoryError>;

    /// 扫描所有分片，返回已完成的URL集合
    async fn load_completed_urls(&self) -> Result<HashSet<String>, RepositoryError>;

    /// 记录本次运行放弃的域名
    async fn record_failed_domains(
        &self,
        failures: Vec<FailedDomain>,
    ) -> Result<(), RepositoryError>;

    /// 落盘并关闭存储
    async fn close(&self) -> Result<(), RepositoryError>;

    /// 写入单条结果
    async fn insert_one(&self, result: FetchResult) -> Result<(), RepositoryError> {
        self.insert(vec![result]).await
    }
}
