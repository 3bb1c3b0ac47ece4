// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::models::seed::{Seed, SeedStats};

/// 种子来源特质
///
/// 外部数据源只需要提供批量读取，重爬引擎不关心种子从哪里来
#[async_trait]
pub trait SeedSource: Send + Sync {
    /// 读取种子集合的聚合统计
    async fn load_stats(&self, seed_id: &str) -> Result<SeedStats>;

    /// 读取全部种子
    async fn load_seeds(&self, seed_id: &str) -> Result<Vec<Seed>>;

    /// 来源名称，写入运行元数据
    fn name(&self) -> &'static str;
}
