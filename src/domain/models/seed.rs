// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};

/// 种子URL
///
/// 一次运行中加载一次且不可变，域名在加载时预先提取，抓取时不再重复解析
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Seed {
    /// 目标URL
    pub url: String,
    /// 预先提取的域名
    pub domain: String,
}

impl Seed {
    pub fn new(url: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            domain: domain.into(),
        }
    }
}

/// 种子集合的聚合统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedStats {
    /// URL总数
    pub total_urls: usize,
    /// 不重复的域名数
    pub unique_domains: usize,
}

impl SeedStats {
    /// 根据种子列表计算统计信息
    pub fn from_seeds(seeds: &[Seed]) -> Self {
        let unique_domains = seeds
            .iter()
            .map(|s| s.domain.as_str())
            .collect::<std::collections::HashSet<_>>()
            .len();
        Self {
            total_urls: seeds.len(),
            unique_domains,
        }
    }
}
