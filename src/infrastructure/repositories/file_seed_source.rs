// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::domain::models::seed::{Seed, SeedStats};
use crate::domain::repositories::seed_source::SeedSource;
use crate::utils::url_utils::extract_domain;

/// 基于文本文件的种子来源
///
/// 每行一个URL，可选 `url<TAB>domain` 形式直接给出域名；`#` 开头的行为注释。
/// 种子标识是相对于 `base_dir` 的文件路径
pub struct FileSeedSource {
    base_dir: PathBuf,
}

impl FileSeedSource {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn resolve(&self, seed_id: &str) -> PathBuf {
        let path = Path::new(seed_id);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

/// 解析种子文件内容，重复URL只保留第一次出现
pub fn parse_seeds(content: &str) -> Vec<Seed> {
    let mut seen = HashSet::new();
    let mut seeds = Vec::new();

    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut fields = line.split('\t');
        let url = fields.next().unwrap_or_default().trim();
        let domain = fields
            .next()
            .map(|d| d.trim().trim_end_matches('.').to_ascii_lowercase())
            .filter(|d| !d.is_empty())
            .or_else(|| extract_domain(url));

        let Some(domain) = domain else {
            warn!("Dropping seed on line {} without a host: {}", line_no + 1, url);
            continue;
        };
        if seen.insert(url.to_string()) {
            seeds.push(Seed::new(url, domain));
        }
    }
    seeds
}

#[async_trait]
impl SeedSource for FileSeedSource {
    async fn load_stats(&self, seed_id: &str) -> Result<SeedStats> {
        let seeds = self.load_seeds(seed_id).await?;
        Ok(SeedStats::from_seeds(&seeds))
    }

    async fn load_seeds(&self, seed_id: &str) -> Result<Vec<Seed>> {
        let path = self.resolve(seed_id);
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read seed file {}", path.display()))?;

        let seeds = parse_seeds(&content);
        info!("Loaded {} seeds from {}", seeds.len(), path.display());
        Ok(seeds)
    }

    fn name(&self) -> &'static str {
        "file"
    }
}
