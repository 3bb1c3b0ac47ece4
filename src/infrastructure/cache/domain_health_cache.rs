// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use migration::{DomainCacheMigrator, MigratorTrait};
use sea_orm::sea_query::OnConflict;
use sea_orm::{EntityTrait, Set, TransactionTrait};
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::domain::models::domain_health::{
    Classification, DeadReason, DomainHealthEntry, DomainStatus,
};
use crate::infrastructure::database::connection::open_sqlite;
use crate::infrastructure::database::entities::domain_health;
use crate::utils::errors::RepositoryError;

const SAVE_CHUNK: usize = 128;

/// 域名健康缓存
///
/// 内存中以域名为键保存最新的分类结论，跨运行持久化到SQLite文件。
/// DNS阶段和抓取阶段都只做O(1)查询，写入只发生在解析结果返回和运行结束的合并中
pub struct DomainHealthCache {
    entries: DashMap<String, DomainHealthEntry>,
    dirty: DashSet<String>,
    live_downgrade_failures: u32,
}

impl DomainHealthCache {
    /// 创建空缓存
    ///
    /// # 参数
    ///
    /// * `live_downgrade_failures` - 合并时Live域名降级为Dead所需的HTTP失败次数
    pub fn new(live_downgrade_failures: u32) -> Self {
        Self {
            entries: DashMap::new(),
            dirty: DashSet::new(),
            live_downgrade_failures: live_downgrade_failures.max(1),
        }
    }

    /// 从文件加载缓存
    ///
    /// 文件不存在时视为空缓存
    ///
    /// # 参数
    ///
    /// * `path` - 缓存文件路径
    ///
    /// # 返回值
    ///
    /// * `Ok(usize)` - 加载的条目数量
    /// * `Err(RepositoryError)` - 文件存在但无法读取
    pub async fn load(&self, path: &Path) -> Result<usize, RepositoryError> {
        if !path.exists() {
            debug!("Domain cache {} not found, starting empty", path.display());
            return Ok(0);
        }

        let db = open_sqlite(path).await?;
        DomainCacheMigrator::up(&db, None).await?;

        let rows = domain_health::Entity::find().all(&db).await?;
        let mut loaded = 0;
        for row in rows {
            match entry_from_model(row) {
                Ok(entry) => {
                    self.entries.insert(entry.domain.clone(), entry);
                    loaded += 1;
                }
                Err(e) => warn!("Skipping malformed domain cache row: {}", e),
            }
        }
        db.close().await?;

        let (live, dead, timeout) = self.counts();
        info!(
            "Loaded {} cached domains from {} (live={}, dead={}, timeout={})",
            loaded,
            path.display(),
            live,
            dead,
            timeout
        );
        Ok(loaded)
    }

    /// 将新增或变更的条目写回文件
    ///
    /// 没有待写入条目时直接返回，不触碰磁盘
    ///
    /// # 返回值
    ///
    /// * `Ok(usize)` - 写入的条目数量
    pub async fn save(&self, path: &Path) -> Result<usize, RepositoryError> {
        if self.dirty.is_empty() {
            debug!("Domain cache unchanged, skipping save");
            return Ok(0);
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let domains: Vec<String> = self.dirty.iter().map(|d| d.key().clone()).collect();
        let models: Vec<domain_health::ActiveModel> = domains
            .iter()
            .filter_map(|d| self.entries.get(d).map(|e| active_model(e.value())))
            .collect();

        let db = open_sqlite(path).await?;
        DomainCacheMigrator::up(&db, None).await?;

        let txn = db.begin().await?;
        for chunk in models.chunks(SAVE_CHUNK) {
            domain_health::Entity::insert_many(chunk.to_vec())
                .on_conflict(
                    OnConflict::column(domain_health::Column::Domain)
                        .update_columns([
                            domain_health::Column::Addresses,
                            domain_health::Column::Status,
                            domain_health::Column::Reason,
                            domain_health::Column::FailureCount,
                            domain_health::Column::ResolvedAt,
                        ])
                        .to_owned(),
                )
                .exec_without_returning(&txn)
                .await?;
        }
        txn.commit().await?;
        db.close().await?;

        for domain in &domains {
            self.dirty.remove(domain);
        }

        info!("Saved {} domain cache entries to {}", models.len(), path.display());
        Ok(models.len())
    }

    /// 查询域名的当前分类
    pub fn classify(&self, domain: &str) -> Classification {
        self.entries
            .get(domain)
            .map(|e| Classification::from(e.status))
            .unwrap_or(Classification::Unknown)
    }

    /// 写入一次新的解析结论，无条件覆盖
    pub fn insert(&self, entry: DomainHealthEntry) {
        self.dirty.insert(entry.domain.clone());
        self.entries.insert(entry.domain.clone(), entry);
    }

    /// 合并外部观察结果
    ///
    /// 较新的观察覆盖较旧的条目。已缓存的Live域名只有在新结论来自DNS，
    /// 或HTTP失败次数达到降级阈值时才会变为Dead；超时结论不会覆盖Live
    ///
    /// # 返回值
    ///
    /// 实际改变了缓存的条目数量
    pub fn merge<I>(&self, incoming: I) -> usize
    where
        I: IntoIterator<Item = DomainHealthEntry>,
    {
        let mut merged = 0;
        for entry in incoming {
            let accept = match self.entries.get(&entry.domain) {
                None => true,
                Some(existing) => self.should_replace(existing.value(), &entry),
            };
            if accept {
                self.insert(entry);
                merged += 1;
            }
        }
        merged
    }

    fn should_replace(&self, existing: &DomainHealthEntry, incoming: &DomainHealthEntry) -> bool {
        if incoming.resolved_at < existing.resolved_at {
            return false;
        }
        if existing.status != DomainStatus::Live {
            return true;
        }
        match incoming.status {
            DomainStatus::Live => true,
            DomainStatus::Timeout => false,
            DomainStatus::Dead => {
                incoming.reason.map(|r| r.is_dns()).unwrap_or(false)
                    || incoming.failure_count >= self.live_downgrade_failures
            }
        }
    }

    pub fn get(&self, domain: &str) -> Option<DomainHealthEntry> {
        self.entries.get(domain).map(|e| e.value().clone())
    }

    /// Live域名的已解析地址
    pub fn addresses(&self, domain: &str) -> Option<Vec<IpAddr>> {
        self.entries
            .get(domain)
            .filter(|e| e.status == DomainStatus::Live && !e.addresses.is_empty())
            .map(|e| e.addresses.clone())
    }

    /// 指定域名集合中所有Live域名的地址表
    pub fn address_map<'a, I>(&self, domains: I) -> HashMap<String, Vec<IpAddr>>
    where
        I: IntoIterator<Item = &'a String>,
    {
        domains
            .into_iter()
            .filter_map(|d| self.addresses(d).map(|addrs| (d.clone(), addrs)))
            .collect()
    }

    /// 返回 (live, dead, timeout) 数量
    pub fn counts(&self) -> (usize, usize, usize) {
        let (mut live, mut dead, mut timeout) = (0, 0, 0);
        for entry in self.entries.iter() {
            match entry.status {
                DomainStatus::Live => live += 1,
                DomainStatus::Dead => dead += 1,
                DomainStatus::Timeout => timeout += 1,
            }
        }
        (live, dead, timeout)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 尚未写盘的条目数量
    pub fn pending_writes(&self) -> usize {
        self.dirty.len()
    }
}

impl Default for DomainHealthCache {
    fn default() -> Self {
        Self::new(3)
    }
}

fn active_model(entry: &DomainHealthEntry) -> domain_health::ActiveModel {
    let addresses = entry
        .addresses
        .iter()
        .map(|ip| ip.to_string())
        .collect::<Vec<_>>()
        .join(",");

    domain_health::ActiveModel {
        domain: Set(entry.domain.clone()),
        addresses: Set(addresses),
        status: Set(entry.status.as_str().to_string()),
        reason: Set(entry.reason.map(|r| r.as_str().to_string()).unwrap_or_default()),
        failure_count: Set(entry.failure_count.min(i32::MAX as u32) as i32),
        resolved_at: Set(entry.resolved_at.into()),
    }
}

fn entry_from_model(model: domain_health::Model) -> Result<DomainHealthEntry, String> {
    let status: DomainStatus = model.status.parse()?;
    let reason = if model.reason.is_empty() {
        None
    } else {
        Some(model.reason.parse::<DeadReason>()?)
    };
    let addresses = model
        .addresses
        .split(',')
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<IpAddr>().map_err(|e| format!("{}: {}", s, e)))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(DomainHealthEntry {
        domain: model.domain,
        addresses,
        status,
        reason,
        failure_count: model.failure_count.max(0) as u32,
        resolved_at: DateTime::<Utc>::from(model.resolved_at),
    })
}

#[cfg(test)]
#[path = "domain_health_cache_test.rs"]
mod tests;
