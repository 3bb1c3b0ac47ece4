// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use migration::{MigratorTrait, ResultShardMigrator, RunMetaMigrator};
use parking_lot::Mutex;
use sea_orm::sea_query::OnConflict;
use sea_orm::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info};

use crate::domain::models::domain_health::{DeadReason, FailedDomain};
use crate::domain::models::fetch_result::{ErrorClass, FetchMode, FetchOutcome, FetchResult};
use crate::domain::repositories::result_store::ResultStore;
use crate::infrastructure::database::connection::open_sqlite;
use crate::infrastructure::database::entities::{
    crawl_state, failed_domain, fetch_result as fetch_result_entity, run_meta,
};
use crate::utils::errors::RepositoryError;
use crate::utils::url_utils::shard_index;

/// 单条INSERT语句携带的最大行数，保证绑定参数不超过SQLite上限
const WRITE_CHUNK: usize = 64;
const META_FILE: &str = "meta.db";
const SHARD_COUNT_KEY: &str = "result_shards";

/// 单个结果分片
///
/// 缓冲区锁只在入队和取批时短暂持有，落盘由独立的异步写锁串行化
struct ResultShard {
    index: usize,
    db: DatabaseConnection,
    buffer: Mutex<Vec<FetchResult>>,
    write_lock: tokio::sync::Mutex<()>,
}

impl ResultShard {
    fn take_if_full(&self, batch_size: usize) -> Option<Vec<FetchResult>> {
        let mut buffer = self.buffer.lock();
        if buffer.len() >= batch_size {
            Some(std::mem::take(&mut *buffer))
        } else {
            None
        }
    }

    fn take_all(&self) -> Vec<FetchResult> {
        std::mem::take(&mut *self.buffer.lock())
    }

    /// 落盘一批结果，失败时把整批放回缓冲区头部，留待下次刷新重试
    async fn write_batch(&self, batch: Vec<FetchResult>) -> Result<usize, RepositoryError> {
        if batch.is_empty() {
            return Ok(0);
        }

        let _guard = self.write_lock.lock().await;
        match self.write_rows(&batch).await {
            Ok(()) => {
                debug!("Shard {} flushed {} results", self.index, batch.len());
                Ok(batch.len())
            }
            Err(e) => {
                let len = batch.len();
                self.buffer.lock().splice(0..0, batch);
                error!(
                    "Shard {} failed to write {} results, kept buffered: {}",
                    self.index, len, e
                );
                Err(e)
            }
        }
    }

    async fn write_rows(&self, batch: &[FetchResult]) -> Result<(), RepositoryError> {
        let completed_at = Utc::now();
        let txn = self.db.begin().await?;

        for chunk in batch.chunks(WRITE_CHUNK) {
            let rows: Vec<fetch_result_entity::ActiveModel> =
                chunk.iter().map(result_model).collect();
            fetch_result_entity::Entity::insert_many(rows)
                .on_conflict(
                    OnConflict::column(fetch_result_entity::Column::Url)
                        .update_columns([
                            fetch_result_entity::Column::Domain,
                            fetch_result_entity::Column::Outcome,
                            fetch_result_entity::Column::StatusCode,
                            fetch_result_entity::Column::ErrorClass,
                            fetch_result_entity::Column::Error,
                            fetch_result_entity::Column::BytesRead,
                            fetch_result_entity::Column::ContentLength,
                            fetch_result_entity::Column::ContentType,
                            fetch_result_entity::Column::RedirectUrl,
                            fetch_result_entity::Column::LatencyMs,
                            fetch_result_entity::Column::Mode,
                            fetch_result_entity::Column::FetchedAt,
                        ])
                        .to_owned(),
                )
                .exec_without_returning(&txn)
                .await?;

            let states: Vec<crawl_state::ActiveModel> = chunk
                .iter()
                .map(|r| crawl_state::ActiveModel {
                    url: Set(r.url.clone()),
                    completed_at: Set(completed_at.into()),
                })
                .collect();
            crawl_state::Entity::insert_many(states)
                .on_conflict(
                    OnConflict::column(crawl_state::Column::Url)
                        .update_column(crawl_state::Column::CompletedAt)
                        .to_owned(),
                )
                .exec_without_returning(&txn)
                .await?;
        }

        txn.commit().await?;
        Ok(())
    }
}

/// 分片、批量、可续传的结果存储
///
/// 目录布局：`shard_000.db` .. `shard_NNN.db` 保存抓取结果与已完成URL，
/// `meta.db` 保存运行元数据和失败域名。URL按哈希固定路由到一个分片，
/// 因此同一URL在所有分片中最多只有一行
pub struct ShardedResultStore {
    dir: PathBuf,
    shards: Vec<ResultShard>,
    meta: DatabaseConnection,
    batch_size: usize,
    closed: AtomicBool,
}

impl ShardedResultStore {
    /// 打开（必要时创建）结果存储目录
    ///
    /// # 参数
    ///
    /// * `dir` - 存储目录
    /// * `shard_count` - 分片数量，同一目录必须始终使用相同的分片数
    /// * `batch_size` - 每个分片缓冲多少条记录后落盘
    ///
    /// # 返回值
    ///
    /// * `Ok(ShardedResultStore)` - 打开的存储
    /// * `Err(RepositoryError)` - 目录或数据库文件无法创建，或分片数与目录记录的不一致
    pub async fn open(
        dir: &Path,
        shard_count: usize,
        batch_size: usize,
    ) -> Result<Self, RepositoryError> {
        if shard_count == 0 {
            return Err(RepositoryError::InvalidParameter(
                "shard count must be positive".to_string(),
            ));
        }
        tokio::fs::create_dir_all(dir).await?;

        let mut shards = Vec::with_capacity(shard_count);
        for index in 0..shard_count {
            let db = open_sqlite(&dir.join(format!("shard_{:03}.db", index))).await?;
            ResultShardMigrator::up(&db, None).await?;
            shards.push(ResultShard {
                index,
                db,
                buffer: Mutex::new(Vec::new()),
                write_lock: tokio::sync::Mutex::new(()),
            });
        }

        let meta = open_sqlite(&dir.join(META_FILE)).await?;
        RunMetaMigrator::up(&meta, None).await?;
        check_shard_count(&meta, dir, shard_count).await?;

        info!(
            "Opened result store at {} ({} shards, batch size {})",
            dir.display(),
            shard_count,
            batch_size.max(1)
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            shards,
            meta,
            batch_size: batch_size.max(1),
            closed: AtomicBool::new(false),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn shard_for(&self, url: &str) -> &ResultShard {
        &self.shards[shard_index(url, self.shards.len())]
    }

    fn ensure_open(&self) -> Result<(), RepositoryError> {
        if self.closed.load(Ordering::Acquire) {
            Err(RepositoryError::Closed)
        } else {
            Ok(())
        }
    }

    /// 读取一条运行元数据
    pub async fn get_meta(&self, key: &str) -> Result<Option<String>, RepositoryError> {
        let row = run_meta::Entity::find_by_id(key.to_string())
            .one(&self.meta)
            .await?;
        Ok(row.map(|m| m.value))
    }

    /// 按URL查询已落盘的结果
    pub async fn find(&self, url: &str) -> Result<Option<FetchResult>, RepositoryError> {
        let shard = self.shard_for(url);
        let row = fetch_result_entity::Entity::find_by_id(url.to_string())
            .one(&shard.db)
            .await?;
        row.map(result_from_model).transpose()
    }

    /// 所有分片中已落盘的结果总数
    pub async fn count_results(&self) -> Result<u64, RepositoryError> {
        let counts = try_join_all(
            self.shards
                .iter()
                .map(|s| fetch_result_entity::Entity::find().count(&s.db)),
        )
        .await?;
        Ok(counts.into_iter().sum())
    }

    /// 所有分片中指定结局的结果数量
    pub async fn count_by_outcome(&self, outcome: FetchOutcome) -> Result<u64, RepositoryError> {
        let counts = try_join_all(self.shards.iter().map(|s| {
            fetch_result_entity::Entity::find()
                .filter(fetch_result_entity::Column::Outcome.eq(outcome.as_str()))
                .count(&s.db)
        }))
        .await?;
        Ok(counts.into_iter().sum())
    }

    /// 已记录的失败域名
    pub async fn failed_domains(&self) -> Result<Vec<FailedDomain>, RepositoryError> {
        let rows = failed_domain::Entity::find()
            .order_by_asc(failed_domain::Column::Domain)
            .all(&self.meta)
            .await?;

        rows.into_iter()
            .map(|m| {
                Ok(FailedDomain {
                    reason: m
                        .reason
                        .parse::<DeadReason>()
                        .map_err(RepositoryError::DatabaseError)?,
                    domain: m.domain,
                    url_count: m.url_count.max(0) as u64,
                    stage: m.stage,
                })
            })
            .collect()
    }

    async fn flush_all(&self) -> Result<(), RepositoryError> {
        let results = try_join_all(
            self.shards
                .iter()
                .map(|shard| shard.write_batch(shard.take_all())),
        )
        .await?;

        let written: usize = results.into_iter().sum();
        if written > 0 {
            debug!("Flushed {} buffered results", written);
        }
        Ok(())
    }
}

#[async_trait]
impl ResultStore for ShardedResultStore {
    async fn insert(&self, results: Vec<FetchResult>) -> Result<(), RepositoryError> {
        self.ensure_open()?;
        if results.is_empty() {
            return Ok(());
        }

        let mut touched = vec![false; self.shards.len()];
        for result in results {
            let index = shard_index(&result.url, self.shards.len());
            self.shards[index].buffer.lock().push(result);
            touched[index] = true;
        }

        for (index, shard) in self.shards.iter().enumerate() {
            if !touched[index] {
                continue;
            }
            if let Some(batch) = shard.take_if_full(self.batch_size) {
                shard.write_batch(batch).await?;
            }
        }
        Ok(())
    }

    async fn flush(&self) -> Result<(), RepositoryError> {
        self.flush_all().await
    }

    async fn set_meta(&self, key: &str, value: &str) -> Result<(), RepositoryError> {
        let model = run_meta::ActiveModel {
            key: Set(key.to_string()),
            value: Set(value.to_string()),
            updated_at: Set(Utc::now().into()),
        };

        run_meta::Entity::insert(model)
            .on_conflict(
                OnConflict::column(run_meta::Column::Key)
                    .update_columns([run_meta::Column::Value, run_meta::Column::UpdatedAt])
                    .to_owned(),
            )
            .exec_without_returning(&self.meta)
            .await?;
        Ok(())
    }

    async fn load_completed_urls(&self) -> Result<HashSet<String>, RepositoryError> {
        let per_shard = try_join_all(self.shards.iter().map(|s| {
            crawl_state::Entity::find()
                .select_only()
                .column(crawl_state::Column::Url)
                .into_tuple::<String>()
                .all(&s.db)
        }))
        .await?;

        let completed: HashSet<String> = per_shard.into_iter().flatten().collect();
        info!(
            "Loaded {} completed URLs from {}",
            completed.len(),
            self.dir.display()
        );
        Ok(completed)
    }

    async fn record_failed_domains(
        &self,
        failures: Vec<FailedDomain>,
    ) -> Result<(), RepositoryError> {
        if failures.is_empty() {
            return Ok(());
        }

        let recorded_at = Utc::now();
        let rows: Vec<failed_domain::ActiveModel> = failures
            .iter()
            .map(|f| failed_domain::ActiveModel {
                domain: Set(f.domain.clone()),
                reason: Set(f.reason.as_str().to_string()),
                url_count: Set(f.url_count.min(i64::MAX as u64) as i64),
                stage: Set(f.stage.clone()),
                recorded_at: Set(recorded_at.into()),
            })
            .collect();

        let txn = self.meta.begin().await?;
        for chunk in rows.chunks(WRITE_CHUNK) {
            failed_domain::Entity::insert_many(chunk.to_vec())
                .on_conflict(
                    OnConflict::column(failed_domain::Column::Domain)
                        .update_columns([
                            failed_domain::Column::Reason,
                            failed_domain::Column::UrlCount,
                            failed_domain::Column::Stage,
                            failed_domain::Column::RecordedAt,
                        ])
                        .to_owned(),
                )
                .exec_without_returning(&txn)
                .await?;
        }
        txn.commit().await?;

        info!("Recorded {} failed domains", failures.len());
        Ok(())
    }

    async fn close(&self) -> Result<(), RepositoryError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.flush_all().await?;
        info!("Closed result store at {}", self.dir.display());
        Ok(())
    }
}

/// 首次打开时记录分片数，之后的打开必须与之一致，否则URL会路由到错误的分片
async fn check_shard_count(
    meta: &DatabaseConnection,
    dir: &Path,
    shard_count: usize,
) -> Result<(), RepositoryError> {
    let stored = run_meta::Entity::find_by_id(SHARD_COUNT_KEY.to_string())
        .one(meta)
        .await?;

    match stored {
        Some(row) if row.value == shard_count.to_string() => Ok(()),
        Some(row) => Err(RepositoryError::InvalidParameter(format!(
            "{} was created with {} shards, refusing to open it with {}",
            dir.display(),
            row.value,
            shard_count
        ))),
        None => {
            let model = run_meta::ActiveModel {
                key: Set(SHARD_COUNT_KEY.to_string()),
                value: Set(shard_count.to_string()),
                updated_at: Set(Utc::now().into()),
            };
            run_meta::Entity::insert(model)
                .exec_without_returning(meta)
                .await?;
            Ok(())
        }
    }
}

fn result_model(result: &FetchResult) -> fetch_result_entity::ActiveModel {
    fetch_result_entity::ActiveModel {
        url: Set(result.url.clone()),
        domain: Set(result.domain.clone()),
        outcome: Set(result.outcome.as_str().to_string()),
        status_code: Set(result.status_code.map(i32::from)),
        error_class: Set(result.error_class.map(|c| c.as_str().to_string())),
        error: Set(result.error.clone()),
        bytes_read: Set(result.bytes_read.min(i64::MAX as u64) as i64),
        content_length: Set(result.content_length.map(|n| n.min(i64::MAX as u64) as i64)),
        content_type: Set(result.content_type.clone()),
        redirect_url: Set(result.redirect_url.clone()),
        latency_ms: Set(result.latency_ms.min(i64::MAX as u64) as i64),
        mode: Set(result.mode.as_str().to_string()),
        fetched_at: Set(result.fetched_at.into()),
    }
}

fn result_from_model(model: fetch_result_entity::Model) -> Result<FetchResult, RepositoryError> {
    let outcome = model
        .outcome
        .parse::<FetchOutcome>()
        .map_err(RepositoryError::DatabaseError)?;
    let error_class = model
        .error_class
        .as_deref()
        .map(str::parse::<ErrorClass>)
        .transpose()
        .map_err(RepositoryError::DatabaseError)?;
    let mode = model
        .mode
        .parse::<FetchMode>()
        .map_err(RepositoryError::DatabaseError)?;

    Ok(FetchResult {
        url: model.url,
        domain: model.domain,
        outcome,
        status_code: model.status_code.and_then(|c| u16::try_from(c).ok()),
        error_class,
        error: model.error,
        bytes_read: model.bytes_read.max(0) as u64,
        content_length: model.content_length.map(|n| n.max(0) as u64),
        content_type: model.content_type,
        redirect_url: model.redirect_url,
        latency_ms: model.latency_ms.max(0) as u64,
        fetched_at: DateTime::<Utc>::from(model.fetched_at),
        mode,
    })
}

#[cfg(test)]
#[path = "sharded_result_store_test.rs"]
mod tests;
