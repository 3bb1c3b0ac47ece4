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

pub use sea_orm_migration::prelude::*;

mod m20260301_000001_create_fetch_results;
mod m20260301_000002_create_crawl_state;
mod m20260301_000003_create_run_meta;
mod m20260301_000004_create_failed_domains;
mod m20260301_000005_create_domain_health;

/// 结果分片迁移器
///
/// 每个结果分片文件独立持有抓取结果表和已完成URL表
pub struct ResultShardMigrator;

#[async_trait::async_trait]
impl MigratorTrait for ResultShardMigrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_000001_create_fetch_results::Migration),
            Box::new(m20260301_000002_create_crawl_state::Migration),
        ]
    }
}

/// 运行元数据迁移器
pub struct RunMetaMigrator;

#[async_trait::async_trait]
impl MigratorTrait for RunMetaMigrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_000003_create_run_meta::Migration),
            Box::new(m20260301_000004_create_failed_domains::Migration),
        ]
    }
}

/// 域名健康缓存迁移器
///
/// # 返回值
///
/// 返回只包含 domain_health 表的迁移列表
pub struct DomainCacheMigrator;

#[async_trait::async_trait]
impl MigratorTrait for DomainCacheMigrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20260301_000005_create_domain_health::Migration)]
    }
}
