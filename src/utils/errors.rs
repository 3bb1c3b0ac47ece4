// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use thiserror::Error;

/// 仓库层错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("IO错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("无效参数: {0}")]
    InvalidParameter(String),

    #[error("存储已关闭")]
    Closed,
}

impl From<sea_orm::DbErr> for RepositoryError {
    fn from(err: sea_orm::DbErr) -> Self {
        RepositoryError::DatabaseError(err.to_string())
    }
}

/// 重爬运行错误类型
///
/// 只有种子加载失败和结果存储无法打开属于致命错误，其余失败都作为数据记录
#[derive(Error, Debug)]
pub enum RecrawlError {
    #[error("无法加载种子: {0}")]
    SeedLoad(String),

    #[error("无法打开结果存储: {0}")]
    ResultStore(#[source] RepositoryError),

    #[error("结果写入失败: {0}")]
    Persistence(#[from] RepositoryError),

    #[error("抓取引擎错误: {0}")]
    Engine(#[from] crate::engines::traits::EngineError),
}
