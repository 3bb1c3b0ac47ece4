// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 应用程序模块
///
/// 编排一次完整的重爬运行
pub mod application;

/// 配置模块
///
/// 处理应用程序的配置设置和环境变量
pub mod config;

/// DNS模块
///
/// 解析后端和批量预解析流水线
pub mod dns;

/// 领域模块
///
/// 包含核心数据模型和仓库接口
pub mod domain;

/// 引擎模块
///
/// 实现重爬抓取引擎、抓取模式和连接池分片
pub mod engines;

/// 基础设施模块
///
/// 提供数据库、域名健康缓存、结果存储和可观测性实现
pub mod infrastructure;

/// 工具模块
///
/// 提供通用的工具函数和辅助功能
pub mod utils;
