// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域层模块
///
/// 该模块包含系统的核心业务概念，包括：
/// - 领域模型（models）：种子、域名健康、抓取结果和运行配置
/// - 仓库接口（repositories）：数据持久化和种子来源的抽象接口
///
/// 领域层不依赖于任何外部实现。
pub mod models;
pub mod repositories;
