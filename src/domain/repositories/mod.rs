// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 仓库接口模块
///
/// 该模块定义了领域层的仓库接口，遵循依赖倒置原则。
/// 具体实现由基础设施层提供：
/// - 结果存储（result_store）：分片、批量、可续传的抓取结果持久化
/// - 种子来源（seed_source）：外部种子数据的批量读取
pub mod result_store;
pub mod seed_source;
