// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 应用层模块
///
/// 编排领域服务与基础设施，完成一次完整的重爬运行
pub mod use_cases;
