// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// DNS模块
///
/// 提供域名解析后端和批量预解析流水线
pub mod pipeline;
pub mod resolver;
