// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 缓存模块
///
/// 提供域名健康缓存：域名 → 地址、存活分类、解析时间，落盘为SQLite文件
pub mod domain_health_cache;
