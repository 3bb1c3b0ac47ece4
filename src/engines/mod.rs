// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 抓取引擎模块
///
/// 包含抓取策略、分片连接池、域名短路和重爬worker池
pub mod domain_guard;
pub mod fetch_mode;
pub mod recrawl_engine;
pub mod traits;
pub mod transport;
