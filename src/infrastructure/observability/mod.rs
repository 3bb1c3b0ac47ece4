// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 可观测性模块
///
/// 提供抓取统计、进度回调和Prometheus指标导出
pub mod metrics;
pub mod stats;
