// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 存储模块
///
/// 按URL哈希分片的抓取结果存储，每个分片独立缓冲和落盘
pub mod sharded_result_store;
