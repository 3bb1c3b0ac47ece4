// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域模型模块
///
/// 该模块定义了重爬系统的核心数据结构，包括：
/// - 种子（seed）：待重新访问的URL/域名对
/// - 域名健康（domain_health）：域名的存活分类和死亡原因
/// - 抓取结果（fetch_result）：每个URL的抓取结局、模式和错误类别
/// - 运行配置（recrawl_config）：一次运行中不可变的配置
pub mod domain_health;
pub mod fetch_result;
pub mod recrawl_config;
pub mod seed;
