// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::describe_counter;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{info, warn};

/// 初始化指标系统
///
/// 安装Prometheus导出器并注册重爬相关指标。地址非法或端口被占用时只记录警告，
/// 计数器在没有安装记录器时是空操作
///
/// # 参数
///
/// * `listen` - 导出器监听地址，如 `0.0.0.0:9000`
pub fn init_metrics(listen: &str) {
    let addr: SocketAddr = match listen.parse() {
        Ok(addr) => addr,
        Err(e) => {
            warn!("Invalid metrics listen address {}: {}", listen, e);
            return;
        }
    };

    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        warn!(
            "Failed to install Prometheus recorder: {}. This might happen if the port is already in use.",
            e
        );
        return;
    }

    describe_counter!(
        "recrawl_fetch_total",
        "Fetch outcomes by status class or error class"
    );
    describe_counter!(
        "recrawl_skipped_total",
        "URLs skipped without a request, by reason"
    );
    describe_counter!(
        "recrawl_dns_lookups_total",
        "DNS lookups performed by the resolver pipeline, by status"
    );
    describe_counter!(
        "recrawl_domains_killed_total",
        "Domains marked dead during the fetch phase, by reason"
    );

    info!("Metrics exporter listening on {}", addr);
}
