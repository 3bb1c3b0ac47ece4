// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::Context;
use recrawlrs::application::use_cases::recrawl_use_case::RecrawlUseCase;
use recrawlrs::config::settings::Settings;
use recrawlrs::dns::resolver::build_resolver;
use recrawlrs::infrastructure::observability::metrics::init_metrics;
use recrawlrs::infrastructure::observability::stats::{Progress, ProgressCallback};
use recrawlrs::infrastructure::repositories::file_seed_source::FileSeedSource;
use recrawlrs::utils::telemetry;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// 主函数
///
/// 应用程序入口点：第一个参数是种子文件，未给出时使用 `seeds.path` 配置
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize logging
    telemetry::init_telemetry();
    info!("Starting recrawlrs...");

    // 2. Load configuration
    let settings = Settings::new()?;
    let config = settings.recrawl_config()?;
    info!("Configuration loaded");

    // 3. Metrics exporter
    if settings.metrics.enabled {
        init_metrics(&settings.metrics.listen);
    }

    let seed_id = std::env::args()
        .nth(1)
        .or_else(|| settings.seeds.path.clone())
        .context("no seed file given (pass a path or set RECRAWLRS__SEEDS__PATH)")?;

    // 4. Wire dependencies
    let resolver = build_resolver(settings.resolver_backend()?, config.dns_timeout)?;
    info!("Using {} resolver", resolver.name());
    let seed_source = Arc::new(FileSeedSource::new(&settings.seeds.base_dir));

    let progress: ProgressCallback = Arc::new(|p: Progress| {
        info!(
            "[{}] {}/{} live={} dead={} timeout={} {:.0}/s elapsed={:?}",
            p.phase, p.done, p.total, p.live, p.dead, p.timeout, p.speed, p.elapsed
        );
    });
    let use_case = RecrawlUseCase::new(config, seed_source, resolver)
        .with_progress(progress, Duration::from_secs(5));

    // 5. Cancellation on ctrl-c
    let token = CancellationToken::new();
    {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, finishing in-flight requests...");
                token.cancel();
            }
        });
    }

    // 6. Run
    let report = use_case.execute(&seed_id, &token).await?;
    if let Ok(json) = serde_json::to_string(&report) {
        info!("Run report: {}", json);
    }
    info!(
        "Recrawl complete: fetched={} errored={} skipped_dead={} resumed={} merged_dead={}",
        report.stats.fetched,
        report.stats.errored,
        report.stats.skipped_dead_domain,
        report.stats.skipped_resumed,
        report.merged_dead_domains
    );
    if let Some(e) = &report.error {
        error!("Run finished with error: {}", e);
        anyhow::bail!("recrawl finished with error: {}", e);
    }
    Ok(())
}
