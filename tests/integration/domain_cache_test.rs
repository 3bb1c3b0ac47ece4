// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::helpers::{LoopbackResolver, TestRun};
use recrawlrs::dns::pipeline::DnsPipeline;
use recrawlrs::infrastructure::cache::domain_health_cache::DomainHealthCache;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn domains() -> Vec<String> {
    ["a.example", "b.example", "nope.invalid", "gone.invalid", "10.0.0.1"]
        .iter()
        .map(|d| d.to_string())
        .collect()
}

#[tokio::test]
async fn saved_cache_reproduces_classifications() {
    let run = TestRun::new();
    let resolver = Arc::new(LoopbackResolver::default());
    let cache = Arc::new(DomainHealthCache::default());

    let summary = DnsPipeline::new(resolver.clone(), cache.clone(), 4, Duration::from_secs(1))
        .resolve_batch(&domains(), &CancellationToken::new())
        .await;
    assert_eq!((summary.live, summary.dead, summary.timeout), (3, 2, 0));
    assert_eq!(cache.save(&run.cache_path()).await.unwrap(), 5);

    let reloaded = Arc::new(DomainHealthCache::default());
    assert_eq!(reloaded.load(&run.cache_path()).await.unwrap(), 5);
    for domain in domains() {
        assert_eq!(reloaded.classify(&domain), cache.classify(&domain), "{}", domain);
        assert_eq!(reloaded.addresses(&domain), cache.addresses(&domain), "{}", domain);
    }

    // 重新加载的缓存命中全部域名，不再发起解析
    let fresh = Arc::new(LoopbackResolver::default());
    let summary = DnsPipeline::new(fresh.clone(), reloaded.clone(), 4, Duration::from_secs(1))
        .resolve_batch(&domains(), &CancellationToken::new())
        .await;
    assert_eq!(fresh.calls(), 0);
    assert_eq!(summary.cached, 5);
    assert_eq!((summary.live, summary.dead), (3, 2));

    // 没有新条目时保存是空操作
    assert_eq!(reloaded.save(&run.cache_path()).await.unwrap(), 0);
}
