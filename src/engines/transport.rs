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

use dashmap::DashMap;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use reqwest::redirect::Policy;
use std::error::Error as StdError;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::domain::models::recrawl_config::RecrawlConfig;
use crate::engines::traits::EngineError;
use crate::utils::url_utils::shard_index;

/// 域名到已解析地址的共享表
pub type AddressCache = Arc<DashMap<String, Vec<IpAddr>>>;

const MAX_REDIRECTS: usize = 2;

/// 优先使用预解析地址的DNS解析器
///
/// 命中缓存时不产生任何DNS流量；每个传输分片从不同的地址开始轮转，
/// 未命中时退回系统解析
#[derive(Clone)]
pub struct CachedAddressResolver {
    addresses: AddressCache,
    offset: usize,
}

impl CachedAddressResolver {
    pub fn new(addresses: AddressCache, offset: usize) -> Self {
        Self { addresses, offset }
    }

    /// 返回缓存中的地址，按分片偏移轮转
    pub fn cached(&self, host: &str) -> Option<Vec<SocketAddr>> {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        let addrs = self.addresses.get(&host)?;
        if addrs.is_empty() {
            return None;
        }
        let start = self.offset % addrs.len();
        Some(
            addrs[start..]
                .iter()
                .chain(addrs[..start].iter())
                .map(|ip| SocketAddr::new(*ip, 0))
                .collect(),
        )
    }
}

impl Resolve for CachedAddressResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let cached = self.cached(name.as_str());
        Box::pin(resolve_host(cached, name.as_str().to_string()))
    }
}

type BoxError = Box<dyn StdError + Send + Sync>;

async fn resolve_host(cached: Option<Vec<SocketAddr>>, host: String) -> Result<Addrs, BoxError> {
    if let Some(addrs) = cached {
        return Ok(Box::new(addrs.into_iter()));
    }
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), 0))
        .await?
        .collect();
    Ok(Box::new(addrs.into_iter()))
}

/// 分片的HTTP连接池
///
/// 每个分片是独立的 `reqwest::Client`，种子按域名哈希固定路由到一个分片，
/// 分片之间不共享任何连接池状态
pub struct TransportPool {
    clients: Vec<reqwest::Client>,
}

impl TransportPool {
    /// 按配置构建全部分片
    ///
    /// # 参数
    ///
    /// * `config` - 运行配置
    /// * `addresses` - 预解析地址表，可以为空
    ///
    /// # 返回值
    ///
    /// * `Ok(TransportPool)` - 连接池
    /// * `Err(EngineError)` - 客户端构建失败
    pub fn new(config: &RecrawlConfig, addresses: AddressCache) -> Result<Self, EngineError> {
        let shards = config.transport_shards.max(1);
        let clients = (0..shards)
            .map(|shard| build_client(config, CachedAddressResolver::new(addresses.clone(), shard)))
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Built {} transport shards", clients.len());
        Ok(Self { clients })
    }

    pub fn shard_count(&self) -> usize {
        self.clients.len()
    }

    /// 域名对应的客户端
    pub fn client_for(&self, domain: &str) -> &reqwest::Client {
        &self.clients[shard_index(domain, self.clients.len())]
    }
}

fn build_client(
    config: &RecrawlConfig,
    resolver: CachedAddressResolver,
) -> Result<reqwest::Client, EngineError> {
    let connect_timeout = (config.http_timeout / 2).min(Duration::from_secs(2));

    let client = reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(config.http_timeout)
        .connect_timeout(connect_timeout)
        .redirect(Policy::limited(MAX_REDIRECTS))
        .pool_idle_timeout(Duration::from_secs(30))
        .pool_max_idle_per_host(50)
        .tcp_keepalive(Duration::from_secs(15))
        .no_proxy()
        .dns_resolver(Arc::new(resolver))
        .build()?;
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn cache_with(domain: &str, ips: &[[u8; 4]]) -> AddressCache {
        let cache: AddressCache = Arc::new(DashMap::new());
        cache.insert(
            domain.to_string(),
            ips.iter()
                .map(|o| IpAddr::V4(Ipv4Addr::new(o[0], o[1], o[2], o[3])))
                .collect(),
        );
        cache
    }

    #[test]
    fn test_cached_addresses_rotate_by_shard() {
        let cache = cache_with("multi.example", &[[10, 0, 0, 1], [10, 0, 0, 2], [10, 0, 0, 3]]);

        let first = CachedAddressResolver::new(cache.clone(), 0)
            .cached("multi.example")
            .unwrap();
        let second = CachedAddressResolver::new(cache.clone(), 1)
            .cached("MULTI.example.")
            .unwrap();

        assert_eq!(first[0].ip(), IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(second[0].ip(), IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)));
        assert_eq!(second.len(), 3);
        assert!(second.iter().all(|a| a.port() == 0));
    }

    #[test]
    fn test_uncached_host_misses() {
        let cache = cache_with("known.example", &[[127, 0, 0, 1]]);
        assert!(CachedAddressResolver::new(cache, 0)
            .cached("unknown.example")
            .is_none());
    }

    #[test]
    fn test_pool_routes_domain_to_stable_shard() {
        let config = RecrawlConfig {
            transport_shards: 4,
            ..Default::default()
        };
        let pool = TransportPool::new(&config, Arc::new(DashMap::new())).unwrap();
        assert_eq!(pool.shard_count(), 4);

        let a = pool.client_for("stable.example") as *const reqwest::Client;
        let b = pool.client_for("stable.example") as *const reqwest::Client;
        assert_eq!(a, b);
    }
}
