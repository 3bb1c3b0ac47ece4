// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::domain::models::domain_health::DeadReason;
use crate::domain::models::fetch_result::ErrorClass;

/// 抓取阶段判定死亡的域名
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpDeadDomain {
    pub domain: String,
    pub reason: DeadReason,
    /// 判定前累计的失败次数
    pub failure_count: u32,
    /// 判定后被跳过的URL数
    pub skipped_urls: u64,
}

#[derive(Debug, Clone, Copy)]
struct DeadMark {
    reason: DeadReason,
    failure_count: u32,
    /// 是否在本次抓取中发现（而不是DNS阶段预先注入）
    discovered: bool,
}

/// 域名级别的短路与限流
///
/// 死亡集合在DNS阶段一次性注入，抓取阶段被并发追加；读远多于写，
/// 因此所有状态都放在分段锁的并发表里
pub struct DomainGuard {
    dead: DashMap<String, DeadMark>,
    failures: DashMap<String, u32>,
    responded: DashSet<String>,
    skipped: DashMap<String, u64>,
    semaphores: DashMap<String, Arc<Semaphore>>,
    threshold: u32,
    max_conns: usize,
}

impl DomainGuard {
    /// # 参数
    ///
    /// * `threshold` - 连续失败多少次后判定域名死亡
    /// * `max_conns` - 单个域名的最大并发请求数
    pub fn new(threshold: u32, max_conns: usize) -> Self {
        Self {
            dead: DashMap::new(),
            failures: DashMap::new(),
            responded: DashSet::new(),
            skipped: DashMap::new(),
            semaphores: DashMap::new(),
            threshold: threshold.max(1),
            max_conns: max_conns.max(1),
        }
    }

    /// 注入预先判定的死亡域名
    pub fn preload<'a, I>(&self, domains: I)
    where
        I: IntoIterator<Item = (&'a String, &'a DeadReason)>,
    {
        for (domain, reason) in domains {
            self.dead.entry(domain.clone()).or_insert(DeadMark {
                reason: *reason,
                failure_count: 0,
                discovered: false,
            });
        }
    }

    pub fn dead_reason(&self, domain: &str) -> Option<DeadReason> {
        self.dead.get(domain).map(|m| m.reason)
    }

    /// 在本次运行中判定域名死亡
    ///
    /// # 返回值
    ///
    /// 域名此前未被判定死亡时返回 `true`
    pub fn mark_dead(&self, domain: &str, reason: DeadReason, failure_count: u32) -> bool {
        let mut newly = false;
        self.dead.entry(domain.to_string()).or_insert_with(|| {
            newly = true;
            DeadMark {
                reason,
                failure_count,
                discovered: true,
            }
        });
        newly
    }

    /// 收到任意HTTP响应：清零失败计数，并使域名不再因超时被判死
    pub fn record_response(&self, domain: &str) {
        self.failures.remove(domain);
        if !self.responded.contains(domain) {
            self.responded.insert(domain.to_string());
        }
    }

    /// 记录一次请求失败
    ///
    /// # 返回值
    ///
    /// 这次失败使域名越过阈值并被判定死亡时返回死亡原因
    pub fn record_failure(&self, domain: &str, class: ErrorClass) -> Option<DeadReason> {
        if !class.counts_against_domain() {
            return None;
        }
        if class == ErrorClass::Timeout && self.responded.contains(domain) {
            return None;
        }

        let count = {
            let mut entry = self.failures.entry(domain.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };
        if count < self.threshold {
            return None;
        }

        let reason = match class {
            ErrorClass::Dns => DeadReason::HttpDnsError,
            ErrorClass::Connect => DeadReason::HttpRefused,
            _ => DeadReason::HttpFailures,
        };
        if self.mark_dead(domain, reason, count) {
            Some(reason)
        } else {
            None
        }
    }

    /// 记录一个因域名死亡而跳过的URL
    pub fn note_skip(&self, domain: &str) {
        *self.skipped.entry(domain.to_string()).or_insert(0) += 1;
    }

    /// 域名的并发限制信号量，首次访问时创建
    pub fn semaphore(&self, domain: &str) -> Arc<Semaphore> {
        if let Some(sem) = self.semaphores.get(domain) {
            return sem.clone();
        }
        self.semaphores
            .entry(domain.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.max_conns)))
            .clone()
    }

    /// 本次抓取中新判定死亡的域名
    pub fn http_dead_domains(&self) -> Vec<HttpDeadDomain> {
        let mut domains: Vec<HttpDeadDomain> = self
            .dead
            .iter()
            .filter(|m| m.discovered)
            .map(|m| HttpDeadDomain {
                domain: m.key().clone(),
                reason: m.reason,
                failure_count: m.failure_count,
                skipped_urls: self.skipped.get(m.key()).map(|c| *c).unwrap_or(0),
            })
            .collect();
        domains.sort_by(|a, b| a.domain.cmp(&b.domain));
        domains
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_threshold_kills_domain() {
        let guard = DomainGuard::new(2, 8);

        assert_eq!(guard.record_failure("down.example", ErrorClass::Connect), None);
        assert_eq!(guard.dead_reason("down.example"), None);
        assert_eq!(
            guard.record_failure("down.example", ErrorClass::Connect),
            Some(DeadReason::HttpRefused)
        );
        assert_eq!(guard.dead_reason("down.example"), Some(DeadReason::HttpRefused));
        assert_eq!(guard.record_failure("down.example", ErrorClass::Connect), None);

        let dead = guard.http_dead_domains();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].failure_count, 2);
    }

    #[test]
    fn test_response_resets_and_grants_timeout_immunity() {
        let guard = DomainGuard::new(2, 8);

        guard.record_failure("slow.example", ErrorClass::Timeout);
        guard.record_response("slow.example");
        for _ in 0..5 {
            assert_eq!(guard.record_failure("slow.example", ErrorClass::Timeout), None);
        }
        assert_eq!(guard.dead_reason("slow.example"), None);

        guard.record_failure("slow.example", ErrorClass::Dns);
        assert_eq!(
            guard.record_failure("slow.example", ErrorClass::Dns),
            Some(DeadReason::HttpDnsError)
        );
    }

    #[test]
    fn test_non_domain_errors_are_ignored() {
        let guard = DomainGuard::new(1, 8);
        assert_eq!(guard.record_failure("x.example", ErrorClass::Body), None);
        assert_eq!(guard.record_failure("x.example", ErrorClass::Redirect), None);
        assert_eq!(guard.dead_reason("x.example"), None);
    }

    #[test]
    fn test_preloaded_domains_are_not_reported_as_http_dead() {
        let guard = DomainGuard::new(2, 8);
        let mut preset = HashMap::new();
        preset.insert("dead.invalid".to_string(), DeadReason::DnsNxdomain);
        guard.preload(&preset);

        assert_eq!(guard.dead_reason("dead.invalid"), Some(DeadReason::DnsNxdomain));
        assert!(!guard.mark_dead("dead.invalid", DeadReason::HttpRefused, 3));
        assert!(guard.http_dead_domains().is_empty());
        assert_eq!(guard.dead_reason("dead.invalid"), Some(DeadReason::DnsNxdomain));
    }

    #[test]
    fn test_skips_are_attributed() {
        let guard = DomainGuard::new(1, 8);
        guard.record_failure("gone.example", ErrorClass::Connect);
        guard.note_skip("gone.example");
        guard.note_skip("gone.example");
        assert_eq!(guard.http_dead_domains()[0].skipped_urls, 2);
    }

    #[tokio::test]
    async fn test_semaphore_limits_per_domain() {
        let guard = DomainGuard::new(2, 2);
        let sem = guard.semaphore("busy.example");
        let _a = sem.clone().acquire_owned().await.unwrap();
        let _b = sem.clone().acquire_owned().await.unwrap();
        assert!(guard.semaphore("busy.example").try_acquire().is_err());
        assert_eq!(guard.semaphore("other.example").available_permits(), 2);
    }
}
