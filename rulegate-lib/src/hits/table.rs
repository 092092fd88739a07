//! Per-client request and match counters.

use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::rules::RuleId;

const NO_RULE: u64 = u64::MAX;

#[derive(Debug)]
struct HitEntry {
    hits: AtomicU64,
    matches: AtomicU64,
    last_rule: AtomicU64,
    /// Milliseconds since the table epoch
    last_hit_ms: AtomicU64,
}

impl HitEntry {
    fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            matches: AtomicU64::new(0),
            last_rule: AtomicU64::new(NO_RULE),
            last_hit_ms: AtomicU64::new(0),
        }
    }

    fn hit(&self, now_ms: u64) -> u64 {
        self.last_hit_ms.fetch_max(now_ms, Ordering::Relaxed);
        self.hits.fetch_add(1, Ordering::Relaxed).saturating_add(1)
    }
}

/// Concurrent hit counters keyed by client address.
///
/// Entries are created on the first hit from an address. Counters are plain atomics, so
/// unrelated addresses never contend and readers may briefly observe a stale value under
/// racing writers.
///
/// Addresses are folded to their canonical form first: `::ffff:10.0.0.1` and `10.0.0.1`
/// share one entry.
#[derive(Debug)]
pub struct HitTable {
    entries: DashMap<IpAddr, HitEntry>,
    epoch: Instant,
}

impl Default for HitTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HitTable {
    pub fn new() -> Self {
        Self { entries: DashMap::new(), epoch: Instant::now() }
    }

    /// Count a request from `addr` and return its hit count including this one.
    pub fn record_hit(&self, addr: &IpAddr) -> u64 {
        let key = addr.to_canonical();
        let now_ms = self.now_ms();
        if let Some(entry) = self.entries.get(&key) {
            return entry.hit(now_ms);
        }
        self.entries.entry(key).or_insert_with(HitEntry::new).hit(now_ms)
    }

    /// Count a rule match for `addr` and remember `rule_id` as its last matching rule.
    ///
    /// Creates the entry if `addr` was never hit.
    pub fn record_match(&self, addr: &IpAddr, rule_id: RuleId) {
        let key = addr.to_canonical();
        let record = |entry: &HitEntry| {
            entry.matches.fetch_add(1, Ordering::Relaxed);
            entry.last_rule.store(u64::from(rule_id), Ordering::Relaxed);
        };
        if let Some(entry) = self.entries.get(&key) {
            record(&entry);
            return;
        }
        record(&self.entries.entry(key).or_insert_with(HitEntry::new));
    }

    /// Total hits for `addr`, 0 if never seen.
    pub fn hits(&self, addr: &IpAddr) -> u64 {
        self.entries
            .get(&addr.to_canonical())
            .map(|e| e.hits.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Total rule matches for `addr`, 0 if never seen.
    pub fn matches(&self, addr: &IpAddr) -> u64 {
        self.entries
            .get(&addr.to_canonical())
            .map(|e| e.matches.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Id of the rule that last matched a request from `addr`.
    pub fn last_matching_rule(&self, addr: &IpAddr) -> Option<RuleId> {
        self.entries
            .get(&addr.to_canonical())
            .map(|e| e.last_rule.load(Ordering::Relaxed))
            .filter(|&id| id != NO_RULE)
            .and_then(|id| RuleId::try_from(id).ok())
    }

    /// When `addr` was last hit, `None` if never seen or only matched.
    pub fn last_hit(&self, addr: &IpAddr) -> Option<Instant> {
        let entry = self.entries.get(&addr.to_canonical())?;
        if entry.hits.load(Ordering::Relaxed) == 0 {
            return None;
        }
        let ms = entry.last_hit_ms.load(Ordering::Relaxed);
        self.epoch.checked_add(Duration::from_millis(ms))
    }

    /// Remove every entry whose last hit is at least `idle` ago. Returns how many went.
    pub fn sweep(&self, idle: Duration) -> usize {
        let now_ms = self.now_ms();
        let idle_ms = u64::try_from(idle.as_millis()).unwrap_or(u64::MAX);
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let last = entry.last_hit_ms.load(Ordering::Relaxed);
            let keep = now_ms.saturating_sub(last) < idle_ms;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};
    use std::sync::Arc;
    use std::thread;

    fn v4(a: u8, b: u8, c: u8, d: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(a, b, c, d))
    }

    #[test]
    fn test_unknown_address_defaults() {
        let table = HitTable::new();
        let addr = v4(10, 0, 0, 1);
        assert_eq!(table.hits(&addr), 0);
        assert_eq!(table.matches(&addr), 0);
        assert_eq!(table.last_matching_rule(&addr), None);
        assert_eq!(table.last_hit(&addr), None);
        assert!(table.is_empty());
    }

    #[test]
    fn test_record_hit_returns_running_count() {
        let table = HitTable::new();
        let addr = v4(10, 0, 0, 1);
        assert_eq!(table.record_hit(&addr), 1);
        assert_eq!(table.record_hit(&addr), 2);
        assert_eq!(table.hits(&addr), 2);
        assert_eq!(table.matches(&addr), 0);
        assert!(table.last_hit(&addr).is_some());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_record_match() {
        let table = HitTable::new();
        let addr = v4(10, 0, 0, 1);
        table.record_hit(&addr);
        table.record_match(&addr, 7);
        table.record_match(&addr, 3);
        assert_eq!(table.matches(&addr), 2);
        assert_eq!(table.last_matching_rule(&addr), Some(3));
    }

    #[test]
    fn test_mapped_address_shares_entry() {
        let table = HitTable::new();
        let plain = v4(192, 168, 0, 1);
        let mapped = IpAddr::V6(Ipv4Addr::new(192, 168, 0, 1).to_ipv6_mapped());
        table.record_hit(&plain);
        table.record_hit(&mapped);
        assert_eq!(table.hits(&plain), 2);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_addresses_are_independent() {
        let table = HitTable::new();
        table.record_hit(&v4(10, 0, 0, 1));
        table.record_hit(&IpAddr::V6(Ipv6Addr::LOCALHOST));
        assert_eq!(table.hits(&v4(10, 0, 0, 1)), 1);
        assert_eq!(table.hits(&IpAddr::V6(Ipv6Addr::LOCALHOST)), 1);
        assert_eq!(table.hits(&v4(10, 0, 0, 2)), 0);
    }

    #[test]
    fn test_sweep() {
        let table = HitTable::new();
        table.record_hit(&v4(10, 0, 0, 1));
        table.record_hit(&v4(10, 0, 0, 2));
        assert_eq!(table.sweep(Duration::from_secs(3600)), 0);
        assert_eq!(table.len(), 2);
        assert_eq!(table.sweep(Duration::ZERO), 2);
        assert!(table.is_empty());
    }

    #[test]
    fn test_concurrent_hits() {
        let table = Arc::new(HitTable::new());
        let addr = v4(10, 0, 0, 1);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let table = Arc::clone(&table);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        table.record_hit(&addr);
                    }
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().is_ok());
        }
        assert_eq!(table.hits(&addr), 8000);
    }
}
