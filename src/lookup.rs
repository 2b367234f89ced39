// Copyright (c) SimpleStaking and Tezedge Contributors
// SPDX-License-Identifier: MIT

//! Append-only caches for the expensive identity lookups.
//!
//! Both caches live for one monitoring session and grow without bound,
//! entries are immutable once appended. A failed resolution is cached
//! with the `"?"` sentinel so it is not retried on every occurrence.

use std::net::IpAddr;

/// Sentinel display value for anything that failed to resolve.
pub const UNRESOLVED: &str = "?";

/// External resolvers consumed by the pipeline. Every method may fail,
/// failure degrades to the sentinel and never interrupts the stream.
pub trait NameResolver {
    /// Security identifier to (domain, account).
    fn account_for_sid(&self, sid: &[u8]) -> Option<(String, String)>;
    /// Filter identifier to its display name.
    fn filter_name(&self, id: u64) -> Option<String>;
    /// Layer identifier to its display name.
    fn layer_name(&self, id: u16) -> Option<String>;
    fn country(&self, addr: &IpAddr) -> Option<String>;
    fn location(&self, addr: &IpAddr) -> Option<String>;
    /// Service name of a port, `protocol` is the ip protocol number.
    fn service_name(&self, port: u16, protocol: u8) -> Option<String>;
}

impl<T: NameResolver> NameResolver for std::sync::Arc<T> {
    fn account_for_sid(&self, sid: &[u8]) -> Option<(String, String)> {
        (**self).account_for_sid(sid)
    }

    fn filter_name(&self, id: u64) -> Option<String> {
        (**self).filter_name(id)
    }

    fn layer_name(&self, id: u16) -> Option<String> {
        (**self).layer_name(id)
    }

    fn country(&self, addr: &IpAddr) -> Option<String> {
        (**self).country(addr)
    }

    fn location(&self, addr: &IpAddr) -> Option<String> {
        (**self).location(addr)
    }

    fn service_name(&self, port: u16, protocol: u8) -> Option<String> {
        (**self).service_name(port, protocol)
    }
}

/// Resolver that knows nothing, every lookup degrades to the sentinel.
pub struct NullResolver;

impl NameResolver for NullResolver {
    fn account_for_sid(&self, _sid: &[u8]) -> Option<(String, String)> {
        None
    }

    fn filter_name(&self, _id: u64) -> Option<String> {
        None
    }

    fn layer_name(&self, _id: u16) -> Option<String> {
        None
    }

    fn country(&self, _addr: &IpAddr) -> Option<String> {
        None
    }

    fn location(&self, _addr: &IpAddr) -> Option<String> {
        None
    }

    fn service_name(&self, port: u16, protocol: u8) -> Option<String> {
        well_known_service(port, protocol).map(|s| s.to_string())
    }
}

/// Fallback service-name table for the common ports.
pub fn well_known_service(port: u16, protocol: u8) -> Option<&'static str> {
    use crate::events::{IPPROTO_TCP, IPPROTO_UDP};

    let name = match (port, protocol) {
        (53, _) => "domain",
        (80, IPPROTO_TCP) => "http",
        (123, IPPROTO_UDP) => "ntp",
        (443, IPPROTO_TCP) => "https",
        (22, IPPROTO_TCP) => "ssh",
        (25, IPPROTO_TCP) => "smtp",
        (137, IPPROTO_UDP) => "netbios-ns",
        (138, IPPROTO_UDP) => "netbios-dgm",
        (139, IPPROTO_TCP) => "netbios-ssn",
        (445, IPPROTO_TCP) => "microsoft-ds",
        (1900, IPPROTO_UDP) => "ssdp",
        (3389, IPPROTO_TCP) => "ms-wbt-server",
        (5353, IPPROTO_UDP) => "mdns",
        _ => return None,
    };
    Some(name)
}

/// Render a security identifier in the `S-1-...` string form.
/// `None` when the bytes do not look like a SID.
pub fn sid_string(sid: &[u8]) -> Option<String> {
    use std::fmt::Write;

    if sid.len() < 8 {
        return None;
    }
    let revision = sid[0];
    let count = sid[1] as usize;
    if revision != 1 || count > 15 || sid.len() != 8 + 4 * count {
        return None;
    }
    let mut authority = 0u64;
    for &b in &sid[2..8] {
        authority = (authority << 8) | u64::from(b);
    }
    let mut s = format!("S-{}-{}", revision, authority);
    for i in 0..count {
        let at = 8 + 4 * i;
        let sub = u32::from_le_bytes([sid[at], sid[at + 1], sid[at + 2], sid[at + 3]]);
        let _ = write!(s, "-{}", sub);
    }
    Some(s)
}

pub struct SidEntry {
    pub sid: Vec<u8>,
    pub sid_str: String,
    pub domain: String,
    pub account: String,
}

#[derive(Default)]
pub struct SidCache {
    entries: Vec<SidEntry>,
}

impl SidCache {
    pub fn new() -> Self {
        SidCache::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Keyed by byte-exact identifier equality. On a miss the account
    /// lookup runs exactly once, whatever its outcome.
    pub fn lookup_or_add<R>(&mut self, sid: &[u8], resolver: &R) -> &SidEntry
    where
        R: NameResolver + ?Sized,
    {
        if let Some(at) = self.entries.iter().position(|e| e.sid == sid) {
            return &self.entries[at];
        }

        let sid_str = match sid_string(sid) {
            Some(s) => s,
            None => {
                tracing::debug!(sid = hex::encode(sid).as_str(), "malformed sid");
                UNRESOLVED.to_string()
            },
        };
        let (domain, account) = match resolver.account_for_sid(sid) {
            Some(v) => v,
            // no account mapping, show the raw identifier instead
            None => (String::new(), sid_str.clone()),
        };
        self.entries.push(SidEntry {
            sid: sid.to_vec(),
            sid_str,
            domain,
            account,
        });
        self.entries.last().unwrap()
    }
}

pub struct FilterEntry {
    pub id: u64,
    pub name: String,
}

pub struct FilterCache {
    entries: Vec<FilterEntry>,
    // filter id zero is the reserved "no filter" value
    null_entry: FilterEntry,
}

impl Default for FilterCache {
    fn default() -> Self {
        FilterCache {
            entries: Vec::new(),
            null_entry: FilterEntry {
                id: 0,
                name: "NULL".to_string(),
            },
        }
    }
}

impl FilterCache {
    pub fn new() -> Self {
        FilterCache::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn lookup_or_add<R>(&mut self, id: u64, resolver: &R) -> &FilterEntry
    where
        R: NameResolver + ?Sized,
    {
        if id == 0 {
            return &self.null_entry;
        }
        if let Some(at) = self.entries.iter().position(|e| e.id == id) {
            return &self.entries[at];
        }

        let name = resolver
            .filter_name(id)
            .unwrap_or_else(|| UNRESOLVED.to_string());
        self.entries.push(FilterEntry { id, name });
        self.entries.last().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::net::IpAddr;
    use super::{sid_string, FilterCache, NameResolver, SidCache, UNRESOLVED};

    /// Counts how often the expensive resolutions actually run.
    #[derive(Default)]
    struct Counting {
        sid_calls: Cell<usize>,
        filter_calls: Cell<usize>,
        fail: bool,
    }

    impl NameResolver for Counting {
        fn account_for_sid(&self, _sid: &[u8]) -> Option<(String, String)> {
            self.sid_calls.set(self.sid_calls.get() + 1);
            if self.fail {
                None
            } else {
                Some(("NT AUTHORITY".to_string(), "SYSTEM".to_string()))
            }
        }

        fn filter_name(&self, id: u64) -> Option<String> {
            self.filter_calls.set(self.filter_calls.get() + 1);
            if self.fail {
                None
            } else {
                Some(format!("filter-{}", id))
            }
        }

        fn layer_name(&self, _id: u16) -> Option<String> {
            None
        }

        fn country(&self, _addr: &IpAddr) -> Option<String> {
            None
        }

        fn location(&self, _addr: &IpAddr) -> Option<String> {
            None
        }

        fn service_name(&self, _port: u16, _protocol: u8) -> Option<String> {
            None
        }
    }

    fn system_sid() -> Vec<u8> {
        // S-1-5-18
        let mut sid = vec![1, 1, 0, 0, 0, 0, 0, 5];
        sid.extend_from_slice(&18u32.to_le_bytes());
        sid
    }

    #[test]
    fn sid_renders_as_string() {
        assert_eq!(sid_string(&system_sid()).unwrap(), "S-1-5-18");
        assert_eq!(sid_string(&[1, 2, 3]), None);
        // count byte promises more sub-authorities than present
        assert_eq!(sid_string(&[1, 4, 0, 0, 0, 0, 0, 5, 1, 0, 0, 0]), None);
    }

    #[test]
    fn sid_cache_resolves_once() {
        let resolver = Counting::default();
        let mut cache = SidCache::new();
        for _ in 0..5 {
            let entry = cache.lookup_or_add(&system_sid(), &resolver);
            assert_eq!(entry.sid_str, "S-1-5-18");
            assert_eq!(entry.account, "SYSTEM");
            assert_eq!(entry.domain, "NT AUTHORITY");
        }
        assert_eq!(resolver.sid_calls.get(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failed_sid_resolution_is_cached_too() {
        let resolver = Counting {
            fail: true,
            ..Default::default()
        };
        let mut cache = SidCache::new();
        for _ in 0..3 {
            let entry = cache.lookup_or_add(&system_sid(), &resolver);
            // falls back to the identifier string
            assert_eq!(entry.account, "S-1-5-18");
            assert_eq!(entry.domain, "");
        }
        assert_eq!(resolver.sid_calls.get(), 1);
    }

    #[test]
    fn sid_cache_keyed_by_bytes() {
        let resolver = Counting::default();
        let mut cache = SidCache::new();
        let mut other = system_sid();
        *other.last_mut().unwrap() = 19;
        cache.lookup_or_add(&system_sid(), &resolver);
        cache.lookup_or_add(&other, &resolver);
        assert_eq!(cache.len(), 2);
        assert_eq!(resolver.sid_calls.get(), 2);
    }

    #[test]
    fn filter_cache_resolves_once() {
        let resolver = Counting::default();
        let mut cache = FilterCache::new();
        for _ in 0..4 {
            let entry = cache.lookup_or_add(7, &resolver);
            assert_eq!(entry.name, "filter-7");
        }
        assert_eq!(resolver.filter_calls.get(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn filter_zero_is_the_static_sentinel() {
        let resolver = Counting::default();
        let mut cache = FilterCache::new();
        let entry = cache.lookup_or_add(0, &resolver);
        assert_eq!(entry.name, "NULL");
        assert_eq!(resolver.filter_calls.get(), 0);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn failed_filter_resolution_keeps_sentinel() {
        let resolver = Counting {
            fail: true,
            ..Default::default()
        };
        let mut cache = FilterCache::new();
        let entry = cache.lookup_or_add(9, &resolver);
        assert_eq!(entry.name, UNRESOLVED);
        let _ = cache.lookup_or_add(9, &resolver);
        assert_eq!(resolver.filter_calls.get(), 1);
    }
}
