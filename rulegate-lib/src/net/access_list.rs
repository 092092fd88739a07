use ahash::AHashMap;
use std::net::IpAddr;

use super::cidr::CidrBlock;

/// Named CIDR lists consulted by `IP in <name>` predicates.
#[derive(Debug, Clone, Default)]
pub struct AccessLists {
    lists: AHashMap<String, Vec<CidrBlock>>,
}

impl AccessLists {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a list.
    pub fn insert(&mut self, name: impl Into<String>, blocks: Vec<CidrBlock>) {
        self.lists.insert(name.into(), blocks);
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.lists.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&[CidrBlock]> {
        self.lists.get(name).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    /// Check if `addr` falls into any block of the named list.
    ///
    /// # Logic:
    /// - Unknown list: never contains anything
    /// - Empty list: contains nothing
    /// - Entries of a family that cannot hold `addr` (a real IPv6 client against an IPv4
    ///   block) are skipped rather than failing the lookup, lists may mix both families
    pub fn contains(&self, name: &str, addr: &IpAddr) -> bool {
        let Some(blocks) = self.lists.get(name) else {
            tracing::debug!(list = name, "access list not defined");
            return false;
        };
        blocks.iter().any(|block| block.contains(addr).unwrap_or(false))
    }
}

impl FromIterator<(String, Vec<CidrBlock>)> for AccessLists {
    fn from_iter<I: IntoIterator<Item = (String, Vec<CidrBlock>)>>(iter: I) -> Self {
        Self { lists: iter.into_iter().collect() }
    }
}
