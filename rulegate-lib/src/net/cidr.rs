use ipnet::IpNet;
use std::cmp::Ordering;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use thiserror::Error;

use super::address::{embedded_ipv4, parse_address};

/// Errors raised while constructing a [`CidrBlock`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CidrError {
    #[error("invalid CIDR block '{0}': expected <address>/<prefix length>")]
    Malformed(String),

    #[error("invalid address '{0}' in CIDR block")]
    InvalidAddress(String),

    #[error("invalid prefix length {prefix_len} for IP{family} address")]
    PrefixLength { prefix_len: u32, family: &'static str },

    #[error("illegal network address {address} for prefix length {prefix_len}: {host_bits} low order bits must be zero")]
    HostBits { address: IpAddr, prefix_len: u8, host_bits: u8 },
}

/// A containment test between address families that cannot be reconciled
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{address} is not an IPv4 compatible address (block {block})")]
pub struct AddressFamilyError {
    pub block: CidrBlock,
    pub address: IpAddr,
}

/// A Classless Inter-Domain Routing address block.
///
/// Wraps an [`IpNet`] whose base address is required to be the network address itself, and
/// adds containment that works across address families:
///
/// - IPv4 block, IPv6 address: the address must carry an IPv4 address in mapped
///   (`::ffff:a.b.c.d`) or compatible (`::a.b.c.d`) form, whose low 32 bits are tested.
///   Any other IPv6 address is an [`AddressFamilyError`].
/// - IPv6 block, IPv4 address: the address is widened to its compatible and mapped IPv6
///   forms and matches if the block contains either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CidrBlock {
    net: IpNet,
}

impl CidrBlock {
    /// Create a block from its network address and prefix length.
    ///
    /// The prefix length must not exceed the family width (32 or 128 bits) and every bit of
    /// `prefix` past the prefix length must be zero.
    pub fn new(prefix: IpAddr, prefix_len: u8) -> Result<Self, CidrError> {
        let net = IpNet::new(prefix, prefix_len).map_err(|_| CidrError::PrefixLength {
            prefix_len: prefix_len.into(),
            family: family_name(&prefix),
        })?;
        if net.network() != prefix {
            return Err(CidrError::HostBits {
                address: prefix,
                prefix_len,
                host_bits: net.max_prefix_len() - prefix_len,
            });
        }
        Ok(Self { net })
    }

    /// The network address of the block.
    pub fn prefix(&self) -> IpAddr {
        self.net.network()
    }

    /// Prefix length in bits.
    pub fn prefix_len(&self) -> u8 {
        self.net.prefix_len()
    }

    pub fn is_ipv4(&self) -> bool {
        matches!(self.net, IpNet::V4(_))
    }

    /// Network mask bytes, 4 or 16 of them depending on the block family.
    pub fn network_mask(&self) -> Vec<u8> {
        super::address::address_bytes(&self.net.netmask())
    }

    /// Host mask bytes, the complement of [`CidrBlock::network_mask`].
    pub fn host_mask(&self) -> Vec<u8> {
        super::address::address_bytes(&self.net.hostmask())
    }

    /// Check if the block contains `addr`, reconciling address families.
    pub fn contains(&self, addr: &IpAddr) -> Result<bool, AddressFamilyError> {
        match (&self.net, addr) {
            (IpNet::V4(net), IpAddr::V4(v4)) => Ok(net.contains(v4)),
            (IpNet::V6(net), IpAddr::V6(v6)) => Ok(net.contains(v6)),
            (IpNet::V4(net), IpAddr::V6(v6)) => match embedded_ipv4(v6) {
                Some(v4) => Ok(net.contains(&v4)),
                None => Err(AddressFamilyError { block: *self, address: *addr }),
            },
            (IpNet::V6(net), IpAddr::V4(v4)) => {
                Ok(net.contains(&v4.to_ipv6_compatible()) || net.contains(&v4.to_ipv6_mapped()))
            }
        }
    }

    /// Bytes used for ordering. Blocks of different families are compared in the
    /// IPv4-mapped IPv6 space.
    fn ordering_key(&self, other_is_v4: bool) -> [u8; 16] {
        let widened = match self.net {
            IpNet::V4(net) if other_is_v4 => {
                let mut key = [0u8; 16];
                key[..4].copy_from_slice(&net.network().octets());
                return key;
            }
            IpNet::V4(net) => net.network().to_ipv6_mapped(),
            IpNet::V6(net) => net.network(),
        };
        widened.octets()
    }
}

impl Ord for CidrBlock {
    /// Network address bytes first (unsigned, big-endian), then prefix length ascending.
    fn cmp(&self, other: &Self) -> Ordering {
        let same_v4 = self.is_ipv4() && other.is_ipv4();
        self.ordering_key(same_v4)
            .cmp(&other.ordering_key(same_v4))
            .then_with(|| self.prefix_len().cmp(&other.prefix_len()))
    }
}

impl PartialOrd for CidrBlock {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for CidrBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.net.network(), self.net.prefix_len())
    }
}

impl FromStr for CidrBlock {
    type Err = CidrError;

    /// Parse `address/prefix_len`. The address accepts the same forms as
    /// [`parse_address`](super::address::parse_address).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (addr, len) = s.split_once('/').ok_or_else(|| CidrError::Malformed(s.to_string()))?;
        let prefix = parse_address(addr).ok_or_else(|| CidrError::InvalidAddress(addr.to_string()))?;
        if len.is_empty() || !len.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CidrError::Malformed(s.to_string()));
        }
        let wide: u32 = len.parse().map_err(|_| CidrError::Malformed(s.to_string()))?;
        let prefix_len = u8::try_from(wide)
            .map_err(|_| CidrError::PrefixLength { prefix_len: wide, family: family_name(&prefix) })?;
        Self::new(prefix, prefix_len)
    }
}

fn family_name(addr: &IpAddr) -> &'static str {
    match addr {
        IpAddr::V4(_) => "v4",
        IpAddr::V6(_) => "v6",
    }
}
